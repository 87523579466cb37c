//! Event system for session reconciliation.
//!
//! This module defines the events that reach the controller from outside a user-triggered
//! operation (contract domain events and wallet account switches), the handler trait used
//! to react to them, and the dispatcher that fans each event out to every registered
//! handler. Both external streams are merged into one ordered `SessionEvent` stream, so
//! handlers see events one at a time in arrival order.

use crate::ledger::{Address, LedgerError, LedgerEvent, LedgerEventStream};
use crate::session::types::SessionError;
use crate::wallet::AccountChangeStream;
use futures_util::StreamExt;
use std::pin::Pin;
use tracing::debug;

/// Events that drive asynchronous reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A vote was recorded on the contract
    VoteCast {
        voter: Address,
        proposal_index: usize,
    },
    /// The contract declared a round winner
    WinnerDeclared { winner_name: String },
    /// The wallet switched accounts; the first entry is the active account
    AccountsChanged { accounts: Vec<Address> },
    /// The contract event subscription reported an error
    SubscriptionError { error: String },
}

/// Merged stream of session events.
pub type SessionEventStream = Pin<Box<dyn futures_util::Stream<Item = SessionEvent> + Send>>;

/// Trait for handling session events.
#[async_trait::async_trait]
pub trait SessionEventHandler: Send + Sync {
    /// Handle a session event.
    async fn handle(&mut self, event: &SessionEvent) -> Result<(), SessionError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order. A failing handler is logged and does not
/// stop the remaining handlers from seeing the event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SessionEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Box<dyn SessionEventHandler>) {
        self.handlers.push(handler);
    }

    #[cfg(test)]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(&mut self, event: &SessionEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }

    /// Dispatch every event from `events` until the stream ends.
    pub async fn run(mut self, mut events: SessionEventStream) {
        while let Some(event) = events.next().await {
            self.dispatch(&event).await;
        }
        debug!("Session event stream ended");
    }
}

/// Handler that records every event in the trace log.
pub struct TracingEventHandler;

#[async_trait::async_trait]
impl SessionEventHandler for TracingEventHandler {
    async fn handle(&mut self, event: &SessionEvent) -> Result<(), SessionError> {
        debug!("Session event: {:?}", event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TracingEventHandler"
    }
}

/// Convert a contract event subscription item into a session event.
pub fn convert_ledger_event(item: Result<LedgerEvent, LedgerError>) -> SessionEvent {
    match item {
        Ok(LedgerEvent::VoteCast {
            voter,
            proposal_index,
        }) => SessionEvent::VoteCast {
            voter,
            proposal_index,
        },
        Ok(LedgerEvent::Winner { winner_name }) => SessionEvent::WinnerDeclared { winner_name },
        Err(e) => SessionEvent::SubscriptionError {
            error: e.to_string(),
        },
    }
}

/// Merge the contract event stream and the wallet account stream into one session stream.
///
/// Either side may be absent (subscription failed, no wallet provider).
pub fn merge_streams(
    ledger: Option<LedgerEventStream>,
    accounts: Option<AccountChangeStream>,
) -> SessionEventStream {
    let ledger: SessionEventStream = match ledger {
        Some(stream) => Box::pin(stream.map(convert_ledger_event)),
        None => Box::pin(futures_util::stream::empty::<SessionEvent>()),
    };
    let accounts: SessionEventStream = match accounts {
        Some(stream) => Box::pin(stream.map(|accounts| SessionEvent::AccountsChanged { accounts })),
        None => Box::pin(futures_util::stream::empty::<SessionEvent>()),
    };

    Box::pin(futures_util::stream::select(ledger, accounts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingHandler {
        seen: Arc<Mutex<Vec<SessionEvent>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl SessionEventHandler for RecordingHandler {
        async fn handle(&mut self, event: &SessionEvent) -> Result<(), SessionError> {
            self.seen.lock().unwrap().push(event.clone());
            if self.fail {
                return Err(SessionError::Config("boom".into()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "RecordingHandler"
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_the_next_one() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(RecordingHandler {
            seen: first.clone(),
            fail: true,
        }));
        dispatcher.register_handler(Box::new(RecordingHandler {
            seen: second.clone(),
            fail: false,
        }));
        assert_eq!(dispatcher.handler_count(), 2);

        let event = SessionEvent::WinnerDeclared {
            winner_name: "Sam".into(),
        };
        dispatcher.dispatch(&event).await;

        assert_eq!(first.lock().unwrap().as_slice(), &[event.clone()]);
        assert_eq!(second.lock().unwrap().as_slice(), &[event]);
    }

    #[tokio::test]
    async fn merged_stream_carries_both_sources() {
        let ledger: LedgerEventStream = Box::pin(futures_util::stream::iter(vec![
            Ok(LedgerEvent::VoteCast {
                voter: Address::new("0x01"),
                proposal_index: 0,
            }),
            Err(LedgerError::NoData),
        ]));
        let accounts: AccountChangeStream =
            Box::pin(futures_util::stream::iter(vec![vec![Address::new("0x02")]]));

        let events: Vec<_> = merge_streams(Some(ledger), Some(accounts)).collect().await;

        assert_eq!(events.len(), 3);
        assert!(events.contains(&SessionEvent::AccountsChanged {
            accounts: vec![Address::new("0x02")]
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SubscriptionError { .. })));
    }

    #[tokio::test]
    async fn missing_sources_yield_an_empty_stream() {
        let events: Vec<_> = merge_streams(None, None).collect().await;
        assert!(events.is_empty());
    }
}
