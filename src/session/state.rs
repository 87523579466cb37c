//! Session state store.
//!
//! `SessionState` is the synchronized snapshot of the contract as seen by the connected
//! account. The store is a plain holder: it applies `SessionPatch`es without validating
//! them and publishes every merged snapshot to subscribers through a `watch` channel, which
//! is how a view layer learns it should redraw.

use crate::ledger::{Address, RecentResults, Wei};
use crate::session::types::ConnectionState;
use crate::utils::format_wei_as_ether;
use itertools::izip;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-account vote allowance for one round.
pub const MAX_VOTES: u32 = 5;

/// Number of candidates on the ballot.
pub const CANDIDATE_COUNT: usize = 3;

/// Tallies, one per candidate, in ballot order.
pub type VoteCounts = [u64; CANDIDATE_COUNT];

/// One completed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub round_number: u64,
    pub winning_proposal_name: String,
    pub winning_vote_count: u64,
}

/// Zip the contract's parallel result columns into rounds, keeping contract order.
///
/// Columns of unequal length are truncated to the shortest one.
pub fn history_from_results(results: RecentResults) -> Vec<RoundResult> {
    izip!(
        results.round_numbers,
        results.winning_names,
        results.winning_counts
    )
    .map(|(round_number, winning_proposal_name, winning_vote_count)| RoundResult {
        round_number,
        winning_proposal_name,
        winning_vote_count,
    })
    .collect()
}

/// Synchronized session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Contract administrator, once loaded.
    pub project_manager: Option<Address>,
    /// Contract funds in wei.
    pub balance: Wei,
    /// Connected wallet account, if any.
    pub current_account: Option<Address>,
    /// Votes the current account may still cast this round, once known.
    pub votes_remaining: Option<u32>,
    pub voting_open: bool,
    pub vote_counts: VoteCounts,
    /// Completed rounds, oldest first, replaced wholesale on every refresh.
    pub history: Vec<RoundResult>,
    pub is_destroyed: bool,
    /// Outcome of the most recent operation.
    pub message: String,
    pub connection: ConnectionState,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            project_manager: None,
            balance: 0,
            current_account: None,
            votes_remaining: None,
            voting_open: false,
            vote_counts: [0; CANDIDATE_COUNT],
            history: Vec::new(),
            is_destroyed: false,
            message: String::new(),
            connection: ConnectionState::Disconnected,
        }
    }
}

impl SessionState {
    /// Whether the connected account administers the contract.
    pub fn is_manager(&self) -> bool {
        match (&self.current_account, &self.project_manager) {
            (Some(account), Some(manager)) => account == manager,
            _ => false,
        }
    }

    /// Whether a vote button should be enabled. Not enforced by the controller, which
    /// re-checks against fresh contract reads before every vote.
    pub fn can_vote(&self) -> bool {
        self.connection.is_connected()
            && self.current_account.is_some()
            && self.voting_open
            && !self.is_manager()
            && !self.is_destroyed
            && self.votes_remaining.is_some_and(|remaining| remaining > 0)
    }

    pub fn balance_ether(&self) -> String {
        format_wei_as_ether(self.balance)
    }

    /// Most recently completed round.
    pub fn latest_round(&self) -> Option<&RoundResult> {
        self.history.last()
    }
}

/// Partial update applied by `SessionStore::merge`. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub project_manager: Option<Address>,
    pub balance: Option<Wei>,
    /// `Some(None)` clears the account.
    pub current_account: Option<Option<Address>>,
    /// `Some(None)` clears the allowance.
    pub votes_remaining: Option<Option<u32>>,
    pub voting_open: Option<bool>,
    pub vote_counts: Option<VoteCounts>,
    pub history: Option<Vec<RoundResult>>,
    pub is_destroyed: Option<bool>,
    pub message: Option<String>,
    pub connection: Option<ConnectionState>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_project_manager(mut self, manager: Address) -> Self {
        self.project_manager = Some(manager);
        self
    }

    pub fn with_balance(mut self, balance: Wei) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_current_account(mut self, account: Option<Address>) -> Self {
        self.current_account = Some(account);
        self
    }

    /// Set the allowance, clamped to `MAX_VOTES`.
    pub fn with_votes_remaining(mut self, remaining: Option<u32>) -> Self {
        self.votes_remaining = Some(remaining.map(|r| r.min(MAX_VOTES)));
        self
    }

    pub fn with_voting_open(mut self, open: bool) -> Self {
        self.voting_open = Some(open);
        self
    }

    pub fn with_vote_counts(mut self, counts: VoteCounts) -> Self {
        self.vote_counts = Some(counts);
        self
    }

    pub fn with_history(mut self, history: Vec<RoundResult>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_destroyed(mut self, destroyed: bool) -> Self {
        self.is_destroyed = Some(destroyed);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_connection(mut self, connection: ConnectionState) -> Self {
        self.connection = Some(connection);
        self
    }

    fn apply(self, state: &mut SessionState) {
        if let Some(manager) = self.project_manager {
            state.project_manager = Some(manager);
        }
        if let Some(balance) = self.balance {
            state.balance = balance;
        }
        if let Some(account) = self.current_account {
            state.current_account = account;
        }
        if let Some(remaining) = self.votes_remaining {
            state.votes_remaining = remaining;
        }
        if let Some(open) = self.voting_open {
            state.voting_open = open;
        }
        if let Some(counts) = self.vote_counts {
            state.vote_counts = counts;
        }
        if let Some(history) = self.history {
            state.history = history;
        }
        if let Some(destroyed) = self.is_destroyed {
            state.is_destroyed = destroyed;
        }
        if let Some(message) = self.message {
            state.message = message;
        }
        if let Some(connection) = self.connection {
            state.connection = connection;
        }
    }
}

/// Shared holder for the session snapshot.
///
/// Cloning the store yields another handle to the same snapshot. Each `merge` is applied
/// atomically, so concurrent merges touching the same field resolve last-writer-wins.
#[derive(Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionState>>,
}

impl SessionStore {
    pub fn new(initial: SessionState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    /// Apply a partial update and notify subscribers.
    pub fn merge(&self, patch: SessionPatch) {
        if patch.is_empty() {
            return;
        }
        self.sender.send_modify(|state| patch.apply(state));
    }

    /// Observe snapshot changes. The receiver starts at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_fields_present_in_patch() {
        let store = SessionStore::default();
        store.merge(
            SessionPatch::new()
                .with_balance(42)
                .with_voting_open(true)
                .with_message("loaded"),
        );
        store.merge(SessionPatch::new().with_vote_counts([1, 2, 3]));

        let state = store.get();
        assert_eq!(state.balance, 42);
        assert!(state.voting_open);
        assert_eq!(state.message, "loaded");
        assert_eq!(state.vote_counts, [1, 2, 3]);
    }

    #[test]
    fn last_merge_wins_on_overlapping_fields() {
        let store = SessionStore::default();
        store.merge(SessionPatch::new().with_balance(10));
        store.merge(SessionPatch::new().with_balance(7));
        assert_eq!(store.get().balance, 7);
    }

    #[test]
    fn explicit_none_clears_the_account() {
        let store = SessionStore::default();
        store.merge(SessionPatch::new().with_current_account(Some(Address::new("0x01"))));
        store.merge(SessionPatch::new().with_current_account(None));
        assert!(store.get().current_account.is_none());
    }

    #[test]
    fn votes_remaining_is_clamped_to_cap() {
        let store = SessionStore::default();
        store.merge(SessionPatch::new().with_votes_remaining(Some(9)));
        assert_eq!(store.get().votes_remaining, Some(MAX_VOTES));
    }

    #[tokio::test]
    async fn subscribers_see_each_merge() {
        let store = SessionStore::default();
        let mut rx = store.subscribe();

        store.merge(SessionPatch::new().with_message("hello"));

        rx.changed().await.expect("store alive");
        assert_eq!(rx.borrow().message, "hello");
    }

    #[test]
    fn empty_patch_does_not_notify() {
        let store = SessionStore::default();
        let rx = store.subscribe();
        store.merge(SessionPatch::new());
        assert!(!rx.has_changed().expect("store alive"));
    }

    #[test]
    fn history_zips_columns_in_contract_order() {
        let history = history_from_results(RecentResults {
            round_numbers: vec![1, 2, 3],
            winning_names: vec!["Elon".into(), "Mark".into(), "Sam".into()],
            winning_counts: vec![4, 5, 7],
        });

        assert_eq!(history.len(), 3);
        assert_eq!(
            history.last(),
            Some(&RoundResult {
                round_number: 3,
                winning_proposal_name: "Sam".into(),
                winning_vote_count: 7,
            })
        );
    }

    #[test]
    fn manager_detection_ignores_address_case() {
        let state = SessionState {
            project_manager: Some(Address::new("0xABCD")),
            current_account: Some(Address::new("0xabcd")),
            ..SessionState::default()
        };
        assert!(state.is_manager());
        assert!(!state.can_vote());
    }

    #[test]
    fn voting_needs_a_live_connection_and_allowance() {
        let mut state = SessionState {
            project_manager: Some(Address::new("0xABCD")),
            current_account: Some(Address::new("0x0123")),
            votes_remaining: Some(1),
            voting_open: true,
            ..SessionState::default()
        };
        assert!(!state.can_vote());

        state.connection = ConnectionState::Connected;
        assert!(state.can_vote());

        state.votes_remaining = Some(0);
        assert!(!state.can_vote());
    }
}
