//! Session synchronization and validation controller.
//!
//! The controller is the only writer of the session store and the notification queue. It
//! pulls authoritative state from the contract, validates votes locally before paying for a
//! transaction, reconciles the store after each write settles, and keeps a background task
//! that reconciles on contract events and wallet account switches.
//!
//! Consistency policy: writes apply their known post-conditions to the store as soon as
//! they settle (read-your-writes), and event-driven reconciliation later overwrites the same
//! fields with fresh contract reads. Both paths derive values from contract state rather
//! than from each other, so they converge instead of double counting.

use crate::config::SessionConfig;
use crate::ledger::{Address, LedgerCall, LedgerClient, LedgerError, TxOptions, TxReceipt, Wei};
use crate::session::events::{
    EventDispatcher, SessionEvent, SessionEventHandler, TracingEventHandler, merge_streams,
};
use crate::session::notifications::{NotificationId, NotificationQueue};
use crate::session::state::{
    CANDIDATE_COUNT, MAX_VOTES, RoundResult, SessionPatch, SessionState, SessionStore,
    VoteCounts, history_from_results,
};
use crate::session::types::{ConnectionState, ContractLifecycle, SessionError};
use crate::session::validation::{self, VoteRejection};
use crate::wallet::{WalletError, WalletProvider};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const PENDING_MESSAGE: &str = "Waiting on transaction success...";
pub const WALLET_MISSING_MESSAGE: &str = "Wallet provider is not installed";
pub const WALLET_DECLINED_MESSAGE: &str = "Wallet has not connected yet";
pub const LOAD_FAILED_MESSAGE: &str = "Unable to load contract state";
pub const VOTE_SUCCESS_MESSAGE: &str = "Vote successful!";
pub const VOTE_FAILED_MESSAGE: &str = "Error voting. See logs for details.";
pub const INVALID_ADDRESS_MESSAGE: &str = "Invalid address";
pub const ACCOUNT_CHANGED_MESSAGE: &str = "Wallet account changed. Please vote again.";
pub const HISTORY_UNAVAILABLE_MESSAGE: &str = "Voting history is unavailable";

fn action_succeeded(call: &LedgerCall) -> String {
    format!("Action {} executed successfully!", call.method_name())
}

fn action_failed(call: &LedgerCall) -> String {
    match call {
        LedgerCall::Vote(_) => VOTE_FAILED_MESSAGE.to_string(),
        other => format!("Error executing {}. See logs for details.", other.method_name()),
    }
}

/// Why a vote did not reach the contract.
enum VoteGate {
    Rejected(VoteRejection),
    Failed(SessionError),
}

impl From<VoteRejection> for VoteGate {
    fn from(rejection: VoteRejection) -> Self {
        VoteGate::Rejected(rejection)
    }
}

impl From<LedgerError> for VoteGate {
    fn from(e: LedgerError) -> Self {
        VoteGate::Failed(SessionError::Ledger(e))
    }
}

/// Contract reads that write their result into the store.
///
/// Shared by the controller's operations and the background reconciliation handler.
#[derive(Clone)]
struct Reconciler {
    ledger: Arc<dyn LedgerClient>,
    store: SessionStore,
}

impl Reconciler {
    async fn read_vote_counts(&self) -> Result<VoteCounts, SessionError> {
        let mut counts = [0; CANDIDATE_COUNT];
        for (candidate, count) in counts.iter_mut().enumerate() {
            *count = self.ledger.vote_count(candidate).await?;
        }
        Ok(counts)
    }

    async fn read_history(&self) -> Result<Vec<RoundResult>, SessionError> {
        Ok(history_from_results(self.ledger.recent_results().await?))
    }

    async fn refresh_balance(&self) -> Result<Wei, SessionError> {
        let balance = self.ledger.balance().await?;
        self.store.merge(SessionPatch::new().with_balance(balance));
        Ok(balance)
    }

    async fn refresh_vote_counts(&self) -> Result<(), SessionError> {
        let counts = self.read_vote_counts().await?;
        self.store.merge(SessionPatch::new().with_vote_counts(counts));
        Ok(())
    }

    /// Re-derive the allowance of `account`. Dropped if the wallet switched to another
    /// account while the read was in flight.
    async fn refresh_votes_remaining(&self, account: &Address) -> Result<(), SessionError> {
        let used = self.ledger.user_votes(account).await?;
        if self.store.get().current_account.as_ref() != Some(account) {
            debug!("Account changed while reading allowance of {}, discarding", account);
            return Ok(());
        }
        self.store.merge(
            SessionPatch::new().with_votes_remaining(Some(validation::remaining_from_used(used))),
        );
        Ok(())
    }

    /// Make `account` the connected account and load its allowance and the tallies.
    async fn adopt_account(&self, account: Address) {
        info!("Connected account {}", account);
        self.store.merge(
            SessionPatch::new()
                .with_current_account(Some(account.clone()))
                .with_connection(ConnectionState::Connected),
        );

        if let Err(e) = self.refresh_votes_remaining(&account).await {
            warn!("Failed to read allowance for {}: {}", account, e);
        }
        if let Err(e) = self.refresh_vote_counts().await {
            warn!("Failed to read vote counts: {}", e);
        }
    }
}

/// Event handler that reconciles the store with the contract and the wallet.
struct ReconciliationHandler {
    reconciler: Reconciler,
    notifications: NotificationQueue,
}

#[async_trait::async_trait]
impl SessionEventHandler for ReconciliationHandler {
    async fn handle(&mut self, event: &SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::VoteCast {
                voter,
                proposal_index,
            } => {
                self.notifications.enqueue(format!(
                    "New vote cast by {} for candidate {}",
                    voter, proposal_index
                ));

                if let Err(e) = self.reconciler.refresh_balance().await {
                    warn!("Failed to refresh balance after vote event: {}", e);
                }
                if let Some(account) = self.reconciler.store.get().current_account {
                    if let Err(e) = self.reconciler.refresh_votes_remaining(&account).await {
                        warn!("Failed to refresh allowance after vote event: {}", e);
                    }
                }
                self.reconciler.refresh_vote_counts().await?;
            }
            SessionEvent::WinnerDeclared { winner_name } => {
                self.notifications
                    .enqueue(format!("{} has won the vote!", winner_name));
            }
            SessionEvent::AccountsChanged { accounts } => {
                self.reconciler
                    .store
                    .merge(SessionPatch::new().with_connection(ConnectionState::Connecting));

                match accounts.first() {
                    Some(account) => self.reconciler.adopt_account(account.clone()).await,
                    None => {
                        info!("Wallet disconnected every account");
                        self.reconciler.store.merge(
                            SessionPatch::new()
                                .with_current_account(None)
                                .with_votes_remaining(None)
                                .with_connection(ConnectionState::Disconnected),
                        );
                    }
                }
            }
            SessionEvent::SubscriptionError { error } => {
                warn!("Contract event subscription error: {}", error);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ReconciliationHandler"
    }
}

/// Session synchronization and validation controller.
pub struct SessionController {
    ledger: Arc<dyn LedgerClient>,
    wallet: Option<Arc<dyn WalletProvider>>,
    reconciler: Reconciler,
    notifications: NotificationQueue,
    vote_fee: Wei,
    subscribed: AtomicBool,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    /// `wallet` is `None` when no wallet provider is installed.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        wallet: Option<Arc<dyn WalletProvider>>,
        config: &SessionConfig,
    ) -> Self {
        let store = SessionStore::default();
        Self {
            reconciler: Reconciler {
                ledger: ledger.clone(),
                store,
            },
            ledger,
            wallet,
            notifications: NotificationQueue::new(config.notification_ttl()),
            vote_fee: config.vote_fee(),
            subscribed: AtomicBool::new(false),
            event_task: Mutex::new(None),
        }
    }

    fn store(&self) -> &SessionStore {
        &self.reconciler.store
    }

    fn report(&self, message: impl Into<String>) {
        self.store().merge(SessionPatch::new().with_message(message));
    }

    /// Current session snapshot.
    pub fn state(&self) -> SessionState {
        self.store().get()
    }

    /// Observe every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store().subscribe()
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn dismiss_notification(&self, id: NotificationId) {
        self.notifications.dismiss(id);
    }

    pub fn connection(&self) -> ConnectionState {
        self.store().get().connection
    }

    pub fn lifecycle(&self) -> ContractLifecycle {
        if self.store().get().is_destroyed {
            ContractLifecycle::Destroyed
        } else {
            ContractLifecycle::Active
        }
    }

    /// Load contract state, connect the wallet and start event reconciliation.
    ///
    /// Never fails: a missing or declined wallet leaves the session read-only, and an
    /// unreachable contract leaves the defaults in place with an explanatory message.
    /// Calling it again reloads state but does not subscribe a second time.
    pub async fn initialize(&self) {
        info!("Initializing voting session");

        match self.read_contract_state().await {
            Ok(patch) => self.store().merge(patch.with_message("")),
            Err(e) => {
                error!("Failed to load contract state: {}", e);
                self.report(LOAD_FAILED_MESSAGE);
            }
        }

        self.connect_wallet().await;
        self.subscribe_events().await;
    }

    async fn read_contract_state(&self) -> Result<SessionPatch, SessionError> {
        let project_manager = self.ledger.project_manager().await?;
        let balance = self.ledger.balance().await?;
        let voting_open = self.ledger.voting_open().await?;
        let history = self.reconciler.read_history().await?;

        Ok(SessionPatch::new()
            .with_project_manager(project_manager)
            .with_balance(balance)
            .with_voting_open(voting_open)
            .with_history(history))
    }

    async fn connect_wallet(&self) {
        let Some(wallet) = &self.wallet else {
            warn!("No wallet provider available, continuing read-only");
            self.store().merge(
                SessionPatch::new()
                    .with_connection(ConnectionState::Unavailable)
                    .with_message(WALLET_MISSING_MESSAGE),
            );
            return;
        };

        self.store()
            .merge(SessionPatch::new().with_connection(ConnectionState::Connecting));

        match request_primary_account(&**wallet).await {
            Ok(account) => self.reconciler.adopt_account(account).await,
            Err(e) => {
                warn!("Wallet connection failed: {}", e);
                self.store().merge(
                    SessionPatch::new()
                        .with_connection(ConnectionState::Unauthorized)
                        .with_message(WALLET_DECLINED_MESSAGE),
                );
            }
        }
    }

    async fn subscribe_events(&self) {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            debug!("Session events already subscribed");
            return;
        }

        let ledger_events = match self.ledger.subscribe_events().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Contract event subscription failed, continuing without it: {}", e);
                None
            }
        };
        let account_changes = self.wallet.as_ref().map(|wallet| wallet.account_changes());

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(TracingEventHandler));
        dispatcher.register_handler(Box::new(ReconciliationHandler {
            reconciler: self.reconciler.clone(),
            notifications: self.notifications.clone(),
        }));

        let task = tokio::spawn(dispatcher.run(merge_streams(ledger_events, account_changes)));
        *self.event_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        info!("Subscribed to contract events and account changes");
    }

    /// Submit a write from the connected account. See `submit_from`.
    async fn submit(&self, call: LedgerCall) -> Option<TxReceipt> {
        let sender = self.store().get().current_account;
        self.submit_from(call, sender, None).await
    }

    /// Submit a write from `sender`, reporting failures.
    ///
    /// Returns `None` if the write failed; the store then only carries the failure message.
    async fn submit_from(
        &self,
        call: LedgerCall,
        sender: Option<Address>,
        value: Option<Wei>,
    ) -> Option<TxReceipt> {
        let mut options = TxOptions::sender(sender);
        if let Some(value) = value {
            options = options.with_value(value);
        }

        self.report(PENDING_MESSAGE);
        match self.ledger.submit(call.clone(), options).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                error!("Error executing {}: {}", call.method_name(), e);
                self.report(action_failed(&call));
                None
            }
        }
    }

    /// Validate and cast a vote for `candidate`.
    pub async fn cast_vote(&self, candidate: usize) {
        let (account, used) = match self.validate_vote(candidate).await {
            Ok(checked) => checked,
            Err(VoteGate::Rejected(rejection)) => {
                info!("Vote for candidate {} refused: {:?}", candidate, rejection);
                let mut patch = SessionPatch::new().with_message(rejection.message());
                if rejection == VoteRejection::VotingClosed {
                    patch = patch.with_voting_open(false);
                }
                self.store().merge(patch);
                return;
            }
            Err(VoteGate::Failed(e)) => {
                error!("Error voting: {}", e);
                self.report(VOTE_FAILED_MESSAGE);
                return;
            }
        };

        // The wallet may have switched while validation awaited the contract; the new
        // account was never checked.
        if self.store().get().current_account.as_ref() != Some(&account) {
            warn!("Account changed while validating vote from {}, not submitting", account);
            self.report(ACCOUNT_CHANGED_MESSAGE);
            return;
        }

        let call = LedgerCall::Vote(candidate);
        if self
            .submit_from(call, Some(account.clone()), Some(self.vote_fee))
            .await
            .is_none()
        {
            return;
        }

        let mut patch = SessionPatch::new().with_message(VOTE_SUCCESS_MESSAGE);
        // Derived from the allowance read during validation rather than the cached value,
        // so it agrees with any VoteCast reconciliation that already landed.
        if self.store().get().current_account.as_ref() == Some(&account) {
            let remaining = validation::remaining_from_used(used.saturating_add(1));
            patch = patch.with_votes_remaining(Some(remaining));
        }
        match self.ledger.balance().await {
            Ok(balance) => patch = patch.with_balance(balance),
            Err(e) => warn!("Failed to refresh balance after vote: {}", e),
        }
        self.store().merge(patch);
    }

    /// Checks run in order, each against fresh contract reads where one is involved.
    async fn validate_vote(&self, candidate: usize) -> Result<(Address, u32), VoteGate> {
        validation::check_candidate(candidate)?;

        let state = self.store().get();
        let account = validation::check_connected(state.current_account.as_ref())?.clone();

        validation::check_voting_open(self.ledger.voting_open().await?)?;
        validation::check_not_manager(&account, state.project_manager.as_ref())?;

        let used = self.ledger.user_votes(&account).await?;
        validation::check_allowance(used)?;

        Ok((account, used))
    }

    /// Close the round. The contract enforces that only the manager may do this.
    pub async fn declare_winner(&self) {
        let call = LedgerCall::DeclareWinner;
        if self.submit(call.clone()).await.is_none() {
            return;
        }

        let mut patch = SessionPatch::new().with_voting_open(false);
        match self.reconciler.read_history().await {
            Ok(history) => {
                let message = match history.last() {
                    Some(round) => format!("{} is the voting winner!", round.winning_proposal_name),
                    None => action_succeeded(&call),
                };
                patch = patch.with_history(history).with_message(message);
            }
            Err(e) => {
                warn!("Winner declared but history could not be read: {}", e);
                patch = patch.with_message(action_succeeded(&call));
            }
        }
        self.store().merge(patch);
    }

    /// Start a new round. The contract guarantees zeroed tallies and full allowances.
    pub async fn reset_vote(&self) {
        let call = LedgerCall::ResetVote;
        if self.submit(call.clone()).await.is_none() {
            return;
        }

        self.store().merge(
            SessionPatch::new()
                .with_vote_counts([0; CANDIDATE_COUNT])
                .with_voting_open(true)
                .with_votes_remaining(Some(MAX_VOTES))
                .with_message(action_succeeded(&call)),
        );
    }

    pub async fn withdraw(&self) {
        let call = LedgerCall::Withdraw;
        if self.submit(call.clone()).await.is_none() {
            return;
        }

        if let Err(e) = self.reconciler.refresh_balance().await {
            warn!("Failed to refresh balance after withdraw: {}", e);
        }
        self.report(action_succeeded(&call));
    }

    /// Transfer contract ownership. The address must be `0x` followed by 40 hex digits.
    pub async fn change_owner(&self, new_owner: &str) {
        let address = match Address::parse(new_owner) {
            Ok(address) => address,
            Err(e) => {
                info!("Refusing ownership transfer: {}", e);
                self.report(INVALID_ADDRESS_MESSAGE);
                return;
            }
        };

        let call = LedgerCall::ChangeOwner(address);
        if self.submit(call.clone()).await.is_none() {
            return;
        }

        match self.ledger.project_manager().await {
            Ok(manager) => self.store().merge(
                SessionPatch::new()
                    .with_project_manager(manager)
                    .with_message(action_succeeded(&call)),
            ),
            Err(e) => {
                warn!("Failed to re-read project manager: {}", e);
                self.report(action_succeeded(&call));
            }
        }
    }

    /// Self-destruct the contract. Irreversible.
    pub async fn destroy_contract(&self) {
        let call = LedgerCall::Destroy;
        if self.submit(call.clone()).await.is_none() {
            return;
        }

        info!("Contract destroyed");
        let mut patch = SessionPatch::new()
            .with_destroyed(true)
            .with_message(action_succeeded(&call));
        match self.ledger.balance().await {
            Ok(balance) => patch = patch.with_balance(balance),
            Err(e) => warn!("Failed to read final balance: {}", e),
        }
        self.store().merge(patch);
    }

    /// Replace the history with the contract's current results. Keeps the stale history
    /// if the read fails, which is expected once the contract is destroyed.
    pub async fn refresh_history(&self) {
        match self.reconciler.read_history().await {
            Ok(history) => self.store().merge(SessionPatch::new().with_history(history)),
            Err(e) => {
                warn!("Failed to refresh history: {}", e);
                self.report(HISTORY_UNAVAILABLE_MESSAGE);
            }
        }
    }
}

/// First account the wallet exposes, or why there is none.
async fn request_primary_account(wallet: &dyn WalletProvider) -> Result<Address, SessionError> {
    let accounts = wallet.request_accounts().await?;
    let account = accounts.into_iter().next().ok_or(WalletError::NoAccounts)?;
    Ok(account)
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(task) = self
            .event_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
