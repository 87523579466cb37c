use super::types::*;
use std::pin::Pin;

/// Stream of contract domain events. Each item is either an event or a subscription error.
pub type LedgerEventStream =
	Pin<Box<dyn futures_util::Stream<Item = Result<LedgerEvent, LedgerError>> + Send>>;

/// Read/write surface of the voting contract.
///
/// Every write settles to a receipt or an error; a `Reverted` or `Rejected` status is
/// reported by implementations as the corresponding `LedgerError`, so callers only
/// need to distinguish `Ok` from `Err`.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
	/// Current contract administrator.
	async fn project_manager(&self) -> Result<Address, LedgerError>;

	/// Funds held by the contract.
	async fn balance(&self) -> Result<Wei, LedgerError>;

	/// Number of votes the account has already cast in the current round.
	async fn user_votes(&self, account: &Address) -> Result<u32, LedgerError>;

	/// Tally for one candidate in the current round.
	async fn vote_count(&self, candidate: usize) -> Result<u64, LedgerError>;

	async fn voting_open(&self) -> Result<bool, LedgerError>;

	/// Completed rounds, oldest first.
	async fn recent_results(&self) -> Result<RecentResults, LedgerError>;

	/// Submit a write and wait for it to settle.
	async fn submit(&self, call: LedgerCall, options: TxOptions) -> Result<TxReceipt, LedgerError>;

	/// Open the contract event subscription.
	async fn subscribe_events(&self) -> Result<LedgerEventStream, LedgerError>;
}
