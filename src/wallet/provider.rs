use crate::ledger::Address;
use crate::wallet::WalletError;
use std::pin::Pin;

/// Stream of `accountsChanged` notifications. The first address is the active account;
/// an empty list means the user disconnected every account.
pub type AccountChangeStream = Pin<Box<dyn futures_util::Stream<Item = Vec<Address>> + Send>>;

/// Wallet provider as seen by the session controller.
#[async_trait::async_trait]
pub trait WalletProvider: Send + Sync {
	/// Ask the user to expose their accounts. Fails if the user declines.
	async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

	/// Subscribe to account switches made in the wallet.
	fn account_changes(&self) -> AccountChangeStream;
}
