//! In-process wallet provider backed by configured accounts.
//!
//! Used by the console binary: accounts come from configuration, and `switch_account`
//! stands in for the user picking another account in an external wallet.

use crate::ledger::Address;
use crate::wallet::{AccountChangeStream, WalletError, WalletProvider};
use futures_util::StreamExt;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

pub struct LocalWallet {
	accounts: Mutex<Vec<Address>>,
	changes: broadcast::Sender<Vec<Address>>,
}

impl LocalWallet {
	pub fn new(accounts: Vec<Address>) -> Self {
		let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
		Self {
			accounts: Mutex::new(accounts),
			changes,
		}
	}

	/// Make `account` the active account and notify subscribers.
	pub fn switch_account(&self, account: Address) {
		let accounts = {
			let mut guard = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
			guard.retain(|existing| existing != &account);
			guard.insert(0, account);
			guard.clone()
		};

		info!("Switched active account to {}", accounts[0]);
		// No receivers just means nobody has subscribed yet.
		let _ = self.changes.send(accounts);
	}

	/// Disconnect every account.
	pub fn disconnect(&self) {
		self.accounts
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clear();
		let _ = self.changes.send(Vec::new());
	}
}

#[async_trait::async_trait]
impl WalletProvider for LocalWallet {
	async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
		let accounts = self
			.accounts
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clone();

		if accounts.is_empty() {
			return Err(WalletError::Declined(
				"no account approved for this session".to_string(),
			));
		}
		Ok(accounts)
	}

	fn account_changes(&self) -> AccountChangeStream {
		let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(|change| async move {
			match change {
				Ok(accounts) => Some(accounts),
				Err(e) => {
					warn!("Dropped account change notifications: {}", e);
					None
				}
			}
		});
		Box::pin(stream)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(n: u8) -> Address {
		Address::new(format!("0x{:040x}", n))
	}

	#[tokio::test]
	async fn request_fails_without_accounts() {
		let wallet = LocalWallet::new(Vec::new());
		assert!(matches!(
			wallet.request_accounts().await,
			Err(WalletError::Declined(_))
		));
	}

	#[tokio::test]
	async fn switching_moves_account_to_front_and_notifies() {
		let wallet = LocalWallet::new(vec![addr(1), addr(2)]);
		let mut changes = wallet.account_changes();

		wallet.switch_account(addr(2));

		let notified = changes.next().await.expect("change delivered");
		assert_eq!(notified, vec![addr(2), addr(1)]);
		assert_eq!(wallet.request_accounts().await.unwrap()[0], addr(2));
	}

	#[tokio::test]
	async fn disconnect_publishes_empty_account_list() {
		let wallet = LocalWallet::new(vec![addr(1)]);
		let mut changes = wallet.account_changes();

		wallet.disconnect();

		assert!(changes.next().await.expect("change delivered").is_empty());
		assert!(wallet.request_accounts().await.is_err());
	}
}
