use crate::ledger::LedgerError;
use crate::wallet::WalletError;

/// Wallet connection as tracked by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
	/// No wallet provider exists at all.
	Unavailable,
	/// The provider exists but the user declined to connect.
	Unauthorized,
}

impl ConnectionState {
	pub fn is_connected(&self) -> bool {
		matches!(self, ConnectionState::Connected)
	}
}

/// Contract lifecycle. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractLifecycle {
	Active,
	Destroyed,
}

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Wallet error: {0}")]
	Wallet(#[from] WalletError),

	#[error("Configuration error: {0}")]
	Config(String),
}
