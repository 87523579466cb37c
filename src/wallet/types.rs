/// Error types for wallet provider interaction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
	#[error("Connection request declined: {0}")]
	Declined(String),

	#[error("Wallet returned no accounts")]
	NoAccounts,
}
