//! Types for the voting contract gateway

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the ledger's smallest currency unit (wei).
pub type Wei = u128;

/// An account or contract address as reported by the ledger.
///
/// Comparison ignores ASCII case, since the same account may be rendered with or
/// without checksum capitalisation depending on who reported it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
	pub fn new(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	/// Parse a `0x`-prefixed, 20 byte hex address.
	pub fn parse(raw: &str) -> Result<Self, LedgerError> {
		let trimmed = raw.trim();
		let digits = trimmed
			.strip_prefix("0x")
			.or_else(|| trimmed.strip_prefix("0X"))
			.ok_or_else(|| LedgerError::InvalidAddress(raw.to_string()))?;

		let bytes =
			hex::decode(digits).map_err(|_| LedgerError::InvalidAddress(raw.to_string()))?;
		if bytes.len() != 20 {
			return Err(LedgerError::InvalidAddress(raw.to_string()));
		}

		Ok(Self(trimmed.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl PartialEq for Address {
	fn eq(&self, other: &Self) -> bool {
		self.0.eq_ignore_ascii_case(&other.0)
	}
}

impl Eq for Address {}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// State-changing calls accepted by the voting contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
	Vote(usize),
	DeclareWinner,
	ResetVote,
	Withdraw,
	ChangeOwner(Address),
	Destroy,
}

impl LedgerCall {
	/// Contract method name, also used to label the action in status messages.
	pub fn method_name(&self) -> &'static str {
		match self {
			LedgerCall::Vote(_) => "vote",
			LedgerCall::DeclareWinner => "declareWinner",
			LedgerCall::ResetVote => "resetVote",
			LedgerCall::Withdraw => "withdraw",
			LedgerCall::ChangeOwner(_) => "changeOwner",
			LedgerCall::Destroy => "destroy",
		}
	}

	/// Positional call arguments as JSON values.
	pub fn args(&self) -> Vec<serde_json::Value> {
		match self {
			LedgerCall::Vote(index) => vec![serde_json::json!(index)],
			LedgerCall::ChangeOwner(address) => vec![serde_json::json!(address.as_str())],
			_ => Vec::new(),
		}
	}
}

/// Sender and attached payment for a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
	pub from: Option<Address>,
	pub value: Option<Wei>,
}

impl TxOptions {
	pub fn sender(sender: Option<Address>) -> Self {
		Self {
			from: sender,
			value: None,
		}
	}

	pub fn with_value(mut self, value: Wei) -> Self {
		self.value = Some(value);
		self
	}
}

/// Settlement status of a submitted write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
	Success,
	Reverted,
	Rejected,
}

/// Receipt returned once a write has settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
	pub hash: String,
	pub status: TxStatus,
	/// Revert or rejection reason, when the gateway provides one.
	#[serde(default)]
	pub reason: Option<String>,
}

/// The three parallel result columns returned by `getRecentResults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentResults {
	#[serde(rename = "roundNumbers")]
	pub round_numbers: Vec<u64>,
	#[serde(rename = "winningNames")]
	pub winning_names: Vec<String>,
	#[serde(rename = "winningCounts")]
	pub winning_counts: Vec<u64>,
}

/// Domain events emitted by the voting contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "__typename")]
pub enum LedgerEvent {
	VoteCast {
		voter: Address,
		#[serde(rename = "proposalIndex")]
		proposal_index: usize,
	},
	#[serde(rename = "winner", alias = "Winner")]
	Winner {
		#[serde(rename = "winnerName")]
		winner_name: String,
	},
}

/// Error types for ledger reads, writes and the event subscription
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("GraphQL error: {0}")]
	GraphQLError(String),

	#[error("No data returned")]
	NoData,

	#[error("WebSocket error: {0}")]
	WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Transaction rejected: {0}")]
	Rejected(String),

	#[error("Transaction reverted: {0}")]
	Reverted(String),

	#[error("Request timed out")]
	Timeout,

	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("Session error: {0}")]
	SessionError(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn addresses_compare_case_insensitively() {
		let lower = Address::new("0xabcdef0000000000000000000000000000000001");
		let upper = Address::new("0xABCDEF0000000000000000000000000000000001");
		assert_eq!(lower, upper);
		assert_ne!(lower, Address::new("0xabcdef0000000000000000000000000000000002"));
	}

	#[test]
	fn parse_rejects_malformed_addresses() {
		assert!(Address::parse("0x5B38Da6a701c568545dCfcB03FcB875f56beddC4").is_ok());
		assert!(Address::parse("5B38Da6a701c568545dCfcB03FcB875f56beddC4").is_err());
		assert!(Address::parse("0x5B38Da6a701c568545dCfcB03FcB875f56bedd").is_err());
		assert!(Address::parse("0xZZ38Da6a701c568545dCfcB03FcB875f56beddC4").is_err());
	}

	#[test]
	fn decodes_contract_events_by_typename() {
		let vote: LedgerEvent = serde_json::from_value(serde_json::json!({
			"__typename": "VoteCast",
			"voter": "0x01",
			"proposalIndex": 2
		}))
		.unwrap();
		assert_eq!(
			vote,
			LedgerEvent::VoteCast {
				voter: Address::new("0x01"),
				proposal_index: 2
			}
		);

		let winner: LedgerEvent = serde_json::from_value(serde_json::json!({
			"__typename": "Winner",
			"winnerName": "Sam"
		}))
		.unwrap();
		assert_eq!(
			winner,
			LedgerEvent::Winner {
				winner_name: "Sam".to_string()
			}
		);
	}

	#[test]
	fn call_arguments_follow_contract_signature() {
		assert_eq!(LedgerCall::Vote(1).args(), vec![serde_json::json!(1)]);
		assert!(LedgerCall::Withdraw.args().is_empty());
		assert_eq!(LedgerCall::ResetVote.method_name(), "resetVote");
	}
}
