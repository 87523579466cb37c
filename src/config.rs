//! Session configuration.
//!
//! Values start from `SessionConfig::default()`, are overridden by an optional TOML file
//! (`ballot-sync.toml`, or the path in `BALLOT_SYNC_CONFIG`), and finally by
//! `BALLOT_SYNC_*` environment variables.

use crate::ledger::{Address, Wei};
use crate::session::{CANDIDATE_COUNT, SessionError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "ballot-sync.toml";

/// 0.01 ether, the fee the deployed contract expects with every vote.
pub const DEFAULT_VOTE_FEE_WEI: u64 = 10_000_000_000_000_000;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
	pub gateway_http_url: String,
	pub gateway_ws_url: String,
	pub contract_address: String,
	/// Fee attached to every vote, in wei.
	pub vote_fee_wei: u64,
	/// How long a notification stays visible.
	pub notification_ttl_secs: u64,
	pub request_timeout_secs: u64,
	/// Display names, in ballot order.
	pub candidate_names: Vec<String>,
	/// Accounts exposed by the local wallet; empty means the user declines to connect.
	pub accounts: Vec<String>,
	/// When false the session runs as if no wallet provider were installed.
	pub wallet_enabled: bool,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			gateway_http_url: "http://127.0.0.1:8080/graphql".to_string(),
			gateway_ws_url: "ws://127.0.0.1:8080/graphql/ws".to_string(),
			contract_address: String::new(),
			vote_fee_wei: DEFAULT_VOTE_FEE_WEI,
			notification_ttl_secs: 5,
			request_timeout_secs: 30,
			candidate_names: vec!["Elon".to_string(), "Mark".to_string(), "Sam".to_string()],
			accounts: Vec::new(),
			wallet_enabled: true,
		}
	}
}

impl SessionConfig {
	/// Load defaults, then the config file if present, then environment overrides.
	pub fn load() -> Result<Self, SessionError> {
		let path = std::env::var("BALLOT_SYNC_CONFIG")
			.map(PathBuf::from)
			.unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

		let mut config = Self::from_file(&path)?.unwrap_or_default();
		config.apply_env(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	/// Read a TOML config file. A missing file yields `None`; a malformed one is an error.
	pub fn from_file(path: &Path) -> Result<Option<Self>, SessionError> {
		let raw = match std::fs::read_to_string(path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(SessionError::Config(format!(
					"Failed to read {}: {}",
					path.display(),
					e
				)));
			}
		};

		let config = toml::from_str(&raw).map_err(|e| {
			SessionError::Config(format!("Failed to parse {}: {}", path.display(), e))
		})?;
		info!("Loaded configuration from {}", path.display());
		Ok(Some(config))
	}

	/// Apply `BALLOT_SYNC_*` overrides using `lookup` to read variables.
	pub fn apply_env(
		&mut self,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<(), SessionError> {
		if let Some(v) = lookup("BALLOT_SYNC_GATEWAY_HTTP_URL") {
			self.gateway_http_url = v;
		}
		if let Some(v) = lookup("BALLOT_SYNC_GATEWAY_WS_URL") {
			self.gateway_ws_url = v;
		}
		if let Some(v) = lookup("BALLOT_SYNC_CONTRACT_ADDRESS") {
			self.contract_address = v;
		}
		if let Some(v) = lookup("BALLOT_SYNC_VOTE_FEE_WEI") {
			self.vote_fee_wei = parse_number("BALLOT_SYNC_VOTE_FEE_WEI", &v)?;
		}
		if let Some(v) = lookup("BALLOT_SYNC_NOTIFICATION_TTL_SECS") {
			self.notification_ttl_secs = parse_number("BALLOT_SYNC_NOTIFICATION_TTL_SECS", &v)?;
		}
		if let Some(v) = lookup("BALLOT_SYNC_REQUEST_TIMEOUT_SECS") {
			self.request_timeout_secs = parse_number("BALLOT_SYNC_REQUEST_TIMEOUT_SECS", &v)?;
		}
		if let Some(v) = lookup("BALLOT_SYNC_ACCOUNTS") {
			self.accounts = v
				.split(',')
				.map(str::trim)
				.filter(|a| !a.is_empty())
				.map(str::to_string)
				.collect();
		}
		if let Some(v) = lookup("BALLOT_SYNC_WALLET_ENABLED") {
			self.wallet_enabled = !matches!(v.as_str(), "0" | "false" | "no");
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SessionError> {
		if self.candidate_names.len() != CANDIDATE_COUNT {
			return Err(SessionError::Config(format!(
				"Expected {} candidate names, found {}",
				CANDIDATE_COUNT,
				self.candidate_names.len()
			)));
		}
		for account in &self.accounts {
			Address::parse(account)
				.map_err(|_| SessionError::Config(format!("Invalid account address {}", account)))?;
		}
		Ok(())
	}

	pub fn vote_fee(&self) -> Wei {
		Wei::from(self.vote_fee_wei)
	}

	pub fn notification_ttl(&self) -> Duration {
		Duration::from_secs(self.notification_ttl_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn wallet_accounts(&self) -> Vec<Address> {
		self.accounts.iter().map(Address::new).collect()
	}

	pub fn candidate_name(&self, index: usize) -> &str {
		self.candidate_names
			.get(index)
			.map(String::as_str)
			.unwrap_or("unknown")
	}
}

fn parse_number(key: &str, raw: &str) -> Result<u64, SessionError> {
	raw.trim()
		.parse()
		.map_err(|e| SessionError::Config(format!("{} must be a number: {}", key, e)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn defaults_match_the_deployed_contract() {
		let config = SessionConfig::default();
		assert_eq!(config.vote_fee(), 10_000_000_000_000_000u128);
		assert_eq!(config.notification_ttl(), Duration::from_secs(5));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn env_overrides_take_precedence() {
		let vars: HashMap<&str, &str> = HashMap::from([
			("BALLOT_SYNC_VOTE_FEE_WEI", "42"),
			(
				"BALLOT_SYNC_ACCOUNTS",
				"0x5B38Da6a701c568545dCfcB03FcB875f56beddC4, 0xAb8483F64d9C6d1EcF9b849Ae677dD3315835cb2",
			),
			("BALLOT_SYNC_WALLET_ENABLED", "false"),
		]);

		let mut config = SessionConfig::default();
		config
			.apply_env(|key| vars.get(key).map(|v| v.to_string()))
			.unwrap();

		assert_eq!(config.vote_fee(), 42);
		assert_eq!(config.accounts.len(), 2);
		assert!(!config.wallet_enabled);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn non_numeric_override_is_rejected() {
		let mut config = SessionConfig::default();
		let result = config.apply_env(|key| {
			(key == "BALLOT_SYNC_NOTIFICATION_TTL_SECS").then(|| "soon".to_string())
		});
		assert!(matches!(result, Err(SessionError::Config(_))));
	}

	#[test]
	fn file_values_fill_in_over_defaults() {
		let config: SessionConfig = toml::from_str(
			r#"
            contract_address = "0xd9145CCE52D386f254917e481eB44e9943F39138"
            notification_ttl_secs = 8
            "#,
		)
		.unwrap();

		assert_eq!(config.notification_ttl(), Duration::from_secs(8));
		assert_eq!(config.vote_fee_wei, DEFAULT_VOTE_FEE_WEI);
		assert_eq!(config.candidate_name(2), "Sam");
	}

	#[test]
	fn missing_file_is_not_an_error() {
		let path = std::env::temp_dir().join("ballot-sync-definitely-missing.toml");
		assert!(SessionConfig::from_file(&path).unwrap().is_none());
	}

	#[test]
	fn wrong_candidate_count_fails_validation() {
		let config = SessionConfig {
			candidate_names: vec!["Only".to_string()],
			..SessionConfig::default()
		};
		assert!(config.validate().is_err());
	}
}
