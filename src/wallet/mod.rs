//! Wallet provider integration
//!
//! The session controller only needs two things from a wallet: the accounts the user is
//! willing to expose, and a stream of account switches. `LocalWallet` provides both from
//! configuration for the console binary; tests substitute their own provider.

/// In-process provider backed by configured accounts
pub mod local;
/// Provider trait consumed by the session controller
pub mod provider;
pub mod types;

pub use local::LocalWallet;
pub use provider::{AccountChangeStream, WalletProvider};
pub use types::*;
