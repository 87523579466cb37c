//! Voting contract integration module
//!
//! This module provides the client trait the session controller talks to, the types that
//! cross it, and a GraphQL gateway implementation for a deployed contract. Reads map onto
//! the contract's view functions, writes settle asynchronously to a receipt or an error, and
//! domain events arrive on a single long-lived subscription.

/// Client trait and event stream type
mod client;
/// GraphQL gateway implementation
mod gateway;
/// Type definitions for contract data, calls and events
mod types;

pub use client::{LedgerClient, LedgerEventStream};
pub use gateway::GatewayLedgerClient;
pub use types::*;
