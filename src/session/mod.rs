//! Voting session synchronization
//!
//! This module keeps a local snapshot of the voting contract consistent with the contract
//! and the connected wallet account. The controller validates votes before submitting them,
//! reconciles the snapshot after every write, and reacts to contract events and account
//! switches on a background task. Views observe the snapshot and the notification queue
//! through `watch` receivers.

/// Session controller: contract reads, writes and reconciliation
pub mod controller;
/// Event types, handler trait and dispatcher
pub mod events;
/// Time-decaying notification queue
pub mod notifications;
/// Session snapshot, patches and the observable store
pub mod state;
pub mod types;
/// Local vote checks
pub mod validation;

pub use controller::SessionController;
pub use notifications::Notification;
pub use state::{CANDIDATE_COUNT, SessionState};
pub use types::*;
