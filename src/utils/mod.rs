//!
//! Utility module for the ballot session.
//!
//! Re-exports formatting helpers used when presenting contract values.
/// Utility functions for formatting and display
pub mod index;

pub use index::format_wei_as_ether;
