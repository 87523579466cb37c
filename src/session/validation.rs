//! Pre-submission rules for casting a vote.
//!
//! The checks are evaluated by the controller in a fixed order, with contract reads in
//! between, and the first failure short-circuits the vote before any transaction is sent.

use crate::ledger::Address;
use crate::session::state::{CANDIDATE_COUNT, MAX_VOTES};

/// Reason a vote was refused locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteRejection {
    InvalidCandidate(usize),
    NotConnected,
    VotingClosed,
    ManagerCannotVote,
    NoVotesLeft,
}

impl VoteRejection {
    /// Status message shown to the user.
    pub fn message(&self) -> String {
        match self {
            VoteRejection::InvalidCandidate(_) => "Invalid candidate".to_string(),
            VoteRejection::NotConnected => "Please connect your wallet".to_string(),
            VoteRejection::VotingClosed => "Voting has already ended.".to_string(),
            VoteRejection::ManagerCannotVote => "Contract owner cannot vote.".to_string(),
            VoteRejection::NoVotesLeft => format!("You have already used all {} votes.", MAX_VOTES),
        }
    }
}

pub fn check_candidate(candidate: usize) -> Result<(), VoteRejection> {
    if candidate >= CANDIDATE_COUNT {
        return Err(VoteRejection::InvalidCandidate(candidate));
    }
    Ok(())
}

pub fn check_connected(account: Option<&Address>) -> Result<&Address, VoteRejection> {
    account
        .filter(|a| !a.is_empty())
        .ok_or(VoteRejection::NotConnected)
}

pub fn check_voting_open(open: bool) -> Result<(), VoteRejection> {
    if !open {
        return Err(VoteRejection::VotingClosed);
    }
    Ok(())
}

pub fn check_not_manager(account: &Address, manager: Option<&Address>) -> Result<(), VoteRejection> {
    if manager.is_some_and(|m| m == account) {
        return Err(VoteRejection::ManagerCannotVote);
    }
    Ok(())
}

/// `used` is the contract's count of votes already cast by the account this round.
pub fn check_allowance(used: u32) -> Result<(), VoteRejection> {
    if used >= MAX_VOTES {
        return Err(VoteRejection::NoVotesLeft);
    }
    Ok(())
}

/// Remaining allowance given the number of votes already cast.
pub fn remaining_from_used(used: u32) -> u32 {
    MAX_VOTES.saturating_sub(used)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ballot_indices_are_accepted() {
        for candidate in 0..CANDIDATE_COUNT {
            assert!(check_candidate(candidate).is_ok());
        }
        for candidate in [CANDIDATE_COUNT, CANDIDATE_COUNT + 1, usize::MAX] {
            assert_eq!(
                check_candidate(candidate),
                Err(VoteRejection::InvalidCandidate(candidate))
            );
        }
    }

    #[test]
    fn empty_account_counts_as_disconnected() {
        assert_eq!(check_connected(None), Err(VoteRejection::NotConnected));
        assert_eq!(
            check_connected(Some(&Address::new(""))),
            Err(VoteRejection::NotConnected)
        );
        assert!(check_connected(Some(&Address::new("0x01"))).is_ok());
    }

    #[test]
    fn manager_is_refused_regardless_of_case() {
        let manager = Address::new("0xABCDEF");
        assert_eq!(
            check_not_manager(&Address::new("0xabcdef"), Some(&manager)),
            Err(VoteRejection::ManagerCannotVote)
        );
        assert!(check_not_manager(&Address::new("0x01"), Some(&manager)).is_ok());
        assert!(check_not_manager(&Address::new("0x01"), None).is_ok());
    }

    #[test]
    fn allowance_is_exhausted_at_cap() {
        assert!(check_allowance(MAX_VOTES - 1).is_ok());
        assert_eq!(check_allowance(MAX_VOTES), Err(VoteRejection::NoVotesLeft));
        assert_eq!(remaining_from_used(2), 3);
        assert_eq!(remaining_from_used(MAX_VOTES + 3), 0);
    }

    #[test]
    fn rejection_messages_match_the_user_facing_copy() {
        assert_eq!(VoteRejection::VotingClosed.message(), "Voting has already ended.");
        assert_eq!(
            VoteRejection::NoVotesLeft.message(),
            "You have already used all 5 votes."
        );
    }
}
