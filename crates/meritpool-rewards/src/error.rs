use meritpool_ledger::LedgerError;
use meritpool_scoring::ScoringError;
use meritpool_types::{AccountId, GroupId};
use thiserror::Error;

/// Reward distribution result type
pub type Result<T> = std::result::Result<T, RewardError>;

/// Reward distribution and recipient split errors
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Caller {caller} is not the owner of group {group}")]
    NotOwner { caller: AccountId, group: GroupId },

    #[error("Recipient split ratios sum past 100%")]
    InvalidRecipientRatios,

    #[error("Round {0} is not finished yet")]
    RoundNotFinished(u64),

    #[error("Round {0} has verified groups; its reward was claimable")]
    RoundHasVerifiedGroups(u64),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}
