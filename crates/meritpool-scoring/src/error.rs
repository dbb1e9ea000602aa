use meritpool_ledger::LedgerError;
use meritpool_types::{AccountId, GroupId, TokenAmount};
use thiserror::Error;

/// Scoring operation result type
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Score submission and distrust voting errors
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Caller {caller} is not the owner of group {group}")]
    NotOwner { caller: AccountId, group: GroupId },

    #[error("Caller {caller} may not verify group {group}")]
    NotVerifier { caller: AccountId, group: GroupId },

    #[error("No snapshot for round {round}, group {group}")]
    NoSnapshotForRound { round: u64, group: GroupId },

    #[error("Scores for group {group} are already finalized this round")]
    AlreadySubmitted { group: GroupId },

    #[error("Batch must start at index {expected}, got {actual}")]
    InvalidStartIndex { expected: usize, actual: usize },

    #[error("Batch of {count} scores from index {start} exceeds {accounts} snapshot accounts")]
    ScoresExceedAccountCount {
        start: usize,
        count: usize,
        accounts: usize,
    },

    #[error("Score {score} exceeds the maximum of {max}")]
    ScoreExceedsMax { score: u64, max: u64 },

    #[error("Owner {owner} has no remaining verify capacity this round")]
    NoRemainingVerifyCapacity { owner: AccountId },

    #[error("Caller {0} holds no governance vote weight")]
    NotGovernor(AccountId),

    #[error("Distrust vote reason must be nonempty")]
    InvalidReason,

    #[error("Cumulative distrust vote by {voter} would exceed their weight of {weight}")]
    DistrustVoteExceedsLimit {
        voter: AccountId,
        weight: TokenAmount,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}
