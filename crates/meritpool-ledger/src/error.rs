use meritpool_types::{AccountId, GroupId, TokenAmount};
use thiserror::Error;

/// Ledger operation result type
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Membership and capacity ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Caller {caller} is not the owner of group {group}")]
    NotOwner { caller: AccountId, group: GroupId },

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Group already active: {0}")]
    AlreadyActive(GroupId),

    #[error("Group already inactive: {0}")]
    AlreadyInactive(GroupId),

    #[error("Stake amount must be nonzero")]
    ZeroStake,

    #[error("Invalid join bounds: min {min} exceeds max {max}")]
    InvalidMinMax { min: TokenAmount, max: TokenAmount },

    #[error("Owner {owner} holds insufficient governance votes to activate")]
    InsufficientGovVotes { owner: AccountId },

    #[error("Stake below protocol floor: required {required}, provided {provided}")]
    MinStakeNotMet {
        required: TokenAmount,
        provided: TokenAmount,
    },

    #[error("Group {group} was activated in round {round}; deactivation must wait a round")]
    ActivatedThisRound { group: GroupId, round: u64 },

    #[error("Join amount must be nonzero")]
    AmountZero,

    #[error("Account {account} is already a member of group {group}")]
    AlreadyInOtherGroup { account: AccountId, group: GroupId },

    #[error("Group is not active: {0}")]
    InactiveGroup(GroupId),

    #[error("Joined amount below group minimum: required {required}, would hold {held}")]
    BelowMinimum {
        required: TokenAmount,
        held: TokenAmount,
    },

    #[error("Joined amount exceeds account cap: cap {cap}, would hold {held}")]
    ExceedsAccountCap { cap: TokenAmount, held: TokenAmount },

    #[error("Group {group} capacity exceeded: capacity {capacity}, would hold {total}")]
    GroupCapacityExceeded {
        group: GroupId,
        capacity: TokenAmount,
        total: TokenAmount,
    },

    #[error("Group {group} account limit reached: {max_accounts}")]
    GroupAccountsFull { group: GroupId, max_accounts: u64 },

    #[error("Owner {owner} aggregate capacity exceeded: cap {cap}, would hold {total}")]
    OwnerCapacityExceeded {
        owner: AccountId,
        cap: TokenAmount,
        total: TokenAmount,
    },

    #[error("Account is not a member: {0}")]
    NotMember(AccountId),

    #[error("Trial waitlist entry may not name the provider itself: {0}")]
    TrialAccountIsProvider(AccountId),

    #[error("Account {account} is not on the waitlist of group {group}")]
    TrialAccountNotInWaitingList { group: GroupId, account: AccountId },

    #[error("No escrowed trial amount for account {account} in group {group}")]
    TrialAmountZero { group: GroupId, account: AccountId },

    #[error("Account {0} holds an active trial membership")]
    TrialAlreadyJoined(AccountId),

    #[error("Caller {0} is neither the sponsor nor the trial account")]
    NotSponsorOrAccount(AccountId),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}
