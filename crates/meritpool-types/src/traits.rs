use crate::primitives::{AccountId, GroupId, TokenAmount};
use anyhow::Result;
use async_trait::async_trait;

/// NFT-like registry resolving a group id to its current owner.
///
/// Mint and transfer are external; the core only ever reads, and never
/// caches, the owner.
#[async_trait]
pub trait OwnershipRegistry: Send + Sync {
    /// Current owner of a group. Fails for unknown group ids.
    async fn owner_of(&self, group: GroupId) -> Result<AccountId>;
}

/// External ledger of governance voting power.
#[async_trait]
pub trait VoteWeightSource: Send + Sync {
    async fn vote_weight(&self, account: AccountId) -> Result<TokenAmount>;
    async fn total_vote_weight(&self) -> Result<TokenAmount>;
}

/// Externally advanced round counter, monotonically non-decreasing.
#[async_trait]
pub trait RoundClock: Send + Sync {
    async fn current_round(&self) -> u64;
}

/// Value transfer and custody primitives. Every call is all-or-nothing.
#[async_trait]
pub trait ValueCustody: Send + Sync {
    /// Lock `amount` out of the account's free balance.
    async fn lock(&self, account: AccountId, amount: TokenAmount) -> Result<()>;
    /// Return a previously locked `amount` to the account's free balance.
    async fn release(&self, account: AccountId, amount: TokenAmount) -> Result<()>;
    /// Destroy `amount`, reducing total supply.
    async fn burn(&self, amount: TokenAmount) -> Result<()>;
    async fn total_supply(&self) -> Result<TokenAmount>;
}

/// Supplies the per-round reward pool once a round is finished.
#[async_trait]
pub trait RewardSource: Send + Sync {
    /// Pool for a round; zero until set by the collaborator.
    async fn pool_amount(&self, round: u64) -> Result<TokenAmount>;
}
