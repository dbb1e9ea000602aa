use crate::primitives::{AccountId, GroupId, TokenAmount};
use crate::traits::{OwnershipRegistry, RewardSource, RoundClock, ValueCustody, VoteWeightSource};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory ownership registry. `set_owner` stands in for the external
/// mint/transfer lifecycle.
#[derive(Default)]
pub struct MemoryRegistry {
    owners: Arc<RwLock<HashMap<GroupId, AccountId>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_owner(&self, group: GroupId, owner: AccountId) {
        let mut owners = self.owners.write().await;
        owners.insert(group, owner);
        debug!(group = %group, owner = %owner, "Group owner set");
    }
}

#[async_trait]
impl OwnershipRegistry for MemoryRegistry {
    async fn owner_of(&self, group: GroupId) -> Result<AccountId> {
        let owners = self.owners.read().await;
        owners
            .get(&group)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown group: {}", group))
    }
}

/// In-memory vote weight ledger; total weight is the sum of all weights.
#[derive(Default)]
pub struct MemoryVoteWeights {
    weights: Arc<RwLock<HashMap<AccountId, TokenAmount>>>,
}

impl MemoryVoteWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_weight(&self, account: AccountId, weight: TokenAmount) {
        let mut weights = self.weights.write().await;
        if weight.is_zero() {
            weights.remove(&account);
        } else {
            weights.insert(account, weight);
        }
    }
}

#[async_trait]
impl VoteWeightSource for MemoryVoteWeights {
    async fn vote_weight(&self, account: AccountId) -> Result<TokenAmount> {
        let weights = self.weights.read().await;
        Ok(weights.get(&account).copied().unwrap_or(TokenAmount::ZERO))
    }

    async fn total_vote_weight(&self) -> Result<TokenAmount> {
        let weights = self.weights.read().await;
        let mut total = TokenAmount::ZERO;
        for weight in weights.values() {
            total = total.saturating_add(*weight);
        }
        Ok(total)
    }
}

/// Manually advanced round clock.
#[derive(Default)]
pub struct ManualRoundClock {
    round: Arc<RwLock<u64>>,
}

impl ManualRoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(round: u64) -> Self {
        Self {
            round: Arc::new(RwLock::new(round)),
        }
    }

    pub async fn advance(&self) -> u64 {
        let mut round = self.round.write().await;
        *round += 1;
        info!(round = *round, "⏱️ Round advanced");
        *round
    }
}

#[async_trait]
impl RoundClock for ManualRoundClock {
    async fn current_round(&self) -> u64 {
        *self.round.read().await
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CustodyAccount {
    balance: TokenAmount,
    locked: TokenAmount,
}

/// In-memory custody: per-account free/locked balances plus a running
/// total supply that `burn` reduces.
#[derive(Default)]
pub struct MemoryCustody {
    accounts: Arc<RwLock<HashMap<AccountId, CustodyAccount>>>,
    supply: Arc<RwLock<TokenAmount>>,
}

impl MemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` into an account's free balance.
    pub async fn credit(&self, account: AccountId, amount: TokenAmount) {
        let mut accounts = self.accounts.write().await;
        let entry = accounts.entry(account).or_default();
        entry.balance = entry.balance.saturating_add(amount);
        let mut supply = self.supply.write().await;
        *supply = supply.saturating_add(amount);
    }

    pub async fn balance_of(&self, account: AccountId) -> TokenAmount {
        let accounts = self.accounts.read().await;
        accounts
            .get(&account)
            .map(|a| a.balance)
            .unwrap_or(TokenAmount::ZERO)
    }

    pub async fn locked_of(&self, account: AccountId) -> TokenAmount {
        let accounts = self.accounts.read().await;
        accounts
            .get(&account)
            .map(|a| a.locked)
            .unwrap_or(TokenAmount::ZERO)
    }

    /// Free (unlocked) balance.
    pub async fn available_of(&self, account: AccountId) -> TokenAmount {
        let accounts = self.accounts.read().await;
        accounts
            .get(&account)
            .map(|a| a.balance.saturating_sub(a.locked))
            .unwrap_or(TokenAmount::ZERO)
    }
}

#[async_trait]
impl ValueCustody for MemoryCustody {
    async fn lock(&self, account: AccountId, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut accounts = self.accounts.write().await;
        let entry = accounts.entry(account).or_default();
        let available = entry.balance.saturating_sub(entry.locked);
        if available < amount {
            bail!(
                "Insufficient unlocked balance for {}: has {}, needs {}",
                account,
                available,
                amount
            );
        }
        entry.locked = entry.locked.saturating_add(amount);
        info!(
            account = %account,
            amount = amount.to_tokens(),
            locked_after = entry.locked.to_tokens(),
            "🔒 Value locked"
        );
        Ok(())
    }

    async fn release(&self, account: AccountId, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut accounts = self.accounts.write().await;
        let entry = accounts.entry(account).or_default();
        if entry.locked < amount {
            bail!(
                "Insufficient locked balance for {}: has {}, releasing {}",
                account,
                entry.locked,
                amount
            );
        }
        entry.locked = entry.locked.saturating_sub(amount);
        info!(
            account = %account,
            amount = amount.to_tokens(),
            locked_after = entry.locked.to_tokens(),
            "🔓 Value released"
        );
        Ok(())
    }

    async fn burn(&self, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut supply = self.supply.write().await;
        let new_supply = supply
            .checked_sub(amount)
            .ok_or_else(|| anyhow::anyhow!("Burn exceeds total supply"))?;
        *supply = new_supply;
        info!(
            amount = amount.to_tokens(),
            supply_after = new_supply.to_tokens(),
            "🔥 Value burned"
        );
        Ok(())
    }

    async fn total_supply(&self) -> Result<TokenAmount> {
        Ok(*self.supply.read().await)
    }
}

/// In-memory reward source; pools are set per round once finished.
#[derive(Default)]
pub struct MemoryRewardSource {
    pools: Arc<RwLock<HashMap<u64, TokenAmount>>>,
}

impl MemoryRewardSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_pool(&self, round: u64, amount: TokenAmount) {
        let mut pools = self.pools.write().await;
        pools.insert(round, amount);
        info!(round, pool = amount.to_tokens(), "💰 Reward pool set");
    }
}

#[async_trait]
impl RewardSource for MemoryRewardSource {
    async fn pool_amount(&self, round: u64) -> Result<TokenAmount> {
        let pools = self.pools.read().await;
        Ok(pools.get(&round).copied().unwrap_or(TokenAmount::ZERO))
    }
}
