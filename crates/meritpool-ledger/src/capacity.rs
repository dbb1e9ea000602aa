use crate::error::{LedgerError, Result};
use meritpool_types::{
    AccountId, GroupId, OwnershipRegistry, ProtocolParams, Ratio, RoundClock, TokenAmount,
    ValueCustody, VoteWeightSource,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Per-group stake and capacity record. The owner is never cached here;
/// every owner check resolves through the ownership registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub description: String,
    pub staked_amount: TokenAmount,
    pub capacity: TokenAmount,
    /// Minimum total joined amount per member; zero disables the bound.
    pub min_join_amount: TokenAmount,
    /// Maximum total joined amount per member; zero disables the bound.
    pub max_join_amount: TokenAmount,
    /// Maximum member count; zero disables the bound.
    pub max_accounts: u64,
    pub active: bool,
    pub activation_round: u64,
}

/// Stake, capacity and owner-aggregate bookkeeping; gatekeeps admission.
pub struct CapacityLedger {
    registry: Arc<dyn OwnershipRegistry>,
    weights: Arc<dyn VoteWeightSource>,
    custody: Arc<dyn ValueCustody>,
    clock: Arc<dyn RoundClock>,
    params: ProtocolParams,
    groups: Arc<RwLock<HashMap<GroupId, Group>>>,
}

impl CapacityLedger {
    pub fn new(
        registry: Arc<dyn OwnershipRegistry>,
        weights: Arc<dyn VoteWeightSource>,
        custody: Arc<dyn ValueCustody>,
        clock: Arc<dyn RoundClock>,
        params: ProtocolParams,
    ) -> Self {
        Self {
            registry,
            weights,
            custody,
            clock,
            params,
            groups: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Resolve the group owner and require that `caller` is it.
    async fn require_owner(&self, caller: AccountId, group: GroupId) -> Result<AccountId> {
        let owner = self
            .registry
            .owner_of(group)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        if owner != caller {
            return Err(LedgerError::NotOwner { caller, group });
        }
        Ok(owner)
    }

    fn validate_min_max(min: TokenAmount, max: TokenAmount) -> Result<()> {
        if !min.is_zero() && !max.is_zero() && min > max {
            return Err(LedgerError::InvalidMinMax { min, max });
        }
        Ok(())
    }

    fn derive_capacity(&self, stake: TokenAmount) -> TokenAmount {
        let capacity =
            stake.to_base_units() as u128 * self.params.capacity_multiplier as u128;
        TokenAmount::from_base_units(capacity.min(u64::MAX as u128) as u64)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn activate(
        &self,
        caller: AccountId,
        group: GroupId,
        description: String,
        stake: TokenAmount,
        min_join: TokenAmount,
        max_join: TokenAmount,
        max_accounts: u64,
    ) -> Result<()> {
        let owner = self.require_owner(caller, group).await?;

        {
            let groups = self.groups.read().await;
            if groups.get(&group).map(|g| g.active).unwrap_or(false) {
                return Err(LedgerError::AlreadyActive(group));
            }
        }

        if stake.is_zero() {
            return Err(LedgerError::ZeroStake);
        }
        Self::validate_min_max(min_join, max_join)?;

        let weight = self
            .weights
            .vote_weight(owner)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        let total_weight = self
            .weights
            .total_vote_weight()
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        let vote_ratio = Ratio::from_fraction(
            weight.to_base_units() as u128,
            total_weight.to_base_units() as u128,
        );
        if vote_ratio < self.params.min_owner_vote_ratio {
            return Err(LedgerError::InsufficientGovVotes { owner });
        }

        if stake < self.params.min_group_stake {
            return Err(LedgerError::MinStakeNotMet {
                required: self.params.min_group_stake,
                provided: stake,
            });
        }

        self.custody
            .lock(owner, stake)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        let round = self.clock.current_round().await;
        let capacity = self.derive_capacity(stake);

        let mut groups = self.groups.write().await;
        groups.insert(
            group,
            Group {
                id: group,
                description,
                staked_amount: stake,
                capacity,
                min_join_amount: min_join,
                max_join_amount: max_join,
                max_accounts,
                active: true,
                activation_round: round,
            },
        );

        info!(
            group = %group,
            owner = %owner,
            round,
            stake = stake.to_tokens(),
            capacity = capacity.to_tokens(),
            "🚀 Group activated"
        );
        Ok(())
    }

    pub async fn expand(
        &self,
        caller: AccountId,
        group: GroupId,
        additional_stake: TokenAmount,
    ) -> Result<()> {
        let owner = self.require_owner(caller, group).await?;
        if additional_stake.is_zero() {
            return Err(LedgerError::ZeroStake);
        }

        // Validate activity before touching custody so a failed expand has
        // no effect.
        {
            let groups = self.groups.read().await;
            let record = groups.get(&group).ok_or(LedgerError::GroupNotFound(group))?;
            if !record.active {
                return Err(LedgerError::InactiveGroup(group));
            }
        }

        self.custody
            .lock(owner, additional_stake)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        let mut groups = self.groups.write().await;
        let record = groups.get_mut(&group).ok_or(LedgerError::GroupNotFound(group))?;
        record.staked_amount = record.staked_amount.saturating_add(additional_stake);
        record.capacity = self.derive_capacity(record.staked_amount);

        info!(
            group = %group,
            owner = %owner,
            added = additional_stake.to_tokens(),
            stake = record.staked_amount.to_tokens(),
            capacity = record.capacity.to_tokens(),
            "📈 Group stake expanded"
        );
        Ok(())
    }

    pub async fn deactivate(&self, caller: AccountId, group: GroupId) -> Result<()> {
        let owner = self.require_owner(caller, group).await?;
        let round = self.clock.current_round().await;

        let stake = {
            let groups = self.groups.read().await;
            let record = groups.get(&group).ok_or(LedgerError::GroupNotFound(group))?;
            if !record.active {
                return Err(LedgerError::AlreadyInactive(group));
            }
            // Flash activate/deactivate guard
            if record.activation_round == round {
                return Err(LedgerError::ActivatedThisRound { group, round });
            }
            record.staked_amount
        };

        self.custody
            .release(owner, stake)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        let mut groups = self.groups.write().await;
        let record = groups.get_mut(&group).ok_or(LedgerError::GroupNotFound(group))?;
        record.active = false;
        record.staked_amount = TokenAmount::ZERO;
        record.capacity = TokenAmount::ZERO;

        info!(
            group = %group,
            owner = %owner,
            round,
            released = stake.to_tokens(),
            "🛑 Group deactivated"
        );
        Ok(())
    }

    pub async fn update_info(
        &self,
        caller: AccountId,
        group: GroupId,
        description: String,
        min_join: TokenAmount,
        max_join: TokenAmount,
        max_accounts: u64,
    ) -> Result<()> {
        let owner = self.require_owner(caller, group).await?;
        Self::validate_min_max(min_join, max_join)?;

        let mut groups = self.groups.write().await;
        let record = groups.get_mut(&group).ok_or(LedgerError::GroupNotFound(group))?;
        if !record.active {
            return Err(LedgerError::InactiveGroup(group));
        }
        record.description = description;
        record.min_join_amount = min_join;
        record.max_join_amount = max_join;
        record.max_accounts = max_accounts;

        info!(group = %group, owner = %owner, "✏️ Group info updated");
        Ok(())
    }

    pub async fn group(&self, group: GroupId) -> Option<Group> {
        let groups = self.groups.read().await;
        groups.get(&group).cloned()
    }

    pub async fn is_active(&self, group: GroupId) -> bool {
        let groups = self.groups.read().await;
        groups.get(&group).map(|g| g.active).unwrap_or(false)
    }

    pub async fn capacity_of(&self, group: GroupId) -> TokenAmount {
        let groups = self.groups.read().await;
        groups
            .get(&group)
            .map(|g| g.capacity)
            .unwrap_or(TokenAmount::ZERO)
    }

    pub async fn group_ids(&self) -> Vec<GroupId> {
        let groups = self.groups.read().await;
        groups.keys().copied().collect()
    }

    /// Owner-level aggregate join cap:
    /// `total_supply * owner_vote_weight * capacity_multiplier / total_vote_weight`.
    pub async fn max_capacity_by_owner(&self, owner: AccountId) -> Result<TokenAmount> {
        self.vote_scaled_capacity(owner, self.params.capacity_multiplier)
            .await
    }

    /// Per-round owner verify budget base, same derivation as the join cap
    /// but with the verify-side multiplier.
    pub async fn max_verify_capacity_by_owner(&self, owner: AccountId) -> Result<TokenAmount> {
        self.vote_scaled_capacity(owner, self.params.verify_capacity_multiplier)
            .await
    }

    async fn vote_scaled_capacity(
        &self,
        owner: AccountId,
        multiplier: u64,
    ) -> Result<TokenAmount> {
        let supply = self
            .custody
            .total_supply()
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        let weight = self
            .weights
            .vote_weight(owner)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        let total_weight = self
            .weights
            .total_vote_weight()
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        if total_weight.is_zero() {
            return Ok(TokenAmount::ZERO);
        }
        let capacity = supply.to_base_units() as u128 * weight.to_base_units() as u128
            / total_weight.to_base_units() as u128
            * multiplier as u128;
        Ok(TokenAmount::from_base_units(
            capacity.min(u64::MAX as u128) as u64,
        ))
    }

    /// Protocol-wide per-account join cap, a fixed fraction of total
    /// supply. Zero means the cap is disabled.
    pub async fn join_max_amount(&self) -> Result<TokenAmount> {
        let supply = self
            .custody
            .total_supply()
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        let cap = self
            .params
            .account_cap_ratio
            .apply(supply.to_base_units() as u128);
        Ok(TokenAmount::from_base_units(cap.min(u64::MAX as u128) as u64))
    }
}
