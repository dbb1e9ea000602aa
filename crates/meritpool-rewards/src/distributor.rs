use crate::error::{Result, RewardError};
use crate::splits::RecipientSplitBook;
use meritpool_scoring::{DistrustLedger, ScoreLedger};
use meritpool_types::{
    AccountId, GroupId, RewardSource, RoundClock, TokenAmount, ValueCustody,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Floor of `amount * num / den` for fractions with `num <= den`. Derived
/// score totals exceed 64 bits by a wide margin, so the fraction is
/// shifted down until the denominator fits in 64 bits and the
/// intermediate product stays within `u128`.
fn fraction_of(amount: TokenAmount, mut num: u128, mut den: u128) -> TokenAmount {
    while den > u64::MAX as u128 {
        num >>= 1;
        den >>= 1;
    }
    if den == 0 || num == 0 {
        return TokenAmount::ZERO;
    }
    TokenAmount::from_base_units((amount.to_base_units() as u128 * num / den) as u64)
}

/// Converts finished rounds into payout figures: pool share per group,
/// per member and per verifier, with owner-configured splits applied on
/// top. Everything here is a read-time computation over the score and
/// distrust ledgers; the only state change is the unclaimed-pool burn.
pub struct RewardDistributor {
    scores: Arc<ScoreLedger>,
    distrust: Arc<DistrustLedger>,
    splits: Arc<RecipientSplitBook>,
    rewards: Arc<dyn RewardSource>,
    custody: Arc<dyn ValueCustody>,
    clock: Arc<dyn RoundClock>,
    burned_rounds: Arc<RwLock<HashSet<u64>>>,
}

impl RewardDistributor {
    pub fn new(
        scores: Arc<ScoreLedger>,
        distrust: Arc<DistrustLedger>,
        splits: Arc<RecipientSplitBook>,
        rewards: Arc<dyn RewardSource>,
        custody: Arc<dyn ValueCustody>,
        clock: Arc<dyn RoundClock>,
    ) -> Self {
        Self {
            scores,
            distrust,
            splits,
            rewards,
            custody,
            clock,
            burned_rounds: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    async fn pool_amount(&self, round: u64) -> Result<TokenAmount> {
        self.rewards
            .pool_amount(round)
            .await
            .map_err(|e| RewardError::Collaborator(e.to_string()))
    }

    /// Capacity-capped group score with the owner's distrust discount
    /// applied. The discount targets the owner of record at submission
    /// time, so a later ownership transfer does not dodge the votes.
    pub async fn effective_score(&self, round: u64, group: GroupId) -> u128 {
        let Some(submission) = self.scores.submission(round, group).await else {
            return 0;
        };
        if !submission.finalized {
            return 0;
        }
        self.distrust
            .discounted(round, submission.owner, submission.aggregate_after)
            .await
    }

    pub async fn total_effective_score(&self, round: u64) -> u128 {
        let mut total = 0u128;
        for group in self.scores.verified_groups(round).await {
            total += self.effective_score(round, group).await;
        }
        total
    }

    /// The group's slice of the round pool, proportional to effective
    /// scores. Zero when nothing was verified in the round.
    pub async fn generated_reward_by_group_id(
        &self,
        round: u64,
        group: GroupId,
    ) -> Result<TokenAmount> {
        let total = self.total_effective_score(round).await;
        if total == 0 {
            return Ok(TokenAmount::ZERO);
        }
        let effective = self.effective_score(round, group).await;
        let pool = self.pool_amount(round).await?;
        Ok(fraction_of(pool, effective, total))
    }

    /// A member's slice of the group reward, proportional to derived
    /// scores before capacity reduction.
    pub async fn generated_reward_by_account(
        &self,
        round: u64,
        group: GroupId,
        account: AccountId,
    ) -> Result<TokenAmount> {
        let Some(submission) = self.scores.submission(round, group).await else {
            return Ok(TokenAmount::ZERO);
        };
        if submission.aggregate_before == 0 {
            return Ok(TokenAmount::ZERO);
        }
        let derived = submission
            .derived_by_account
            .get(&account)
            .copied()
            .unwrap_or(0);
        let group_reward = self.generated_reward_by_group_id(round, group).await?;
        Ok(fraction_of(
            group_reward,
            derived,
            submission.aggregate_before,
        ))
    }

    /// Sum of group rewards across every group this verifier finalized in
    /// the round.
    pub async fn generated_reward_by_verifier(
        &self,
        round: u64,
        verifier: AccountId,
    ) -> Result<TokenAmount> {
        let mut total = TokenAmount::ZERO;
        for group in self.scores.verified_groups(round).await {
            if self.scores.verifier_of(round, group).await == Some(verifier) {
                total = total.saturating_add(self.generated_reward_by_group_id(round, group).await?);
            }
        }
        Ok(total)
    }

    /// The owner's group reward cut into `(recipient, amount)` pairs per
    /// the configured splits. Each cut rounds down; the remainder always
    /// falls to the owner, so the pairs sum exactly to the group reward.
    pub async fn owner_reward_breakdown(
        &self,
        round: u64,
        group: GroupId,
    ) -> Result<Vec<(AccountId, TokenAmount)>> {
        let Some(submission) = self.scores.submission(round, group).await else {
            return Ok(Vec::new());
        };
        let owner_reward = self.generated_reward_by_group_id(round, group).await?;

        let mut breakdown = Vec::new();
        let mut split_total = TokenAmount::ZERO;
        for share in self.splits.recipients(round, group).await {
            let cut = TokenAmount::from_base_units(
                share.ratio.apply(owner_reward.to_base_units() as u128) as u64,
            );
            split_total = split_total.saturating_add(cut);
            breakdown.push((share.recipient, cut));
        }
        breakdown.push((submission.owner, owner_reward.saturating_sub(split_total)));
        Ok(breakdown)
    }

    /// Destroy the pool of a finished round in which no group was
    /// verified. Repeat calls are no-ops so independent triggers can race
    /// harmlessly.
    pub async fn burn_unclaimed_reward(&self, round: u64) -> Result<()> {
        let current = self.clock.current_round().await;
        if round >= current {
            return Err(RewardError::RoundNotFinished(round));
        }
        if !self.scores.verified_groups(round).await.is_empty() {
            return Err(RewardError::RoundHasVerifiedGroups(round));
        }

        let mut burned = self.burned_rounds.write().await;
        if burned.contains(&round) {
            return Ok(());
        }

        let pool = self.pool_amount(round).await?;
        if !pool.is_zero() {
            self.custody
                .burn(pool)
                .await
                .map_err(|e| RewardError::Collaborator(e.to_string()))?;
        }
        burned.insert(round);

        info!(round, burned = pool.to_tokens(), "🔥 Unclaimed round pool burned");
        Ok(())
    }
}
