use crate::error::{Result, ScoringError};
use meritpool_types::{AccountId, RoundClock, TokenAmount, VoteWeightSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Accumulated distrust against one group owner in one round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrustRecord {
    pub total_votes: TokenAmount,
    pub vote_by_voter: HashMap<AccountId, TokenAmount>,
    pub reasons_by_voter: HashMap<AccountId, Vec<String>>,
}

/// Governance-weighted distrust voting. Votes never mutate stored scores;
/// the discount is a pure function applied at read time, so queries always
/// reflect the latest votes for the round.
pub struct DistrustLedger {
    weights: Arc<dyn VoteWeightSource>,
    clock: Arc<dyn RoundClock>,
    records: Arc<RwLock<HashMap<(u64, AccountId), DistrustRecord>>>,
    /// Total vote weight frozen at the first vote of each round; the
    /// discount denominator.
    total_by_round: Arc<RwLock<HashMap<u64, TokenAmount>>>,
}

impl DistrustLedger {
    pub fn new(weights: Arc<dyn VoteWeightSource>, clock: Arc<dyn RoundClock>) -> Self {
        Self {
            weights,
            clock,
            records: Arc::new(RwLock::new(HashMap::new())),
            total_by_round: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cast a distrust vote against a group owner for the current round.
    /// A voter's cumulative votes against one owner are capped at the
    /// voter's own weight.
    pub async fn distrust_vote(
        &self,
        caller: AccountId,
        owner: AccountId,
        amount: TokenAmount,
        reason: &str,
    ) -> Result<()> {
        let weight = self
            .weights
            .vote_weight(caller)
            .await
            .map_err(|e| ScoringError::Collaborator(e.to_string()))?;
        if weight.is_zero() {
            return Err(ScoringError::NotGovernor(caller));
        }
        if reason.trim().is_empty() {
            return Err(ScoringError::InvalidReason);
        }

        let round = self.clock.current_round().await;
        {
            let mut totals = self.total_by_round.write().await;
            if !totals.contains_key(&round) {
                let total = self
                    .weights
                    .total_vote_weight()
                    .await
                    .map_err(|e| ScoringError::Collaborator(e.to_string()))?;
                totals.insert(round, total);
            }
        }

        let mut records = self.records.write().await;
        let record = records.entry((round, owner)).or_default();
        let cast = record
            .vote_by_voter
            .get(&caller)
            .copied()
            .unwrap_or_default();
        let cumulative = cast.saturating_add(amount);
        if cumulative > weight {
            return Err(ScoringError::DistrustVoteExceedsLimit {
                voter: caller,
                weight,
            });
        }

        record.vote_by_voter.insert(caller, cumulative);
        record
            .reasons_by_voter
            .entry(caller)
            .or_default()
            .push(reason.to_string());
        record.total_votes = record.total_votes.saturating_add(amount);

        info!(
            round,
            owner = %owner,
            voter = %caller,
            amount = amount.to_tokens(),
            total = record.total_votes.to_tokens(),
            "👎 Distrust vote cast"
        );
        Ok(())
    }

    pub async fn votes_against(&self, round: u64, owner: AccountId) -> TokenAmount {
        let records = self.records.read().await;
        records
            .get(&(round, owner))
            .map(|r| r.total_votes)
            .unwrap_or_default()
    }

    pub async fn voter_amount(
        &self,
        round: u64,
        owner: AccountId,
        voter: AccountId,
    ) -> TokenAmount {
        let records = self.records.read().await;
        records
            .get(&(round, owner))
            .and_then(|r| r.vote_by_voter.get(&voter).copied())
            .unwrap_or_default()
    }

    pub async fn reasons_of(&self, round: u64, owner: AccountId, voter: AccountId) -> Vec<String> {
        let records = self.records.read().await;
        records
            .get(&(round, owner))
            .and_then(|r| r.reasons_by_voter.get(&voter).cloned())
            .unwrap_or_default()
    }

    /// Denominator for the round's discount; zero if no vote was cast.
    pub async fn total_verify_votes(&self, round: u64) -> TokenAmount {
        let totals = self.total_by_round.read().await;
        totals.get(&round).copied().unwrap_or_default()
    }

    /// Scale a raw group score by the owner's distrust for the round:
    /// `raw * (total - votes) / total`, with no discount when the round
    /// saw no votes at all.
    pub async fn discounted(&self, round: u64, owner: AccountId, raw: u128) -> u128 {
        let total = self.total_verify_votes(round).await;
        if total.is_zero() {
            return raw;
        }
        let votes = self.votes_against(round, owner).await;
        let kept = total.saturating_sub(votes);
        let total_bu = total.to_base_units() as u128;
        let kept_bu = kept.to_base_units() as u128;
        // Split the product so `raw * kept` cannot overflow; derived-score
        // aggregates run far past 64 bits
        raw / total_bu * kept_bu + raw % total_bu * kept_bu / total_bu
    }
}
