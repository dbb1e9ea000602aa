use crate::error::{Result, ScoringError};
use meritpool_ledger::{CapacityLedger, MembershipStore, SnapshotStore};
use meritpool_types::{AccountId, GroupId, OwnershipRegistry, Ratio, RoundClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Verifier delegation for one group. Implicitly revoked when group
/// ownership changes: the grant is only honored while `granted_by` is
/// still the current owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Delegation {
    pub verifier: AccountId,
    pub granted_by: AccountId,
}

/// Resumable per-round score submission for one group. Derived scores are
/// origin score times snapshot amount in base units, so they are kept as
/// plain `u128`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// First batch caller; the verifier of record for reward purposes.
    pub verifier: AccountId,
    /// Group owner at submission time; verify budget is charged here.
    pub owner: AccountId,
    pub submitted_count: usize,
    pub origin_by_account: HashMap<AccountId, u64>,
    pub derived_by_account: HashMap<AccountId, u128>,
    /// Sum of derived scores before capacity reduction.
    pub aggregate_before: u128,
    /// Aggregate after the owner's remaining verify budget is applied.
    pub aggregate_after: u128,
    /// Reduction coefficient actually applied at finalization.
    pub reduction: Ratio,
    pub finalized: bool,
}

impl Submission {
    fn new(verifier: AccountId, owner: AccountId) -> Self {
        Self {
            verifier,
            owner,
            submitted_count: 0,
            origin_by_account: HashMap::new(),
            derived_by_account: HashMap::new(),
            aggregate_before: 0,
            aggregate_after: 0,
            reduction: Ratio::ONE,
            finalized: false,
        }
    }
}

/// Batched, resumable verifier scoring against round snapshots, with a
/// per-round, per-owner verify budget consumed in call order.
pub struct ScoreLedger {
    membership: Arc<MembershipStore>,
    snapshots: Arc<SnapshotStore>,
    capacity: Arc<CapacityLedger>,
    registry: Arc<dyn OwnershipRegistry>,
    clock: Arc<dyn RoundClock>,
    delegations: Arc<RwLock<HashMap<GroupId, Delegation>>>,
    submissions: Arc<RwLock<HashMap<(u64, GroupId), Submission>>>,
    /// Remaining verify budget per `(round, owner)`, in derived-score
    /// units, initialized from the owner's verify capacity on first use.
    budgets: Arc<RwLock<HashMap<(u64, AccountId), u128>>>,
    verified_by_round: Arc<RwLock<HashMap<u64, Vec<GroupId>>>>,
}

impl ScoreLedger {
    pub fn new(
        membership: Arc<MembershipStore>,
        snapshots: Arc<SnapshotStore>,
        capacity: Arc<CapacityLedger>,
        registry: Arc<dyn OwnershipRegistry>,
        clock: Arc<dyn RoundClock>,
    ) -> Self {
        Self {
            membership,
            snapshots,
            capacity,
            registry,
            clock,
            delegations: Arc::new(RwLock::new(HashMap::new())),
            submissions: Arc::new(RwLock::new(HashMap::new())),
            budgets: Arc::new(RwLock::new(HashMap::new())),
            verified_by_round: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn owner_of(&self, group: GroupId) -> Result<AccountId> {
        self.registry
            .owner_of(group)
            .await
            .map_err(|e| ScoringError::Collaborator(e.to_string()))
    }

    /// Grant score-submission rights for a group to another account. Only
    /// the current owner may grant; the grant dies with the ownership.
    pub async fn set_delegated_verifier(
        &self,
        caller: AccountId,
        group: GroupId,
        verifier: AccountId,
    ) -> Result<()> {
        let owner = self.owner_of(group).await?;
        if caller != owner {
            return Err(ScoringError::NotOwner { caller, group });
        }
        let mut delegations = self.delegations.write().await;
        delegations.insert(
            group,
            Delegation {
                verifier,
                granted_by: owner,
            },
        );
        info!(group = %group, owner = %owner, verifier = %verifier, "🔑 Verifier delegated");
        Ok(())
    }

    pub async fn delegated_verifier(&self, group: GroupId) -> Option<Delegation> {
        let delegations = self.delegations.read().await;
        delegations.get(&group).copied()
    }

    pub async fn can_verify(&self, caller: AccountId, group: GroupId) -> Result<bool> {
        let owner = self.owner_of(group).await?;
        if caller == owner {
            return Ok(true);
        }
        let delegations = self.delegations.read().await;
        Ok(delegations
            .get(&group)
            .map(|d| d.verifier == caller && d.granted_by == owner)
            .unwrap_or(false))
    }

    /// Submit the next batch of origin scores for the current round. The
    /// batch must start exactly at the submission's progress counter;
    /// the submission finalizes itself once every snapshot account is
    /// scored, charging the owner's verify budget.
    pub async fn submit(
        &self,
        caller: AccountId,
        group: GroupId,
        start_index: usize,
        scores: &[u64],
    ) -> Result<()> {
        let round = self.clock.current_round().await;

        // Lazy snapshot; a no-op for inactive groups, which then fail below
        self.membership.snapshot_current(group).await?;
        let snapshot = self
            .snapshots
            .get(round, group)
            .await
            .ok_or(ScoringError::NoSnapshotForRound { round, group })?;

        let owner = self.owner_of(group).await?;
        if !self.can_verify(caller, group).await? {
            return Err(ScoringError::NotVerifier { caller, group });
        }

        // Budget base is resolved before any mutation so a collaborator
        // failure leaves no partial state.
        let max_score = self.capacity.params().max_origin_score;
        let budget_base = self.capacity.max_verify_capacity_by_owner(owner).await?;
        let initial_budget = budget_base.to_base_units() as u128 * max_score as u128;

        let mut submissions = self.submissions.write().await;
        let key = (round, group);

        // Validate against existing progress before inserting anything
        if let Some(existing) = submissions.get(&key) {
            if existing.finalized {
                return Err(ScoringError::AlreadySubmitted { group });
            }
            if start_index != existing.submitted_count {
                return Err(ScoringError::InvalidStartIndex {
                    expected: existing.submitted_count,
                    actual: start_index,
                });
            }
        } else if start_index != 0 {
            return Err(ScoringError::InvalidStartIndex {
                expected: 0,
                actual: start_index,
            });
        }
        if start_index + scores.len() > snapshot.accounts.len() {
            return Err(ScoringError::ScoresExceedAccountCount {
                start: start_index,
                count: scores.len(),
                accounts: snapshot.accounts.len(),
            });
        }
        for score in scores {
            if *score > max_score {
                return Err(ScoringError::ScoreExceedsMax {
                    score: *score,
                    max: max_score,
                });
            }
        }

        let mut budgets = self.budgets.write().await;
        // Check against the would-be budget first; a rejected submit must
        // not leave a fresh budget entry behind
        let available = budgets
            .get(&(round, owner))
            .copied()
            .unwrap_or(initial_budget);
        if available == 0 {
            return Err(ScoringError::NoRemainingVerifyCapacity { owner });
        }
        let remaining = budgets.entry((round, owner)).or_insert(initial_budget);

        let submission = submissions
            .entry(key)
            .or_insert_with(|| Submission::new(caller, owner));

        for (offset, score) in scores.iter().enumerate() {
            let account = snapshot.accounts[start_index + offset];
            let amount = snapshot
                .amount_by_account
                .get(&account)
                .copied()
                .unwrap_or_default();
            let derived = *score as u128 * amount.to_base_units() as u128;
            submission.origin_by_account.insert(account, *score);
            submission.derived_by_account.insert(account, derived);
            submission.aggregate_before += derived;
        }
        submission.submitted_count += scores.len();

        let finalized = submission.submitted_count == snapshot.accounts.len();
        if finalized {
            let consumed = submission.aggregate_before.min(*remaining);
            submission.aggregate_after = consumed;
            submission.reduction = if submission.aggregate_before == 0 {
                Ratio::ONE
            } else {
                Ratio::from_fraction(consumed, submission.aggregate_before)
            };
            submission.finalized = true;
            *remaining -= consumed;

            let mut verified = self.verified_by_round.write().await;
            verified.entry(round).or_default().push(group);
        }

        info!(
            round,
            group = %group,
            verifier = %caller,
            batch = scores.len(),
            progress = submission.submitted_count,
            total = snapshot.accounts.len(),
            finalized,
            "✅ Score batch accepted"
        );
        Ok(())
    }

    // ----- queries -----

    pub async fn submission(&self, round: u64, group: GroupId) -> Option<Submission> {
        let submissions = self.submissions.read().await;
        submissions.get(&(round, group)).cloned()
    }

    pub async fn is_finalized(&self, round: u64, group: GroupId) -> bool {
        let submissions = self.submissions.read().await;
        submissions
            .get(&(round, group))
            .map(|s| s.finalized)
            .unwrap_or(false)
    }

    pub async fn origin_score(&self, round: u64, group: GroupId, account: AccountId) -> u64 {
        let submissions = self.submissions.read().await;
        submissions
            .get(&(round, group))
            .and_then(|s| s.origin_by_account.get(&account).copied())
            .unwrap_or(0)
    }

    pub async fn derived_score(&self, round: u64, group: GroupId, account: AccountId) -> u128 {
        let submissions = self.submissions.read().await;
        submissions
            .get(&(round, group))
            .and_then(|s| s.derived_by_account.get(&account).copied())
            .unwrap_or(0)
    }

    /// Group aggregate before capacity reduction; zero until finalized or
    /// while batches are in flight.
    pub async fn aggregate_before(&self, round: u64, group: GroupId) -> u128 {
        let submissions = self.submissions.read().await;
        submissions
            .get(&(round, group))
            .map(|s| s.aggregate_before)
            .unwrap_or(0)
    }

    /// Capacity-capped group score; zero until the submission finalizes.
    pub async fn score_by_group(&self, round: u64, group: GroupId) -> u128 {
        let submissions = self.submissions.read().await;
        submissions
            .get(&(round, group))
            .filter(|s| s.finalized)
            .map(|s| s.aggregate_after)
            .unwrap_or(0)
    }

    pub async fn reduction_of(&self, round: u64, group: GroupId) -> Ratio {
        let submissions = self.submissions.read().await;
        submissions
            .get(&(round, group))
            .map(|s| s.reduction)
            .unwrap_or(Ratio::ONE)
    }

    pub async fn verifier_of(&self, round: u64, group: GroupId) -> Option<AccountId> {
        let submissions = self.submissions.read().await;
        submissions.get(&(round, group)).map(|s| s.verifier)
    }

    pub async fn remaining_verify_budget(&self, round: u64, owner: AccountId) -> Option<u128> {
        let budgets = self.budgets.read().await;
        budgets.get(&(round, owner)).copied()
    }

    /// Groups whose submissions finalized in the round, in call order.
    pub async fn verified_groups(&self, round: u64) -> Vec<GroupId> {
        let verified = self.verified_by_round.read().await;
        verified.get(&round).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meritpool_types::{
        ManualRoundClock, MemoryCustody, MemoryRegistry, MemoryVoteWeights, ProtocolParams, Ratio,
        TokenAmount,
    };

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        weights: Arc<MemoryVoteWeights>,
        custody: Arc<MemoryCustody>,
        clock: Arc<ManualRoundClock>,
        capacity: Arc<CapacityLedger>,
        membership: Arc<MembershipStore>,
        scores: ScoreLedger,
    }

    fn test_params() -> ProtocolParams {
        ProtocolParams {
            capacity_multiplier: 10,
            verify_capacity_multiplier: 10,
            min_group_stake: TokenAmount::from_tokens(1.0),
            min_owner_vote_ratio: Ratio::from_ppm(1_000),
            account_cap_ratio: Ratio::ZERO, // per-account protocol cap disabled
            max_origin_score: 10_000,
        }
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        let weights = Arc::new(MemoryVoteWeights::new());
        let custody = Arc::new(MemoryCustody::new());
        let clock = Arc::new(ManualRoundClock::starting_at(1));
        let capacity = Arc::new(CapacityLedger::new(
            registry.clone(),
            weights.clone(),
            custody.clone(),
            clock.clone(),
            test_params(),
        ));
        let snapshots = Arc::new(SnapshotStore::new());
        let membership = Arc::new(MembershipStore::new(
            capacity.clone(),
            snapshots.clone(),
            registry.clone(),
            custody.clone(),
            clock.clone(),
        ));
        let scores = ScoreLedger::new(
            membership.clone(),
            snapshots,
            capacity.clone(),
            registry.clone(),
            clock.clone(),
        );
        Fixture {
            registry,
            weights,
            custody,
            clock,
            capacity,
            membership,
            scores,
        }
    }

    fn account(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 32])
    }

    async fn setup_group(fx: &Fixture, owner: AccountId, group: GroupId) {
        fx.registry.set_owner(group, owner).await;
        fx.weights
            .set_weight(owner, TokenAmount::from_tokens(100.0))
            .await;
        fx.custody
            .credit(owner, TokenAmount::from_tokens(1_000.0))
            .await;
        fx.capacity
            .activate(
                owner,
                group,
                String::new(),
                TokenAmount::from_tokens(10.0),
                TokenAmount::ZERO,
                TokenAmount::ZERO,
                0,
            )
            .await
            .unwrap();
    }

    async fn join(fx: &Fixture, member: AccountId, group: GroupId, tokens: f64) {
        fx.custody
            .credit(member, TokenAmount::from_tokens(100.0))
            .await;
        fx.membership
            .join(member, group, TokenAmount::from_tokens(tokens))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn single_batch_finalizes() {
        let fx = fixture().await;
        let owner = account(1);
        let group = GroupId::new(1);
        setup_group(&fx, owner, group).await;
        let a = account(2);
        join(&fx, a, group, 10.0).await;
        fx.clock.advance().await;

        fx.scores.submit(owner, group, 0, &[5_000]).await.unwrap();

        assert!(fx.scores.is_finalized(2, group).await);
        assert_eq!(fx.scores.origin_score(2, group, a).await, 5_000);
        let expected = 5_000u128 * TokenAmount::from_tokens(10.0).to_base_units() as u128;
        assert_eq!(fx.scores.derived_score(2, group, a).await, expected);
        assert_eq!(fx.scores.score_by_group(2, group).await, expected);
        assert_eq!(fx.scores.reduction_of(2, group).await, Ratio::ONE);
        assert_eq!(fx.scores.verified_groups(2).await, vec![group]);
        assert_eq!(fx.scores.verifier_of(2, group).await, Some(owner));
    }

    #[tokio::test]
    async fn resumable_batches_match_single_submission() {
        let fx = fixture().await;
        let owner = account(1);
        let group = GroupId::new(1);
        setup_group(&fx, owner, group).await;
        let a = account(2);
        let b = account(3);
        let c = account(4);
        join(&fx, a, group, 10.0).await;
        join(&fx, b, group, 20.0).await;
        join(&fx, c, group, 30.0).await;
        fx.clock.advance().await;

        // Out-of-order start is rejected without effect
        let err = fx.scores.submit(owner, group, 1, &[100]).await.unwrap_err();
        assert!(matches!(
            err,
            ScoringError::InvalidStartIndex {
                expected: 0,
                actual: 1
            }
        ));

        fx.scores.submit(owner, group, 0, &[100]).await.unwrap();
        assert!(!fx.scores.is_finalized(2, group).await);

        // Replaying the same index is rejected
        let err = fx.scores.submit(owner, group, 0, &[100]).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidStartIndex { .. }));

        fx.scores
            .submit(owner, group, 1, &[200, 300])
            .await
            .unwrap();
        assert!(fx.scores.is_finalized(2, group).await);

        let base = TokenAmount::from_tokens(10.0).to_base_units() as u128;
        let expected = 100u128 * base + 200u128 * 2 * base + 300u128 * 3 * base;
        assert_eq!(fx.scores.aggregate_before(2, group).await, expected);
        assert_eq!(fx.scores.score_by_group(2, group).await, expected);

        let err = fx.scores.submit(owner, group, 3, &[1]).await.unwrap_err();
        assert!(matches!(err, ScoringError::AlreadySubmitted { .. }));
    }

    #[tokio::test]
    async fn submit_bounds_checks() {
        let fx = fixture().await;
        let owner = account(1);
        let group = GroupId::new(1);
        setup_group(&fx, owner, group).await;
        let a = account(2);
        join(&fx, a, group, 10.0).await;
        fx.clock.advance().await;

        let err = fx
            .scores
            .submit(owner, group, 0, &[10_001])
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::ScoreExceedsMax { .. }));

        let err = fx
            .scores
            .submit(owner, group, 0, &[100, 100])
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::ScoresExceedAccountCount { .. }));

        // A group with no snapshot in the round cannot be scored
        let err = fx
            .scores
            .submit(owner, GroupId::new(9), 0, &[1])
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::NoSnapshotForRound { .. }));
    }

    #[tokio::test]
    async fn delegation_follows_ownership() {
        let fx = fixture().await;
        let owner = account(1);
        let delegate = account(7);
        let stranger = account(8);
        let group = GroupId::new(1);
        setup_group(&fx, owner, group).await;
        let a = account(2);
        join(&fx, a, group, 10.0).await;
        fx.clock.advance().await;

        let err = fx
            .scores
            .set_delegated_verifier(stranger, group, delegate)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::NotOwner { .. }));

        fx.scores
            .set_delegated_verifier(owner, group, delegate)
            .await
            .unwrap();
        assert!(fx.scores.can_verify(delegate, group).await.unwrap());
        assert!(!fx.scores.can_verify(stranger, group).await.unwrap());

        let err = fx
            .scores
            .submit(stranger, group, 0, &[100])
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::NotVerifier { .. }));

        // Ownership transfer silently revokes the delegation
        let new_owner = account(9);
        fx.registry.set_owner(group, new_owner).await;
        assert!(!fx.scores.can_verify(delegate, group).await.unwrap());
        assert!(fx.scores.can_verify(new_owner, group).await.unwrap());
    }

    #[tokio::test]
    async fn verify_budget_caps_owner_across_groups() {
        let fx = fixture().await;
        let owner = account(1);
        let rich = account(9);
        let g1 = GroupId::new(1);
        let g2 = GroupId::new(2);

        fx.registry.set_owner(g1, owner).await;
        fx.registry.set_owner(g2, owner).await;
        fx.weights
            .set_weight(owner, TokenAmount::from_tokens(100.0))
            .await;
        fx.custody
            .credit(owner, TokenAmount::from_tokens(100.0))
            .await;
        for group in [g1, g2] {
            fx.capacity
                .activate(
                    owner,
                    group,
                    String::new(),
                    TokenAmount::from_tokens(10.0),
                    TokenAmount::ZERO,
                    TokenAmount::ZERO,
                    0,
                )
                .await
                .unwrap();
        }
        let a = account(2);
        let b = account(3);
        join(&fx, a, g1, 15.0).await;
        join(&fx, b, g2, 5.0).await;
        fx.clock.advance().await;

        // Votes shift after join time: the owner now holds 0.5 of 100.5
        // votes. Supply 300, multiplier 10: verify base ~14.92 tokens.
        fx.weights
            .set_weight(owner, TokenAmount::from_tokens(0.5))
            .await;
        fx.weights
            .set_weight(rich, TokenAmount::from_tokens(100.0))
            .await;
        let budget_base = fx.capacity.max_verify_capacity_by_owner(owner).await.unwrap();
        let budget = budget_base.to_base_units() as u128 * 10_000u128;

        // g1 aggregate exceeds the whole budget and is clamped to it
        fx.scores.submit(owner, g1, 0, &[10_000]).await.unwrap();
        let before = fx.scores.aggregate_before(2, g1).await;
        assert!(before > budget);
        assert_eq!(fx.scores.score_by_group(2, g1).await, budget);
        assert!(fx.scores.reduction_of(2, g1).await < Ratio::ONE);
        assert_eq!(fx.scores.remaining_verify_budget(2, owner).await, Some(0));

        // Nothing is left for the owner's second group
        let err = fx.scores.submit(owner, g2, 0, &[1]).await.unwrap_err();
        assert!(matches!(err, ScoringError::NoRemainingVerifyCapacity { .. }));
    }

    #[tokio::test]
    async fn rejected_submit_leaves_no_budget_entry() {
        let fx = fixture().await;
        let owner = account(1);
        let rich = account(9);
        let group = GroupId::new(1);
        setup_group(&fx, owner, group).await;
        let a = account(2);
        join(&fx, a, group, 10.0).await;
        fx.clock.advance().await;

        // The owner's votes evaporate after activation, so the verify
        // budget derives to zero
        fx.weights.set_weight(owner, TokenAmount::ZERO).await;
        fx.weights
            .set_weight(rich, TokenAmount::from_tokens(100.0))
            .await;

        let err = fx.scores.submit(owner, group, 0, &[100]).await.unwrap_err();
        assert!(matches!(err, ScoringError::NoRemainingVerifyCapacity { .. }));

        // The failed call left no budget state behind
        assert_eq!(fx.scores.remaining_verify_budget(2, owner).await, None);
        assert!(fx.scores.submission(2, group).await.is_none());

        // With votes restored the budget derives afresh and the submit goes
        // through
        fx.weights
            .set_weight(owner, TokenAmount::from_tokens(100.0))
            .await;
        fx.scores.submit(owner, group, 0, &[100]).await.unwrap();
        assert!(fx.scores.is_finalized(2, group).await);
    }

    #[tokio::test]
    async fn budget_consumption_is_call_ordered() {
        let fx = fixture().await;
        let owner = account(1);
        let g1 = GroupId::new(1);
        let g2 = GroupId::new(2);
        fx.registry.set_owner(g1, owner).await;
        fx.registry.set_owner(g2, owner).await;
        fx.weights
            .set_weight(owner, TokenAmount::from_tokens(100.0))
            .await;
        fx.custody
            .credit(owner, TokenAmount::from_tokens(100.0))
            .await;
        for group in [g1, g2] {
            fx.capacity
                .activate(
                    owner,
                    group,
                    String::new(),
                    TokenAmount::from_tokens(10.0),
                    TokenAmount::ZERO,
                    TokenAmount::ZERO,
                    0,
                )
                .await
                .unwrap();
        }
        let a = account(2);
        let b = account(3);
        join(&fx, a, g1, 10.0).await;
        join(&fx, b, g2, 10.0).await;
        fx.clock.advance().await;

        fx.scores.submit(owner, g1, 0, &[4_000]).await.unwrap();
        fx.scores.submit(owner, g2, 0, &[4_000]).await.unwrap();

        // Both fit; the budget shrank by both consumed aggregates
        let consumed = fx.scores.score_by_group(2, g1).await
            + fx.scores.score_by_group(2, g2).await;
        let budget_base = fx.capacity.max_verify_capacity_by_owner(owner).await.unwrap();
        let budget = budget_base.to_base_units() as u128 * 10_000u128;
        assert_eq!(
            fx.scores.remaining_verify_budget(2, owner).await,
            Some(budget - consumed)
        );
        assert_eq!(fx.scores.verified_groups(2).await, vec![g1, g2]);
    }
}
