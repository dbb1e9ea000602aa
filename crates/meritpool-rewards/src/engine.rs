use crate::distributor::RewardDistributor;
use crate::splits::RecipientSplitBook;
use meritpool_ledger::{CapacityLedger, MembershipStore, SnapshotStore};
use meritpool_scoring::{DistrustLedger, ScoreLedger};
use meritpool_types::{
    OwnershipRegistry, ProtocolParams, RewardSource, RoundClock, ValueCustody, VoteWeightSource,
};
use std::sync::Arc;
use tracing::info;

/// Wires the full staking-pool core over a set of collaborator seams.
/// All components share state through `Arc`s, so the engine itself is
/// cheap to clone around.
pub struct PoolEngine {
    pub capacity: Arc<CapacityLedger>,
    pub snapshots: Arc<SnapshotStore>,
    pub membership: Arc<MembershipStore>,
    pub scores: Arc<ScoreLedger>,
    pub distrust: Arc<DistrustLedger>,
    pub splits: Arc<RecipientSplitBook>,
    pub distributor: Arc<RewardDistributor>,
}

impl PoolEngine {
    pub fn new(
        registry: Arc<dyn OwnershipRegistry>,
        weights: Arc<dyn VoteWeightSource>,
        custody: Arc<dyn ValueCustody>,
        clock: Arc<dyn RoundClock>,
        rewards: Arc<dyn RewardSource>,
        params: ProtocolParams,
    ) -> Self {
        let capacity = Arc::new(CapacityLedger::new(
            registry.clone(),
            weights.clone(),
            custody.clone(),
            clock.clone(),
            params,
        ));
        let snapshots = Arc::new(SnapshotStore::new());
        let membership = Arc::new(MembershipStore::new(
            capacity.clone(),
            snapshots.clone(),
            registry.clone(),
            custody.clone(),
            clock.clone(),
        ));
        let scores = Arc::new(ScoreLedger::new(
            membership.clone(),
            snapshots.clone(),
            capacity.clone(),
            registry.clone(),
            clock.clone(),
        ));
        let distrust = Arc::new(DistrustLedger::new(weights, clock.clone()));
        let splits = Arc::new(RecipientSplitBook::new(registry, clock.clone()));
        let distributor = Arc::new(RewardDistributor::new(
            scores.clone(),
            distrust.clone(),
            splits.clone(),
            rewards,
            custody,
            clock,
        ));

        info!("🏊 Pool engine initialized");
        Self {
            capacity,
            snapshots,
            membership,
            scores,
            distrust,
            splits,
            distributor,
        }
    }
}
