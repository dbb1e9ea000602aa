use crate::error::{Result, RewardError};
use meritpool_types::{AccountId, GroupId, OwnershipRegistry, Ratio, RoundClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// One configured cut of a group owner's reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientShare {
    pub recipient: AccountId,
    pub ratio: Ratio,
    pub remark: String,
}

/// Owner-configured reward splits, stored per `(round, group)` so a
/// configuration never reaches back into already-finished rounds.
pub struct RecipientSplitBook {
    registry: Arc<dyn OwnershipRegistry>,
    clock: Arc<dyn RoundClock>,
    splits: Arc<RwLock<HashMap<(u64, GroupId), Vec<RecipientShare>>>>,
}

impl RecipientSplitBook {
    pub fn new(registry: Arc<dyn OwnershipRegistry>, clock: Arc<dyn RoundClock>) -> Self {
        Self {
            registry,
            clock,
            splits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace the split configuration for the caller's group in the
    /// current round. Ratios may sum to at most one; whatever is not
    /// split stays with the owner.
    pub async fn set_recipients(
        &self,
        caller: AccountId,
        group: GroupId,
        shares: Vec<RecipientShare>,
    ) -> Result<()> {
        let owner = self
            .registry
            .owner_of(group)
            .await
            .map_err(|e| RewardError::Collaborator(e.to_string()))?;
        if caller != owner {
            return Err(RewardError::NotOwner { caller, group });
        }

        let total_ppm: u64 = shares.iter().map(|s| s.ratio.as_ppm() as u64).sum();
        if total_ppm > Ratio::ONE.as_ppm() as u64 {
            return Err(RewardError::InvalidRecipientRatios);
        }

        let round = self.clock.current_round().await;
        let count = shares.len();
        let mut splits = self.splits.write().await;
        splits.insert((round, group), shares);

        info!(round, group = %group, owner = %owner, recipients = count, "🧾 Recipient splits set");
        Ok(())
    }

    pub async fn recipients(&self, round: u64, group: GroupId) -> Vec<RecipientShare> {
        let splits = self.splits.read().await;
        splits.get(&(round, group)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meritpool_types::{ManualRoundClock, MemoryRegistry};

    fn account(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 32])
    }

    fn share(byte: u8, ppm: u32) -> RecipientShare {
        RecipientShare {
            recipient: account(byte),
            ratio: Ratio::from_ppm(ppm),
            remark: String::new(),
        }
    }

    #[tokio::test]
    async fn only_owner_sets_valid_ratios() {
        let registry = Arc::new(MemoryRegistry::new());
        let clock = Arc::new(ManualRoundClock::starting_at(1));
        let book = RecipientSplitBook::new(registry.clone(), clock.clone());
        let owner = account(1);
        let group = GroupId::new(1);
        registry.set_owner(group, owner).await;

        let err = book
            .set_recipients(account(2), group, vec![share(3, 100_000)])
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::NotOwner { .. }));

        let err = book
            .set_recipients(owner, group, vec![share(3, 600_000), share(4, 500_000)])
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::InvalidRecipientRatios));

        book.set_recipients(owner, group, vec![share(3, 600_000), share(4, 400_000)])
            .await
            .unwrap();
        assert_eq!(book.recipients(1, group).await.len(), 2);

        // Scoped to the round it was set in
        assert!(book.recipients(2, group).await.is_empty());
    }
}
