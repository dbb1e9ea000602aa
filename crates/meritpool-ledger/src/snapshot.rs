use meritpool_types::{AccountId, GroupId, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Frozen membership view for a `(round, group)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Member accounts in index order; batched scoring addresses members
    /// by position in this list.
    pub accounts: Vec<AccountId>,
    pub amount_by_account: HashMap<AccountId, TokenAmount>,
    pub total_amount: TokenAmount,
}

/// Arena of per-round, per-group snapshots. The only mutating entry point
/// is `capture_if_absent`, so a snapshot is immutable once created.
#[derive(Default)]
pub struct SnapshotStore {
    snapshots: Arc<RwLock<HashMap<(u64, GroupId), RoundSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the given membership view for `(round, group)` unless a
    /// snapshot already exists. Returns whether a snapshot was created.
    pub async fn capture_if_absent(
        &self,
        round: u64,
        group: GroupId,
        accounts: Vec<AccountId>,
        amount_by_account: HashMap<AccountId, TokenAmount>,
    ) -> bool {
        let mut snapshots = self.snapshots.write().await;
        if snapshots.contains_key(&(round, group)) {
            return false;
        }

        let mut total_amount = TokenAmount::ZERO;
        for amount in amount_by_account.values() {
            total_amount = total_amount.saturating_add(*amount);
        }

        info!(
            round,
            group = %group,
            accounts = accounts.len(),
            total = total_amount.to_tokens(),
            "📸 Round snapshot captured"
        );

        snapshots.insert(
            (round, group),
            RoundSnapshot {
                accounts,
                amount_by_account,
                total_amount,
            },
        );
        true
    }

    pub async fn get(&self, round: u64, group: GroupId) -> Option<RoundSnapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots.get(&(round, group)).cloned()
    }

    pub async fn exists(&self, round: u64, group: GroupId) -> bool {
        let snapshots = self.snapshots.read().await;
        snapshots.contains_key(&(round, group))
    }

    pub async fn amount_of(&self, round: u64, group: GroupId, account: AccountId) -> TokenAmount {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&(round, group))
            .and_then(|s| s.amount_by_account.get(&account).copied())
            .unwrap_or(TokenAmount::ZERO)
    }

    pub async fn total_amount(&self, round: u64, group: GroupId) -> TokenAmount {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&(round, group))
            .map(|s| s.total_amount)
            .unwrap_or(TokenAmount::ZERO)
    }
}
