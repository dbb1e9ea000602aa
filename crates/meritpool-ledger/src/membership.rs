use crate::capacity::{CapacityLedger, Group};
use crate::error::{LedgerError, Result};
use crate::snapshot::SnapshotStore;
use crate::trial::{TrialBook, WaitlistEntry};
use meritpool_types::{
    AccountId, GroupId, OwnershipRegistry, RoundClock, TokenAmount, ValueCustody,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Per-account membership record. `amount == ZERO` and
/// `group == GroupId::NONE` denote "not a member". `sponsor` is set only
/// for trial admissions and names the account that funded the stake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JoinInfo {
    pub joined_round: u64,
    pub amount: TokenAmount,
    pub group: GroupId,
    pub sponsor: Option<AccountId>,
}

impl JoinInfo {
    pub fn cleared() -> Self {
        Self {
            joined_round: 0,
            amount: TokenAmount::ZERO,
            group: GroupId::NONE,
            sponsor: None,
        }
    }

    pub fn is_member(&self) -> bool {
        !self.amount.is_zero()
    }
}

impl Default for JoinInfo {
    fn default() -> Self {
        Self::cleared()
    }
}

/// Round-indexed join/exit state, the mutable "live" view scoring
/// snapshots are taken from. Trial escrow is folded in here: the sponsor
/// funds the stake up front and is the only party refunded on exit.
pub struct MembershipStore {
    capacity: Arc<CapacityLedger>,
    snapshots: Arc<SnapshotStore>,
    registry: Arc<dyn OwnershipRegistry>,
    custody: Arc<dyn ValueCustody>,
    clock: Arc<dyn RoundClock>,
    /// Live membership per account.
    current: Arc<RwLock<HashMap<AccountId, JoinInfo>>>,
    /// Round-indexed history; a round with no action inherits the last
    /// known value when queried.
    history: Arc<RwLock<HashMap<AccountId, BTreeMap<u64, JoinInfo>>>>,
    /// Member index per group; compacted with swap-remove on exit.
    members: Arc<RwLock<HashMap<GroupId, Vec<AccountId>>>>,
    totals: Arc<RwLock<HashMap<GroupId, TokenAmount>>>,
    trials: TrialBook,
}

impl MembershipStore {
    pub fn new(
        capacity: Arc<CapacityLedger>,
        snapshots: Arc<SnapshotStore>,
        registry: Arc<dyn OwnershipRegistry>,
        custody: Arc<dyn ValueCustody>,
        clock: Arc<dyn RoundClock>,
    ) -> Self {
        Self {
            capacity,
            snapshots,
            registry,
            custody,
            clock,
            current: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            members: Arc::new(RwLock::new(HashMap::new())),
            totals: Arc::new(RwLock::new(HashMap::new())),
            trials: TrialBook::new(),
        }
    }

    // ----- membership mutations -----

    pub async fn join(&self, caller: AccountId, group: GroupId, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::AmountZero);
        }

        let info = self.join_info(caller).await;
        if info.is_member() {
            if info.sponsor.is_some() {
                return Err(LedgerError::TrialAlreadyJoined(caller));
            }
            if info.group != group {
                return Err(LedgerError::AlreadyInOtherGroup {
                    account: caller,
                    group: info.group,
                });
            }
        }

        let record = self
            .capacity
            .group(group)
            .await
            .ok_or(LedgerError::InactiveGroup(group))?;
        if !record.active {
            return Err(LedgerError::InactiveGroup(group));
        }

        let new_total = self
            .check_admission(&record, info.amount, amount)
            .await?;

        // Freeze this round's scoring view before the first mutation
        self.snapshot_current(group).await?;

        self.custody
            .lock(caller, amount)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        let round = self.clock.current_round().await;
        let is_new = !info.is_member();
        let joined_round = if is_new { round } else { info.joined_round };
        let updated = JoinInfo {
            joined_round,
            amount: new_total,
            group,
            sponsor: None,
        };
        self.commit_join(caller, updated, round, is_new, amount).await;

        info!(
            account = %caller,
            group = %group,
            round,
            amount = amount.to_tokens(),
            held = new_total.to_tokens(),
            "🤝 Member joined"
        );
        Ok(())
    }

    pub async fn exit(&self, caller: AccountId) -> Result<()> {
        let info = self.join_info(caller).await;
        if !info.is_member() {
            return Err(LedgerError::NotMember(caller));
        }
        self.exit_internal(caller, info).await
    }

    // ----- trial escrow -----

    /// Pre-fund waitlist entries from the provider's own balance. The
    /// combined amount is locked in one all-or-nothing custody call.
    pub async fn trial_waitlist_add(
        &self,
        caller: AccountId,
        group: GroupId,
        entries: &[(AccountId, TokenAmount)],
    ) -> Result<()> {
        let mut total = TokenAmount::ZERO;
        for (account, amount) in entries {
            if *account == caller {
                return Err(LedgerError::TrialAccountIsProvider(*account));
            }
            if amount.is_zero() {
                return Err(LedgerError::TrialAmountZero {
                    group,
                    account: *account,
                });
            }
            total = total.saturating_add(*amount);
        }

        self.custody
            .lock(caller, total)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        for (account, amount) in entries {
            self.trials
                .add_entry(
                    group,
                    caller,
                    WaitlistEntry {
                        account: *account,
                        amount: *amount,
                    },
                )
                .await;
        }

        info!(
            provider = %caller,
            group = %group,
            entries = entries.len(),
            escrowed = total.to_tokens(),
            "📝 Trial waitlist extended"
        );
        Ok(())
    }

    pub async fn trial_waitlist_remove(
        &self,
        caller: AccountId,
        group: GroupId,
        accounts: &[AccountId],
    ) -> Result<()> {
        // Verify the whole batch against the current waitlist before
        // unlocking anything, so a missing account leaves no effect.
        let mut pool = self.trials.waitlisted(group, caller).await;
        let mut total = TokenAmount::ZERO;
        for account in accounts {
            let index = pool
                .iter()
                .position(|e| e.account == *account)
                .ok_or(LedgerError::TrialAccountNotInWaitingList {
                    group,
                    account: *account,
                })?;
            total = total.saturating_add(pool.swap_remove(index).amount);
        }

        for account in accounts {
            self.trials.take_entry(group, caller, *account).await;
        }
        self.custody
            .release(caller, total)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        info!(
            provider = %caller,
            group = %group,
            removed = accounts.len(),
            released = total.to_tokens(),
            "🧹 Trial waitlist entries removed"
        );
        Ok(())
    }

    /// Sponsor-funded admission. Consumes exactly one matching waitlist
    /// entry; the stake was already locked by the provider, so no custody
    /// movement happens here.
    pub async fn trial_join(
        &self,
        caller: AccountId,
        group: GroupId,
        provider: AccountId,
    ) -> Result<()> {
        let entry = self
            .trials
            .find_entry(group, provider, caller)
            .await
            .ok_or(LedgerError::TrialAmountZero {
                group,
                account: caller,
            })?;

        let info = self.join_info(caller).await;
        if info.is_member() {
            if info.sponsor.is_some() {
                return Err(LedgerError::TrialAlreadyJoined(caller));
            }
            return Err(LedgerError::AlreadyInOtherGroup {
                account: caller,
                group: info.group,
            });
        }

        let record = self
            .capacity
            .group(group)
            .await
            .ok_or(LedgerError::InactiveGroup(group))?;
        if !record.active {
            return Err(LedgerError::InactiveGroup(group));
        }

        self.check_admission(&record, TokenAmount::ZERO, entry.amount)
            .await?;

        self.snapshot_current(group).await?;

        // All checks passed; consume the entry and admit
        self.trials.take_entry(group, provider, caller).await;
        self.trials.mark_in_use(group, provider, caller).await;

        let round = self.clock.current_round().await;
        let updated = JoinInfo {
            joined_round: round,
            amount: entry.amount,
            group,
            sponsor: Some(provider),
        };
        self.commit_join(caller, updated, round, true, entry.amount)
            .await;

        info!(
            account = %caller,
            provider = %provider,
            group = %group,
            round,
            amount = entry.amount.to_tokens(),
            "🎟️ Trial member joined"
        );
        Ok(())
    }

    /// Exit a trial membership; callable by the sponsoring provider
    /// (forced exit) or the account itself. Escrow always returns to the
    /// provider.
    pub async fn trial_exit(
        &self,
        caller: AccountId,
        group: GroupId,
        account: AccountId,
    ) -> Result<()> {
        let info = self.join_info(account).await;
        if !info.is_member() || info.group != group {
            return Err(LedgerError::NotMember(account));
        }
        let allowed = match info.sponsor {
            Some(provider) => caller == account || caller == provider,
            None => caller == account,
        };
        if !allowed {
            return Err(LedgerError::NotSponsorOrAccount(caller));
        }
        self.exit_internal(account, info).await
    }

    // ----- internals -----

    /// Admission checks 4–7: group/protocol bounds, group capacity,
    /// member-count bound, owner aggregate capacity. Returns the new
    /// total held by the account.
    async fn check_admission(
        &self,
        record: &Group,
        held: TokenAmount,
        amount: TokenAmount,
    ) -> Result<TokenAmount> {
        let group = record.id;
        let new_total = held.saturating_add(amount);

        if !record.min_join_amount.is_zero() && new_total < record.min_join_amount {
            return Err(LedgerError::BelowMinimum {
                required: record.min_join_amount,
                held: new_total,
            });
        }
        if !record.max_join_amount.is_zero() && new_total > record.max_join_amount {
            return Err(LedgerError::ExceedsAccountCap {
                cap: record.max_join_amount,
                held: new_total,
            });
        }
        let protocol_cap = self.capacity.join_max_amount().await?;
        if !protocol_cap.is_zero() && new_total > protocol_cap {
            return Err(LedgerError::ExceedsAccountCap {
                cap: protocol_cap,
                held: new_total,
            });
        }

        let group_total = self.group_total_joined(group).await;
        let new_group_total = group_total.saturating_add(amount);
        if new_group_total > record.capacity {
            return Err(LedgerError::GroupCapacityExceeded {
                group,
                capacity: record.capacity,
                total: new_group_total,
            });
        }

        let is_new = held.is_zero();
        if is_new && record.max_accounts != 0 {
            let count = self.member_count(group).await as u64;
            if count + 1 > record.max_accounts {
                return Err(LedgerError::GroupAccountsFull {
                    group,
                    max_accounts: record.max_accounts,
                });
            }
        }

        let owner = self
            .registry
            .owner_of(group)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
        let owner_total = self.owner_total_joined(owner).await?;
        let new_owner_total = owner_total.saturating_add(amount);
        let owner_cap = self.capacity.max_capacity_by_owner(owner).await?;
        if new_owner_total > owner_cap {
            return Err(LedgerError::OwnerCapacityExceeded {
                owner,
                cap: owner_cap,
                total: new_owner_total,
            });
        }

        Ok(new_total)
    }

    async fn commit_join(
        &self,
        account: AccountId,
        updated: JoinInfo,
        round: u64,
        is_new: bool,
        delta: TokenAmount,
    ) {
        {
            let mut current = self.current.write().await;
            current.insert(account, updated);
        }
        {
            let mut history = self.history.write().await;
            history.entry(account).or_default().insert(round, updated);
        }
        if is_new {
            let mut members = self.members.write().await;
            members.entry(updated.group).or_default().push(account);
        }
        {
            let mut totals = self.totals.write().await;
            let total = totals.entry(updated.group).or_insert(TokenAmount::ZERO);
            *total = total.saturating_add(delta);
        }
    }

    async fn exit_internal(&self, account: AccountId, info: JoinInfo) -> Result<()> {
        self.snapshot_current(info.group).await?;

        let refund_to = info.sponsor.unwrap_or(account);
        self.custody
            .release(refund_to, info.amount)
            .await
            .map_err(|e| LedgerError::Collaborator(e.to_string()))?;

        let round = self.clock.current_round().await;
        {
            let mut current = self.current.write().await;
            current.remove(&account);
        }
        {
            let mut history = self.history.write().await;
            history
                .entry(account)
                .or_default()
                .insert(round, JoinInfo::cleared());
        }
        {
            let mut members = self.members.write().await;
            if let Some(list) = members.get_mut(&info.group) {
                if let Some(index) = list.iter().position(|a| *a == account) {
                    list.swap_remove(index);
                }
                if list.is_empty() {
                    members.remove(&info.group);
                }
            }
        }
        {
            let mut totals = self.totals.write().await;
            if let Some(total) = totals.get_mut(&info.group) {
                *total = total.saturating_sub(info.amount);
            }
        }
        if let Some(provider) = info.sponsor {
            self.trials
                .remove_in_use(info.group, provider, account)
                .await;
        }

        info!(
            account = %account,
            group = %info.group,
            round,
            refund_to = %refund_to,
            amount = info.amount.to_tokens(),
            trial = info.sponsor.is_some(),
            "👋 Member exited"
        );
        Ok(())
    }

    /// Freeze the current round's view of a group on first touch; no-op
    /// for inactive groups and for rounds already snapshotted.
    pub async fn snapshot_current(&self, group: GroupId) -> Result<()> {
        let round = self.clock.current_round().await;
        if self.snapshots.exists(round, group).await {
            return Ok(());
        }
        let Some(record) = self.capacity.group(group).await else {
            return Ok(());
        };
        if !record.active {
            return Ok(());
        }

        let accounts = self.members(group).await;
        let amounts = {
            let current = self.current.read().await;
            accounts
                .iter()
                .map(|a| {
                    (
                        *a,
                        current.get(a).map(|i| i.amount).unwrap_or(TokenAmount::ZERO),
                    )
                })
                .collect::<HashMap<_, _>>()
        };
        self.snapshots
            .capture_if_absent(round, group, accounts, amounts)
            .await;
        Ok(())
    }

    // ----- queries -----

    pub async fn join_info(&self, account: AccountId) -> JoinInfo {
        let current = self.current.read().await;
        current.get(&account).copied().unwrap_or_default()
    }

    /// Membership as of `round`: the last recorded action at or before the
    /// round, cleared after an exit.
    pub async fn join_info_by_round(&self, account: AccountId, round: u64) -> JoinInfo {
        let history = self.history.read().await;
        history
            .get(&account)
            .and_then(|entries| entries.range(..=round).next_back().map(|(_, v)| *v))
            .unwrap_or_default()
    }

    pub async fn members(&self, group: GroupId) -> Vec<AccountId> {
        let members = self.members.read().await;
        members.get(&group).cloned().unwrap_or_default()
    }

    pub async fn member_count(&self, group: GroupId) -> usize {
        let members = self.members.read().await;
        members.get(&group).map(|l| l.len()).unwrap_or(0)
    }

    pub async fn member_at(&self, group: GroupId, index: usize) -> Option<AccountId> {
        let members = self.members.read().await;
        members.get(&group).and_then(|l| l.get(index).copied())
    }

    pub async fn group_total_joined(&self, group: GroupId) -> TokenAmount {
        let totals = self.totals.read().await;
        totals.get(&group).copied().unwrap_or(TokenAmount::ZERO)
    }

    /// Aggregate joined amount across every group currently owned by
    /// `owner`.
    pub async fn owner_total_joined(&self, owner: AccountId) -> Result<TokenAmount> {
        let mut total = TokenAmount::ZERO;
        for group in self.capacity.group_ids().await {
            let group_owner = self
                .registry
                .owner_of(group)
                .await
                .map_err(|e| LedgerError::Collaborator(e.to_string()))?;
            if group_owner == owner {
                total = total.saturating_add(self.group_total_joined(group).await);
            }
        }
        Ok(total)
    }

    pub async fn waitlisted(&self, group: GroupId, provider: AccountId) -> Vec<WaitlistEntry> {
        self.trials.waitlisted(group, provider).await
    }

    pub async fn trial_accounts_in_use(
        &self,
        group: GroupId,
        provider: AccountId,
    ) -> Vec<AccountId> {
        self.trials.accounts_in_use(group, provider).await
    }
}
