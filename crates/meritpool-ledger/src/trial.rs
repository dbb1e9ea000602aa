use meritpool_types::{AccountId, GroupId, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pre-funded waitlist entry, consumed exactly once by the matching
/// account's trial join.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub account: AccountId,
    pub amount: TokenAmount,
}

/// Waitlist and in-use bookkeeping for sponsor-funded admissions, keyed by
/// `(group, provider)`. Value movement stays with the membership store;
/// this book only tracks who escrowed what for whom.
#[derive(Default)]
pub struct TrialBook {
    waitlist: Arc<RwLock<HashMap<(GroupId, AccountId), Vec<WaitlistEntry>>>>,
    in_use: Arc<RwLock<HashMap<(GroupId, AccountId), Vec<AccountId>>>>,
}

impl TrialBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_entry(&self, group: GroupId, provider: AccountId, entry: WaitlistEntry) {
        let mut waitlist = self.waitlist.write().await;
        waitlist.entry((group, provider)).or_default().push(entry);
    }

    /// Remove and return the first waitlist entry matching `account`.
    pub async fn take_entry(
        &self,
        group: GroupId,
        provider: AccountId,
        account: AccountId,
    ) -> Option<WaitlistEntry> {
        let mut waitlist = self.waitlist.write().await;
        let entries = waitlist.get_mut(&(group, provider))?;
        let index = entries.iter().position(|e| e.account == account)?;
        let entry = entries.swap_remove(index);
        if entries.is_empty() {
            waitlist.remove(&(group, provider));
        }
        Some(entry)
    }

    pub async fn find_entry(
        &self,
        group: GroupId,
        provider: AccountId,
        account: AccountId,
    ) -> Option<WaitlistEntry> {
        let waitlist = self.waitlist.read().await;
        waitlist
            .get(&(group, provider))?
            .iter()
            .find(|e| e.account == account)
            .copied()
    }

    pub async fn waitlisted(&self, group: GroupId, provider: AccountId) -> Vec<WaitlistEntry> {
        let waitlist = self.waitlist.read().await;
        waitlist.get(&(group, provider)).cloned().unwrap_or_default()
    }

    pub async fn mark_in_use(&self, group: GroupId, provider: AccountId, account: AccountId) {
        let mut in_use = self.in_use.write().await;
        in_use.entry((group, provider)).or_default().push(account);
    }

    pub async fn remove_in_use(
        &self,
        group: GroupId,
        provider: AccountId,
        account: AccountId,
    ) -> bool {
        let mut in_use = self.in_use.write().await;
        let Some(accounts) = in_use.get_mut(&(group, provider)) else {
            return false;
        };
        let Some(index) = accounts.iter().position(|a| *a == account) else {
            return false;
        };
        accounts.swap_remove(index);
        if accounts.is_empty() {
            in_use.remove(&(group, provider));
        }
        true
    }

    pub async fn accounts_in_use(&self, group: GroupId, provider: AccountId) -> Vec<AccountId> {
        let in_use = self.in_use.read().await;
        in_use.get(&(group, provider)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn waitlist_entry_consumed_once() {
        let book = TrialBook::new();
        let group = GroupId::new(1);
        let provider = account(1);
        let member = account(2);

        book.add_entry(
            group,
            provider,
            WaitlistEntry {
                account: member,
                amount: TokenAmount::from_tokens(5.0),
            },
        )
        .await;

        assert!(book.find_entry(group, provider, member).await.is_some());
        let entry = book.take_entry(group, provider, member).await.unwrap();
        assert_eq!(entry.amount, TokenAmount::from_tokens(5.0));
        assert!(book.take_entry(group, provider, member).await.is_none());
    }

    #[tokio::test]
    async fn in_use_tracking() {
        let book = TrialBook::new();
        let group = GroupId::new(1);
        let provider = account(1);
        let member = account(2);

        book.mark_in_use(group, provider, member).await;
        assert_eq!(book.accounts_in_use(group, provider).await, vec![member]);
        assert!(book.remove_in_use(group, provider, member).await);
        assert!(!book.remove_in_use(group, provider, member).await);
        assert!(book.accounts_in_use(group, provider).await.is_empty());
    }
}
