//! Per-account mutual exclusion.
//!
//! One in-flight pipeline per signing account, from validation until the
//! receipt (or timeout). Distinct accounts never contend. Orchestrators
//! share the process-wide table unless given another one.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, OwnedMutexGuard};

static PROCESS_LOCKS: Lazy<Arc<AccountLocks>> = Lazy::new(|| Arc::new(AccountLocks::new()));

#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shared by every orchestrator in this process.
    pub fn process_wide() -> Arc<Self> {
        PROCESS_LOCKS.clone()
    }

    /// Wait for exclusive use of `account`. Released when the guard drops.
    pub async fn acquire(&self, account: Address) -> OwnedMutexGuard<()> {
        // Clone the Arc out so no map shard stays locked across the await
        let lock = self.locks.entry(account).or_default().clone();
        lock.lock_owned().await
    }

    /// True while a pipeline holds `account`.
    pub fn is_locked(&self, account: Address) -> bool {
        match self.locks.get(&account) {
            Some(lock) => {
                let held = lock.try_lock().is_err();
                held
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_account_is_serialized() {
        let locks = Arc::new(AccountLocks::new());
        let account = Address::repeat_byte(0x01);

        let guard = locks.acquire(account).await;
        assert!(locks.is_locked(account));

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(account).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!locks.is_locked(account));
    }

    #[test]
    fn test_process_wide_table_is_shared() {
        assert!(Arc::ptr_eq(&AccountLocks::process_wide(), &AccountLocks::process_wide()));
    }

    #[tokio::test]
    async fn test_distinct_accounts_do_not_contend() {
        let locks = AccountLocks::new();
        let _a = locks.acquire(Address::repeat_byte(0x01)).await;
        let acquired = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(Address::repeat_byte(0x02)),
        )
        .await;
        assert!(acquired.is_ok());
    }
}
