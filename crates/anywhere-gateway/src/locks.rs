//! Per-server mutual exclusion for lifecycle operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anywhere_core::domain::ServerId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per server id, created on first use.
#[derive(Debug, Default)]
pub struct ServerLocks {
    locks: Mutex<HashMap<ServerId, Arc<AsyncMutex<()>>>>,
}

impl ServerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `server_id`.
    pub async fn acquire(&self, server_id: &ServerId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(server_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the entry of a deleted server.
    pub fn forget(&self, server_id: &ServerId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_server_waits() {
        let locks = Arc::new(ServerLocks::new());
        let id = ServerId::new("0a1b2c3d");
        let guard = locks.acquire(&id).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move { drop(locks.acquire(&id).await) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn other_servers_do_not_wait() {
        let locks = ServerLocks::new();
        let _a = locks.acquire(&ServerId::new("aaaaaaaa")).await;
        let _b = locks.acquire(&ServerId::new("bbbbbbbb")).await;
        assert_eq!(locks.len(), 2);

        locks.forget(&ServerId::new("aaaaaaaa"));
        assert_eq!(locks.len(), 1);
    }
}
