//! Serialized tool reconciliation per server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::plan::validate_discovered;
use crate::domain::{DiscoveredTool, ReconcileOutcome, ServerId, ToolShapeError};
use crate::ports::{DiscoveryError, RepositoryError, ToolRepository};

/// Why a tool sync left the stored tool set unchanged.
#[derive(Debug, Error)]
pub enum ToolSyncError {
    /// Discovery failed, so the previous tool set was kept.
    #[error("tool discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("invalid discovered tool: {0}")]
    InvalidTool(#[from] ToolShapeError),

    /// The reconciliation transaction was rolled back.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Sole writer of tool additions and removals.
///
/// At most one reconciliation per server is in flight at a time; servers
/// are independent of each other.
pub struct ToolSyncService {
    tools: Arc<dyn ToolRepository>,
    locks: Mutex<HashMap<ServerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ToolSyncService {
    pub fn new(tools: Arc<dyn ToolRepository>) -> Self {
        Self {
            tools,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ToolRepository> {
        &self.tools
    }

    fn server_lock(&self, server_id: &ServerId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(server_id.clone()).or_default())
    }

    /// Drop the reconcile lock of a removed server.
    pub fn forget(&self, server_id: &ServerId) {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(server_id);
    }

    /// Reconcile `discovered` against the stored tools of `server_id`.
    ///
    /// An empty list is a valid discovery result and removes every tool.
    pub async fn reconcile(
        &self,
        server_id: &ServerId,
        discovered: Vec<DiscoveredTool>,
    ) -> Result<ReconcileOutcome, ToolSyncError> {
        let discovered = validate_discovered(discovered)?;

        let lock = self.server_lock(server_id);
        let _guard = lock.lock().await;

        let outcome = self.tools.reconcile(server_id, &discovered).await?;
        tracing::info!(
            server_id = %server_id,
            discovered = discovered.len(),
            added = outcome.added,
            removed = outcome.removed,
            "Reconciled tools"
        );
        Ok(outcome)
    }

    /// Reconcile the result of a discovery attempt.
    ///
    /// A failed discovery leaves the stored tools untouched and is returned
    /// as [`ToolSyncError::Discovery`].
    pub async fn apply_discovery(
        &self,
        server_id: &ServerId,
        discovery: Result<Vec<DiscoveredTool>, DiscoveryError>,
    ) -> Result<ReconcileOutcome, ToolSyncError> {
        match discovery {
            Ok(tools) => self.reconcile(server_id, tools).await,
            Err(e) => {
                tracing::warn!(
                    server_id = %server_id,
                    error = %e,
                    "Discovery failed, keeping previous tool set"
                );
                Err(e.into())
            }
        }
    }

    /// Update description and schema of already known tools.
    pub async fn refresh_metadata(
        &self,
        server_id: &ServerId,
        discovered: Vec<DiscoveredTool>,
    ) -> Result<usize, ToolSyncError> {
        let discovered = validate_discovered(discovered)?;

        let lock = self.server_lock(server_id);
        let _guard = lock.lock().await;

        let updated = self.tools.refresh_metadata(server_id, &discovered).await?;
        tracing::debug!(server_id = %server_id, updated, "Refreshed tool metadata");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ToolRecord, full_tool_name};
    use crate::tool_sync::plan::{plan_reconcile, plan_refresh};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory repository that records the peak number of overlapping calls.
    #[derive(Default)]
    struct MemoryTools {
        records: Mutex<Vec<ToolRecord>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_next: Mutex<bool>,
    }

    #[async_trait]
    impl ToolRepository for MemoryTools {
        async fn list_for_server(
            &self,
            server_id: &ServerId,
        ) -> Result<Vec<ToolRecord>, RepositoryError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| &r.server_id == server_id)
                .cloned()
                .collect())
        }

        async fn list_enabled(&self) -> Result<Vec<ToolRecord>, RepositoryError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.is_enabled)
                .cloned()
                .collect())
        }

        async fn reconcile(
            &self,
            server_id: &ServerId,
            discovered: &[DiscoveredTool],
        ) -> Result<ReconcileOutcome, RepositoryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                return Err(RepositoryError::Storage("disk full".into()));
            }

            let mut records = self.records.lock().unwrap();
            let existing: Vec<String> = records
                .iter()
                .filter(|r| &r.server_id == server_id)
                .map(|r| r.tool_name.clone())
                .collect();
            let plan = plan_reconcile(existing.iter().map(String::as_str), discovered);
            records.retain(|r| &r.server_id != server_id || !plan.to_remove.contains(&r.tool_name));
            for tool in &plan.to_add {
                records.push(ToolRecord {
                    id: 0,
                    server_id: server_id.clone(),
                    tool_name: tool.name.clone(),
                    full_tool_name: full_tool_name(server_id, &tool.name),
                    description: tool.description.clone(),
                    schema: tool.schema.clone(),
                    is_enabled: true,
                    created_at: Utc::now(),
                });
            }
            Ok(ReconcileOutcome {
                added: plan.to_add.len(),
                removed: plan.to_remove.len(),
            })
        }

        async fn refresh_metadata(
            &self,
            server_id: &ServerId,
            discovered: &[DiscoveredTool],
        ) -> Result<usize, RepositoryError> {
            let mut records = self.records.lock().unwrap();
            let existing: Vec<ToolRecord> = records
                .iter()
                .filter(|r| &r.server_id == server_id)
                .cloned()
                .collect();
            let updates = plan_refresh(&existing, discovered);
            for update in &updates {
                if let Some(r) = records
                    .iter_mut()
                    .find(|r| &r.server_id == server_id && r.tool_name == update.tool_name)
                {
                    r.description.clone_from(&update.description);
                    r.schema.clone_from(&update.schema);
                }
            }
            Ok(updates.len())
        }

        async fn set_enabled(
            &self,
            server_id: &ServerId,
            tool_name: &str,
            enabled: bool,
        ) -> Result<ToolRecord, RepositoryError> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| &r.server_id == server_id && r.tool_name == tool_name)
                .ok_or_else(|| RepositoryError::NotFound(tool_name.to_string()))?;
            record.is_enabled = enabled;
            Ok(record.clone())
        }

        async fn get_by_full_name(
            &self,
            full_tool_name: &str,
        ) -> Result<ToolRecord, RepositoryError> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.full_tool_name == full_tool_name)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(full_tool_name.to_string()))
        }
    }

    fn id(s: &str) -> ServerId {
        ServerId::new(s)
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let repo = Arc::new(MemoryTools::default());
        let sync = ToolSyncService::new(repo.clone());

        let first = sync
            .reconcile(&id("aaaa0001"), vec![DiscoveredTool::new("a")])
            .await
            .unwrap();
        assert_eq!(first, ReconcileOutcome { added: 1, removed: 0 });

        let second = sync
            .reconcile(&id("aaaa0001"), vec![DiscoveredTool::new("a")])
            .await
            .unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn failed_discovery_keeps_previous_tools() {
        let repo = Arc::new(MemoryTools::default());
        let sync = ToolSyncService::new(repo.clone());
        let server = id("aaaa0001");
        sync.reconcile(&server, vec![DiscoveredTool::new("a")])
            .await
            .unwrap();

        let result = sync
            .apply_discovery(&server, Err(DiscoveryError::Protocol("eof".into())))
            .await;
        assert!(matches!(result, Err(ToolSyncError::Discovery(_))));
        assert_eq!(repo.list_for_server(&server).await.unwrap().len(), 1);

        let emptied = sync.apply_discovery(&server, Ok(Vec::new())).await.unwrap();
        assert_eq!(emptied.removed, 1);
        assert!(repo.list_for_server(&server).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_tools_are_rejected_before_touching_storage() {
        let repo = Arc::new(MemoryTools::default());
        let sync = ToolSyncService::new(repo.clone());
        let result = sync
            .reconcile(&id("aaaa0001"), vec![DiscoveredTool::new("")])
            .await;
        assert!(matches!(result, Err(ToolSyncError::InvalidTool(_))));
        assert_eq!(repo.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repository_errors_propagate() {
        let repo = Arc::new(MemoryTools::default());
        *repo.fail_next.lock().unwrap() = true;
        let sync = ToolSyncService::new(repo.clone());
        let result = sync
            .reconcile(&id("aaaa0001"), vec![DiscoveredTool::new("a")])
            .await;
        assert!(matches!(result, Err(ToolSyncError::Repository(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_server_reconciles_are_serialized() {
        let repo = Arc::new(MemoryTools::default());
        let sync = Arc::new(ToolSyncService::new(repo.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let sync = Arc::clone(&sync);
                tokio::spawn(async move {
                    sync.reconcile(&id("aaaa0001"), vec![DiscoveredTool::new(format!("t{i}"))])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repo.peak.load(Ordering::SeqCst), 1);
        assert_eq!(repo.list_for_server(&id("aaaa0001")).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_servers_run_concurrently() {
        let repo = Arc::new(MemoryTools::default());
        let sync = Arc::new(ToolSyncService::new(repo.clone()));
        let barrier = Arc::new(tokio::sync::Barrier::new(4));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let sync = Arc::clone(&sync);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    sync.reconcile(&id(&format!("bbbb000{i}")), vec![DiscoveredTool::new("x")])
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(repo.list_enabled().await.unwrap().len(), 4);
        assert!(repo.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn forget_releases_the_server_lock() {
        let repo = Arc::new(MemoryTools::default());
        let sync = ToolSyncService::new(repo);
        sync.reconcile(&id("aaaa0001"), vec![DiscoveredTool::new("a")])
            .await
            .unwrap();
        sync.reconcile(&id("aaaa0002"), vec![DiscoveredTool::new("b")])
            .await
            .unwrap();
        assert_eq!(sync.locks.lock().unwrap().len(), 2);

        sync.forget(&id("aaaa0001"));
        let locks = sync.locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&id("aaaa0002")));
    }

    #[tokio::test]
    async fn refresh_keeps_enabled_flag() {
        let repo = Arc::new(MemoryTools::default());
        let sync = ToolSyncService::new(repo.clone());
        let server = id("aaaa0001");
        sync.reconcile(&server, vec![DiscoveredTool::new("a")])
            .await
            .unwrap();
        repo.set_enabled(&server, "a", false).await.unwrap();

        let updated = sync
            .refresh_metadata(&server, vec![DiscoveredTool::new("a").with_description("new")])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let tools = repo.list_for_server(&server).await.unwrap();
        assert_eq!(tools[0].description, "new");
        assert!(!tools[0].is_enabled);
        assert_eq!(tools[0].full_tool_name, "aaaa0001_a");
    }
}
