//! Tool Sync Engine.
//!
//! Brings persisted tool records in line with a freshly discovered tool list.
//! The set algebra in [`plan`] is pure; storage adapters apply a plan inside
//! one transaction and [`ToolSyncService`] serializes calls per server.

pub mod plan;
mod service;

pub use plan::{
    MetadataUpdate, ReconcilePlan, dedup_discovered, plan_reconcile, plan_refresh,
    validate_discovered,
};
pub use service::{ToolSyncError, ToolSyncService};
