//! Synchronous facade over [`GatewayService`].
//!
//! Every call crosses into the main loop through the
//! [`EventLoopBridge`] and blocks until it completes or times out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anywhere_core::domain::{
    NewServer, ReconcileOutcome, RuntimeKind, ServerConfig, ServerId, ToolRecord, UpdateServer,
    UsageRecord,
};
use anywhere_runtime::EventLoopBridge;

use crate::error::GatewayError;
use crate::service::{GatewayService, ServerInfo, ServerStartResult, StartReport};

/// Blocking handle for callers that are not on the main loop.
#[derive(Clone)]
pub struct BlockingGateway {
    service: Arc<GatewayService>,
    bridge: Arc<EventLoopBridge>,
    timeout: Duration,
}

impl BlockingGateway {
    pub const fn new(
        service: Arc<GatewayService>,
        bridge: Arc<EventLoopBridge>,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            bridge,
            timeout,
        }
    }

    pub fn service(&self) -> &Arc<GatewayService> {
        &self.service
    }

    /// Same gateway with a different per-call timeout.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    fn call<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<GatewayService>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let future = op(Arc::clone(&self.service));
        self.bridge.run_async(future, self.timeout)?
    }

    pub fn add_server(&self, new_server: NewServer) -> Result<ServerConfig, GatewayError> {
        self.call(|svc| async move { svc.add_server(new_server).await })
    }

    pub fn find_server(&self, key: &str) -> Result<ServerConfig, GatewayError> {
        let key = key.to_string();
        self.call(|svc| async move { svc.find_server(&key).await })
    }

    pub fn list_servers(&self) -> Result<Vec<ServerConfig>, GatewayError> {
        self.call(|svc| async move { svc.list_servers().await })
    }

    pub fn update_server(
        &self,
        id: ServerId,
        edit: UpdateServer,
    ) -> Result<ServerConfig, GatewayError> {
        self.call(|svc| async move { svc.update_server(&id, edit).await })
    }

    pub fn set_active(&self, id: ServerId, active: bool) -> Result<ServerConfig, GatewayError> {
        self.call(|svc| async move { svc.set_active(&id, active).await })
    }

    pub fn remove_server(&self, id: ServerId) -> Result<(), GatewayError> {
        self.call(|svc| async move { svc.remove_server(&id).await })
    }

    pub fn start_server(&self, id: ServerId) -> Result<StartReport, GatewayError> {
        self.call(|svc| async move { svc.start_server(&id).await })
    }

    pub fn stop_server(&self, id: ServerId) -> Result<(), GatewayError> {
        self.call(|svc| async move { svc.stop_server(&id).await })
    }

    pub fn restart_server(&self, id: ServerId) -> Result<StartReport, GatewayError> {
        self.call(|svc| async move { svc.restart_server(&id).await })
    }

    pub fn start_all_active(&self) -> Result<Vec<ServerStartResult>, GatewayError> {
        self.call(|svc| async move { svc.start_all_active().await })
    }

    pub fn sync_tools(&self, id: ServerId) -> Result<ReconcileOutcome, GatewayError> {
        self.call(|svc| async move { svc.sync_tools(&id).await })
    }

    pub fn refresh_tool_schemas(&self, id: ServerId) -> Result<usize, GatewayError> {
        self.call(|svc| async move { svc.refresh_tool_schemas(&id).await })
    }

    pub fn list_tools(&self, id: Option<ServerId>) -> Result<Vec<ToolRecord>, GatewayError> {
        self.call(|svc| async move { svc.list_tools(id.as_ref()).await })
    }

    pub fn set_tool_enabled(
        &self,
        id: ServerId,
        tool_name: &str,
        enabled: bool,
    ) -> Result<ToolRecord, GatewayError> {
        let tool_name = tool_name.to_string();
        self.call(|svc| async move { svc.set_tool_enabled(&id, &tool_name, enabled).await })
    }

    pub fn server_info(&self, id: ServerId) -> Result<ServerInfo, GatewayError> {
        self.call(|svc| async move { svc.server_info(&id).await })
    }

    pub fn recent_usage(
        &self,
        server: Option<ServerId>,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, GatewayError> {
        self.call(|svc| async move { svc.recent_usage(server.as_ref(), limit).await })
    }

    /// Parsing needs no I/O and does not cross the bridge.
    pub fn preview_command(
        &self,
        command: &str,
        kind: RuntimeKind,
    ) -> Result<Vec<String>, GatewayError> {
        self.service.preview_command(command, kind)
    }
}
