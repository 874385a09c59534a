use std::sync::Arc;

use vdb_evm::Backend;
use vdb_state::{Error, Result};

use crate::{config::ServerConfig, proxy::ProxyClient};

/// Everything a request handler needs, shared across request tasks. Cloning
/// is cheap; the heavy members are pooled or reference counted.
#[derive(Clone)]
pub struct RpcResources {
    pub backend: Backend,
    pub proxy: Option<ProxyClient>,
    pub config: Arc<ServerConfig>,
}

impl RpcResources {
    pub fn new(backend: Backend, proxy: Option<ProxyClient>, config: ServerConfig) -> Self {
        Self {
            backend,
            proxy,
            config: Arc::new(config),
        }
    }

    /// Runs blocking index/EVM work off the async request task. Every DB
    /// read is a suspension point for the calling task.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Backend) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || f(backend))
            .await
            .map_err(|e| Error::internal(format!("worker task failed: {e}")))?
    }

    /// The proxy client, required: absence is a `ProxyUnavailable`, not a
    /// silent local evaluation.
    pub fn require_proxy(&self) -> Result<&ProxyClient> {
        self.proxy
            .as_ref()
            .ok_or_else(|| Error::ProxyUnavailable("no upstream configured".to_string()))
    }
}
