use std::sync::Arc;

use fidx_index::IndexManager;
use fidx_store::{DirKvStore, InMemoryKvStore, KvStore};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Open the store named by `config`: directory-backed when `data_dir` is
/// set, in-memory otherwise.
pub async fn open_store(config: &ServerConfig) -> ServerResult<Arc<dyn KvStore>> {
    match &config.data_dir {
        Some(dir) => Ok(Arc::new(DirKvStore::open(dir).await?)),
        None => {
            tracing::warn!("no data_dir configured, records are kept in memory");
            Ok(Arc::new(InMemoryKvStore::new()))
        }
    }
}

/// fidx listing server.
pub struct FidxServer {
    config: Arc<ServerConfig>,
    manager: IndexManager,
}

impl FidxServer {
    pub fn new(config: ServerConfig, store: Arc<dyn KvStore>) -> Self {
        let manager = IndexManager::new(store, config.index.clone());
        Self {
            config: Arc::new(config),
            manager,
        }
    }

    /// Open the configured store and build a server over it.
    pub async fn open(config: ServerConfig) -> ServerResult<Self> {
        let store = open_store(&config).await?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &IndexManager {
        &self.manager
    }

    /// Build the router and start its maintenance worker. Must be called
    /// from within a tokio runtime.
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            config: self.config.clone(),
            manager: self.manager.clone(),
            queue: self.manager.spawn_queue(),
        };
        build_router(Arc::new(state))
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "fidx server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
