use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use escrow_bitcoin::BitcoinRpcClient;
use escrow_core::{ActionOutcome, EscrowActionEngine, EscrowEventRouter};
use escrow_messaging::{InboxPoller, SmsgTransport};
use escrow_storage::{OrderItemStore, SqliteStore};
use escrow_types::{EscrowError, EscrowRequest, OrderItem, RawTxArtifact};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;

/// Wires storage, wallet RPC and secure messaging into one engine.
pub struct EscrowApp {
    config: AppConfig,
    store: Arc<SqliteStore>,
    transport: Arc<SmsgTransport>,
    engine: Arc<EscrowActionEngine>,
}

impl EscrowApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        if let Some(parent) = Path::new(&config.node.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory {}", parent.display())
                })?;
            }
        }

        info!("Opening escrow store at {}", config.node.db_path);
        let store = Arc::new(SqliteStore::open(&config.node.db_path)?);

        info!("Connecting wallet RPC at {}", config.rpc.url);
        let rpc = Arc::new(BitcoinRpcClient::new(config.rpc.to_rpc_config())?);
        let transport = Arc::new(SmsgTransport::new(rpc.clone()));

        let engine = EscrowActionEngine::new(
            rpc,
            transport.clone(),
            store.clone(),
            config.escrow.clone(),
        )?
        .with_encrypted_messages(config.messaging.encrypted);

        Ok(Self {
            config,
            store,
            transport,
            engine: Arc::new(engine),
        })
    }

    /// Poll the inbox until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let interval = Duration::from_secs(self.config.messaging.poll_interval_secs);
        let poller = Arc::new(InboxPoller::new(
            self.transport.clone(),
            Arc::new(EscrowEventRouter::new(self.engine.clone())),
            interval,
        ));

        let cancel = CancellationToken::new();
        let handle = poller.spawn(cancel.clone());

        info!("escrowd {} running", self.config.node.identity);
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;

        info!("Shutting down");
        cancel.cancel();
        handle.await?;

        Ok(())
    }

    pub async fn execute(&self, request: &EscrowRequest) -> Result<ActionOutcome> {
        Ok(self.engine.execute(request).await?)
    }

    pub async fn dry_run(&self, request: &EscrowRequest) -> Result<RawTxArtifact> {
        Ok(self.engine.create_raw_tx(request, true).await?)
    }

    pub async fn order_item(&self, order_item_id: i64) -> Result<OrderItem> {
        let item = self
            .store
            .get(order_item_id)
            .await?
            .ok_or_else(|| EscrowError::OrderItemNotFound(order_item_id.to_string()))?;
        Ok(item)
    }
}
