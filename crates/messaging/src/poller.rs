//! Inbox polling loop.
//!
//! Fetches unread messages on a fixed interval and hands each one to an
//! [`InboundHandler`]. A message is marked processed only when the handler
//! reports it handled; failures are logged and left for redelivery, and never
//! stop the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use escrow_types::Result;

use crate::transport::{InboundMessage, MessageInbox};

/// Outcome of offering a message to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The message was consumed and can be acknowledged.
    Handled,
    /// Not addressed to this handler; left unread for other consumers.
    Unhandled,
}

#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> Result<Dispatch>;
}

/// Per-tick counters, mostly useful in tests and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub handled: usize,
    pub unhandled: usize,
    pub failed: usize,
}

pub struct InboxPoller {
    inbox: Arc<dyn MessageInbox>,
    handler: Arc<dyn InboundHandler>,
    interval: Duration,
}

impl InboxPoller {
    pub fn new(
        inbox: Arc<dyn MessageInbox>,
        handler: Arc<dyn InboundHandler>,
        interval: Duration,
    ) -> Self {
        Self {
            inbox,
            handler,
            interval,
        }
    }

    /// Process one batch of unread messages.
    pub async fn poll_once(&self) -> Result<PollStats> {
        let messages = self.inbox.fetch_unread().await?;
        let mut stats = PollStats::default();

        for message in &messages {
            match self.handler.handle(message).await {
                Ok(Dispatch::Handled) => {
                    stats.handled += 1;
                    if let Err(e) = self.inbox.mark_processed(&message.msgid).await {
                        // Handlers are idempotent, so the redelivery is harmless.
                        warn!(msgid = %message.msgid, "Failed to mark message processed: {}", e);
                    }
                }
                Ok(Dispatch::Unhandled) => {
                    stats.unhandled += 1;
                    debug!(msgid = %message.msgid, "Skipping non-escrow message");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        msgid = %message.msgid,
                        from = %message.from,
                        "Failed to process inbound message: {}", e
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Poll until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = time::interval(self.interval);

        info!("Starting inbox poller (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Inbox poller stopped");
                    break;
                }
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(stats) if stats != PollStats::default() => {
                            info!(
                                handled = stats.handled,
                                unhandled = stats.unhandled,
                                failed = stats.failed,
                                "Inbox poll complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Keep polling; the inbox may come back.
                            error!("Inbox poll failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }
}
