use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::channel::line::{LineChannel, LineEvent};
use crate::channel::Channel;
use crate::resolver::ReplyResolver;
use crate::types::OutboundMessage;

/// Counters for webhook processing.
#[derive(Debug, Default)]
pub struct WebhookStats {
    batches: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStatsSnapshot {
    pub batches: u64,
    pub events_processed: u64,
    pub events_skipped: u64,
    pub failures: u64,
}

impl WebhookStats {
    pub fn snapshot(&self) -> WebhookStatsSnapshot {
        WebhookStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            events_processed: self.processed.load(Ordering::Relaxed),
            events_skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Resolve and push every text message in a webhook batch.
///
/// Events run one at a time in array order. Non-text events are skipped and a
/// failed push is logged; neither stops the rest of the batch.
pub async fn process_batch(
    events: Vec<LineEvent>,
    resolver: &ReplyResolver,
    channel: &dyn Channel,
    stats: &WebhookStats,
) {
    stats.batches.fetch_add(1, Ordering::Relaxed);
    debug!("Processing webhook batch of {} events", events.len());

    for event in &events {
        let Some(inbound) = LineChannel::text_message(event) else {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let reply = resolver.resolve(&inbound.text, &inbound.user_id).await;
        stats.processed.fetch_add(1, Ordering::Relaxed);

        let outbound = OutboundMessage::new(inbound.user_id, reply);
        if let Err(e) = channel.send(&outbound).await {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            error!(
                "Failed to push {} reply to '{}': {}",
                channel.name(),
                outbound.user_id,
                e
            );
        }
    }
}

enum Job {
    Batch(Vec<LineEvent>),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
struct Worker {
    resolver: ReplyResolver,
    channel: Arc<dyn Channel>,
    stats: Arc<WebhookStats>,
}

impl Worker {
    async fn run_batch(&self, events: Vec<LineEvent>) {
        process_batch(events, &self.resolver, self.channel.as_ref(), &self.stats).await;
    }

    async fn run(self, mut rx: mpsc::Receiver<Job>) {
        while let Some(job) = rx.recv().await {
            match job {
                Job::Batch(events) => self.run_batch(events).await,
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!("Webhook worker stopped");
    }
}

/// Runs webhook batches after the HTTP acknowledgment has been sent.
///
/// Batches queue for a single background worker. When the queue is full or the
/// worker is gone, the batch runs on its own task instead.
pub struct BatchScheduler {
    tx: mpsc::Sender<Job>,
    worker: Worker,
}

impl BatchScheduler {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start(resolver: ReplyResolver, channel: Arc<dyn Channel>, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let worker = Worker {
            resolver,
            channel,
            stats: Arc::new(WebhookStats::default()),
        };
        tokio::spawn(worker.clone().run(rx));
        Self { tx, worker }
    }

    /// Hand a batch to the worker without waiting for it.
    pub fn submit(&self, events: Vec<LineEvent>) {
        if events.is_empty() {
            return;
        }
        match self.tx.try_send(Job::Batch(events)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job))
            | Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("Webhook queue unavailable, processing batch on a new task");
                if let Job::Batch(events) = job {
                    let worker = self.worker.clone();
                    tokio::spawn(async move { worker.run_batch(events).await });
                }
            }
        }
    }

    /// Wait until every batch queued before this call has been processed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn stats(&self) -> WebhookStatsSnapshot {
        self.worker.stats.snapshot()
    }
}
