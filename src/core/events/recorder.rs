use crate::core::idr::IdrClient;
use derive_builder::Builder;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Max events per drain batch before a flush is forced
const BATCH_SIZE: usize = 100;

/// One per-bidder auction outcome, the training signal pushed
/// back to the selector service
#[derive(Debug, Clone, Default, Serialize, Builder)]
#[builder(setter(into), default)]
pub struct OutcomeEvent {
    pub bidder_code: String,
    pub latency_ms: u64,
    pub had_bid: bool,
    /// Winning-side CPM of the bidder's best bid, 0 when no bid
    pub cpm: f64,
    pub floor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<String>,
    pub timed_out: bool,
    pub had_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Buffered, detached emission of outcome events.
///
/// # Behavior
/// Enqueue never blocks the auction path, a full buffer drops the
/// event and bumps the drop counter. A single drain task batches
/// events to the selector on a size or interval trigger and is the
/// only task allowed to outlive an auction. Shutdown flushes
/// whatever is queued within a bounded grace period.
pub struct EventRecorder {
    tx: mpsc::Sender<OutcomeEvent>,
    dropped: AtomicU64,
    shutdown: Arc<Notify>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl EventRecorder {
    fn new(buffer_size: usize) -> (Self, mpsc::Receiver<OutcomeEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));

        (
            EventRecorder {
                tx,
                dropped: AtomicU64::new(0),
                shutdown: Arc::new(Notify::new()),
                drain: Mutex::new(None),
            },
            rx,
        )
    }

    /// Create the recorder and spawn its detached drain task
    pub fn start(
        client: Arc<IdrClient>,
        buffer_size: usize,
        flush_interval: Duration,
    ) -> Arc<Self> {
        let (recorder, rx) = Self::new(buffer_size);
        let recorder = Arc::new(recorder);

        let shutdown = recorder.shutdown.clone();
        let handle = tokio::spawn(drain_loop(client, rx, flush_interval, shutdown));

        *recorder.drain.lock() = Some(handle);

        recorder
    }

    /// Non-blocking enqueue, drops on a full buffer
    pub fn record(&self, event: OutcomeEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Flush outstanding events, waiting at most `grace` for the
    /// drain task to finish
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.notify_one();

        let handle = self.drain.lock().take();

        if let Some(handle) = handle {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Event recorder flush exceeded grace period, abandoning");
            } else {
                info!("Event recorder drained");
            }
        }
    }
}

async fn flush(client: &IdrClient, batch: &mut Vec<OutcomeEvent>) {
    if batch.is_empty() {
        return;
    }

    match client.post_events(batch).await {
        Ok(_) => debug!("Flushed {} outcome events", batch.len()),
        Err(e) => debug!("Failed to flush {} outcome events: {}", batch.len(), e),
    }

    batch.clear();
}

async fn drain_loop(
    client: Arc<IdrClient>,
    mut rx: mpsc::Receiver<OutcomeEvent>,
    flush_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut batch: Vec<OutcomeEvent> = Vec::with_capacity(BATCH_SIZE);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(event) => {
                        batch.push(event);

                        if batch.len() >= BATCH_SIZE {
                            flush(&client, &mut batch).await;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                flush(&client, &mut batch).await;
            }
            _ = shutdown.notified() => {
                // pull whatever is still queued, then final flush
                while let Ok(event) = rx.try_recv() {
                    batch.push(event);

                    if batch.len() >= BATCH_SIZE {
                        flush(&client, &mut batch).await;
                    }
                }

                flush(&client, &mut batch).await;
                return;
            }
        }
    }

    flush(&client, &mut batch).await;
}
