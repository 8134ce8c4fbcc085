//! Process-wide price preload queue.
//!
//! UI components announce mints the user is likely to ask about next (hover,
//! list scroll); the queue deduplicates them, debounces rapid bursts, and
//! drains in fixed-size batches against the market-data service so the
//! shared cache is warm before the real request arrives. Fire-and-forget:
//! nothing is returned to the requester.

use crate::pricing::service::MarketDataService;
use crate::types::Mint;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Downstream that actually warms the cache for a batch of mints.
#[async_trait]
pub trait PreloadSink: Send + Sync + 'static {
    /// Warm the cache for `mints`. Results are discarded; errors are
    /// reported so the queue can log them, nothing more.
    async fn warm(&self, mints: &[Mint]) -> Result<()>;
}

#[async_trait]
impl PreloadSink for MarketDataService {
    async fn warm(&self, mints: &[Mint]) -> Result<()> {
        let _ = self.get_batch(mints).await;
        Ok(())
    }
}

/// Timing and sizing knobs for the preload queue.
#[derive(Debug, Clone)]
pub struct PreloadConfig {
    /// Quiet period before a burst of requests starts draining
    pub debounce_ms: u64,
    /// Mints per batch call
    pub batch_size: usize,
    /// Pause between consecutive batch calls
    pub inter_batch_delay_ms: u64,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            batch_size: 10,
            inter_batch_delay_ms: 100,
        }
    }
}

/// Snapshot of queue state for dashboards and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadStatus {
    /// Mints waiting for a batch slot
    pub queue_length: usize,
    /// Mints inside the batch currently being warmed
    pub preloading_count: usize,
    /// Whether a drain loop is active
    pub is_processing: bool,
}

struct QueueState {
    /// Mints waiting to be drained, in arrival order
    pending: VecDeque<Mint>,
    /// Everything queued or in flight; membership blocks re-enqueueing
    tracked: HashSet<Mint>,
    /// Size of the batch currently being warmed
    preloading: usize,
    /// At most one drain loop runs at a time
    processing: bool,
    debounce: Option<JoinHandle<()>>,
    drain: Option<JoinHandle<()>>,
}

struct PreloadInner {
    sink: Arc<dyn PreloadSink>,
    config: PreloadConfig,
    state: Mutex<QueueState>,
}

/// Debounced, deduplicated cache-warming queue. Cheap to clone; all clones
/// share one queue.
#[derive(Clone)]
pub struct PreloadQueue {
    inner: Arc<PreloadInner>,
}

impl PreloadQueue {
    /// Create a queue draining into `sink`.
    pub fn new(sink: Arc<dyn PreloadSink>, config: PreloadConfig) -> Self {
        Self {
            inner: Arc::new(PreloadInner {
                sink,
                config,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    tracked: HashSet::new(),
                    preloading: 0,
                    processing: false,
                    debounce: None,
                    drain: None,
                }),
            }),
        }
    }

    /// Queue mints for cache warming and return immediately. Mints already
    /// queued or in flight are dropped silently; every call re-arms the
    /// debounce timer.
    #[instrument(skip(self, mints), fields(count = mints.len()))]
    pub async fn request_preload(&self, mints: &[Mint]) {
        let mut state = self.inner.state.lock().await;

        let mut added = 0usize;
        for mint in mints {
            if state.tracked.insert(mint.clone()) {
                state.pending.push_back(mint.clone());
                added += 1;
            }
        }
        debug!("Queued {} new mints ({} duplicates dropped)", added, mints.len() - added);

        if state.pending.is_empty() {
            return;
        }

        // Re-arm the debounce timer; the previous timer, if still sleeping,
        // is cancelled. The drain loop itself is a separate task and is
        // never aborted here.
        if let Some(timer) = state.debounce.take() {
            timer.abort();
        }
        let inner = self.inner.clone();
        let debounce = Duration::from_millis(self.inner.config.debounce_ms);
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            PreloadInner::try_start_drain(&inner).await;
        }));
    }

    /// Current queue state.
    pub async fn status(&self) -> PreloadStatus {
        let state = self.inner.state.lock().await;
        PreloadStatus {
            queue_length: state.pending.len(),
            preloading_count: state.preloading,
            is_processing: state.processing,
        }
    }

    /// Cancel timers and the drain loop, dropping queued work.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(timer) = state.debounce.take() {
            timer.abort();
        }
        if let Some(drain) = state.drain.take() {
            drain.abort();
        }
        state.pending.clear();
        state.tracked.clear();
        state.preloading = 0;
        state.processing = false;
    }
}

impl PreloadInner {
    /// Start the drain loop unless one is already running.
    async fn try_start_drain(inner: &Arc<Self>) {
        let mut state = inner.state.lock().await;
        if state.processing || state.pending.is_empty() {
            return;
        }
        state.processing = true;

        let looped = inner.clone();
        state.drain = Some(tokio::spawn(async move {
            Self::drain(looped).await;
        }));
    }

    /// Take up to `batch_size` mints per cycle, warm them, and release them
    /// from tracking whether or not the sink succeeded: a failure must not
    /// leave mints permanently marked as queued, or later preload requests
    /// for them would be dropped forever.
    async fn drain(inner: Arc<Self>) {
        loop {
            let batch: Vec<Mint> = {
                let mut state = inner.state.lock().await;
                let take = state.pending.len().min(inner.config.batch_size);
                let batch: Vec<Mint> = state.pending.drain(..take).collect();
                if batch.is_empty() {
                    state.processing = false;
                    return;
                }
                state.preloading = batch.len();
                batch
            };

            debug!("Preloading batch of {} mints", batch.len());
            if let Err(e) = inner.sink.warm(&batch).await {
                warn!("Preload batch failed: {:#}", e);
            }

            {
                let mut state = inner.state.lock().await;
                for mint in &batch {
                    state.tracked.remove(mint);
                }
                state.preloading = 0;
                if state.pending.is_empty() {
                    state.processing = false;
                    return;
                }
            }

            tokio::time::sleep(Duration::from_millis(inner.config.inter_batch_delay_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Sink recording every batch it receives.
    struct RecordingSink {
        batches: StdMutex<Vec<Vec<Mint>>>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                batches: StdMutex::new(Vec::new()),
                fail,
                calls: AtomicUsize::new(0),
            })
        }

        fn batches(&self) -> Vec<Vec<Mint>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PreloadSink for RecordingSink {
        async fn warm(&self, mints: &[Mint]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(mints.to_vec());
            if self.fail {
                Err(anyhow!("warm failed"))
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> PreloadConfig {
        PreloadConfig {
            debounce_ms: 20,
            batch_size: 10,
            inter_batch_delay_ms: 10,
        }
    }

    fn mints(names: &[&str]) -> Vec<Mint> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_preload_drains_after_debounce() {
        let sink = RecordingSink::new(false);
        let queue = PreloadQueue::new(sink.clone(), fast_config());

        queue.request_preload(&mints(&["A", "B"])).await;
        assert_eq!(queue.status().await.queue_length, 2);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.batches(), vec![mints(&["A", "B"])]);
        let status = queue.status().await;
        assert_eq!(status.queue_length, 0);
        assert!(!status.is_processing);
    }

    #[tokio::test]
    async fn test_duplicate_mints_enqueue_once() {
        let sink = RecordingSink::new(false);
        let queue = PreloadQueue::new(sink.clone(), fast_config());

        queue.request_preload(&mints(&["A", "B", "A"])).await;
        queue.request_preload(&mints(&["B", "C"])).await;
        assert_eq!(queue.status().await.queue_length, 3);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.batches(), vec![mints(&["A", "B", "C"])]);
    }

    #[tokio::test]
    async fn test_batches_are_capped_at_batch_size() {
        let sink = RecordingSink::new(false);
        let config = PreloadConfig {
            batch_size: 3,
            ..fast_config()
        };
        let queue = PreloadQueue::new(sink.clone(), config);

        queue
            .request_preload(&mints(&["A", "B", "C", "D", "E"]))
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], mints(&["A", "B", "C"]));
        assert_eq!(batches[1], mints(&["D", "E"]));
    }

    #[tokio::test]
    async fn test_failed_batch_releases_tracking() {
        let sink = RecordingSink::new(true);
        let queue = PreloadQueue::new(sink.clone(), fast_config());

        queue.request_preload(&mints(&["A"])).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        // The failure must not leave "A" stuck as already-queued.
        queue.request_preload(&mints(&["A"])).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_requests_restart_debounce() {
        let sink = RecordingSink::new(false);
        let queue = PreloadQueue::new(sink.clone(), fast_config());

        queue.request_preload(&mints(&["A"])).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Second request inside the quiet period coalesces into one batch.
        queue.request_preload(&mints(&["B"])).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.batches(), vec![mints(&["A", "B"])]);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_work() {
        let sink = RecordingSink::new(false);
        let queue = PreloadQueue::new(sink.clone(), fast_config());

        queue.request_preload(&mints(&["A"])).await;
        queue.shutdown().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(sink.batches().is_empty());
        assert_eq!(queue.status().await, PreloadStatus::default());
    }
}
