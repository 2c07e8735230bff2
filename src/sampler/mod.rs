//! Sampler
//!
//! ## Responsibilities
//!
//! - Run classification on every Nth ingested frame, not every frame
//! - Feed classification results into the buffer engine's debounce
//! - Stop with a bounded join: after `stop()` returns the classifier is
//!   never invoked again
//!
//! The loop is gated on the engine's ingest sequence counter, so a stalled
//! frame source pauses sampling instead of re-classifying a stale frame.
//! While an event is in flight classification is skipped entirely; the
//! engine ignores detection signals when armed anyway.

use crate::clip_buffer::ClipBuffer;
use crate::detector::{self, Classifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Idle poll period while waiting for enough new frames
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bounded join timeout for `stop()`
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long ingestion may stall before the sampler reports it. While armed
/// a stalled source means the post-roll never completes, so this is the
/// surfaced form of that condition.
const STALL_WARN_AFTER: Duration = Duration::from_secs(10);

/// Handle to a running sampler loop
pub struct SamplerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Signal the loop and join it with a bounded timeout.
    ///
    /// The shutdown flag is checked before every classifier call, so once
    /// this returns no further call can start. If an in-flight call blocks
    /// past the timeout the task is abandoned with a warning rather than
    /// killed; no forced preemption is assumed.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(STOP_TIMEOUT, self.task).await {
            Ok(Ok(())) => {
                tracing::info!("Sampler stopped");
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Sampler task panicked");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = STOP_TIMEOUT.as_secs(),
                    "Sampler still inside a classifier call, abandoning it"
                );
            }
        }
    }
}

/// Spawn the sampling loop.
///
/// `detect_every_n` is the subsampling factor: classification runs once per
/// N ingested frames.
pub fn start<C: Classifier>(
    buffer: Arc<ClipBuffer>,
    classifier: Arc<C>,
    detect_every_n: u64,
) -> SamplerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut last_seq: u64 = 0;
        let mut last_progress = tokio::time::Instant::now();
        tracing::info!(detect_every_n = detect_every_n, "Sampler started");

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            let sample = buffer.sample().await;
            let sample = match sample {
                Some(s) if s.seq >= last_seq + detect_every_n => s,
                _ => {
                    if last_progress.elapsed() >= STALL_WARN_AFTER {
                        let armed = buffer.is_armed().await;
                        tracing::warn!(
                            stalled_secs = last_progress.elapsed().as_secs(),
                            armed = armed,
                            "Frame ingestion stalled"
                        );
                        last_progress = tokio::time::Instant::now();
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            last_seq = sample.seq;
            last_progress = tokio::time::Instant::now();

            if sample.armed {
                // One event in flight; nothing a new classification could
                // change until the flush
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            match classifier.classify(&sample.frame).await {
                Ok(labels) => {
                    let qualifies = detector::qualifies(&labels);
                    tracing::trace!(
                        seq = sample.seq,
                        labels = ?labels,
                        qualifies = qualifies,
                        "Frame classified"
                    );
                    buffer.notify_detection(qualifies).await;
                }
                Err(e) => {
                    // A failed classification is a missed sample, not a
                    // pipeline failure; the debounce simply does not advance
                    tracing::warn!(seq = sample.seq, error = %e, "Classification failed");
                }
            }
        }

        tracing::debug!("Sampler loop exited");
    });

    SamplerHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip_buffer::ClipBufferConfig;
    use crate::error::Result;
    use crate::frame_source::Frame;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct StubClassifier {
        calls: AtomicUsize,
        qualify: AtomicBool,
    }

    impl StubClassifier {
        fn new(qualify: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                qualify: AtomicBool::new(qualify),
            }
        }
    }

    impl Classifier for StubClassifier {
        async fn classify(&self, _frame: &Frame) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.qualify.load(Ordering::SeqCst) {
                Ok(vec!["Unknown".to_string()])
            } else {
                Ok(vec!["alice".to_string()])
            }
        }
    }

    fn frame(tag: u8) -> Frame {
        Frame {
            data: Bytes::from(vec![tag]),
            width: 1,
            height: 1,
        }
    }

    fn buffer() -> (Arc<ClipBuffer>, mpsc::Receiver<crate::clip_buffer::FlushJob>) {
        let config = ClipBufferConfig {
            fps: 30,
            pre_roll_secs: 1,
            total_secs: 4,
            min_persist: Duration::from_millis(100),
            cooldown: Duration::from_secs(60),
        };
        let (tx, rx) = mpsc::channel(2);
        (Arc::new(ClipBuffer::new(config, tx).unwrap()), rx)
    }

    #[tokio::test]
    async fn test_classifies_every_nth_frame() {
        let (buffer, _rx) = buffer();
        let classifier = Arc::new(StubClassifier::new(false));
        let handle = start(buffer.clone(), classifier.clone(), 10);

        for i in 0..30u8 {
            buffer.ingest(frame(i)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        // 30 frames at N=10: at most 3 samples, and at least one once the
        // counter crosses the first gate
        let calls = classifier.calls.load(Ordering::SeqCst);
        assert!((1..=3).contains(&calls), "got {calls} classifications");
    }

    #[tokio::test]
    async fn test_stop_prevents_further_classification() {
        let (buffer, _rx) = buffer();
        let classifier = Arc::new(StubClassifier::new(false));
        let handle = start(buffer.clone(), classifier.clone(), 1);

        buffer.ingest(frame(0)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let calls_at_stop = classifier.calls.load(Ordering::SeqCst);
        for i in 1..20u8 {
            buffer.ingest(frame(i)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), calls_at_stop);
    }

    #[tokio::test]
    async fn test_qualifying_samples_arm_the_buffer() {
        let (buffer, _rx) = buffer();
        let classifier = Arc::new(StubClassifier::new(true));
        let handle = start(buffer.clone(), classifier.clone(), 1);

        // Feed frames until the persistence threshold (100ms) has been
        // covered by qualifying samples
        for i in 0..60u8 {
            buffer.ingest(frame(i)).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(buffer.is_armed().await);
        handle.stop().await;
    }
}
