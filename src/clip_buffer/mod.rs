//! Circular Buffer Engine
//!
//! ## Responsibilities
//!
//! - Absorb the continuous frame stream into a fixed-capacity ring window
//! - Decide whether a detection signal is a new event or a continuation
//! - Extend the window exactly once per distinct event (pre-roll truncation)
//! - Hand the finished window to the export worker without blocking ingestion
//!
//! ## State machine
//!
//! ```text
//! IDLE --(debounced qualifying detection, cooldown elapsed)--> ARMED
//! ARMED --(window reaches total capacity)--> flush --> IDLE
//! ```
//!
//! No other transitions exist. A detection signal arriving while armed is
//! ignored for state purposes: one event in flight until its flush.

mod ring;

pub use ring::FrameRing;

use crate::error::{Error, Result};
use crate::event_id::EventId;
use crate::frame_source::Frame;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// Ring window and trigger settings
#[derive(Debug, Clone)]
pub struct ClipBufferConfig {
    /// Nominal capture rate; capacities are derived from it
    pub fps: u32,
    /// Seconds of context retained before the trigger
    pub pre_roll_secs: u32,
    /// Total clip length in seconds (pre-roll + post-roll)
    pub total_secs: u32,
    /// How long a qualifying signal must persist before it is an event
    pub min_persist: Duration,
    /// Minimum time between the starts of two recorded events
    pub cooldown: Duration,
}

impl ClipBufferConfig {
    pub fn pre_roll_capacity(&self) -> usize {
        (self.fps * self.pre_roll_secs) as usize
    }

    pub fn total_capacity(&self) -> usize {
        (self.fps * self.total_secs) as usize
    }

    /// Invalid settings are fatal: the engine refuses to arm
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(Error::Config("fps must be positive".to_string()));
        }
        if self.pre_roll_secs == 0 {
            return Err(Error::Config("pre-roll must be positive".to_string()));
        }
        if self.total_secs < self.pre_roll_secs {
            return Err(Error::Config(format!(
                "total window ({}s) must cover the pre-roll ({}s)",
                self.total_secs, self.pre_roll_secs
            )));
        }
        if self.min_persist.is_zero() {
            return Err(Error::Config(
                "detection persistence threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A finished window handed to the export worker
pub struct FlushJob {
    pub event_id: EventId,
    pub frames: Vec<Frame>,
}

/// The most recent frame plus the context the sampler needs
pub struct FrameSample {
    /// Ingest sequence number of this frame
    pub seq: u64,
    pub frame: Frame,
    /// True while an event is in flight (the sampler skips classification)
    pub armed: bool,
}

enum DetectionState {
    Idle,
    Armed { event_id: EventId },
}

struct Inner {
    ring: FrameRing,
    state: DetectionState,
    /// Start of the current uninterrupted qualifying run (debounce)
    candidate_since: Option<Instant>,
    /// Start of the most recent recorded event (cooldown). Survives flushes
    /// and outlives the window itself.
    last_event_at: Option<Instant>,
    /// Total frames ever ingested (sampler gating)
    ingested: u64,
}

/// The engine. All shared state sits behind a single lock that is held only
/// for O(window) copy operations, never across I/O.
pub struct ClipBuffer {
    config: ClipBufferConfig,
    inner: Mutex<Inner>,
    flush_tx: mpsc::Sender<FlushJob>,
}

impl ClipBuffer {
    pub fn new(config: ClipBufferConfig, flush_tx: mpsc::Sender<FlushJob>) -> Result<Self> {
        config.validate()?;
        let ring = FrameRing::new(config.total_capacity());
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                ring,
                state: DetectionState::Idle,
                candidate_since: None,
                last_event_at: None,
                ingested: 0,
            }),
            flush_tx,
        })
    }

    pub fn config(&self) -> &ClipBufferConfig {
        &self.config
    }

    /// Append a frame to the window, evicting the oldest when full.
    ///
    /// When armed and the window has refilled to total capacity this takes
    /// the point-in-time copy, clears the window, returns to idle and hands
    /// the copy off. The handoff is a non-blocking send so ingestion never
    /// waits on disk or re-encoding.
    pub async fn ingest(&self, frame: Frame) {
        let job = {
            let mut inner = self.inner.lock().await;
            inner.ring.push(frame);
            inner.ingested += 1;

            if inner.ring.len() < self.config.total_capacity() {
                None
            } else if let DetectionState::Armed { event_id } =
                std::mem::replace(&mut inner.state, DetectionState::Idle)
            {
                let frames = inner.ring.snapshot();
                inner.ring.clear();
                Some(FlushJob { event_id, frames })
            } else {
                // Full but idle: steady-state eviction, nothing to flush
                None
            }
        };

        if let Some(job) = job {
            let event_id = job.event_id.clone();
            let frame_count = job.frames.len();
            match self.flush_tx.try_send(job) {
                Ok(()) => {
                    tracing::info!(
                        event_id = %event_id,
                        frame_count = frame_count,
                        "Window flushed to export worker"
                    );
                }
                Err(e) => {
                    // Non-fatal: the window is already cleared so ingestion
                    // is never starved, but this clip is lost.
                    tracing::error!(
                        event_id = %event_id,
                        frame_count = frame_count,
                        error = %e,
                        "Flush handoff failed, clip dropped"
                    );
                }
            }
        }
    }

    /// Advance the debounce timer with one sampled classification result.
    ///
    /// A qualifying signal must persist for the configured threshold before
    /// it arms; a non-qualifying signal resets the debounce but never
    /// cancels an event already in flight. Arming truncates the window to
    /// the pre-roll suffix and stamps the cooldown clock.
    pub async fn notify_detection(&self, qualifies: bool) {
        let mut inner = self.inner.lock().await;

        if !qualifies {
            inner.candidate_since = None;
            return;
        }

        let now = Instant::now();
        let since = *inner.candidate_since.get_or_insert(now);

        if matches!(inner.state, DetectionState::Armed { .. }) {
            return;
        }
        if now.duration_since(since) < self.config.min_persist {
            return;
        }
        if let Some(last) = inner.last_event_at {
            if now.duration_since(last) < self.config.cooldown {
                tracing::debug!(
                    elapsed_secs = now.duration_since(last).as_secs(),
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Qualifying detection within cooldown, suppressed"
                );
                return;
            }
        }

        let event_id = EventId::new();
        inner.ring.truncate_to_suffix(self.config.pre_roll_capacity());
        inner.last_event_at = Some(now);
        inner.candidate_since = None;
        tracing::info!(
            event_id = %event_id,
            pre_roll_frames = inner.ring.len(),
            "Detection persisted past threshold, recording armed"
        );
        inner.state = DetectionState::Armed { event_id };
    }

    /// Latest frame plus sampler context (sequence number, armed flag)
    pub async fn sample(&self) -> Option<FrameSample> {
        let inner = self.inner.lock().await;
        let frame = inner.ring.latest()?;
        Some(FrameSample {
            seq: inner.ingested,
            frame,
            armed: matches!(inner.state, DetectionState::Armed { .. }),
        })
    }

    pub async fn window_len(&self) -> usize {
        self.inner.lock().await.ring.len()
    }

    pub async fn is_armed(&self) -> bool {
        matches!(self.inner.lock().await.state, DetectionState::Armed { .. })
    }

    /// Id of the event in flight, if armed
    pub async fn current_event_id(&self) -> Option<EventId> {
        match &self.inner.lock().await.state {
            DetectionState::Armed { event_id } => Some(event_id.clone()),
            DetectionState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    // ~30fps with a nudge past the exact frame period so N frames always
    // cover at least N/30 seconds under paused time
    const FRAME_INTERVAL: Duration = Duration::from_nanos(33_333_334);

    fn frame(tag: u32) -> Frame {
        Frame {
            data: Bytes::copy_from_slice(&tag.to_be_bytes()),
            width: 4,
            height: 4,
        }
    }

    fn tag(frame: &Frame) -> u32 {
        u32::from_be_bytes([frame.data[0], frame.data[1], frame.data[2], frame.data[3]])
    }

    fn scenario_config() -> ClipBufferConfig {
        ClipBufferConfig {
            fps: 30,
            pre_roll_secs: 15,
            total_secs: 30,
            min_persist: Duration::from_secs(2),
            cooldown: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = scenario_config();
        assert!(config.validate().is_ok());

        config.fps = 0;
        assert!(config.validate().is_err());

        config = scenario_config();
        config.total_secs = 10; // shorter than pre-roll
        assert!(config.validate().is_err());

        config = scenario_config();
        config.min_persist = Duration::ZERO;
        assert!(config.validate().is_err());

        config = scenario_config();
        config.pre_roll_secs = 0;
        assert!(config.validate().is_err());
    }

    // Scenario: detection held from frame 500 through 560 (2s at 30fps).
    // Arming lands at ~560, the window is truncated to the 450-frame
    // pre-roll, and the single flush fires once the window refills to 900.
    #[tokio::test(start_paused = true)]
    async fn test_pre_post_roll_recording_cycle() {
        let (tx, mut rx) = mpsc::channel(2);
        let buffer = ClipBuffer::new(scenario_config(), tx).unwrap();
        let total = buffer.config().total_capacity();

        let mut armed_at = None;
        for i in 0..1500u32 {
            tokio::time::advance(FRAME_INTERVAL).await;
            buffer.ingest(frame(i)).await;
            assert!(buffer.window_len().await <= total);

            buffer.notify_detection((500..=560).contains(&i)).await;

            if armed_at.is_none() && buffer.is_armed().await {
                armed_at = Some(i);
                assert!(buffer.window_len().await <= buffer.config().pre_roll_capacity());
            }
        }

        let armed_at = armed_at.expect("never armed");
        assert!(
            (559..=562).contains(&armed_at),
            "armed at frame {armed_at}, expected ~560"
        );

        let job = rx.try_recv().expect("no flush delivered");
        assert_eq!(job.frames.len(), 900);

        // The clip is the 450-frame pre-roll plus 450 post-roll frames, in
        // capture order with no gaps
        let first = tag(&job.frames[0]);
        for (offset, f) in job.frames.iter().enumerate() {
            assert_eq!(tag(f), first + offset as u32);
        }
        assert_eq!(tag(job.frames.last().unwrap()), armed_at + 450);

        // Exactly one event for one sustained detection
        assert!(rx.try_recv().is_err());
        assert!(!buffer.is_armed().await);
    }

    // Scenario: detection flickering true/false every frame never persists
    // past the threshold, so no event is recorded.
    #[tokio::test(start_paused = true)]
    async fn test_flickering_detection_never_arms() {
        let (tx, mut rx) = mpsc::channel(2);
        let buffer = ClipBuffer::new(scenario_config(), tx).unwrap();

        for i in 0..100u32 {
            tokio::time::advance(FRAME_INTERVAL).await;
            buffer.ingest(frame(i)).await;
            buffer.notify_detection(i % 2 == 0).await;
            assert!(!buffer.is_armed().await);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_persistence_stays_idle() {
        let (tx, _rx) = mpsc::channel(2);
        let buffer = ClipBuffer::new(scenario_config(), tx).unwrap();

        // 45 qualifying frames = 1.5s, below the 2s threshold
        for i in 0..45u32 {
            tokio::time::advance(FRAME_INTERVAL).await;
            buffer.ingest(frame(i)).await;
            buffer.notify_detection(true).await;
        }
        assert!(!buffer.is_armed().await);

        buffer.notify_detection(false).await;
        assert!(!buffer.is_armed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_ignores_further_signals() {
        let (tx, _rx) = mpsc::channel(2);
        let buffer = ClipBuffer::new(scenario_config(), tx).unwrap();

        for i in 0..70u32 {
            tokio::time::advance(FRAME_INTERVAL).await;
            buffer.ingest(frame(i)).await;
            buffer.notify_detection(true).await;
        }
        assert!(buffer.is_armed().await);
        let event_id = buffer.current_event_id().await.unwrap();

        // Neither a dropout nor a fresh qualifying run touches the event
        buffer.notify_detection(false).await;
        assert!(buffer.is_armed().await);
        for _ in 0..70 {
            tokio::time::advance(FRAME_INTERVAL).await;
            buffer.notify_detection(true).await;
        }
        assert_eq!(buffer.current_event_id().await, Some(event_id));
    }

    /// Advance paused time one frame period per ingest, feeding a constant
    /// detection signal (2fps configs: one frame every 500ms)
    async fn drive(buffer: &ClipBuffer, qualify: bool, frames: u32, from: u32) {
        for i in 0..frames {
            tokio::time::advance(Duration::from_millis(500)).await;
            buffer.ingest(frame(from + i)).await;
            buffer.notify_detection(qualify).await;
        }
    }

    // Scenario: a second qualifying event 30s after the first is suppressed
    // by the 120s cooldown; one at 130s is accepted.
    #[tokio::test(start_paused = true)]
    async fn test_cooldown_suppresses_close_events() {
        let config = ClipBufferConfig {
            fps: 2,
            pre_roll_secs: 1,
            total_secs: 2,
            min_persist: Duration::from_secs(1),
            cooldown: Duration::from_secs(120),
        };
        let (tx, mut rx) = mpsc::channel(2);
        let buffer = ClipBuffer::new(config, tx).unwrap();

        // First event: qualify for >= 1s, then one more frame refills the
        // window to total capacity and flushes
        drive(&buffer, true, 4, 0).await;
        assert!(buffer.is_armed().await);
        drive(&buffer, false, 1, 4).await;
        let first = rx.try_recv().expect("first flush");
        assert_eq!(buffer.window_len().await, 0);
        assert!(!buffer.is_armed().await);

        // ~30s after the first event start: suppressed
        tokio::time::advance(Duration::from_secs(26)).await;
        drive(&buffer, true, 4, 100).await;
        assert!(!buffer.is_armed().await);
        drive(&buffer, false, 1, 104).await;

        // ~130s after the first event start: accepted
        tokio::time::advance(Duration::from_secs(98)).await;
        drive(&buffer, true, 4, 200).await;
        assert!(buffer.is_armed().await);
        drive(&buffer, false, 4, 204).await;

        let second = rx.try_recv().expect("second flush");
        assert_ne!(first.event_id, second.event_id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_tracks_latest_frame_and_state() {
        let (tx, _rx) = mpsc::channel(2);
        let buffer = ClipBuffer::new(scenario_config(), tx).unwrap();

        assert!(buffer.sample().await.is_none());

        buffer.ingest(frame(7)).await;
        buffer.ingest(frame(8)).await;
        let sample = buffer.sample().await.unwrap();
        assert_eq!(sample.seq, 2);
        assert_eq!(tag(&sample.frame), 8);
        assert!(!sample.armed);
    }
}
