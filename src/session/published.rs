use anyhow::Result;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, SystemTime};

use crate::detect::DetectionSummary;
use crate::encode::FrameEncoder;
use crate::frame::Frame;

/// One published (annotated frame, summary) pair. Immutable once published.
pub struct PublishedFrame {
    pub frame: Frame,
    pub summary: DetectionSummary,
    pub generation: u64,
    pub session_id: u64,
    pub published_at: SystemTime,
    encoded: OnceLock<Arc<Vec<u8>>>,
}

impl PublishedFrame {
    /// Encoded bytes, computed by the first viewer that asks and shared after that.
    /// A failed encode is not cached.
    pub fn encoded(&self, encoder: &dyn FrameEncoder) -> Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self.encoded.get() {
            return Ok(bytes.clone());
        }
        let bytes = Arc::new(encoder.encode(&self.frame)?);
        Ok(self.encoded.get_or_init(|| bytes).clone())
    }
}

impl std::fmt::Debug for PublishedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedFrame")
            .field("frame", &self.frame)
            .field("summary", &self.summary)
            .field("generation", &self.generation)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Slot {
    latest: Option<Arc<PublishedFrame>>,
    generation: u64,
    /// Only this session may publish.
    owner: Option<u64>,
}

/// Latest-frame hand-off between the capture worker and every reader.
///
/// Readers clone the `Arc` under the lock and encode outside it. Every change
/// (publish, claim, release) bumps the generation and wakes waiting viewers.
#[derive(Default)]
pub struct SharedPublishedState {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl SharedPublishedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand publishing rights to `session_id` and drop whatever was shown before.
    pub fn claim(&self, session_id: u64) {
        let mut slot = self.lock();
        slot.owner = Some(session_id);
        slot.latest = None;
        slot.generation += 1;
        self.changed.notify_all();
    }

    /// Clear the frame if `session_id` still owns the slot.
    pub fn release(&self, session_id: u64) {
        let mut slot = self.lock();
        if slot.owner != Some(session_id) {
            return;
        }
        slot.owner = None;
        slot.latest = None;
        slot.generation += 1;
        self.changed.notify_all();
    }

    /// Publish a frame. Returns the new generation, or `None` when `session_id`
    /// no longer owns the slot.
    pub fn publish(&self, session_id: u64, frame: Frame, summary: DetectionSummary) -> Option<u64> {
        let mut slot = self.lock();
        if slot.owner != Some(session_id) {
            return None;
        }
        slot.generation += 1;
        let generation = slot.generation;
        slot.latest = Some(Arc::new(PublishedFrame {
            frame,
            summary,
            generation,
            session_id,
            published_at: SystemTime::now(),
            encoded: OnceLock::new(),
        }));
        self.changed.notify_all();
        Some(generation)
    }

    pub fn latest(&self) -> Option<Arc<PublishedFrame>> {
        self.lock().latest.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn frame_available(&self) -> bool {
        self.lock().latest.is_some()
    }

    /// Block until the generation differs from `seen` or `timeout` passes.
    /// Returns the current generation and snapshot either way.
    pub fn wait_for_change(
        &self,
        seen: u64,
        timeout: Duration,
    ) -> (u64, Option<Arc<PublishedFrame>>) {
        let guard = self.lock();
        let (slot, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |slot| slot.generation == seen)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (slot.generation, slot.latest.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::JpegFrameEncoder;
    use std::time::Instant;

    fn frame() -> Frame {
        Frame::solid(8, 8, [1, 2, 3])
    }

    #[test]
    fn only_owner_publishes() {
        let state = SharedPublishedState::new();
        assert!(state.publish(1, frame(), DetectionSummary::default()).is_none());
        state.claim(1);
        assert!(state.publish(1, frame(), DetectionSummary::default()).is_some());
        state.claim(2);
        assert!(!state.frame_available());
        assert!(state.publish(1, frame(), DetectionSummary::default()).is_none());
        assert!(!state.frame_available());
    }

    #[test]
    fn release_by_stale_session_is_ignored() {
        let state = SharedPublishedState::new();
        state.claim(2);
        state.publish(2, frame(), DetectionSummary::default());
        state.release(1);
        assert!(state.frame_available());
        state.release(2);
        assert!(!state.frame_available());
    }

    #[test]
    fn released_claim_stops_publishing() {
        let state = SharedPublishedState::new();
        let before = state.generation();
        state.claim(3);
        state.release(3);
        assert!(state.generation() > before);
        assert!(state.publish(3, frame(), DetectionSummary::default()).is_none());
        assert!(!state.frame_available());
    }

    #[test]
    fn waiter_wakes_on_publish() {
        let state = Arc::new(SharedPublishedState::new());
        state.claim(7);
        let seen = state.generation();
        let publisher = {
            let state = state.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                state.publish(7, frame(), DetectionSummary::default());
            })
        };
        let started = Instant::now();
        let (generation, latest) = state.wait_for_change(seen, Duration::from_secs(5));
        publisher.join().unwrap();
        assert!(generation > seen);
        assert!(latest.is_some());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn encoding_is_cached_per_frame() -> Result<()> {
        let state = SharedPublishedState::new();
        state.claim(1);
        state.publish(1, frame(), DetectionSummary::default());
        let latest = state.latest().expect("published");
        let encoder = JpegFrameEncoder::default();
        let a = latest.encoded(&encoder)?;
        let b = latest.encoded(&encoder)?;
        assert!(Arc::ptr_eq(&a, &b));
        Ok(())
    }
}
