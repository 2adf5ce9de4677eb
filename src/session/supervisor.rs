use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{CaptureContext, CaptureSession, SessionState, SessionStats};
use crate::error::PipelineError;

struct Inner {
    state: SessionState,
    session: Option<CaptureSession>,
    /// Snapshot of a session being stopped, for readers while the stop is in flight.
    stopping: Option<SessionStats>,
    next_id: u64,
}

impl Inner {
    /// Forget a session whose worker has exited: on its own while running
    /// (end of stream, read error), or late after a timed-out stop.
    fn reap(&mut self, ctx: &CaptureContext) {
        let finished = match self.session.as_mut() {
            Some(session) => session.is_finished(),
            None => false,
        };
        if !finished {
            return;
        }
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.wait(Duration::ZERO) {
                log::warn!("session {} could not be joined: {}", session.id(), err);
            }
            if self.state == SessionState::Stopping {
                ctx.published.release(session.id());
                log::info!("session {} stopped late", session.id());
            } else {
                log::info!("session {} ended on its own", session.id());
            }
        }
        self.state = SessionState::Idle;
    }
}

/// Owns at most one running capture session.
///
/// `start` and `stop` are serialized on a transition lock and wait for old
/// workers without holding the state lock, so `state`, `active_source` and
/// `stats` stay answerable while a stop is in flight.
pub struct SessionSupervisor {
    ctx: CaptureContext,
    join_timeout: Duration,
    transition: Mutex<()>,
    inner: Mutex<Inner>,
}

impl SessionSupervisor {
    pub fn new(ctx: CaptureContext, join_timeout: Duration) -> Self {
        Self {
            ctx,
            join_timeout,
            transition: Mutex::new(()),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
                stopping: None,
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop the tracked session, waiting at most the join timeout. On timeout
    /// the session stays tracked in `Stopping`. Callers hold the transition lock.
    fn shutdown(&self) -> Result<(), PipelineError> {
        let mut session = {
            let mut inner = self.lock();
            inner.reap(&self.ctx);
            let Some(session) = inner.session.take() else {
                inner.state = SessionState::Idle;
                return Ok(());
            };
            session.request_stop();
            inner.state = SessionState::Stopping;
            inner.stopping = Some(session.stats());
            session
        };

        let waited = session.wait(self.join_timeout);

        let mut inner = self.lock();
        inner.stopping = None;
        match waited {
            Ok(()) => {
                self.ctx.published.release(session.id());
                log::info!("session {} stopped", session.id());
                inner.state = SessionState::Idle;
                Ok(())
            }
            Err(err) => {
                log::warn!("session {} did not stop in time: {}", session.id(), err);
                inner.session = Some(session);
                Err(err)
            }
        }
    }

    /// Start capturing from `source_id`, replacing any running session first.
    pub fn start(&self, source_id: &str) -> Result<u64, PipelineError> {
        let _transition = self.lock_transition();
        self.shutdown()?;

        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            id
        };
        match CaptureSession::start(id, source_id, self.ctx.clone()) {
            Ok(session) => {
                log::info!("session {} started on {}", id, source_id);
                let mut inner = self.lock();
                inner.session = Some(session);
                inner.state = SessionState::Running;
                Ok(id)
            }
            Err(err) => {
                log::warn!("session {} failed to start: {}", id, err);
                Err(err)
            }
        }
    }

    /// Stop the running session. A no-op when idle.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let _transition = self.lock_transition();
        self.shutdown()
    }

    pub fn state(&self) -> SessionState {
        let mut inner = self.lock();
        inner.reap(&self.ctx);
        inner.state
    }

    pub fn active_source(&self) -> Option<String> {
        let mut inner = self.lock();
        inner.reap(&self.ctx);
        match (&inner.session, &inner.stopping) {
            (Some(session), _) => Some(session.source_id().to_string()),
            (None, Some(stopping)) => Some(stopping.source.clone()),
            (None, None) => None,
        }
    }

    pub fn stats(&self) -> Option<SessionStats> {
        let mut inner = self.lock();
        inner.reap(&self.ctx);
        match (&inner.session, &inner.stopping) {
            (Some(session), _) => Some(session.stats()),
            (None, stopping) => stopping.clone(),
        }
    }

    /// Swap the detector model used for subsequent frames.
    pub fn change_detector(&self, model_id: &str) -> Result<(), PipelineError> {
        self.ctx.detector.change(model_id)
    }

    pub fn active_model(&self) -> String {
        self.ctx.detector.active_id()
    }

    pub fn available_models(&self) -> Vec<String> {
        self.ctx.detector.available()
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("capture worker abandoned at shutdown: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{
        ActiveDetector, ClassMap, DetectorBackend, ModelRegistry, RawDetection, ScriptedBackend,
    };
    use crate::frame::Frame;
    use crate::sensor::SensorCache;
    use crate::session::SharedPublishedState;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// Takes `delay` per frame and flags the first call.
    struct SlowBackend {
        delay: Duration,
        entered: Arc<AtomicBool>,
    }

    impl DetectorBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(Vec::new())
        }
    }

    fn supervisor_with<F>(factory: F, detect_timeout: Duration) -> SessionSupervisor
    where
        F: Fn() -> anyhow::Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        let mut registry = ModelRegistry::new();
        registry.register("test", ClassMap::fire_first(), factory);
        let ctx = CaptureContext {
            detector: Arc::new(ActiveDetector::new(registry, "test").expect("model")),
            published: Arc::new(SharedPublishedState::new()),
            sensor_cache: Arc::new(SensorCache::new()),
            frame_skip: 1,
            width: 64,
            height: 36,
            detect_timeout,
        };
        SessionSupervisor::new(ctx, Duration::from_secs(5))
    }

    fn supervisor() -> SessionSupervisor {
        supervisor_with(
            || Ok(Box::new(ScriptedBackend::new(Vec::new())) as Box<dyn DetectorBackend>),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn stop_when_idle_is_a_noop() {
        let sup = supervisor();
        sup.stop().expect("idle stop");
        sup.stop().expect("idle stop twice");
        assert_eq!(sup.state(), SessionState::Idle);
    }

    #[test]
    fn finished_session_is_reaped_to_idle() {
        let sup = supervisor();
        sup.start("stub://short?frames=2&fps=0").expect("start");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while sup.state() != SessionState::Idle && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(sup.state(), SessionState::Idle);
        assert!(sup.active_source().is_none());
    }

    #[test]
    fn failed_start_after_replace_leaves_idle() {
        let sup = supervisor();
        sup.start("stub://one?fps=50").expect("start");
        let err = sup.start("stub://unavailable").unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
        assert_eq!(sup.state(), SessionState::Idle);
    }

    #[test]
    fn readers_answer_while_a_stop_is_in_flight() {
        let entered = Arc::new(AtomicBool::new(false));
        let flag = entered.clone();
        let sup = Arc::new(supervisor_with(
            move || {
                Ok(Box::new(SlowBackend {
                    delay: Duration::from_millis(1500),
                    entered: flag.clone(),
                }) as Box<dyn DetectorBackend>)
            },
            Duration::from_secs(5),
        ));
        sup.start("stub://slow?fps=50").expect("start");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !entered.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "detector never called");
            std::thread::sleep(Duration::from_millis(5));
        }

        let stopper = {
            let sup = sup.clone();
            std::thread::spawn(move || sup.stop())
        };

        let mut saw_stopping = false;
        while !stopper.is_finished() {
            let asked = Instant::now();
            let state = sup.state();
            let source = sup.active_source();
            let stats = sup.stats();
            assert!(
                asked.elapsed() < Duration::from_millis(250),
                "readers blocked for {:?}",
                asked.elapsed()
            );
            if state == SessionState::Stopping {
                saw_stopping = true;
                assert_eq!(source.as_deref(), Some("stub://slow?fps=50"));
                assert_eq!(stats.map(|s| s.session_id), Some(1));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        stopper.join().expect("stop thread").expect("stop");
        assert!(saw_stopping);
        assert_eq!(sup.state(), SessionState::Idle);
        assert!(sup.active_source().is_none());
    }
}
