//! Recognition session: one speech engine, one mode at a time.
//!
//! Wraps a [`SpeechEngine`] capability with the guarantees the rest of the
//! system relies on: passive and active listening are mutually exclusive,
//! only finalized fragments reach consumers, and an engine that stops
//! unexpectedly is restarted after a short backoff for as long as the mode
//! is still wanted.

pub mod segmenter;
pub mod wake;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{EngineEvent, EngineFault, RecognitionMode, SpeechEngine};
use crate::error::RecognitionError;

/// Buffer for session events between the driver and the consumer.
const SESSION_CHANNEL_SIZE: usize = 16;

/// Events delivered to the consumer of a running mode.
///
/// Interim fragments are dropped at the session boundary: wake matching and
/// utterance segmentation operate on finalized text only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A finalized transcript fragment.
    Final(String),
    /// The engine reported hearing nothing. The session keeps the mode
    /// alive (the engine restarts); the consumer decides what it means.
    NoSpeech,
    /// Terminal fault. The mode is torn down after this event.
    Fault(RecognitionError),
}

/// A speech-recognition session multiplexing one engine between passive
/// wake scanning and active utterance capture.
pub struct RecognitionSession {
    engine: Arc<dyn SpeechEngine>,
    busy: Arc<AtomicBool>,
    current: Mutex<Option<CancellationToken>>,
    restart_backoff: Duration,
}

impl RecognitionSession {
    /// Create a session around the given engine.
    pub fn new(engine: Arc<dyn SpeechEngine>, restart_backoff: Duration) -> Self {
        Self {
            engine,
            busy: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
            restart_backoff,
        }
    }

    /// Start passive wake-phrase scanning.
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::Busy`] if any mode is already running.
    pub fn start_passive(&self) -> Result<SessionHandle, RecognitionError> {
        self.start(RecognitionMode::Passive)
    }

    /// Start active utterance capture.
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::Busy`] if any mode is already running.
    pub fn start_active(&self) -> Result<SessionHandle, RecognitionError> {
        self.start(RecognitionMode::Active)
    }

    fn start(&self, mode: RecognitionMode) -> Result<SessionHandle, RecognitionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecognitionError::Busy);
        }

        let cancel = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(cancel.clone());
        }

        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_SIZE);
        let engine = Arc::clone(&self.engine);
        let busy = Arc::clone(&self.busy);
        let backoff = self.restart_backoff;
        let driver_cancel = cancel.clone();
        tokio::spawn(async move {
            drive(engine, mode, tx, driver_cancel, backoff).await;
            busy.store(false, Ordering::Release);
        });

        debug!(?mode, "recognition session started");
        Ok(SessionHandle {
            events: rx,
            cancel,
            engine: Arc::clone(&self.engine),
        })
    }

    /// Halt whatever mode is running. Safe to call at any time, including
    /// when nothing is running.
    ///
    /// The engine run is ended synchronously; the mode slot itself is
    /// released when the driver task exits, so a start issued immediately
    /// afterwards can still observe [`RecognitionError::Busy`] for a
    /// moment and should retry.
    pub fn stop(&self) {
        let token = self.current.lock().ok().and_then(|mut cur| cur.take());
        if let Some(token) = token {
            token.cancel();
        }
        self.engine.end();
    }

    /// Whether a mode is currently running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Handle to one running mode. Dropping the handle tears the mode down,
/// so no code path can leak a running engine.
pub struct SessionHandle {
    events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
    engine: Arc<dyn SpeechEngine>,
}

impl SessionHandle {
    /// Receive the next session event. `None` means the mode has ended.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Halt this mode. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            self.engine.end();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Engine driver: begins the engine, forwards finalized fragments, and
/// restarts the engine after `backoff` when its stream ends while the
/// mode is still desired. "Desired" is the cancellation token, not a
/// raced timer.
///
/// The driver holds the mode slot until it exits, so no second mode can
/// touch the engine while a run of this one might still be live.
async fn drive(
    engine: Arc<dyn SpeechEngine>,
    mode: RecognitionMode,
    tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    backoff: Duration,
) {
    loop {
        let mut engine_rx = match engine.begin(mode) {
            Ok(rx) => rx,
            Err(e) => {
                warn!("engine failed to begin: {e}");
                let _ = tx
                    .send(SessionEvent::Fault(RecognitionError::Engine(e.to_string())))
                    .await;
                return;
            }
        };

        // A cancel may have landed between the restart check and the
        // begin call above; end the freshly begun run rather than leak it.
        if cancel.is_cancelled() {
            engine.end();
            return;
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    engine.end();
                    return;
                }
                event = engine_rx.recv() => match event {
                    Some(EngineEvent::Fragment { text, is_final }) => {
                        if !is_final {
                            continue;
                        }
                        if tx.send(SessionEvent::Final(text)).await.is_err() {
                            // Consumer gone; tear the mode down.
                            engine.end();
                            return;
                        }
                    }
                    Some(EngineEvent::Fault(EngineFault::NoSpeech)) => {
                        if tx.send(SessionEvent::NoSpeech).await.is_err() {
                            engine.end();
                            return;
                        }
                        // Not terminal for the mode: restart and keep
                        // listening unless the consumer stops us.
                        break;
                    }
                    Some(EngineEvent::Fault(fault)) => {
                        let _ = tx.send(SessionEvent::Fault(map_fault(fault))).await;
                        engine.end();
                        return;
                    }
                    None => {
                        debug!(?mode, "engine stream ended unexpectedly, restarting");
                        break;
                    }
                }
            }
        }

        // Restart path: back off briefly, unless stop() arrived in the
        // interim.
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(backoff) => {}
        }
    }
}

fn map_fault(fault: EngineFault) -> RecognitionError {
    match fault {
        EngineFault::NoSpeech => RecognitionError::NoSpeech,
        EngineFault::Aborted => RecognitionError::Aborted,
        EngineFault::PermissionDenied => RecognitionError::PermissionDenied,
        EngineFault::Other(msg) => RecognitionError::Engine(msg),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::Result;
    use std::sync::atomic::AtomicUsize;

    /// Engine whose runs are scripted ahead of time: each `begin` pops the
    /// next script and replays it on the returned stream.
    struct ScriptedEngine {
        scripts: Mutex<Vec<Vec<EngineEvent>>>,
        begins: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(scripts: Vec<Vec<EngineEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
                begins: AtomicUsize::new(0),
            }
        }

        fn begin_count(&self) -> usize {
            self.begins.load(Ordering::SeqCst)
        }
    }

    impl SpeechEngine for ScriptedEngine {
        fn begin(&self, _mode: RecognitionMode) -> Result<mpsc::Receiver<EngineEvent>> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    Vec::new()
                } else {
                    scripts.remove(0)
                }
            };
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                for event in script {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                // Dropping tx closes the stream: an unexpected engine stop.
            });
            Ok(rx)
        }

        fn end(&self) {}
    }

    fn final_fragment(text: &str) -> EngineEvent {
        EngineEvent::Fragment {
            text: text.to_owned(),
            is_final: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn passive_and_active_are_mutually_exclusive() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![]]));
        let session = RecognitionSession::new(engine, Duration::from_millis(250));

        let _passive = session.start_passive().unwrap();
        assert!(matches!(
            session.start_active(),
            Err(RecognitionError::Busy)
        ));
        assert!(matches!(
            session.start_passive(),
            Err(RecognitionError::Busy)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_releases_the_mode() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![], vec![]]));
        let session = RecognitionSession::new(Arc::clone(&engine) as _, Duration::from_millis(250));

        let handle = session.start_active().unwrap();
        drop(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!session.is_busy());
        assert!(session.start_active().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn interim_fragments_are_dropped() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![
            EngineEvent::Fragment {
                text: "hey fri".to_owned(),
                is_final: false,
            },
            final_fragment("hey friday"),
        ]]));
        let session = RecognitionSession::new(engine, Duration::from_millis(250));

        let mut handle = session.start_passive().unwrap();
        let event = handle.recv().await.unwrap();
        assert_eq!(event, SessionEvent::Final("hey friday".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_engine_stop_restarts_after_backoff() {
        // First run ends without a fault; second run carries the fragment.
        let engine = Arc::new(ScriptedEngine::new(vec![
            vec![],
            vec![final_fragment("hello")],
        ]));
        let session = RecognitionSession::new(Arc::clone(&engine) as _, Duration::from_millis(250));

        let mut handle = session.start_passive().unwrap();
        let event = handle.recv().await.unwrap();
        assert_eq!(event, SessionEvent::Final("hello".to_owned()));
        assert_eq!(engine.begin_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_the_restart() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![]]));
        let session = RecognitionSession::new(Arc::clone(&engine) as _, Duration::from_millis(250));

        let mut handle = session.start_passive().unwrap();
        handle.stop();
        assert!(handle.recv().await.is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.begin_count(), 1);
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn session_stop_is_idempotent() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![]]));
        let session = RecognitionSession::new(engine, Duration::from_millis(250));

        let _handle = session.start_passive().unwrap();
        session.stop();
        session.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!session.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_fault_surfaces_and_ends_the_mode() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![EngineEvent::Fault(
            EngineFault::PermissionDenied,
        )]]));
        let session = RecognitionSession::new(engine, Duration::from_millis(250));

        let mut handle = session.start_active().unwrap();
        let event = handle.recv().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Fault(RecognitionError::PermissionDenied)
        );
        assert!(handle.recv().await.is_none());
    }
}
