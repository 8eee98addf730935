//! The assistant state machine.
//!
//! Owns the recognition session, the ambient screen monitor, and the
//! conversation log, and drives every transition between standby, active
//! listening, response generation, and spoken playback. External inputs
//! (control commands, wake detections, completed utterances, ambient
//! suggestions) arrive as events on channels; no callback mutates state
//! directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::conversation::{ConversationLog, ConversationMessage, Originator};
use crate::engine::SpeechEngine;
use crate::error::{RecognitionError, Result};
use crate::gateways::synthesis::sanitize_spoken_text;
use crate::gateways::{
    GenerationGateway, PlaybackGateway, ScreenCaptureGateway, SynthesisGateway,
};
use crate::monitor::{AmbientMonitor, MonitorHandle};
use crate::recognition::RecognitionSession;
use crate::recognition::segmenter::UtteranceSegmenter;
use crate::recognition::wake::{PhraseSet, WakeWordListener};

/// Buffer for runtime events to the presentation layer.
const EVENT_CHANNEL_SIZE: usize = 64;
/// Ambient suggestions waiting for the orchestrator. One slot: a
/// suggestion that cannot be taken promptly is dropped, never queued.
const SUGGESTION_CHANNEL_SIZE: usize = 1;
/// Delay before re-arming wake listening after a standby-cycle fault.
const STANDBY_RETRY_DELAY: Duration = Duration::from_millis(1_000);
/// Delay before retrying a mode start that lost the teardown handoff.
const MODE_HANDOFF_RETRY: Duration = Duration::from_millis(25);
/// Synthetic utterance for the dedicated screen-analysis action.
const SCREEN_ANALYSIS_REQUEST: &str = "What do you see on my screen?";

/// The assistant's externally visible state. Exactly one value is active
/// at any instant; all mutation flows through the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantState {
    /// Wake-word listening only.
    Standby,
    /// Active utterance capture (ambient monitor running).
    Listening,
    /// A generation request is in flight.
    Thinking,
    /// Synthesis or playback is in flight.
    Speaking,
}

/// Control operations exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Enter active listening without a wake phrase.
    Start,
    /// Return to standby. Idempotent; safe in any state.
    Stop,
    /// Clear the conversation log and the last error.
    ClearHistory,
    /// Run a screen-augmented turn without an utterance.
    AnalyzeScreen,
}

/// Runtime events broadcast to the presentation layer.
#[derive(Debug, Clone)]
pub enum AssistantEvent {
    /// The state machine transitioned.
    StateChanged(AssistantState),
    /// A message was appended to the conversation log.
    MessageAppended(ConversationMessage),
    /// The conversation log was cleared.
    HistoryCleared,
    /// A user-visible error was surfaced.
    Error(String),
}

/// The downstream collaborators the orchestrator dispatches to.
pub struct Gateways {
    /// Text/vision response generation.
    pub generation: Arc<dyn GenerationGateway>,
    /// Speech synthesis.
    pub synthesis: Arc<dyn SynthesisGateway>,
    /// Audio playback.
    pub playback: Arc<dyn PlaybackGateway>,
    /// Screen capture.
    pub screen: Arc<dyn ScreenCaptureGateway>,
}

/// Outcome of one synthesis+playback phase.
enum SpeakOutcome {
    Completed,
    Stopped,
    Failed(String),
    Shutdown,
}

/// What the standby select loop decided to do next.
enum StandbyPlan {
    Shutdown,
    Rearm { delay: Duration },
    Wake,
    Turn { text: String, screen_flagged: bool },
    Aside(String),
}

/// What the listening select loop decided to do next.
enum ListenPlan {
    Shutdown,
    Turn { text: String, screen_flagged: bool },
    Relisten,
    Sleep,
    Fault(RecognitionError),
}

/// The central state machine. Create one, keep its [`AssistantHandle`],
/// and drive it with [`Orchestrator::run`] until shutdown.
pub struct Orchestrator {
    config: AssistantConfig,
    session: RecognitionSession,
    gateways: Gateways,
    log: Arc<Mutex<ConversationLog>>,
    wake_phrases: PhraseSet,
    power_down_phrases: PhraseSet,
    screen_keywords: PhraseSet,
    continuous: bool,
    cancel: CancellationToken,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    suggestion_tx: Option<mpsc::Sender<String>>,
    suggestion_rx: mpsc::Receiver<String>,
    event_tx: broadcast::Sender<AssistantEvent>,
    state_tx: watch::Sender<AssistantState>,
    error_tx: watch::Sender<Option<String>>,
    monitor: Option<MonitorHandle>,
}

impl Orchestrator {
    /// Create an orchestrator over the given engine and gateways.
    pub fn new(
        config: AssistantConfig,
        engine: Arc<dyn SpeechEngine>,
        gateways: Gateways,
    ) -> Self {
        let session = RecognitionSession::new(
            engine,
            Duration::from_millis(config.recognition.restart_backoff_ms),
        );
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (suggestion_tx, suggestion_rx) = mpsc::channel(SUGGESTION_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (state_tx, _) = watch::channel(AssistantState::Standby);
        let (error_tx, _) = watch::channel(None);

        let wake_phrases = PhraseSet::new(&config.conversation.wake_phrases);
        let power_down_phrases = PhraseSet::new(&config.conversation.power_down_phrases);
        let screen_keywords = PhraseSet::new(&config.conversation.screen_keywords);
        let continuous = config.conversation.continuous;

        Self {
            config,
            session,
            gateways,
            log: Arc::new(Mutex::new(ConversationLog::new())),
            wake_phrases,
            power_down_phrases,
            screen_keywords,
            continuous,
            cancel: CancellationToken::new(),
            control_tx,
            control_rx,
            suggestion_tx: Some(suggestion_tx),
            suggestion_rx,
            event_tx,
            state_tx,
            error_tx,
            monitor: None,
        }
    }

    /// A handle for the presentation layer. Cheap to clone.
    #[must_use]
    pub fn handle(&self) -> AssistantHandle {
        AssistantHandle {
            control_tx: self.control_tx.clone(),
            state_rx: self.state_tx.subscribe(),
            error_rx: self.error_tx.subscribe(),
            event_tx: self.event_tx.clone(),
            log: Arc::clone(&self.log),
        }
    }

    /// The shutdown token for this orchestrator.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request shutdown. The run loop exits at its next suspension point.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. Runtime faults
    /// are surfaced through the error watch instead and never end the
    /// loop.
    pub async fn run(mut self) -> Result<()> {
        self.config.validate()?;

        if self.config.monitor.enabled
            && let Some(suggestion_tx) = self.suggestion_tx.take()
        {
            let monitor = AmbientMonitor::new(
                self.config.monitor.clone(),
                Arc::clone(&self.gateways.screen),
                Arc::clone(&self.gateways.generation),
            );
            self.monitor = Some(monitor.spawn(suggestion_tx, self.cancel.child_token()));
        }

        info!("assistant started in standby");

        while !self.cancel.is_cancelled() {
            match self.state() {
                AssistantState::Standby => self.standby_cycle().await,
                AssistantState::Listening => self.listening_cycle().await,
                // Turn phases always exit into Standby or Listening; a
                // shutdown mid-turn leaves the loop before this matters.
                AssistantState::Thinking | AssistantState::Speaking => {
                    self.set_state(AssistantState::Standby);
                }
            }
        }

        self.session.stop();
        info!("assistant stopped");
        Ok(())
    }

    fn state(&self) -> AssistantState {
        *self.state_tx.borrow()
    }

    /// Standby: wake-word listening plus ambient asides. This is the only
    /// place wake-word listening is ever started, so every path back to
    /// standby resumes it exactly once.
    async fn standby_cycle(&mut self) {
        let plan = {
            let listener = WakeWordListener::new(self.wake_phrases.clone());
            let wake = listener.listen(&self.session);
            tokio::pin!(wake);
            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => break StandbyPlan::Shutdown,
                    result = &mut wake => break match result {
                        Ok(()) => StandbyPlan::Wake,
                        Err(RecognitionError::Busy) => StandbyPlan::Rearm {
                            delay: MODE_HANDOFF_RETRY,
                        },
                        Err(e) => {
                            self.surface_error(&format!("wake listening failed: {e}"));
                            StandbyPlan::Rearm {
                                delay: STANDBY_RETRY_DELAY,
                            }
                        }
                    },
                    Some(command) = self.control_rx.recv() => match command {
                        ControlCommand::Start => break StandbyPlan::Wake,
                        ControlCommand::Stop => {
                            debug!("stop while already in standby, ignoring");
                        }
                        ControlCommand::ClearHistory => self.clear_history(),
                        ControlCommand::AnalyzeScreen => break StandbyPlan::Turn {
                            text: SCREEN_ANALYSIS_REQUEST.to_owned(),
                            screen_flagged: true,
                        },
                    },
                    Some(suggestion) = self.suggestion_rx.recv() => {
                        break StandbyPlan::Aside(suggestion);
                    }
                }
            }
        };

        match plan {
            StandbyPlan::Shutdown => self.session.stop(),
            StandbyPlan::Rearm { delay } => tokio::time::sleep(delay).await,
            StandbyPlan::Wake => {
                self.session.stop();
                self.begin_listening();
            }
            StandbyPlan::Turn {
                text,
                screen_flagged,
            } => {
                self.session.stop();
                self.process_turn(text, screen_flagged).await;
            }
            StandbyPlan::Aside(text) => {
                // Halt passive listening so the aside is not transcribed
                // back at us; the next cycle re-arms it.
                self.session.stop();
                self.speak_aside(&text).await;
            }
        }
    }

    /// Listening: capture one utterance while staying responsive to
    /// control commands and ambient asides.
    async fn listening_cycle(&mut self) {
        let plan = {
            let segmenter = UtteranceSegmenter::new(Duration::from_millis(
                self.config.recognition.silence_ms,
            ));
            let capture = segmenter.capture(&self.session);
            tokio::pin!(capture);
            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => break ListenPlan::Shutdown,
                    result = &mut capture => break match result {
                        Ok(utterance) if utterance.is_empty() => ListenPlan::Relisten,
                        Ok(utterance) => ListenPlan::Turn {
                            text: utterance.text,
                            screen_flagged: false,
                        },
                        Err(e) => ListenPlan::Fault(e),
                    },
                    Some(command) = self.control_rx.recv() => match command {
                        ControlCommand::Start => {}
                        ControlCommand::Stop => break ListenPlan::Sleep,
                        ControlCommand::ClearHistory => self.clear_history(),
                        ControlCommand::AnalyzeScreen => break ListenPlan::Turn {
                            text: SCREEN_ANALYSIS_REQUEST.to_owned(),
                            screen_flagged: true,
                        },
                    },
                    Some(suggestion) = self.suggestion_rx.recv() => {
                        // Spoken inline: captured fragments keep buffering
                        // in the session channel meanwhile, and the
                        // silence deadline resumes once the aside is done.
                        self.speak_aside(&suggestion).await;
                    }
                }
            }
        };

        match plan {
            ListenPlan::Shutdown => self.session.stop(),
            ListenPlan::Turn {
                text,
                screen_flagged,
            } => {
                self.session.stop();
                self.process_turn(text, screen_flagged).await;
            }
            ListenPlan::Relisten => {
                debug!("empty utterance, re-listening");
                tokio::time::sleep(Duration::from_millis(
                    self.config.conversation.relisten_delay_ms,
                ))
                .await;
                if !self.continuous {
                    self.set_state(AssistantState::Standby);
                }
            }
            ListenPlan::Sleep => {
                self.session.stop();
                self.set_state(AssistantState::Standby);
            }
            ListenPlan::Fault(RecognitionError::Busy) => {
                // The previous mode's driver has not released the engine
                // yet; retry without surfacing anything.
                tokio::time::sleep(MODE_HANDOFF_RETRY).await;
            }
            ListenPlan::Fault(e) => {
                self.session.stop();
                self.surface_error(&format!("listening failed: {e}"));
                self.set_state(AssistantState::Standby);
            }
        }
    }

    /// One full turn: intercept power-down, classify screen need, dispatch
    /// generation, speak the response.
    async fn process_turn(&mut self, text: String, screen_flagged: bool) {
        self.drain_stale_suggestions();
        self.set_state(AssistantState::Thinking);

        let user_message = self.append_message(&text, Originator::User);

        if self.power_down_phrases.matches(&text).is_some() {
            info!("power-down phrase recognized");
            self.continuous = false;
            let ack = self.config.conversation.power_down_ack.clone();
            self.append_message(&ack, Originator::Assistant);
            self.set_state(AssistantState::Speaking);
            if let SpeakOutcome::Failed(message) = self.speaking_phase(&ack).await {
                self.surface_error(&message);
            }
            self.set_state(AssistantState::Standby);
            return;
        }

        let wants_screen = screen_flagged || self.screen_keywords.matches(&text).is_some();
        let snapshot = if wants_screen {
            match self.gateways.screen.capture(false).await {
                Ok(snapshot) => {
                    if let Some(message) = &user_message {
                        self.with_log(|log| log.tag_screen_context(message.id));
                    }
                    Some(snapshot)
                }
                Err(e) => {
                    debug!("screen capture failed, using text-only path: {e}");
                    None
                }
            }
        } else {
            None
        };

        let context = self
            .with_log(|log| log.history(self.config.conversation.history_window))
            .unwrap_or_default();
        let generation = Arc::clone(&self.gateways.generation);
        let mut request = tokio::spawn(async move {
            // The snapshot lives only inside this request's scope.
            generation.generate(&context, snapshot.as_ref()).await
        });

        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => return,
                result = &mut request => break result,
                Some(command) = self.control_rx.recv() => match command {
                    ControlCommand::Stop => {
                        // The in-flight request completes detached; once
                        // we have left the turn nothing applies its result.
                        debug!("stopped while thinking, pending response will be discarded");
                        self.set_state(AssistantState::Standby);
                        return;
                    }
                    ControlCommand::ClearHistory => self.clear_history(),
                    ControlCommand::Start | ControlCommand::AnalyzeScreen => {}
                },
            }
        };

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.surface_error(&format!("response generation failed: {e}"));
                self.set_state(AssistantState::Standby);
                return;
            }
            Err(e) => {
                self.surface_error(&format!("generation task failed: {e}"));
                self.set_state(AssistantState::Standby);
                return;
            }
        };

        self.append_message(&response, Originator::Assistant);
        self.set_state(AssistantState::Speaking);
        match self.speaking_phase(&response).await {
            SpeakOutcome::Completed => {
                if self.continuous {
                    self.set_state(AssistantState::Listening);
                } else {
                    self.set_state(AssistantState::Standby);
                }
            }
            SpeakOutcome::Stopped => self.set_state(AssistantState::Standby),
            SpeakOutcome::Failed(message) => {
                self.surface_error(&message);
                self.set_state(AssistantState::Standby);
            }
            SpeakOutcome::Shutdown => {}
        }
    }

    /// Synthesize and play one piece of text, staying responsive to stop
    /// commands. A stop leaves the in-flight gateway work to finish
    /// detached; its result is never applied.
    async fn speaking_phase(&mut self, text: &str) -> SpeakOutcome {
        let spoken = sanitize_spoken_text(text);
        if spoken.is_empty() {
            return SpeakOutcome::Completed;
        }

        let synthesis = Arc::clone(&self.gateways.synthesis);
        let playback = Arc::clone(&self.gateways.playback);
        let mut speak = tokio::spawn(async move {
            let audio = synthesis
                .synthesize(&spoken)
                .await
                .map_err(|e| format!("speech synthesis failed: {e}"))?;
            playback
                .play(audio)
                .await
                .map_err(|e| format!("audio playback failed: {e}"))?;
            Ok::<(), String>(())
        });

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return SpeakOutcome::Shutdown,
                result = &mut speak => return match result {
                    Ok(Ok(())) => SpeakOutcome::Completed,
                    Ok(Err(message)) => SpeakOutcome::Failed(message),
                    Err(e) => SpeakOutcome::Failed(format!("speaking task failed: {e}")),
                },
                Some(command) = self.control_rx.recv() => match command {
                    ControlCommand::Stop => {
                        debug!("stopped while speaking");
                        return SpeakOutcome::Stopped;
                    }
                    ControlCommand::ClearHistory => self.clear_history(),
                    ControlCommand::Start | ControlCommand::AnalyzeScreen => {}
                },
            }
        }
    }

    /// Speak an ambient suggestion. Failures are logged, never surfaced,
    /// and never disturb the main cycle.
    async fn speak_aside(&self, text: &str) {
        info!("speaking ambient aside");
        self.append_message(text, Originator::Assistant);

        let spoken = sanitize_spoken_text(text);
        if spoken.is_empty() {
            return;
        }
        match self.gateways.synthesis.synthesize(&spoken).await {
            Ok(audio) => {
                if let Err(e) = self.gateways.playback.play(audio).await {
                    debug!("ambient aside playback failed: {e}");
                }
            }
            Err(e) => debug!("ambient aside synthesis failed: {e}"),
        }
    }

    fn begin_listening(&mut self) {
        self.continuous = self.config.conversation.continuous;
        self.clear_error();
        self.set_state(AssistantState::Listening);
    }

    fn set_state(&self, state: AssistantState) {
        let previous = self.state_tx.send_replace(state);
        if previous == state {
            return;
        }
        if let Some(monitor) = &self.monitor {
            match state {
                AssistantState::Standby | AssistantState::Listening => monitor.resume(),
                AssistantState::Thinking | AssistantState::Speaking => monitor.pause(),
            }
        }
        debug!(from = ?previous, to = ?state, "state transition");
        let _ = self.event_tx.send(AssistantEvent::StateChanged(state));
    }

    fn with_log<T>(&self, f: impl FnOnce(&mut ConversationLog) -> T) -> Option<T> {
        let mut log = self.log.lock().ok()?;
        Some(f(&mut log))
    }

    fn append_message(&self, text: &str, originator: Originator) -> Option<ConversationMessage> {
        let message = self.with_log(|log| log.append(text, originator))?;
        let _ = self
            .event_tx
            .send(AssistantEvent::MessageAppended(message.clone()));
        Some(message)
    }

    fn clear_history(&self) {
        self.with_log(ConversationLog::clear);
        self.clear_error();
        let _ = self.event_tx.send(AssistantEvent::HistoryCleared);
        info!("conversation history cleared");
    }

    fn surface_error(&self, message: &str) {
        warn!("{message}");
        self.error_tx.send_replace(Some(message.to_owned()));
        let _ = self.event_tx.send(AssistantEvent::Error(message.to_owned()));
    }

    fn clear_error(&self) {
        self.error_tx.send_replace(None);
    }

    /// Discard suggestions that raced a transition into a turn; they were
    /// produced against a screen the turn may be about to change.
    fn drain_stale_suggestions(&mut self) {
        while self.suggestion_rx.try_recv().is_ok() {}
    }
}

/// Read/control surface exposed to the presentation layer. Everything
/// here is safe to use from any task; the conversation log is read-only
/// through this handle.
#[derive(Clone)]
pub struct AssistantHandle {
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    state_rx: watch::Receiver<AssistantState>,
    error_rx: watch::Receiver<Option<String>>,
    event_tx: broadcast::Sender<AssistantEvent>,
    log: Arc<Mutex<ConversationLog>>,
}

impl AssistantHandle {
    /// Enter active listening without a wake phrase.
    pub fn start(&self) {
        let _ = self.control_tx.send(ControlCommand::Start);
    }

    /// Return to standby. Idempotent.
    pub fn stop(&self) {
        let _ = self.control_tx.send(ControlCommand::Stop);
    }

    /// Clear the conversation log and the last error.
    pub fn clear_history(&self) {
        let _ = self.control_tx.send(ControlCommand::ClearHistory);
    }

    /// Run a screen-augmented turn without an utterance.
    pub fn analyze_screen(&self) {
        let _ = self.control_tx.send(ControlCommand::AnalyzeScreen);
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> AssistantState {
        *self.state_rx.borrow()
    }

    /// A watch receiver for state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<AssistantState> {
        self.state_rx.clone()
    }

    /// The last surfaced error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.error_rx.borrow().clone()
    }

    /// Subscribe to runtime events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<AssistantEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the message list, in insertion order.
    #[must_use]
    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.log
            .lock()
            .map(|log| log.messages().to_vec())
            .unwrap_or_default()
    }
}
