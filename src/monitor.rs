//! Ambient screen monitoring.
//!
//! A periodic background task that captures the screen, skips ticks whose
//! content is unchanged, and turns meaningfully different screens into
//! short spoken asides. The task is explicitly paused and resumed by the
//! orchestrator on state transitions; it never inspects orchestrator
//! state from inside a timer callback. Every failure here is logged and
//! contained — the main conversation cycle is unaffected.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::conversation::ChatEntry;
use crate::gateways::{GenerationGateway, ScreenCaptureGateway, ScreenSnapshot};

/// Commands from the orchestrator gating the periodic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Stop doing tick work (the interval keeps running).
    Pause,
    /// Resume tick work.
    Resume,
}

/// Control handle for a spawned monitor task.
pub struct MonitorHandle {
    cmd_tx: mpsc::UnboundedSender<MonitorCommand>,
}

impl MonitorHandle {
    /// Pause tick work. Best effort; a no-op once the monitor has shut down.
    pub fn pause(&self) {
        let _ = self.cmd_tx.send(MonitorCommand::Pause);
    }

    /// Resume tick work. Best effort; a no-op once the monitor has shut down.
    pub fn resume(&self) {
        let _ = self.cmd_tx.send(MonitorCommand::Resume);
    }
}

/// The ambient monitor: periodic capture, change detection, suppression
/// filtering.
pub struct AmbientMonitor {
    config: MonitorConfig,
    screen: Arc<dyn ScreenCaptureGateway>,
    generation: Arc<dyn GenerationGateway>,
}

impl AmbientMonitor {
    /// Create a monitor over the given gateways.
    pub fn new(
        config: MonitorConfig,
        screen: Arc<dyn ScreenCaptureGateway>,
        generation: Arc<dyn GenerationGateway>,
    ) -> Self {
        Self {
            config,
            screen,
            generation,
        }
    }

    /// Spawn the monitor task. Qualifying suggestions are delivered on
    /// `suggestions_tx`; when the orchestrator is not ready to take one,
    /// the send fails and the suggestion is dropped, never queued.
    pub fn spawn(
        self,
        suggestions_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> MonitorHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(suggestions_tx, cmd_rx, cancel));
        MonitorHandle { cmd_tx }
    }

    async fn run(
        self,
        suggestions_tx: mpsc::Sender<String>,
        mut cmd_rx: mpsc::UnboundedReceiver<MonitorCommand>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_s));
        // A tick's capture+analysis may outlast the interval; never let
        // ticks pile up behind it.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so the
        // monitor starts observing one full interval after launch.
        interval.tick().await;

        let mut paused = false;
        let mut last_analyzed: Option<ScreenSnapshot> = None;

        info!(interval_s = self.config.interval_s, "ambient monitor started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                command = cmd_rx.recv() => match command {
                    Some(MonitorCommand::Pause) => paused = true,
                    Some(MonitorCommand::Resume) => paused = false,
                    None => break,
                },
                _ = interval.tick(), if !paused => {
                    self.tick(&mut last_analyzed, &suggestions_tx).await;
                }
            }
        }

        debug!("ambient monitor stopped");
    }

    /// One monitor tick. Runs to completion before the next tick can
    /// start; errors are logged and swallowed.
    async fn tick(
        &self,
        last_analyzed: &mut Option<ScreenSnapshot>,
        suggestions_tx: &mpsc::Sender<String>,
    ) {
        let snapshot = match self.screen.capture(false).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("ambient capture skipped: {e}");
                return;
            }
        };

        if last_analyzed.as_ref() == Some(&snapshot) {
            debug!("screen unchanged, skipping analysis");
            return;
        }

        let context = [ChatEntry {
            role: "user",
            content: self.config.prompt.clone(),
        }];
        let analysis = match self.generation.generate(&context, Some(&snapshot)).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("ambient analysis failed: {e}");
                *last_analyzed = Some(snapshot);
                return;
            }
        };
        // This snapshot is now the analyzed baseline; the image itself is
        // not retained anywhere else.
        *last_analyzed = Some(snapshot);

        let suggestion = analysis.trim();
        if self.is_suppressed(suggestion) {
            debug!(chars = suggestion.len(), "ambient analysis suppressed");
            return;
        }

        match suggestions_tx.try_send(suggestion.to_owned()) {
            Ok(()) => info!("ambient suggestion delivered"),
            Err(_) => debug!("orchestrator busy, ambient suggestion dropped"),
        }
    }

    /// Whether an analysis is too trivial to speak.
    fn is_suppressed(&self, suggestion: &str) -> bool {
        if suggestion.len() < self.config.min_suggestion_len {
            return true;
        }
        let lower = suggestion.to_lowercase();
        self.config
            .suppression_phrases
            .iter()
            .any(|phrase| lower.contains(&phrase.to_lowercase()))
    }
}
