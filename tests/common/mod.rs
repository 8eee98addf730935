//! Shared test doubles for the integration suite.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use friday::config::AssistantConfig;
use friday::conversation::ChatEntry;
use friday::engine::{EngineEvent, EngineFault, RecognitionMode, SpeechEngine};
use friday::error::{CaptureError, GatewayError, PlaybackError, Result};
use friday::gateways::{
    AudioPayload, GenerationGateway, PlaybackGateway, ScreenCaptureGateway, ScreenSnapshot,
    SynthesisGateway,
};
use friday::orchestrator::Gateways;

/// A finalized transcript fragment.
pub fn final_fragment(text: &str) -> EngineEvent {
    EngineEvent::Fragment {
        text: text.to_owned(),
        is_final: true,
    }
}

/// A no-speech engine fault.
pub fn no_speech() -> EngineEvent {
    EngineEvent::Fault(EngineFault::NoSpeech)
}

/// Speech engine that replays timed scripts, one per `begin` call, in
/// order. After a script is exhausted (or when none remain) the stream
/// stays open so the session keeps waiting, as a live engine would.
pub struct ScriptedEngine {
    scripts: Mutex<Vec<Vec<(Duration, EngineEvent)>>>,
    modes: Mutex<Vec<RecognitionMode>>,
}

impl ScriptedEngine {
    pub fn new(scripts: Vec<Vec<(Duration, EngineEvent)>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            modes: Mutex::new(Vec::new()),
        })
    }

    /// The modes `begin` was called with, in order.
    pub fn modes(&self) -> Vec<RecognitionMode> {
        self.modes.lock().expect("modes lock").clone()
    }

    pub fn begin_count(&self) -> usize {
        self.modes.lock().expect("modes lock").len()
    }
}

impl SpeechEngine for ScriptedEngine {
    fn begin(&self, mode: RecognitionMode) -> Result<mpsc::Receiver<EngineEvent>> {
        self.modes.lock().expect("modes lock").push(mode);
        let script = {
            let mut scripts = self.scripts.lock().expect("scripts lock");
            if scripts.is_empty() {
                Vec::new()
            } else {
                scripts.remove(0)
            }
        };
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep(delay).await;
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            // Keep the stream open; the session ends us when it is done.
            std::future::pending::<()>().await;
        });
        Ok(rx)
    }

    fn end(&self) {}
}

/// Generation gateway returning a canned reply and recording every call.
pub struct FakeGeneration {
    reply: Mutex<String>,
    fail_with: Mutex<Option<GatewayError>>,
    delay: Duration,
    /// (context, had_image) per call.
    calls: Mutex<Vec<(Vec<ChatEntry>, bool)>>,
}

impl FakeGeneration {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply.to_owned()),
            fail_with: Mutex::new(None),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A reply that takes `delay` to arrive, for stale-response tests.
    pub fn replying_after(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply.to_owned()),
            fail_with: Mutex::new(None),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: GatewayError) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(String::new()),
            fail_with: Mutex::new(Some(error)),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(Vec<ChatEntry>, bool)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl GenerationGateway for FakeGeneration {
    async fn generate(
        &self,
        context: &[ChatEntry],
        image: Option<&ScreenSnapshot>,
    ) -> std::result::Result<String, GatewayError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((context.to_vec(), image.is_some()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.fail_with.lock().expect("fail lock").clone() {
            return Err(error);
        }
        Ok(self.reply.lock().expect("reply lock").clone())
    }
}

/// Synthesis gateway recording every sanitized input.
pub struct FakeSynthesis {
    calls: Mutex<Vec<String>>,
}

impl FakeSynthesis {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl SynthesisGateway for FakeSynthesis {
    async fn synthesize(&self, text: &str) -> std::result::Result<AudioPayload, GatewayError> {
        self.calls.lock().expect("calls lock").push(text.to_owned());
        Ok(AudioPayload {
            bytes: vec![0x0A; 4],
        })
    }
}

/// Playback gateway counting completed plays.
pub struct FakePlayback {
    plays: AtomicUsize,
}

impl FakePlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plays: AtomicUsize::new(0),
        })
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackGateway for FakePlayback {
    async fn play(&self, _audio: AudioPayload) -> std::result::Result<(), PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Screen capture gateway with a fixed outcome.
pub struct FakeCapture {
    frame: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeCapture {
    pub fn returning(frame: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            frame: Some(frame),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            frame: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenCaptureGateway for FakeCapture {
    async fn capture(&self, _full_page: bool) -> std::result::Result<ScreenSnapshot, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.frame {
            Some(frame) => Ok(ScreenSnapshot::from_jpeg(frame.clone())),
            None => Err(CaptureError::Unavailable("no provider".to_owned())),
        }
    }
}

/// Bundle the fakes into a gateway set.
pub fn gateways(
    generation: Arc<FakeGeneration>,
    synthesis: Arc<FakeSynthesis>,
    playback: Arc<FakePlayback>,
    screen: Arc<FakeCapture>,
) -> Gateways {
    Gateways {
        generation,
        synthesis,
        playback,
        screen,
    }
}

/// Default config for orchestrator tests: ambient monitoring off so only
/// the scenario under test drives the gateways.
pub fn test_config() -> AssistantConfig {
    let mut config = AssistantConfig::default();
    config.monitor.enabled = false;
    config
}
