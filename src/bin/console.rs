//! Console harness for the assistant loop.
//!
//! Stands in for a live speech engine: each line typed on stdin is
//! delivered to the recognizer as one finalized transcript fragment, and
//! an empty line reports a no-speech condition. Everything downstream
//! (wake phrase, silence segmentation, power-down interception, the
//! gateways) runs exactly as it would with a real engine.
//!
//! Usage:
//!   friday-console [--mute] [--no-monitor] [path/to/config.toml]
//!
//! `--mute` prints spoken replies instead of synthesizing and playing
//! them, so the loop can be exercised without synthesis credentials or an
//! audio device (generation still needs its API key).

use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info};

use friday::config::AssistantConfig;
use friday::engine::{EngineEvent, EngineFault, RecognitionMode, SpeechEngine};
use friday::error::{GatewayError, PlaybackError, Result};
use friday::gateways::generation::OpenAiGeneration;
use friday::gateways::playback::CpalPlayback;
use friday::gateways::synthesis::ElevenLabsSynthesis;
use friday::gateways::{
    AudioPayload, NullScreenCapture, PlaybackGateway, SynthesisGateway,
};
use friday::orchestrator::{AssistantEvent, Gateways, Orchestrator};

/// Speech engine fed by stdin lines.
///
/// A background thread reads stdin once and fans lines out to whichever
/// run is currently active; `begin` registers the active run's sender.
struct LineEngine {
    active: Arc<Mutex<Option<mpsc::Sender<EngineEvent>>>>,
}

impl LineEngine {
    fn spawn() -> Arc<Self> {
        let engine = Arc::new(Self {
            active: Arc::new(Mutex::new(None)),
        });

        let active = Arc::clone(&engine.active);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let text = line.trim().to_owned();
                let event = if text.is_empty() {
                    EngineEvent::Fault(EngineFault::NoSpeech)
                } else {
                    EngineEvent::Fragment {
                        text,
                        is_final: true,
                    }
                };
                let sender = active.lock().ok().and_then(|slot| slot.clone());
                if let Some(sender) = sender {
                    let _ = sender.blocking_send(event);
                } else {
                    debug!("no active recognition run, line dropped");
                }
            }
        });

        engine
    }
}

impl SpeechEngine for LineEngine {
    fn begin(&self, mode: RecognitionMode) -> Result<mpsc::Receiver<EngineEvent>> {
        let (tx, rx) = mpsc::channel(16);
        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(tx);
        }
        debug!(?mode, "line engine listening");
        Ok(rx)
    }

    fn end(&self) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = None;
        }
    }
}

/// Synthesis stand-in for `--mute`: prints instead of speaking.
struct SilentSynthesis;

#[async_trait::async_trait]
impl SynthesisGateway for SilentSynthesis {
    async fn synthesize(&self, text: &str) -> std::result::Result<AudioPayload, GatewayError> {
        println!("[speaks] {text}");
        Ok(AudioPayload { bytes: Vec::new() })
    }
}

/// Playback stand-in for `--mute`.
struct SilentPlayback;

#[async_trait::async_trait]
impl PlaybackGateway for SilentPlayback {
    async fn play(&self, _audio: AudioPayload) -> std::result::Result<(), PlaybackError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("friday=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mute = args.iter().any(|a| a == "--mute");
    let no_monitor = args.iter().any(|a| a == "--no-monitor");
    let config_path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(std::path::PathBuf::from)
        .unwrap_or_else(AssistantConfig::default_config_path);

    let mut config = if config_path.exists() {
        AssistantConfig::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        info!("no config at {}, using defaults", config_path.display());
        AssistantConfig::default()
    };
    if no_monitor {
        config.monitor.enabled = false;
    }

    let gateways = if mute {
        Gateways {
            generation: Arc::new(OpenAiGeneration::new(config.generation.clone())?),
            synthesis: Arc::new(SilentSynthesis),
            playback: Arc::new(SilentPlayback),
            screen: Arc::new(NullScreenCapture),
        }
    } else {
        Gateways {
            generation: Arc::new(OpenAiGeneration::new(config.generation.clone())?),
            synthesis: Arc::new(ElevenLabsSynthesis::new(config.synthesis.clone())?),
            playback: Arc::new(CpalPlayback::new()?),
            screen: Arc::new(NullScreenCapture),
        }
    };

    let engine = LineEngine::spawn();
    let orchestrator = Orchestrator::new(config, engine, gateways);
    let handle = orchestrator.handle();
    let cancel = orchestrator.cancel_token();

    // Narrate what the assistant is doing.
    let mut events = handle.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AssistantEvent::StateChanged(state) => println!("-- {state:?}"),
                AssistantEvent::MessageAppended(message) => {
                    println!("[{:?}] {}", message.originator, message.text);
                }
                AssistantEvent::HistoryCleared => println!("-- history cleared"),
                AssistantEvent::Error(message) => eprintln!("!! {message}"),
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    println!("Say a wake phrase (type it and press enter), e.g. \"hey friday\".");
    orchestrator.run().await?;
    Ok(())
}
