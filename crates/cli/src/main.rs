//! Voice tutor terminal session
//!
//! Runs one tutoring session against the configured tutor, synthesizer and
//! progress store. Typed lines go to the tutor directly; after `/listen`
//! they are fed through the capture engine as recognized speech.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_tutor_agent::{
    Collaborators, VoiceSession, VoiceSessionConfig, VoiceSessionEvent, VoiceSessionState,
};
use voice_tutor_config::{load_settings_from, PersistenceBackend, Settings};
use voice_tutor_core::{
    AudioClip, InteractionMode, ProgressStore, TargetLanguage, TextToSpeech, TurnRole, TUTOR_NAME,
};
use voice_tutor_llm::{ClaudeBackend, ClaudeConfig};
use voice_tutor_persistence::open_store;
use voice_tutor_speech::{
    ChannelCapture, ChannelCaptureHandle, ElevenLabsConfig, ElevenLabsTts, FileAudioSink,
};

use commands::Command;

/// Voice tutor - practice a language with an adaptive AI tutor
#[derive(Parser)]
#[command(name = "voice-tutor", version, about)]
struct Cli {
    /// Directory holding default.yaml and per-environment overlays
    #[arg(long, env = "VOICE_TUTOR_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Environment overlay to load (development, staging, production)
    #[arg(short, long, env = "VOICE_TUTOR_ENV")]
    env: Option<String>,

    /// Target language (de, fr, es, it, ja, pt)
    #[arg(short, long)]
    language: Option<String>,

    /// Interaction mode to start in
    #[arg(short, long)]
    mode: Option<InteractionMode>,

    /// Start with spoken replies off
    #[arg(long)]
    muted: bool,

    /// Keep progress in this file instead of the configured store
    #[arg(long)]
    progress: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not initialized yet
            eprintln!("voice-tutor: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    init_tracing(&settings);

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

/// Layer configuration files, then command-line overrides
fn load(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = load_settings_from(&cli.config_dir, cli.env.as_deref())
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;

    if let Some(ref code) = cli.language {
        let language = TargetLanguage::from_str_loose(code)
            .ok_or_else(|| anyhow!("unknown target language: {}", code))?;
        settings.session.target_language = language.code().to_string();
    }
    if cli.muted {
        settings.session.muted = true;
    }
    if let Some(ref path) = cli.progress {
        settings.persistence.backend = PersistenceBackend::File;
        settings.persistence.path = path.clone();
    }
    match cli.verbose {
        0 => {},
        1 => settings.observability.log_level = "debug".to_string(),
        _ => settings.observability.log_level = "trace".to_string(),
    }

    settings.validate().context("invalid configuration")?;
    Ok(settings)
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("voice_tutor={level},warn").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed()
    };
    subscriber.with(fmt_layer).init();
}

async fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?settings.environment,
        "Starting voice tutor"
    );

    let inference = ClaudeBackend::new(ClaudeConfig::from_settings(&settings.llm))
        .context("creating inference client")?;
    let (tts, speech_available) = build_tts(&settings);
    let store = open_store(&settings.persistence).context("opening progress store")?;
    let (capture, mic) = ChannelCapture::new(true);
    let player = FileAudioSink::new(settings.tts.output_dir.clone());

    let config = VoiceSessionConfig::from_settings(&settings.session)
        .with_muted(settings.session.muted || !speech_available);
    let session = VoiceSession::new(
        config,
        Collaborators {
            inference: Arc::new(inference),
            capture: Arc::new(capture),
            tts,
            player: Arc::new(player),
            store: store.clone(),
        },
    );

    let printer = tokio::spawn(print_events(session.subscribe()));
    session.start().await?;
    if let Some(mode) = cli.mode {
        session.set_mode(mode);
    }

    println!("{}\n", commands::HELP);
    repl(&session, &mic, speech_available).await?;

    // Ending discards the debounced save, so write the latest profile now
    if !session.persists_progress() {
        println!("Progress could not be loaded, so it was not saved.");
    } else if session.transcript().len() > 1 {
        match store.save(&session.profile()).await {
            Ok(()) => println!("Progress saved."),
            Err(e) => tracing::warn!(error = %e, "Failed to save progress on exit"),
        }
    }
    session.end("learner quit").await;
    drop(session);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}

/// Read prompt lines until `/quit` or end of input
async fn repl(
    session: &VoiceSession,
    mic: &ChannelCaptureHandle,
    speech_available: bool,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match commands::parse(line) {
            None => {
                if session.state() == VoiceSessionState::Listening {
                    mic.final_text(line);
                } else {
                    session.submit_text(line).await?;
                }
                continue;
            },
            Some(Err(message)) => {
                println!("{}", message);
                continue;
            },
            Some(Ok(command)) => command,
        };

        match command {
            Command::Help => println!("{}", commands::HELP),
            Command::Quit => break,
            Command::Mode(mode) => session.set_mode(mode),
            Command::Mute => {
                if !speech_available {
                    println!("Speech synthesis is not configured; replies stay text only.");
                } else {
                    let muted = !session.is_muted();
                    session.set_muted(muted).await;
                    println!("Spoken replies {}.", if muted { "off" } else { "on" });
                }
            },
            Command::Profile => print_profile(session),
            Command::Transcript => {
                for turn in session.transcript() {
                    let speaker = match turn.role {
                        TurnRole::Learner => "You",
                        TurnRole::Assistant => TUTOR_NAME,
                    };
                    println!("[{}] {}: {}", turn.timestamp.format("%H:%M:%S"), speaker, turn.content);
                }
            },
            Command::Listen => {
                session.start_listening().await?;
                if session.state() == VoiceSessionState::Listening {
                    println!("Listening... type what you say, then /send.");
                }
            },
            Command::Send => session.stop_listening().await?,
            Command::Dismiss => session.dismiss_permission_warning(),
        }
    }
    Ok(())
}

fn print_profile(session: &VoiceSession) {
    let profile = session.profile();
    println!(
        "Level {} ({}), confidence {}/10, {} session(s), mode {}",
        profile.level(),
        profile.level_label(),
        profile.confidence(),
        profile.sessions(),
        session.mode()
    );
    let lists = [
        ("Strengths", profile.strengths()),
        ("Working on", profile.weaknesses()),
        ("Words mastered", profile.mastered_words()),
        ("Words to practice", profile.struggling_words()),
    ];
    for (title, items) in lists {
        if !items.is_empty() {
            println!("  {}: {}", title, items.join(", "));
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<VoiceSessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &VoiceSessionEvent) {
    match event {
        VoiceSessionEvent::Started { greeting, .. } => println!("{}: {}\n", TUTOR_NAME, greeting),
        VoiceSessionEvent::Reply { text, corrections } => {
            println!("{}: {}", TUTOR_NAME, text);
            for correction in corrections {
                println!(
                    "  ✗ {}  →  ✓ {}  ({})",
                    correction.original, correction.correct, correction.reason
                );
            }
        },
        VoiceSessionEvent::LevelUp { to, label, .. } => {
            println!("  Level up! You are now level {} ({}).", to, label)
        },
        VoiceSessionEvent::Notice { text } => println!("{}: {}", TUTOR_NAME, text),
        VoiceSessionEvent::PermissionDenied => {
            println!("Microphone access was denied. Use /dismiss to clear this warning.")
        },
        VoiceSessionEvent::InterimTranscript { text } => println!("  … {}", text),
        VoiceSessionEvent::ModeChanged(mode) => println!("Mode: {}", mode),
        VoiceSessionEvent::Error(reason) => tracing::debug!(%reason, "Session error"),
        _ => {},
    }
}

fn build_tts(settings: &Settings) -> (Arc<dyn TextToSpeech>, bool) {
    if !settings.tts.enabled {
        return (Arc::new(TextOnly), false);
    }
    match ElevenLabsTts::new(ElevenLabsConfig::from_settings(&settings.tts)) {
        Ok(tts) => (Arc::new(tts), true),
        Err(e) => {
            tracing::warn!(error = %e, "Speech synthesis unavailable; replies will be text only");
            (Arc::new(TextOnly), false)
        },
    }
}

/// Synthesizer used when speech is disabled; sessions using it stay muted
struct TextOnly;

#[async_trait]
impl TextToSpeech for TextOnly {
    async fn synthesize(&self, _text: &str) -> voice_tutor_core::Result<AudioClip> {
        Err(voice_tutor_core::Error::Synthesis(
            "speech synthesis is disabled".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        "text-only"
    }
}
