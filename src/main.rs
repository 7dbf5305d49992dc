use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dex_voice::clip::{ClipLoader, ClipStatus, HttpClipBackend};
use dex_voice::synthesis::{clean_text, preferred_voice};
use dex_voice::voice::{AudioCapture, AudioPlayback, CpalMicrophone, RemoteSpeechEngine};
use dex_voice::{AudioFocus, CaptureState, Config, SpeechSynthesis, VoiceCapture};

/// Dex Voice - voice input, read-back and cry clips for the encyclopedia
#[derive(Parser)]
#[command(name = "dexvoice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hold the talk button, then print the transcript
    Listen {
        /// Seconds to hold the button
        #[arg(long, default_value = "3")]
        hold: f64,
        /// Print the final capture state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read text aloud
    Speak {
        /// Text (markdown is fine)
        text: String,
    },
    /// Load a cry clip with fallback and play it
    Cry {
        /// Primary clip URL
        primary: String,
        /// Backup clip URL
        #[arg(long)]
        backup: Option<String>,
        /// Only check that the clip loads
        #[arg(long)]
        no_play: bool,
    },
    /// List the speech engine's voices
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,dex_voice=info",
        1 => "info,dex_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    // Hardware checks don't need configuration
    match &cli.command {
        Command::TestMic { duration } => return test_mic(*duration).await,
        Command::TestSpeaker => return test_speaker().await,
        _ => {}
    }

    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Listen { hold, json } => listen(&config, hold, json).await,
        Command::Speak { text } => speak(&config, &text).await,
        Command::Cry {
            primary,
            backup,
            no_play,
        } => cry(&config, &primary, backup.as_deref(), no_play).await,
        Command::Voices => list_voices(&config),
        Command::TestMic { .. } | Command::TestSpeaker => Ok(()),
    }
}

/// Simulate a press held for `hold` seconds and report the outcome
async fn listen(config: &Config, hold: f64, json: bool) -> anyhow::Result<()> {
    if !hold.is_finite() || hold < 0.0 {
        anyhow::bail!("hold must be a non-negative number of seconds");
    }
    let hold = Duration::from_secs_f64(hold);

    let (result_tx, mut result_rx) = tokio::sync::mpsc::unbounded_channel();
    let capture = VoiceCapture::new(
        Arc::new(CpalMicrophone::new()),
        Arc::new(config.transcriber()?),
        AudioFocus::new(),
        config.capture.clone(),
        Arc::new(move |transcript: String, auto_submit: bool| {
            let _ = result_tx.send((transcript, auto_submit));
        }),
    );

    if !capture.is_supported() {
        anyhow::bail!("no microphone available");
    }

    let mut transitions = capture.transitions();

    println!("Holding the talk button for {:.1}s, speak now...", hold.as_secs_f64());
    capture.press();
    tokio::time::sleep(hold).await;
    capture.release();

    if hold < config.capture.min_hold {
        println!(
            "Released before the {}ms minimum hold, nothing was recorded",
            config.capture.min_hold.as_millis()
        );
        return Ok(());
    }

    // Wait for the session to come back to Idle
    let wait = config
        .capture
        .transcription_timeout
        .unwrap_or(Duration::from_secs(60))
        + Duration::from_secs(5);
    let settled = tokio::time::timeout(wait, async {
        loop {
            match transitions.recv().await {
                Ok(CaptureState::Idle) | Err(_) => break,
                Ok(state) => tracing::debug!(?state, "capture state"),
            }
        }
    })
    .await;
    if settled.is_err() {
        capture.cancel();
        anyhow::bail!("capture did not finish in time");
    }

    let snapshot = capture.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    match (snapshot.error, result_rx.try_recv()) {
        (Some(error), _) => println!("error: {}", error.code()),
        (None, Ok((transcript, auto_submit))) => {
            println!("transcript: {transcript}");
            println!("auto submit: {auto_submit}");
        }
        (None, Err(_)) => println!("no result"),
    }

    Ok(())
}

/// Read `text` aloud until done or interrupted
async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    if clean_text(text).is_empty() {
        println!("Nothing to speak");
        return Ok(());
    }

    let playback = Arc::new(AudioPlayback::new()?);
    let engine = RemoteSpeechEngine::new(config.text_to_speech()?, playback);
    let synthesis = SpeechSynthesis::new(
        Some(Arc::new(engine)),
        AudioFocus::new(),
        config.synthesis.clone(),
    );

    let mut status = synthesis.subscribe();
    synthesis.speak(text);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() || !status.borrow_and_update().speaking {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping");
                synthesis.stop();
                break;
            }
        }
    }

    Ok(())
}

/// Load a cry clip and play it once
async fn cry(
    config: &Config,
    primary: &str,
    backup: Option<&str>,
    no_play: bool,
) -> anyhow::Result<()> {
    let backend = if no_play {
        HttpClipBackend::load_only(config.clip.request_timeout)?
    } else {
        HttpClipBackend::new(Arc::new(AudioPlayback::new()?), config.clip.request_timeout)?
    };
    let loader = ClipLoader::new(Arc::new(backend));

    let mut status = loader.subscribe();
    loader.set_sources(Some(primary), backup);

    let status = *status
        .wait_for(|s| *s != ClipStatus::NotLoaded)
        .await
        .map_err(|_| anyhow::anyhow!("clip loader closed"))?;

    if status == ClipStatus::Failed {
        anyhow::bail!("no clip source could be loaded");
    }

    println!("Clip loaded");
    if !no_play && loader.play() {
        // Cries are short; the playback thread stops when the loader drops
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    Ok(())
}

/// List the configured engine's voices
fn list_voices(config: &Config) -> anyhow::Result<()> {
    let tts = config.text_to_speech()?;
    let voices = tts.offered_voices();
    let preferred = preferred_voice(
        &voices,
        &config.synthesis.language,
        config.synthesis.voice.as_deref(),
    );

    for voice in &voices {
        let marker = if preferred == Some(voice) { "*" } else { " " };
        println!("{marker} {:<12} {}", voice.name, voice.lang);
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = playback.sample_rate();
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Arc<[f32]> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    tokio::task::spawn_blocking(move || {
        let stop = std::sync::atomic::AtomicBool::new(false);
        playback.play_blocking(samples, &stop)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
