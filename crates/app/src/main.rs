use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bitwave_core::{
    AppConfig, BitwaveError, CpalOutput, Decoded, PlaybackEngine, PlaybackEvent, PlaybackState,
};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;

fn main() -> bitwave_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Info { file, json } => run_info(&file, json),
        Commands::Waveform {
            file,
            channel,
            width,
        } => run_waveform(
            &file,
            channel.unwrap_or(config.waveform.channel),
            width.unwrap_or(config.waveform.width),
        ),
        Commands::Play { file, volume } => run_play(&file, volume, &config),
        Commands::SetBpm {
            input,
            output,
            bpm,
            clear,
        } => run_set_bpm(&input, &output, bpm, clear),
    }
}

fn read_file(path: &Path) -> bitwave_core::Result<Decoded> {
    let bytes = std::fs::read(path)?;
    let decoded = bitwave_core::decode(&bytes)?;
    if !decoded.header.is_supported_version() {
        tracing::warn!(
            ?path,
            version = decoded.header.version,
            "file written by a newer format version"
        );
    }
    Ok(decoded)
}

fn run_info(path: &Path, json: bool) -> bitwave_core::Result<()> {
    let Decoded {
        header,
        metadata,
        buffer,
    } = read_file(path)?;

    if json {
        let info = serde_json::json!({
            "header": header,
            "frames": buffer.frame_count(),
            "spatial": metadata.spatial,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Bitwave File Information:");
    println!("Version: {}", header.version);
    println!("Sample Rate: {} Hz", header.sample_rate);
    println!("Channels: {}", header.channels);
    println!("Frames: {}", buffer.frame_count());
    println!("Duration: {:.2} seconds", buffer.duration_seconds());
    if let Some(bpm) = header.bpm {
        println!("BPM: {bpm}");
    }
    if let Some(spatial) = &metadata.spatial {
        for (channel, position) in spatial.iter().enumerate() {
            println!(
                "Channel {channel} position: ({}, {}, {})",
                position.x, position.y, position.z
            );
        }
    }
    Ok(())
}

fn run_waveform(path: &Path, channel: usize, width: usize) -> bitwave_core::Result<()> {
    let decoded = read_file(path)?;
    let peaks = bitwave_core::summarize(&decoded.buffer, channel, width)?;
    println!("{}", serde_json::to_string(&peaks)?);
    Ok(())
}

fn run_play(path: &Path, volume: Option<f32>, config: &AppConfig) -> bitwave_core::Result<()> {
    let decoded = read_file(path)?;
    let device = CpalOutput::default_device()?;
    let mut engine = PlaybackEngine::with_config(device, &config.playback);
    if let Some(volume) = volume {
        engine.set_volume(volume);
    }

    let events = engine.events();
    engine.load(Arc::new(decoded.buffer), decoded.metadata)?;
    engine.play()?;

    let sample_rate = decoded.header.sample_rate as f64;
    let duration = engine.duration_seconds();
    let mut last_report = 0.0;
    loop {
        match events.recv_timeout(Duration::from_millis(500)) {
            Ok(PlaybackEvent::PositionChanged(frame)) => {
                let seconds = frame as f64 / sample_rate;
                if (seconds - last_report).abs() >= 1.0 {
                    last_report = seconds;
                    tracing::info!("{seconds:.1}s / {duration:.1}s");
                }
            }
            Ok(PlaybackEvent::PlaybackFinished) => break,
            Err(RecvTimeoutError::Timeout) if engine.state() != PlaybackState::Playing => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.stop();
    tracing::info!(?path, "playback finished");
    Ok(())
}

fn run_set_bpm(
    input: &Path,
    output: &Path,
    bpm: Option<f32>,
    clear: bool,
) -> bitwave_core::Result<()> {
    let Decoded {
        mut metadata,
        buffer,
        ..
    } = read_file(input)?;

    metadata.bpm = match (bpm, clear) {
        (Some(bpm), false) => Some(bpm),
        (None, true) => None,
        _ => return Err(BitwaveError::msg("pass exactly one of --bpm or --clear")),
    };

    let bytes = bitwave_core::encode(&buffer, &metadata)?;
    std::fs::write(output, bytes)?;
    tracing::info!(?input, ?output, bpm = ?metadata.bpm, "rewrote bpm");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Bitwave audio format tools", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the header of a Bitwave file.
    Info {
        file: PathBuf,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print a min/max envelope of one channel as JSON.
    Waveform {
        file: PathBuf,
        #[arg(long)]
        channel: Option<usize>,
        /// Number of (min, max) pairs to produce.
        #[arg(long)]
        width: Option<usize>,
    },
    /// Stream a file to the default output device.
    Play {
        file: PathBuf,
        /// Output gain between 0.0 and 1.0.
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Rewrite a file with a new or removed BPM value.
    SetBpm {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        bpm: Option<f32>,
        /// Remove the BPM field entirely.
        #[arg(long, conflicts_with = "bpm")]
        clear: bool,
    },
}
