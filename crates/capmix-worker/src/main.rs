//! Composition worker binary.
//!
//! Composes one local video for a user and prints the outcome as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capmix_models::{CaptionFailurePolicy, CompositionJob, CompositionRequest, MusicSource, DEFAULT_MUSIC_VOLUME};
use capmix_worker::metrics::init_metrics;
use capmix_worker::{JobExecutor, WorkerConfig};

#[derive(Debug, Parser)]
#[command(name = "capmix-worker", version, about = "Caption and music composition worker")]
struct Cli {
    /// Source video (MP4-compatible)
    input: PathBuf,

    /// Requesting user ID
    #[arg(long, env = "CAPMIX_USER")]
    user: String,

    /// Burn transcribed captions into the video
    #[arg(long)]
    captions: bool,

    /// Mix background music (silence when no music is given)
    #[arg(long)]
    music: bool,

    /// Music preset name
    #[arg(long, conflicts_with = "music_file")]
    preset: Option<String>,

    /// Music file
    #[arg(long)]
    music_file: Option<PathBuf>,

    /// Music gain in (0, 1]
    #[arg(long, default_value_t = DEFAULT_MUSIC_VOLUME)]
    volume: f32,

    /// Render without captions if transcription fails
    #[arg(long)]
    degrade_captions: bool,
}

impl Cli {
    fn request(&self) -> CompositionRequest {
        let mut request = CompositionRequest::new().with_music_volume(self.volume);

        if self.captions {
            request = request.with_captions();
        }

        let music = self
            .preset
            .clone()
            .map(MusicSource::Preset)
            .or_else(|| self.music_file.clone().map(MusicSource::File));
        if self.music || music.is_some() {
            request = request.with_music(music);
        }

        if self.degrade_captions {
            request = request.with_caption_failure(CaptionFailurePolicy::Degrade);
        }
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TLS for Stripe, Firestore and the transcription service
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
        info!(addr = %addr, "Prometheus exporter listening");
    }

    let executor = Arc::new(JobExecutor::from_config(config).await?);

    // Copy the input in as an upload; the job owns and removes it
    let extension = cli
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_string();
    let bytes = tokio::fs::read(&cli.input).await?;
    let upload = executor.uploads().persist(&bytes, &extension).await?;

    let job = CompositionJob::new(cli.user.clone(), upload.path, cli.request());
    let job_id = job.id.clone();

    match executor.spawn(job).await? {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            error!(job_id = %job_id, kind = e.kind(), "Job failed: {}", e);
            let report = serde_json::json!({
                "status": "failed",
                "job_id": job_id,
                "kind": e.kind(),
                "error": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(1);
        }
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("capmix=info,warn"));

    // Logs go to stderr; stdout carries the JSON outcome
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_implies_music() {
        let cli = Cli::parse_from(["capmix-worker", "in.mp4", "--user", "u1", "--preset", "lofi"]);
        let request = cli.request();
        assert!(request.add_music);
        assert_eq!(request.music, Some(MusicSource::Preset("lofi".to_string())));
        assert!(!request.add_captions);
    }

    #[test]
    fn test_plain_flags() {
        let cli = Cli::parse_from([
            "capmix-worker",
            "in.mp4",
            "--user",
            "u1",
            "--captions",
            "--music",
            "--volume",
            "0.5",
            "--degrade-captions",
        ]);
        let request = cli.request();
        assert!(request.add_captions && request.add_music);
        assert!(request.music.is_none());
        assert_eq!(request.caption_failure, CaptionFailurePolicy::Degrade);
        assert!((request.music_volume - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_preset_and_file_conflict() {
        let result = Cli::try_parse_from([
            "capmix-worker",
            "in.mp4",
            "--user",
            "u1",
            "--preset",
            "lofi",
            "--music-file",
            "a.mp3",
        ]);
        assert!(result.is_err());
    }
}
