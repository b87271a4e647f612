use std::path::Path;

use capmix_firestore::FirestoreConfig;
use capmix_media::{check_ffmpeg, check_ffprobe};
use capmix_ml_client::TranscriptionClient;
use capmix_storage::PresetStore;
use capmix_worker::{CheckoutBackend, LedgerBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    for dir in [&config.work_dir, &config.uploads_dir, &config.outputs_dir] {
        ensure_dir(dir).await?;
    }

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("{}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("worker-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    let presets = PresetStore::new(&config.presets_dir).list().await?;
    println!("worker-selfcheck: {} music presets", presets.len());

    if let LedgerBackend::Memory { seed_file: Some(path) } = &config.ledger {
        if !path.exists() {
            return Err(anyhow::anyhow!("ledger seed file {} not found", path.display()));
        }
    }
    if config.ledger == LedgerBackend::Firestore {
        let firestore = FirestoreConfig::from_env()?;
        println!("worker-selfcheck: firestore project={}", firestore.project_id);
    }
    if config.checkout == CheckoutBackend::Stripe {
        ensure_env_present(&["STRIPE_PRICE_ID"])?;
    }
    if config.checkout == CheckoutBackend::Disabled {
        println!("worker-selfcheck: warning: no checkout backend configured");
    }

    let transcription = TranscriptionClient::from_env()?;
    if !transcription.health_check().await? {
        return Err(anyhow::anyhow!(
            "transcription service at {} is not healthy",
            transcription.config().base_url
        ));
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
