//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use capmix_models::{CaptionStyle, EncodingConfig};

/// Where credit balances live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Process-local ledger, optionally seeded from a JSON file
    Memory { seed_file: Option<PathBuf> },
    /// Firestore `users` collection
    Firestore,
}

/// How checkout URLs are produced for users without access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutBackend {
    /// Stripe Checkout sessions (`STRIPE_*` variables)
    Stripe,
    /// Fixed hosted payment link
    PaymentLink(String),
    /// Nothing configured; denied users produce a billing error
    Disabled,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs composing/encoding at once
    pub max_concurrent_jobs: usize,
    /// Root for per-job scratch workspaces
    pub work_dir: PathBuf,
    /// Persisted uploads
    pub uploads_dir: PathBuf,
    /// Published outputs
    pub outputs_dir: PathBuf,
    /// Music presets
    pub presets_dir: PathBuf,
    pub ledger: LedgerBackend,
    pub checkout: CheckoutBackend,
    pub caption_style: CaptionStyle,
    pub encoding: EncodingConfig,
    /// Prometheus scrape address; exporter disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/capmix/work"),
            uploads_dir: PathBuf::from("/tmp/capmix/uploads"),
            outputs_dir: PathBuf::from("/tmp/capmix/outputs"),
            presets_dir: PathBuf::from("./presets"),
            ledger: LedgerBackend::Memory { seed_file: None },
            checkout: CheckoutBackend::Disabled,
            caption_style: CaptionStyle::default(),
            encoding: EncodingConfig::default(),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ledger = match env_string("LEDGER_BACKEND").as_deref() {
            Some("firestore") => LedgerBackend::Firestore,
            _ => LedgerBackend::Memory {
                seed_file: env_string("LEDGER_SEED_FILE").map(PathBuf::from),
            },
        };

        let checkout = if env_string("STRIPE_SECRET_KEY").is_some() {
            CheckoutBackend::Stripe
        } else if let Some(link) = env_string("PAYMENT_LINK_URL") {
            CheckoutBackend::PaymentLink(link)
        } else {
            CheckoutBackend::Disabled
        };

        let mut caption_style = defaults.caption_style.clone();
        if let Some(size) = env_parse("CAPTION_FONT_SIZE") {
            caption_style = caption_style.with_font_size(size);
        }
        if let Some(opacity) = env_parse("CAPTION_BOX_OPACITY") {
            caption_style = caption_style.with_box_opacity(opacity);
        }
        if let Some(font) = env_string("CAPTION_FONT_FILE") {
            caption_style = caption_style.with_font_file(font);
        }

        let mut encoding = defaults.encoding.clone();
        if let Some(crf) = env_parse("ENCODING_CRF") {
            encoding = encoding.with_crf(crf);
        }
        if let Some(preset) = env_string("ENCODING_PRESET") {
            encoding.preset = preset;
        }
        if let (Some(video), Some(audio)) = (env_string("ENCODING_VIDEO_CODEC"), env_string("ENCODING_AUDIO_CODEC")) {
            encoding = encoding.with_codecs(video, audio);
        }
        if env_parse::<bool>("ENCODING_NVENC").unwrap_or(false) {
            encoding = encoding.with_nvenc();
        }

        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: env_string("WORKER_WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            uploads_dir: env_string("CAPMIX_UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_dir),
            outputs_dir: env_string("CAPMIX_OUTPUTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.outputs_dir),
            presets_dir: env_string("CAPMIX_PRESETS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.presets_dir),
            ledger,
            checkout,
            caption_style,
            encoding,
            metrics_addr: env_parse("METRICS_ADDR"),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "LEDGER_BACKEND",
        "LEDGER_SEED_FILE",
        "STRIPE_SECRET_KEY",
        "PAYMENT_LINK_URL",
        "WORKER_MAX_JOBS",
        "METRICS_ADDR",
        "CAPTION_FONT_SIZE",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = WorkerConfig::from_env();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.ledger, LedgerBackend::Memory { seed_file: None });
        assert_eq!(config.checkout, CheckoutBackend::Disabled);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear();
        std::env::set_var("LEDGER_BACKEND", "firestore");
        std::env::set_var("PAYMENT_LINK_URL", "https://buy.stripe.com/test");
        std::env::set_var("WORKER_MAX_JOBS", "4");
        std::env::set_var("METRICS_ADDR", "0.0.0.0:9100");
        std::env::set_var("CAPTION_FONT_SIZE", "36");

        let config = WorkerConfig::from_env();
        assert_eq!(config.ledger, LedgerBackend::Firestore);
        assert_eq!(
            config.checkout,
            CheckoutBackend::PaymentLink("https://buy.stripe.com/test".to_string())
        );
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.metrics_addr, Some("0.0.0.0:9100".parse().unwrap()));
        assert_eq!(config.caption_style.font_size, 36);
        clear();
    }

    #[test]
    #[serial]
    fn test_stripe_takes_precedence() {
        clear();
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test");
        std::env::set_var("PAYMENT_LINK_URL", "https://buy.stripe.com/test");
        assert_eq!(WorkerConfig::from_env().checkout, CheckoutBackend::Stripe);
        clear();
    }

    #[test]
    #[serial]
    fn test_zero_jobs_ignored() {
        clear();
        std::env::set_var("WORKER_MAX_JOBS", "0");
        assert_eq!(WorkerConfig::from_env().max_concurrent_jobs, 2);
        clear();
    }
}
