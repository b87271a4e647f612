//! Job executor.
//!
//! One job: admit → workspace → probe → compose → encode → publish.
//! Admission runs before a concurrency permit is taken, so a user waiting
//! on a slow encode never holds up the admission of unrelated requests.

use std::sync::Arc;
use std::time::Instant;

use capmix_billing::{CheckoutProvider, DisabledCheckout, PaymentLinkCheckout, StripeCheckoutClient};
use capmix_firestore::{FirestoreClient, LedgerRepository};
use capmix_media::{FfmpegEncoder, MediaEncoder};
use capmix_ml_client::TranscriptionClient;
use capmix_models::{Admission, AdmissionBasis, CompositionJob, JobOutcome};
use capmix_storage::{JobWorkspace, PresetStore, UploadStore};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::access::{AccessGate, CreditLedger, FirestoreLedger, InMemoryLedger};
use crate::compose::CompositionEngine;
use crate::config::{CheckoutBackend, LedgerBackend, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{record_job_completed, record_job_failed};

/// Runs composition jobs end to end.
pub struct JobExecutor {
    config: WorkerConfig,
    gate: AccessGate,
    engine: CompositionEngine,
    encoder: Arc<dyn MediaEncoder>,
    uploads: UploadStore,
    job_semaphore: Arc<Semaphore>,
}

impl JobExecutor {
    /// Create an executor from already-constructed adapters.
    pub fn new(
        config: WorkerConfig,
        gate: AccessGate,
        engine: CompositionEngine,
        encoder: Arc<dyn MediaEncoder>,
        uploads: UploadStore,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            gate,
            engine,
            encoder,
            uploads,
            job_semaphore,
        }
    }

    /// Build every adapter from `config` and the environment.
    pub async fn from_config(config: WorkerConfig) -> WorkerResult<Self> {
        let ledger: Arc<dyn CreditLedger> = match &config.ledger {
            LedgerBackend::Memory { seed_file: Some(path) } => Arc::new(InMemoryLedger::from_file(path).await?),
            LedgerBackend::Memory { seed_file: None } => {
                warn!("In-memory ledger without seed file; every user is unknown");
                Arc::new(InMemoryLedger::default())
            }
            LedgerBackend::Firestore => {
                let client = FirestoreClient::from_env().await?;
                Arc::new(FirestoreLedger::new(LedgerRepository::new(client)))
            }
        };

        let checkout: Arc<dyn CheckoutProvider> = match &config.checkout {
            CheckoutBackend::Stripe => Arc::new(StripeCheckoutClient::from_env()?),
            CheckoutBackend::PaymentLink(link) => Arc::new(PaymentLinkCheckout::new(link)?),
            CheckoutBackend::Disabled => {
                warn!("No checkout configured; users without access will fail with a billing error");
                Arc::new(DisabledCheckout)
            }
        };

        let transcriber = TranscriptionClient::from_env()
            .map_err(|e| WorkerError::config_error(format!("transcription client: {}", e)))?;
        let encoder: Arc<dyn MediaEncoder> = Arc::new(FfmpegEncoder::new(config.caption_style.clone()));
        let engine = CompositionEngine::new(
            encoder.clone(),
            Arc::new(transcriber),
            PresetStore::new(&config.presets_dir),
        );
        let uploads = UploadStore::new(&config.uploads_dir, &config.outputs_dir);
        uploads.ensure_dirs().await?;

        Ok(Self::new(config, AccessGate::new(ledger, checkout), engine, encoder, uploads))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Run `job` on its own task.
    pub fn spawn(self: &Arc<Self>, job: CompositionJob) -> JoinHandle<WorkerResult<JobOutcome>> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.run_job(job).await })
    }

    /// Run one job to completion or failure.
    ///
    /// Payment-required is an outcome, not an error. A job input living in
    /// the uploads directory is deleted whichever way the job ends.
    pub async fn run_job(&self, job: CompositionJob) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(&job.id, &job.user_id, "compose");
        let span = logger.create_span();
        let started = Instant::now();

        let result = self.execute(&job, &logger).instrument(span).await;

        if job.input.starts_with(self.uploads.uploads_dir()) {
            if let Err(e) = self.uploads.remove(&job.input).await {
                logger.log_warning(&format!("failed to remove upload: {}", e));
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(JobOutcome::Completed { output, duration, .. }) => {
                record_job_completed(elapsed);
                logger.log_completion(&format!("{} ({:.3}s)", output.display(), duration));
            }
            Ok(JobOutcome::PaymentRequired { .. }) => {
                logger.log_progress("payment required");
            }
            Err(e) => {
                record_job_failed(e.kind(), elapsed);
                logger.log_failure(e.kind(), &e.to_string());
            }
        }
        result
    }

    async fn execute(&self, job: &CompositionJob, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        // Invalid requests never cost a credit
        job.request.check()?;

        logger.log_start(&format!(
            "captions={} music={}",
            job.request.add_captions, job.request.add_music
        ));

        match self.gate.admit(&job.user_id).await? {
            Admission::PaymentRequired { checkout_url } => {
                return Ok(JobOutcome::PaymentRequired {
                    job_id: job.id.clone(),
                    checkout_url,
                });
            }
            Admission::Admitted(AdmissionBasis::Credit { remaining }) => {
                logger.log_progress(&format!("admitted on credit, {} left", remaining));
            }
            Admission::Admitted(AdmissionBasis::Subscription) => {
                logger.log_progress("admitted by subscription");
            }
        }

        let _permit = self
            .job_semaphore
            .acquire()
            .await
            .map_err(|_| WorkerError::job_failed("executor is shutting down"))?;

        let workspace = JobWorkspace::create(&self.config.work_dir, job.id.as_str()).await?;

        let source = self.encoder.probe(&job.input).await?;
        info!(
            duration = source.duration,
            has_audio = source.has_audio(),
            width = source.video.width,
            height = source.video.height,
            "Probed source"
        );

        let timeline = self.engine.compose(source, &job.request, &workspace).await?;
        logger.log_progress(&format!(
            "composed {} overlays, music={}",
            timeline.overlays().len(),
            timeline.music().is_some()
        ));

        let encoded = workspace.encoded_output();
        self.encoder
            .encode(&timeline, &encoded, &self.config.encoding)
            .await?;

        let output = self.uploads.publish(&encoded, &job.id).await?;

        if let Err(e) = workspace.close().await {
            logger.log_warning(&format!("workspace cleanup failed: {}", e));
        }

        Ok(JobOutcome::Completed {
            job_id: job.id.clone(),
            output,
            duration: timeline.duration(),
        })
    }
}
