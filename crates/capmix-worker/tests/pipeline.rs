//! End-to-end job tests against in-process fakes for the encoder,
//! transcriber and checkout provider.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capmix_billing::PaymentLinkCheckout;
use capmix_media::{MediaEncoder, MediaError, MediaResult, Timeline};
use capmix_ml_client::{MlResult, Transcriber};
use capmix_models::{
    AudioLayout, AudioStream, CompositionJob, CompositionRequest, EncodingConfig, JobOutcome, LedgerEntry,
    MediaAsset, MusicSource, TranscriptSegment, VideoStream,
};
use capmix_storage::{PresetStore, UploadStore};
use capmix_worker::{AccessGate, CompositionEngine, CreditLedger, InMemoryLedger, JobExecutor, WorkerConfig};

#[derive(Default)]
struct FakeEncoder {
    duration: f64,
    with_audio: bool,
    fail_encode: bool,
    silences: Mutex<Vec<(f64, AudioLayout)>>,
    encoded: Mutex<Vec<Timeline>>,
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        if std::fs::read(path)? == b"garbage" {
            return Err(MediaError::unsupported(path, "invalid data found when processing input"));
        }
        Ok(MediaAsset {
            path: path.to_path_buf(),
            duration: self.duration,
            video: VideoStream {
                width: 1080,
                height: 1920,
                fps: 30.0,
                codec: "h264".to_string(),
            },
            audio: self.with_audio.then(|| AudioStream {
                sample_rate: 44_100,
                channels: 2,
                channel_layout: "stereo".to_string(),
                codec: "aac".to_string(),
            }),
        })
    }

    async fn probe_audio(&self, path: &Path) -> MediaResult<AudioStream> {
        if std::fs::read(path)? == b"garbage" {
            return Err(MediaError::unsupported(path, "invalid data found when processing input"));
        }
        Ok(AudioStream {
            sample_rate: 44_100,
            channels: 2,
            channel_layout: "stereo".to_string(),
            codec: "mp3".to_string(),
        })
    }

    async fn extract_audio(&self, _asset: &MediaAsset, target: &Path) -> MediaResult<()> {
        std::fs::write(target, b"RIFF")?;
        Ok(())
    }

    async fn synthesize_silence(&self, duration: f64, layout: &AudioLayout, target: &Path) -> MediaResult<()> {
        self.silences.lock().unwrap().push((duration, layout.clone()));
        std::fs::write(target, b"RIFF")?;
        Ok(())
    }

    async fn encode(&self, timeline: &Timeline, target: &Path, _encoding: &EncodingConfig) -> MediaResult<()> {
        if self.fail_encode {
            return Err(MediaError::encoding("Unknown encoder 'libx264'"));
        }
        // Scratch files must still be around while encoding
        if let Some(bed) = timeline.music() {
            assert!(bed.path.exists());
        }
        self.encoded.lock().unwrap().push(timeline.clone());
        std::fs::write(target, b"mp4")?;
        Ok(())
    }
}

struct FakeTranscriber(Vec<TranscriptSegment>);

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> MlResult<Vec<TranscriptSegment>> {
        Ok(self.0.clone())
    }
}

struct Harness {
    executor: Arc<JobExecutor>,
    ledger: Arc<InMemoryLedger>,
    encoder: Arc<FakeEncoder>,
    root: tempfile::TempDir,
}

impl Harness {
    fn new(encoder: FakeEncoder, transcript: Vec<TranscriptSegment>, entries: Vec<LedgerEntry>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            work_dir: root.path().join("work"),
            uploads_dir: root.path().join("uploads"),
            outputs_dir: root.path().join("outputs"),
            presets_dir: root.path().join("presets"),
            ..Default::default()
        };

        let encoder = Arc::new(encoder);
        let ledger = Arc::new(InMemoryLedger::new(entries));
        let checkout = Arc::new(PaymentLinkCheckout::new("https://buy.stripe.com/test_123").unwrap());
        let engine = CompositionEngine::new(
            encoder.clone(),
            Arc::new(FakeTranscriber(transcript)),
            PresetStore::new(&config.presets_dir),
        );
        let uploads = UploadStore::new(&config.uploads_dir, &config.outputs_dir);
        let executor = JobExecutor::new(
            config,
            AccessGate::new(ledger.clone(), checkout),
            engine,
            encoder.clone(),
            uploads,
        );

        Self {
            executor: Arc::new(executor),
            ledger,
            encoder,
            root,
        }
    }

    async fn job(&self, user: &str, request: CompositionRequest) -> CompositionJob {
        let upload = self.executor.uploads().persist(b"source", "mp4").await.unwrap();
        CompositionJob::new(user, upload.path, request)
    }

    async fn credits(&self, user: &str) -> u32 {
        self.ledger.entry(user).await.unwrap().unwrap().free_credits
    }

    fn encoded(&self) -> Vec<Timeline> {
        self.encoder.encoded.lock().unwrap().clone()
    }

    fn dir_is_empty(&self, name: &str) -> bool {
        let dir = self.root.path().join(name);
        !dir.exists() || std::fs::read_dir(dir).unwrap().next().is_none()
    }
}

fn source(duration: f64) -> FakeEncoder {
    FakeEncoder {
        duration,
        with_audio: true,
        ..Default::default()
    }
}

fn completed(outcome: &JobOutcome) -> (&PathBuf, f64) {
    match outcome {
        JobOutcome::Completed { output, duration, .. } => (output, *duration),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_last_credit_admits_exactly_one_job() {
    let h = Harness::new(source(4.0), vec![], vec![LedgerEntry::new("u1", 1, false)]);

    let first = h.executor.spawn(h.job("u1", CompositionRequest::new()).await);
    let second = h.executor.spawn(h.job("u1", CompositionRequest::new()).await);
    let outcomes = vec![first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];

    let admitted = outcomes
        .iter()
        .filter(|o| matches!(o, JobOutcome::Completed { .. }))
        .count();
    let denied: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            JobOutcome::PaymentRequired { checkout_url, .. } => Some(checkout_url.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(admitted, 1);
    assert_eq!(denied, vec!["https://buy.stripe.com/test_123?client_reference_id=u1".to_string()]);
    assert_eq!(h.credits("u1").await, 0);
    assert_eq!(h.encoded().len(), 1);
}

#[tokio::test]
async fn test_subscriber_always_admitted_and_never_charged() {
    let h = Harness::new(source(4.0), vec![], vec![LedgerEntry::new("sub", 0, true)]);

    let handles: Vec<_> = {
        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(h.executor.spawn(h.job("sub", CompositionRequest::new()).await));
        }
        handles
    };
    for handle in handles {
        completed(&handle.await.unwrap().unwrap());
    }

    assert_eq!(
        h.ledger.entry("sub").await.unwrap(),
        Some(LedgerEntry::new("sub", 0, true))
    );
}

#[tokio::test]
async fn test_ten_second_clip_with_one_caption() {
    let h = Harness::new(
        source(10.0),
        vec![TranscriptSegment::new(0.0, 2.5, "hello")],
        vec![LedgerEntry::new("u1", 3, false)],
    );

    let job = h.job("u1", CompositionRequest::new().with_captions()).await;
    let outcome = h.executor.run_job(job).await.unwrap();
    let (output, duration) = completed(&outcome);

    assert_eq!(duration, 10.0);
    assert!(output.exists());

    let timeline = &h.encoded()[0];
    assert_eq!(timeline.duration(), 10.0);
    assert_eq!(timeline.overlays().len(), 1);
    let overlay = &timeline.overlays()[0];
    assert_eq!((overlay.start, overlay.end, overlay.text.as_str()), (0.0, 2.5, "hello"));
    assert!(overlay.is_visible_at(0.0));
    assert!(overlay.is_visible_at(2.4));
    assert!(!overlay.is_visible_at(2.5));
    assert_eq!(h.credits("u1").await, 2);
}

#[tokio::test]
async fn test_five_second_clip_with_silence_bed() {
    let h = Harness::new(source(5.0), vec![], vec![LedgerEntry::new("u1", 1, false)]);

    let request = CompositionRequest::new().with_music(None).with_music_volume(0.2);
    let outcome = h.executor.run_job(h.job("u1", request).await).await.unwrap();
    assert_eq!(completed(&outcome).1, 5.0);

    let silences = h.encoder.silences.lock().unwrap().clone();
    assert_eq!(silences, vec![(5.0, AudioLayout::default())]);

    let timeline = &h.encoded()[0];
    let bed = timeline.music().unwrap();
    assert!((bed.volume - 0.2).abs() < f32::EPSILON);
    assert!(timeline.overlays().is_empty());
    assert_eq!(timeline.duration(), 5.0);
}

#[tokio::test]
async fn test_undecodable_music_still_completes() {
    let h = Harness::new(source(6.0), vec![], vec![LedgerEntry::new("u1", 1, false)]);
    let music = h.root.path().join("broken.mp3");
    std::fs::write(&music, b"garbage").unwrap();

    let request = CompositionRequest::new().with_music(Some(MusicSource::File(music)));
    let outcome = h.executor.run_job(h.job("u1", request).await).await.unwrap();
    assert_eq!(completed(&outcome).1, 6.0);

    let silences = h.encoder.silences.lock().unwrap().clone();
    assert_eq!(silences.len(), 1);
    assert_eq!(silences[0].0, 6.0);
    assert_eq!(h.encoded()[0].music().unwrap().path.file_name().unwrap(), "silence.wav");
    assert_eq!(h.credits("u1").await, 0);
}

#[tokio::test]
async fn test_passthrough_preserves_duration_and_cleans_up() {
    let h = Harness::new(source(7.25), vec![], vec![LedgerEntry::new("u1", 1, false)]);

    let job = h.job("u1", CompositionRequest::new()).await;
    let input = job.input.clone();
    let outcome = h.executor.run_job(job).await.unwrap();

    let (output, duration) = completed(&outcome);
    assert_eq!(duration, 7.25);
    assert_eq!(std::fs::read(output).unwrap(), b"mp4");
    assert!(h.encoded()[0].is_passthrough());

    assert!(!input.exists());
    assert!(h.dir_is_empty("work"));
    assert!(h.dir_is_empty("uploads"));
}

#[tokio::test]
async fn test_encode_failure_leaves_nothing_behind() {
    let encoder = FakeEncoder {
        fail_encode: true,
        ..source(5.0)
    };
    let h = Harness::new(encoder, vec![], vec![LedgerEntry::new("u1", 2, false)]);

    let job = h.job("u1", CompositionRequest::new().with_music(None)).await;
    let err = h.executor.run_job(job).await.unwrap_err();

    assert_eq!(err.kind(), "encoding");
    assert!(h.dir_is_empty("work"));
    assert!(h.dir_is_empty("uploads"));
    assert!(h.dir_is_empty("outputs"));
}

#[tokio::test]
async fn test_undecodable_source() {
    let h = Harness::new(source(5.0), vec![], vec![LedgerEntry::new("u1", 1, false)]);

    let upload = h.executor.uploads().persist(b"garbage", "mp4").await.unwrap();
    let job = CompositionJob::new("u1", upload.path, CompositionRequest::new());
    let err = h.executor.run_job(job).await.unwrap_err();

    assert_eq!(err.kind(), "unsupported_media");
    assert!(h.dir_is_empty("outputs"));
    assert!(h.dir_is_empty("work"));
}

#[tokio::test]
async fn test_invalid_request_costs_nothing() {
    let h = Harness::new(source(5.0), vec![], vec![LedgerEntry::new("u1", 1, false)]);

    let request = CompositionRequest::new().with_music(None).with_music_volume(3.0);
    let err = h.executor.run_job(h.job("u1", request).await).await.unwrap_err();

    assert_eq!(err.kind(), "invalid_request");
    assert_eq!(h.credits("u1").await, 1);
}

#[tokio::test]
async fn test_unknown_user() {
    let h = Harness::new(source(5.0), vec![], vec![]);

    let err = h
        .executor
        .run_job(h.job("ghost", CompositionRequest::new()).await)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "unknown_user");
    assert!(h.encoded().is_empty());
}
