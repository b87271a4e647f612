//! Composition engine.
//!
//! Turns one probed source plus a request into a `Timeline`. Transforms run
//! in a fixed order: the original audio is transcribed first (so music is
//! never transcribed), then the music bed is mixed, then captions are laid
//! over the video. The encoder materializes the result afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use capmix_media::{mix_music, overlay_captions, MediaEncoder, MusicBed, Timeline};
use capmix_ml_client::Transcriber;
use capmix_models::{
    normalize_segments, CaptionFailurePolicy, CompositionRequest, MediaAsset, MusicSource, TranscriptSegment,
};
use capmix_storage::{JobWorkspace, PresetStore};
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics::{record_captions_degraded, record_music_fallback};

/// Applies the requested transforms to a source asset.
///
/// Constructed once at startup; every dependency is shared read-only.
#[derive(Clone)]
pub struct CompositionEngine {
    encoder: Arc<dyn MediaEncoder>,
    transcriber: Arc<dyn Transcriber>,
    presets: PresetStore,
}

impl CompositionEngine {
    pub fn new(encoder: Arc<dyn MediaEncoder>, transcriber: Arc<dyn Transcriber>, presets: PresetStore) -> Self {
        Self {
            encoder,
            transcriber,
            presets,
        }
    }

    /// Compose `source` according to `request`.
    ///
    /// Scratch files (extracted narration, synthesized silence) go into
    /// `workspace`. The returned timeline always has the source duration.
    pub async fn compose(
        &self,
        source: MediaAsset,
        request: &CompositionRequest,
        workspace: &JobWorkspace,
    ) -> WorkerResult<Timeline> {
        request.check()?;

        let segments = if request.add_captions {
            self.caption_segments(&source, request.caption_failure, workspace)
                .await?
        } else {
            Vec::new()
        };

        let mut timeline = Timeline::from_source(source);

        if request.add_music {
            let bed = self.music_bed(&timeline, request, workspace).await?;
            timeline = mix_music(timeline, bed);
        }

        if request.add_captions {
            timeline = overlay_captions(timeline, &segments);
        }

        debug!(
            duration = timeline.duration(),
            overlays = timeline.overlays().len(),
            mixed = timeline.music().is_some(),
            "Composed timeline"
        );
        Ok(timeline)
    }

    /// Transcribe the source's own audio, honoring the failure policy.
    async fn caption_segments(
        &self,
        source: &MediaAsset,
        policy: CaptionFailurePolicy,
        workspace: &JobWorkspace,
    ) -> WorkerResult<Vec<TranscriptSegment>> {
        if !source.has_audio() {
            info!(source = %source.path().display(), "Source has no audio; no captions to render");
            return Ok(Vec::new());
        }

        match self.transcribe(source, workspace).await {
            Ok(segments) => Ok(segments),
            Err(e) if policy == CaptionFailurePolicy::Degrade => {
                warn!(error = %e, "Transcription failed; continuing without captions");
                record_captions_degraded();
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn transcribe(&self, source: &MediaAsset, workspace: &JobWorkspace) -> WorkerResult<Vec<TranscriptSegment>> {
        let audio = workspace.transcription_audio();

        // The engine cannot process what we cannot extract
        self.encoder
            .extract_audio(source, &audio)
            .await
            .map_err(|e| WorkerError::TranscriptionUnavailable(format!("audio extraction failed: {}", e)))?;

        let raw = self.transcriber.transcribe(&audio).await?;
        let raw_count = raw.len();
        let segments = normalize_segments(raw, source.duration);

        if segments.len() != raw_count {
            debug!(raw = raw_count, kept = segments.len(), "Dropped out-of-range transcript segments");
        }
        info!(segments = segments.len(), "Transcribed source audio");
        Ok(segments)
    }

    /// Music bed for the request, falling back to silence when the music
    /// cannot be found or decoded.
    async fn music_bed(
        &self,
        timeline: &Timeline,
        request: &CompositionRequest,
        workspace: &JobWorkspace,
    ) -> WorkerResult<MusicBed> {
        let path = match &request.music {
            None => self.silence(timeline, workspace).await?,
            Some(source) => match self.locate_music(source).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Falling back to synthesized silence");
                    record_music_fallback();
                    self.silence(timeline, workspace).await?
                }
            },
        };

        Ok(MusicBed::new(path, request.music_volume))
    }

    async fn locate_music(&self, source: &MusicSource) -> WorkerResult<PathBuf> {
        let path = match source {
            MusicSource::Preset(name) => self
                .presets
                .resolve(name)
                .await
                .map_err(|e| WorkerError::music_missing(e.to_string()))?,
            MusicSource::File(path) => path.clone(),
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            Ok(_) => return Err(WorkerError::music_missing(format!("{} is empty", path.display()))),
            Err(e) => return Err(WorkerError::music_missing(format!("{}: {}", path.display(), e))),
        }

        // An undecodable bed would otherwise only fail at encode time
        let audio = self
            .encoder
            .probe_audio(&path)
            .await
            .map_err(|e| WorkerError::music_missing(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), codec = %audio.codec, "Located music bed");
        Ok(path)
    }

    async fn silence(&self, timeline: &Timeline, workspace: &JobWorkspace) -> WorkerResult<PathBuf> {
        let target = workspace.silence_track();
        let layout = timeline.audio_layout();
        self.encoder
            .synthesize_silence(timeline.duration(), &layout, &target)
            .await?;
        debug!(
            duration = timeline.duration(),
            sample_rate = layout.sample_rate,
            channel_layout = %layout.channel_layout,
            "Synthesized silence bed"
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capmix_media::{AudioTrack, MediaError, MediaResult};
    use capmix_ml_client::{MlError, MlResult};
    use capmix_models::{AudioLayout, AudioStream, EncodingConfig, VideoStream};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaEncoder for RecordingEncoder {
        async fn probe(&self, _path: &Path) -> MediaResult<MediaAsset> {
            unreachable!("engine never probes the source")
        }

        async fn probe_audio(&self, path: &Path) -> MediaResult<AudioStream> {
            self.calls.lock().unwrap().push("probe_audio".to_string());
            if std::fs::read(path)?.starts_with(b"ID3") {
                Ok(AudioStream {
                    sample_rate: 44_100,
                    channels: 2,
                    channel_layout: "stereo".to_string(),
                    codec: "mp3".to_string(),
                })
            } else {
                Err(MediaError::unsupported(path, "invalid data found when processing input"))
            }
        }

        async fn extract_audio(&self, _asset: &MediaAsset, target: &Path) -> MediaResult<()> {
            self.calls.lock().unwrap().push("extract_audio".to_string());
            std::fs::write(target, b"wav")?;
            Ok(())
        }

        async fn synthesize_silence(&self, duration: f64, layout: &AudioLayout, target: &Path) -> MediaResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("silence {:.1} {}", duration, layout.sample_rate));
            std::fs::write(target, b"wav")?;
            Ok(())
        }

        async fn encode(&self, _timeline: &Timeline, _target: &Path, _encoding: &EncodingConfig) -> MediaResult<()> {
            unreachable!("engine never encodes")
        }
    }

    struct StaticTranscriber(MlResult<Vec<TranscriptSegment>>);

    #[async_trait]
    impl Transcriber for StaticTranscriber {
        async fn transcribe(&self, audio_path: &Path) -> MlResult<Vec<TranscriptSegment>> {
            assert!(audio_path.exists());
            match &self.0 {
                Ok(segments) => Ok(segments.clone()),
                Err(_) => Err(MlError::unavailable("corrupt stream")),
            }
        }
    }

    fn source(duration: f64, with_audio: bool) -> MediaAsset {
        MediaAsset {
            path: PathBuf::from("/uploads/in.mp4"),
            duration,
            video: VideoStream {
                width: 1280,
                height: 720,
                fps: 30.0,
                codec: "h264".to_string(),
            },
            audio: with_audio.then(|| AudioStream {
                sample_rate: 48_000,
                channels: 2,
                channel_layout: "stereo".to_string(),
                codec: "aac".to_string(),
            }),
        }
    }

    struct Fixture {
        engine: CompositionEngine,
        encoder: Arc<RecordingEncoder>,
        workspace: JobWorkspace,
        presets: tempfile::TempDir,
        _root: tempfile::TempDir,
    }

    async fn fixture(transcript: MlResult<Vec<TranscriptSegment>>) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let presets = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let engine = CompositionEngine::new(
            encoder.clone(),
            Arc::new(StaticTranscriber(transcript)),
            PresetStore::new(presets.path()),
        );
        let workspace = JobWorkspace::create(root.path(), "t").await.unwrap();
        Fixture {
            engine,
            encoder,
            workspace,
            presets,
            _root: root,
        }
    }

    fn calls(f: &Fixture) -> Vec<String> {
        f.encoder.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_transcribes_before_mixing() {
        let f = fixture(Ok(vec![TranscriptSegment::new(0.0, 2.5, "hello")])).await;
        let request = CompositionRequest::new().with_captions().with_music(None);

        let timeline = f.engine.compose(source(10.0, true), &request, &f.workspace).await.unwrap();

        assert_eq!(calls(&f), vec!["extract_audio", "silence 10.0 48000"]);
        assert_eq!(timeline.overlays().len(), 1);
        assert!(timeline.music().is_some());
    }

    #[tokio::test]
    async fn test_segments_normalized_to_duration() {
        let f = fixture(Ok(vec![
            TranscriptSegment::new(4.0, 6.0, " second "),
            TranscriptSegment::new(0.0, 1.0, "first"),
            TranscriptSegment::new(4.5, 9.0, "clamped"),
            TranscriptSegment::new(7.0, 8.0, "past the end"),
        ]))
        .await;
        let request = CompositionRequest::new().with_captions();

        let timeline = f.engine.compose(source(5.0, true), &request, &f.workspace).await.unwrap();
        let texts: Vec<_> = timeline.overlays().iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "clamped"]);
        assert_eq!(timeline.overlays()[2].end, 5.0);
    }

    #[tokio::test]
    async fn test_transcription_failure_propagates() {
        let f = fixture(Err(MlError::unavailable("x"))).await;
        let request = CompositionRequest::new().with_captions().with_music(None);

        let err = f
            .engine
            .compose(source(10.0, true), &request, &f.workspace)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transcription_unavailable");
    }

    #[tokio::test]
    async fn test_transcription_failure_degrades_when_asked() {
        let f = fixture(Err(MlError::unavailable("x"))).await;
        let request = CompositionRequest::new()
            .with_captions()
            .with_music(None)
            .with_caption_failure(CaptionFailurePolicy::Degrade);

        let timeline = f.engine.compose(source(10.0, true), &request, &f.workspace).await.unwrap();
        assert!(timeline.overlays().is_empty());
        assert!(timeline.music().is_some());
    }

    #[tokio::test]
    async fn test_silent_source_gets_no_captions() {
        let f = fixture(Ok(vec![TranscriptSegment::new(0.0, 1.0, "never")])).await;
        let request = CompositionRequest::new().with_captions();

        let timeline = f.engine.compose(source(3.0, false), &request, &f.workspace).await.unwrap();
        assert!(timeline.overlays().is_empty());
        assert!(calls(&f).is_empty());
    }

    #[tokio::test]
    async fn test_missing_preset_falls_back_to_silence() {
        let f = fixture(Ok(vec![])).await;
        let request = CompositionRequest::new().with_music(Some(MusicSource::Preset("jazz".to_string())));

        let timeline = f.engine.compose(source(5.0, false), &request, &f.workspace).await.unwrap();

        // Silent source: silence follows the default layout
        assert_eq!(calls(&f), vec!["silence 5.0 44100"]);
        assert_eq!(timeline.music().unwrap().path, f.workspace.silence_track());
    }

    #[tokio::test]
    async fn test_preset_is_resolved() {
        let f = fixture(Ok(vec![])).await;
        std::fs::write(f.presets.path().join("lofi.mp3"), b"ID3\x04").unwrap();
        let request = CompositionRequest::new()
            .with_music(Some(MusicSource::Preset("lofi".to_string())))
            .with_music_volume(0.5);

        let timeline = f.engine.compose(source(5.0, true), &request, &f.workspace).await.unwrap();

        assert_eq!(calls(&f), vec!["probe_audio"]);
        match timeline.audio() {
            AudioTrack::Mixed(bed) => {
                assert_eq!(bed.path, f.presets.path().join("lofi.mp3"));
                assert!((bed.volume - 0.5).abs() < f32::EPSILON);
            }
            AudioTrack::Source => panic!("expected a mixed track"),
        }
    }

    #[tokio::test]
    async fn test_empty_music_file_falls_back() {
        let f = fixture(Ok(vec![])).await;
        let empty = f.presets.path().join("empty.wav");
        std::fs::write(&empty, b"").unwrap();
        let request = CompositionRequest::new().with_music(Some(MusicSource::File(empty)));

        f.engine.compose(source(5.0, true), &request, &f.workspace).await.unwrap();
        assert_eq!(calls(&f), vec!["silence 5.0 48000"]);
    }

    #[tokio::test]
    async fn test_undecodable_music_falls_back() {
        let f = fixture(Ok(vec![])).await;
        let garbage = f.presets.path().join("garbage.mp3");
        std::fs::write(&garbage, b"this is not audio at all").unwrap();
        let request = CompositionRequest::new().with_music(Some(MusicSource::File(garbage)));

        let timeline = f.engine.compose(source(5.0, true), &request, &f.workspace).await.unwrap();

        assert_eq!(calls(&f), vec!["probe_audio", "silence 5.0 48000"]);
        assert_eq!(timeline.music().unwrap().path, f.workspace.silence_track());
    }

    #[tokio::test]
    async fn test_passthrough() {
        let f = fixture(Ok(vec![])).await;
        let timeline = f
            .engine
            .compose(source(7.5, true), &CompositionRequest::new(), &f.workspace)
            .await
            .unwrap();

        assert!(timeline.is_passthrough());
        assert_eq!(timeline.duration(), 7.5);
        assert!(calls(&f).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_volume_rejected() {
        let f = fixture(Ok(vec![])).await;
        let request = CompositionRequest::new().with_music(None).with_music_volume(0.0);
        let err = f
            .engine
            .compose(source(5.0, true), &request, &f.workspace)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }
}
