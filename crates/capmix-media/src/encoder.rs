//! Encoder adapter.
//!
//! Everything that touches FFmpeg goes through `MediaEncoder`, so the
//! composition engine can run against an in-process fake in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use capmix_models::{AudioLayout, AudioStream, CaptionStyle, EncodingConfig, MediaAsset};
use tracing::{debug, info, warn};

use crate::audio_mix::build_audio_graph;
use crate::captions::build_caption_graph;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::anullsrc;
use crate::metrics::record_caption_overlays;
use crate::probe::{probe_audio, probe_media};
use crate::timeline::{AudioTrack, Timeline};

/// Sample rate the transcription service expects.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

/// Media operations backed by an external encoder.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Inspect a source file.
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset>;

    /// Inspect an audio file, such as a music bed.
    async fn probe_audio(&self, path: &Path) -> MediaResult<AudioStream>;

    /// Write the asset's audio as 16 kHz mono PCM WAV.
    async fn extract_audio(&self, asset: &MediaAsset, target: &Path) -> MediaResult<()>;

    /// Write `duration` seconds of silence in `layout` as a WAV file.
    async fn synthesize_silence(&self, duration: f64, layout: &AudioLayout, target: &Path) -> MediaResult<()>;

    /// Materialize a timeline to an MP4 file at `target`.
    ///
    /// On failure no file is left at `target`.
    async fn encode(&self, timeline: &Timeline, target: &Path, encoding: &EncodingConfig) -> MediaResult<()>;
}

/// `MediaEncoder` that shells out to ffmpeg/ffprobe.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    caption_style: CaptionStyle,
}

impl FfmpegEncoder {
    pub fn new(caption_style: CaptionStyle) -> Self {
        Self { caption_style }
    }

    pub fn caption_style(&self) -> &CaptionStyle {
        &self.caption_style
    }

    /// Build the ffmpeg invocation for a timeline.
    ///
    /// `text_files[i]` must hold the text of overlay `i`.
    pub fn build_encode_command(
        &self,
        timeline: &Timeline,
        text_files: &[PathBuf],
        output: &Path,
        encoding: &EncodingConfig,
    ) -> FfmpegCommand {
        let duration = timeline.duration();
        let mut cmd = FfmpegCommand::new(output).input(timeline.source_path());
        let mut graphs = Vec::new();

        let cues = timeline
            .overlays()
            .iter()
            .zip(text_files.iter().map(PathBuf::as_path));
        let video_map = match build_caption_graph(cues, &self.caption_style, "0:v:0", "vout") {
            Some(graph) => {
                graphs.push(graph);
                "[vout]".to_string()
            }
            None => "0:v:0".to_string(),
        };

        let audio_map = match timeline.audio() {
            AudioTrack::Mixed(bed) => {
                cmd = cmd.input(&bed.path);
                let narration = timeline.source().has_audio().then_some("0:a:0");
                graphs.push(build_audio_graph(
                    narration,
                    "1:a:0",
                    bed,
                    duration,
                    &timeline.audio_layout(),
                    "aout",
                ));
                Some("[aout]".to_string())
            }
            AudioTrack::Source => timeline.source().has_audio().then(|| "0:a:0".to_string()),
        };

        if !graphs.is_empty() {
            cmd = cmd.filter_complex(graphs.join(";"));
        }

        cmd = cmd.map(video_map);
        if let Some(audio_map) = &audio_map {
            cmd = cmd.map(audio_map.clone());
        }

        cmd.output_args(encoding.to_ffmpeg_args(audio_map.is_some()))
            .duration(duration)
    }

    async fn render(&self, timeline: &Timeline, output: &Path, encoding: &EncodingConfig) -> MediaResult<()> {
        // Caption text goes through files so no escaping of user text is needed
        let scratch = if timeline.overlays().is_empty() {
            None
        } else {
            Some(
                tempfile::Builder::new()
                    .prefix(".captions-")
                    .tempdir_in(parent_dir(output))?,
            )
        };

        let mut text_files = Vec::with_capacity(timeline.overlays().len());
        if let Some(scratch) = &scratch {
            for (i, overlay) in timeline.overlays().iter().enumerate() {
                let path = scratch.path().join(format!("cap-{:04}.txt", i));
                tokio::fs::write(&path, overlay.text.as_bytes()).await?;
                text_files.push(path);
            }
        }

        let cmd = self.build_encode_command(timeline, &text_files, output, encoding);
        let total = timeline.duration();

        FfmpegRunner::new()
            .with_operation("encode")
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    percent = progress.percentage(total),
                    speed = progress.speed,
                    eta_secs = progress.eta_seconds(total),
                    "Encode progress"
                );
            })
            .await?;

        record_caption_overlays(timeline.overlays().len());
        Ok(())
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset> {
        probe_media(path).await
    }

    async fn probe_audio(&self, path: &Path) -> MediaResult<AudioStream> {
        probe_audio(path).await
    }

    async fn extract_audio(&self, asset: &MediaAsset, target: &Path) -> MediaResult<()> {
        if !asset.has_audio() {
            return Err(MediaError::unsupported(asset.path(), "no audio stream to extract"));
        }

        let cmd = FfmpegCommand::new(target)
            .input(asset.path())
            .map("0:a:0")
            .no_video()
            .audio_channels(1)
            .audio_sample_rate(TRANSCRIPTION_SAMPLE_RATE)
            .audio_codec("pcm_s16le");

        FfmpegRunner::new()
            .with_operation("extract_audio")
            .run(&cmd)
            .await
    }

    async fn synthesize_silence(&self, duration: f64, layout: &AudioLayout, target: &Path) -> MediaResult<()> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(MediaError::encoding(format!("invalid silence duration {}", duration)));
        }

        let cmd = FfmpegCommand::new(target)
            .lavfi_input(anullsrc(layout))
            .duration(duration)
            .audio_codec("pcm_s16le");

        FfmpegRunner::new()
            .with_operation("synthesize_silence")
            .run(&cmd)
            .await
    }

    async fn encode(&self, timeline: &Timeline, target: &Path, encoding: &EncodingConfig) -> MediaResult<()> {
        let partial = partial_path(target);

        info!(
            source = %timeline.source_path().display(),
            target = %target.display(),
            overlays = timeline.overlays().len(),
            mixed = timeline.music().is_some(),
            "Encoding composed asset"
        );

        if let Err(e) = self.render(timeline, &partial, encoding).await {
            discard(&partial).await;
            discard(target).await;
            return Err(match e {
                MediaError::Encoding(_) => e,
                other => MediaError::encoding(other.to_string()),
            });
        }

        // Only a finished file ever appears at the target path
        if let Err(e) = tokio::fs::rename(&partial, target).await {
            discard(&partial).await;
            return Err(MediaError::encoding(format!(
                "failed to move encoded output into place: {}",
                e
            )));
        }

        Ok(())
    }
}

/// Sibling path the encoder writes to before the final rename.
fn partial_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    parent_dir(target).join(format!(".{}.partial.mp4", stem))
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Remove a file, ignoring "not found".
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
