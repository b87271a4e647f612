//! FFprobe source inspection.

use std::path::Path;
use std::process::Stdio;

use capmix_models::asset::DEFAULT_CHANNEL_LAYOUT;
use capmix_models::{AudioStream, MediaAsset, VideoStream};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
}

/// Probe a source file into a `MediaAsset`.
///
/// Anything that prevents the file from being treated as a decodable
/// video (missing file, ffprobe rejection, no video stream, unusable
/// duration) is reported as `UnsupportedMedia`.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaAsset> {
    let path = path.as_ref();
    let stdout = run_ffprobe(path).await?;

    let asset = parse_probe_output(path, &stdout)?;
    debug!(
        path = %path.display(),
        duration = asset.duration,
        has_audio = asset.has_audio(),
        "Probed source"
    );
    Ok(asset)
}

/// Probe an audio-only file (a music bed) for its first audio stream.
///
/// Fails with `UnsupportedMedia` when ffprobe cannot read the file or it
/// carries no audio stream.
pub async fn probe_audio(path: impl AsRef<Path>) -> MediaResult<AudioStream> {
    let path = path.as_ref();
    let stdout = run_ffprobe(path).await?;

    let audio = parse_audio_probe_output(path, &stdout)?;
    debug!(
        path = %path.display(),
        sample_rate = audio.sample_rate,
        channel_layout = %audio.channel_layout,
        "Probed audio"
    );
    Ok(audio)
}

async fn run_ffprobe(path: &Path) -> MediaResult<Vec<u8>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::unsupported(path, stderr.trim().to_string()));
    }

    Ok(output.stdout)
}

fn parse_probe(path: &Path, json: &[u8]) -> MediaResult<FfprobeOutput> {
    serde_json::from_slice(json).map_err(|e| MediaError::unsupported(path, format!("unreadable probe output: {}", e)))
}

/// First decodable audio stream in ffprobe JSON.
fn parse_audio_probe_output(path: &Path, json: &[u8]) -> MediaResult<AudioStream> {
    parse_probe(path, json)?
        .streams
        .iter()
        .filter(|s| s.codec_type == "audio")
        .find_map(parse_audio_stream)
        .ok_or_else(|| MediaError::unsupported(path, "no audio stream found"))
}

/// Turn ffprobe JSON into a `MediaAsset`.
fn parse_probe_output(path: &Path, json: &[u8]) -> MediaResult<MediaAsset> {
    let probe = parse_probe(path, json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unsupported(path, "no video stream found"))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::unsupported(path, "missing or invalid duration"))?;

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    let video = VideoStream {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
    };

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .and_then(parse_audio_stream);

    Ok(MediaAsset {
        path: path.to_path_buf(),
        duration,
        video,
        audio,
    })
}

fn parse_audio_stream(stream: &FfprobeStream) -> Option<AudioStream> {
    let sample_rate = stream.sample_rate.as_deref()?.parse::<u32>().ok()?;
    let channels = stream.channels.unwrap_or(2);
    let channel_layout = stream
        .channel_layout
        .clone()
        .filter(|l| !l.is_empty() && l != "unknown")
        .unwrap_or_else(|| layout_for_channels(channels).to_string());

    Some(AudioStream {
        sample_rate,
        channels,
        channel_layout,
        codec: stream.codec_name.clone().unwrap_or_default(),
    })
}

/// Channel layout name for a bare channel count.
fn layout_for_channels(channels: u32) -> &'static str {
    match channels {
        1 => "mono",
        6 => "5.1",
        8 => "7.1",
        _ => DEFAULT_CHANNEL_LAYOUT,
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    s.parse().ok()
}
