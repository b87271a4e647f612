//! Background music mixing.
//!
//! Policy: the music bed is clipped to the source duration (never looped),
//! padded with silence when it is shorter, scaled by its volume and
//! resampled to the source layout before being layered under the
//! narration. Neither input truncates the other and the mixed track is
//! exactly as long as the source.

use capmix_models::AudioLayout;

use crate::filters::aformat;
use crate::timeline::{AudioTrack, MusicBed, Timeline};

/// Replace the timeline's audio with the source mixed with `bed`.
///
/// Pure: the mix is rendered by the encoder.
pub fn mix_music(timeline: Timeline, bed: MusicBed) -> Timeline {
    timeline.with_audio(AudioTrack::Mixed(bed))
}

/// Build the `-filter_complex` audio graph for a mixed track.
///
/// `narration` is the source audio stream label (`None` for silent
/// sources, where the bed becomes the only audio) and `music` the bed's
/// input label. The result is written to `[output]`.
pub fn build_audio_graph(
    narration: Option<&str>,
    music: &str,
    bed: &MusicBed,
    duration: f64,
    layout: &AudioLayout,
    output: &str,
) -> String {
    let format = aformat(layout);
    let bed_chain = format!(
        "[{music}]atrim=0:{d:.3},asetpts=PTS-STARTPTS,apad=whole_dur={d:.3},volume={v:.3},{format}",
        music = music,
        d = duration,
        v = bed.volume,
        format = format,
    );

    match narration {
        Some(narration) => format!(
            "[{narration}]{format},apad=whole_dur={d:.3},atrim=0:{d:.3}[narration];\
             {bed_chain}[bed];\
             [narration][bed]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[{output}]",
            narration = narration,
            format = format,
            d = duration,
            bed_chain = bed_chain,
            output = output,
        ),
        None => format!("{}[{}]", bed_chain, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::asset;

    fn bed() -> MusicBed {
        MusicBed::new("/presets/lofi.mp3", 0.2)
    }

    #[test]
    fn test_mix_music_keeps_duration() {
        let timeline = mix_music(Timeline::from_source(asset(5.0, true)), bed());
        assert!((timeline.duration() - 5.0).abs() < f64::EPSILON);
        assert_eq!(timeline.music(), Some(&bed()));
        assert!(timeline.overlays().is_empty());
    }

    #[test]
    fn test_graph_clips_pads_and_scales_music() {
        let layout = AudioLayout {
            sample_rate: 48_000,
            channel_layout: "stereo".to_string(),
        };
        let graph = build_audio_graph(Some("0:a:0"), "1:a:0", &bed(), 5.0, &layout, "aout");

        assert!(graph.contains("[1:a:0]atrim=0:5.000,asetpts=PTS-STARTPTS,apad=whole_dur=5.000"));
        assert!(graph.contains("volume=0.200"));
        assert!(graph.contains("sample_rates=48000:channel_layouts=stereo"));
        assert!(graph.contains("amix=inputs=2:duration=first:dropout_transition=0:normalize=0[aout]"));
        assert!(!graph.contains("aloop"));
    }

    #[test]
    fn test_graph_without_narration_uses_bed_alone() {
        let graph = build_audio_graph(None, "1:a:0", &bed(), 5.0, &AudioLayout::default(), "aout");
        assert!(!graph.contains("amix"));
        assert!(graph.contains("sample_rates=44100:channel_layouts=stereo"));
        assert!(graph.ends_with("[aout]"));
    }
}
