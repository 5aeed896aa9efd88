//! Offline renderer: plays a scripted performance through a
//! [`SynthEngine`] and returns the samples or a WAV file.

use std::io::Cursor;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::SirenConfig;
use crate::dsp::oscillator::Waveform;
use crate::engine::SynthEngine;
use crate::error::SirenError;
use crate::knob::KnobId;

/// Something the performer does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Press { pad: String },
    Release { pad: String },
    Set { knob: KnobId, value: f64 },
    Waveform { waveform: Waveform },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedAction {
    /// Seconds from the start of the render.
    pub at: f64,
    pub action: Action,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    #[serde(default)]
    pub actions: Vec<TimedAction>,
}

impl Performance {
    pub fn from_json(json: &str) -> Result<Self, SirenError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Render `seconds` of mono audio. Actions run at the first quantum
/// boundary at or after their time, in time order; actions past the end are
/// dropped.
pub fn render_performance(
    config: SirenConfig,
    performance: &Performance,
    seconds: f64,
) -> Result<Vec<f32>, SirenError> {
    let mut engine = SynthEngine::new(config)?;
    let sample_rate = engine.config().sample_rate;
    let total = (seconds.max(0.0) * sample_rate).round() as usize;
    let mut out = vec![0.0f32; total];

    let mut actions: Vec<&TimedAction> = performance.actions.iter().collect();
    actions.sort_by(|a, b| a.at.total_cmp(&b.at));

    let mut cursor = 0;
    for timed in actions {
        let at = (timed.at.max(0.0) * sample_rate).round() as usize;
        if at > total {
            debug!("action at {}s is past the end of the render", timed.at);
            break;
        }
        engine.render(&mut out[cursor..at.max(cursor)]);
        cursor = at.max(cursor);
        perform(&mut engine, &timed.action)?;
    }
    engine.render(&mut out[cursor..]);
    Ok(out)
}

fn perform(engine: &mut SynthEngine, action: &Action) -> Result<(), SirenError> {
    match action {
        Action::Press { pad } => engine.pad_press(pad),
        Action::Release { pad } => {
            engine.pad_release(pad);
            Ok(())
        }
        Action::Set { knob, value } => engine.set_parameter(*knob, *value).map(|_| ()),
        Action::Waveform { waveform } => engine.set_waveform(*waveform),
    }
}

/// Render a performance to a 16-bit mono WAV file.
pub fn render_wav(config: SirenConfig, performance: &Performance, seconds: f64) -> Result<Vec<u8>, SirenError> {
    let sample_rate = config.sample_rate.round() as u32;
    let samples = render_performance(config, performance, seconds)?;
    encode_wav(&samples, sample_rate)
}

/// Encode mono f32 samples as 16-bit PCM.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, SirenError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SirenConfig {
        SirenConfig {
            sample_rate: 8000.0,
            ..SirenConfig::default()
        }
    }

    fn press_release(pad: &str, from: f64, to: f64) -> Performance {
        Performance {
            actions: vec![
                TimedAction {
                    at: from,
                    action: Action::Press { pad: pad.into() },
                },
                TimedAction {
                    at: to,
                    action: Action::Release { pad: pad.into() },
                },
            ],
        }
    }

    #[test]
    fn empty_performance_is_silent() {
        let out = render_performance(config(), &Performance::default(), 0.5).unwrap();
        assert_eq!(out.len(), 4000);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn press_is_audible_and_release_fades_to_silence() {
        let out = render_performance(config(), &press_release("pad2", 0.1, 0.3), 1.0).unwrap();
        let before: f32 = out[..700].iter().map(|s| s.abs()).fold(0.0, f32::max);
        let during: f32 = out[1000..2000].iter().map(|s| s.abs()).fold(0.0, f32::max);
        let after: f32 = out[3600..].iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert_eq!(before, 0.0);
        assert!(during > 0.1, "peak while held {during}");
        assert!(after < 1e-3, "tail after release {after}");
    }

    #[test]
    fn unknown_pad_fails_the_render() {
        let err = render_performance(config(), &press_release("pad7", 0.0, 0.1), 0.2).unwrap_err();
        assert!(matches!(err, SirenError::UnknownPad(_)));
    }

    #[test]
    fn performance_parses_from_json() {
        let json = r#"{"actions": [
            {"at": 0.0, "action": {"type": "waveform", "waveform": "square"}},
            {"at": 0.1, "action": {"type": "set", "knob": "volume", "value": 0.8}},
            {"at": 0.2, "action": {"type": "press", "pad": "pad1"}}
        ]}"#;
        let p = Performance::from_json(json).unwrap();
        assert_eq!(p.actions.len(), 3);
        assert_eq!(
            p.actions[1].action,
            Action::Set {
                knob: KnobId::Volume,
                value: 0.8
            }
        );
    }

    #[test]
    fn wav_header_valid() {
        let wav = render_wav(config(), &press_release("pad1", 0.0, 0.1), 0.25).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 8000);
        assert_eq!(&wav[36..40], b"data");
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 2000 * 2);
        assert_eq!(wav.len(), 44 + 4000);
    }
}
