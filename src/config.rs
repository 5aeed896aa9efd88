//! Instrument configuration: control ranges, pad presets and engine timing.
//!
//! Every field has a default, so `{}` is a valid configuration that yields
//! the stock four-pad siren.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dsp::oscillator::Waveform;
use crate::error::SirenError;
use crate::knob::KnobId;
use crate::pad::{KnobAssignment, PadPreset};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SirenConfig {
    /// Audio context sample rate in Hz. Checked by the context itself when
    /// it is created.
    pub sample_rate: f64,
    /// Note-off fade window in seconds.
    pub fade_seconds: f64,
    /// Pixels of vertical drag that sweep a knob across its full range.
    pub drag_sensitivity: f64,
    /// Capacity of the echo delay line in seconds.
    pub max_delay_seconds: f64,
    /// Waveform selected at start-up.
    pub waveform: Waveform,
    pub knobs: Vec<KnobSpec>,
    pub pads: Vec<PadSpec>,
    pub reverb: ReverbConfig,
}

/// Declared range and start value of one control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnobSpec {
    pub id: KnobId,
    pub min: f64,
    pub max: f64,
    pub initial: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadSpec {
    pub id: String,
    pub preset: PadPreset,
}

/// Impulse response generation settings for the convolution reverb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbConfig {
    /// Tail length at room size 1.0, in seconds.
    pub max_seconds: f64,
    /// Exponent of the tail's decay curve.
    pub decay: f64,
    /// Noise seed, fixed so renders are reproducible.
    pub seed: u64,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        ReverbConfig {
            max_seconds: 3.0,
            decay: 2.0,
            seed: 0x5EED,
        }
    }
}

impl Default for SirenConfig {
    fn default() -> Self {
        SirenConfig {
            sample_rate: 44100.0,
            fade_seconds: 0.05,
            drag_sensitivity: 100.0,
            max_delay_seconds: 1.0,
            waveform: Waveform::Sine,
            knobs: default_knobs(),
            pads: default_pads(),
            reverb: ReverbConfig::default(),
        }
    }
}

fn knob(id: KnobId, min: f64, max: f64, initial: f64) -> KnobSpec {
    KnobSpec { id, min, max, initial }
}

fn default_knobs() -> Vec<KnobSpec> {
    vec![
        knob(KnobId::Frequency, 20.0, 2000.0, 440.0),
        knob(KnobId::ReverbAmount, 0.0, 1.0, 0.0),
        knob(KnobId::RoomSize, 0.1, 0.9, 0.5),
        knob(KnobId::ModSpeed, 0.0, 10.0, 0.0),
        knob(KnobId::DelayTime, 0.0, 1.0, 0.0),
        knob(KnobId::Feedback, 0.0, 0.9, 0.0),
        knob(KnobId::Volume, 0.0, 1.0, 0.5),
    ]
}

fn pad(id: &str, set: &[(KnobId, f64)], modulate: bool) -> PadSpec {
    PadSpec {
        id: id.to_string(),
        preset: PadPreset {
            set: set
                .iter()
                .map(|&(knob, value)| KnobAssignment { knob, value })
                .collect(),
            modulate,
        },
    }
}

fn default_pads() -> Vec<PadSpec> {
    vec![
        pad("pad1", &[(KnobId::Frequency, 880.0)], false),
        pad("pad2", &[(KnobId::Frequency, 220.0)], false),
        pad("pad3", &[(KnobId::ModSpeed, 5.0)], true),
        pad("pad4", &[(KnobId::DelayTime, 0.8), (KnobId::Feedback, 0.7)], false),
    ]
}

impl SirenConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, SirenError> {
        let config: SirenConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn knob(&self, id: KnobId) -> Option<&KnobSpec> {
        self.knobs.iter().find(|k| k.id == id)
    }

    pub fn validate(&self) -> Result<(), SirenError> {
        let invalid = |msg: String| Err(SirenError::InvalidConfig(msg));

        if !(self.fade_seconds.is_finite() && self.fade_seconds > 0.0) {
            return invalid(format!("fade window must be positive, got {}", self.fade_seconds));
        }
        if !(self.drag_sensitivity.is_finite() && self.drag_sensitivity > 0.0) {
            return invalid(format!(
                "drag sensitivity must be positive, got {}",
                self.drag_sensitivity
            ));
        }
        if !(self.max_delay_seconds.is_finite() && self.max_delay_seconds > 0.0) {
            return invalid(format!(
                "max delay must be positive, got {}",
                self.max_delay_seconds
            ));
        }
        if !(self.reverb.max_seconds.is_finite() && self.reverb.max_seconds > 0.0) {
            return invalid(format!(
                "reverb length must be positive, got {}",
                self.reverb.max_seconds
            ));
        }

        let mut seen = HashSet::new();
        for k in &self.knobs {
            if !seen.insert(k.id) {
                return invalid(format!("duplicate control '{}'", k.id));
            }
            if !(k.min.is_finite() && k.max.is_finite() && k.min < k.max) {
                return invalid(format!("control '{}' has an empty range", k.id));
            }
            if !(k.min..=k.max).contains(&k.initial) {
                return invalid(format!(
                    "control '{}' starts at {} outside [{}, {}]",
                    k.id, k.initial, k.min, k.max
                ));
            }
        }
        if let Some(delay) = self.knob(KnobId::DelayTime) {
            if delay.max > self.max_delay_seconds {
                return invalid(format!(
                    "delay time range exceeds the delay line capacity of {}s",
                    self.max_delay_seconds
                ));
            }
        }

        let mut pads = HashSet::new();
        for p in &self.pads {
            if !pads.insert(p.id.as_str()) {
                return invalid(format!("duplicate pad '{}'", p.id));
            }
            if p.preset.set.iter().any(|a| !a.value.is_finite()) {
                return invalid(format!("pad '{}' assigns a non-finite value", p.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_the_stock_siren() {
        let config = SirenConfig::from_json("{}").unwrap();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.knobs.len(), 7);
        assert_eq!(config.pads.len(), 4);
        let freq = config.knob(KnobId::Frequency).unwrap();
        assert_eq!((freq.min, freq.max, freq.initial), (20.0, 2000.0, 440.0));
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = SirenConfig::from_json(r#"{"sampleRate": 8000, "fadeSeconds": 0.1}"#).unwrap();
        assert_eq!(config.sample_rate, 8000.0);
        assert_eq!(config.fade_seconds, 0.1);
        assert_eq!(config.drag_sensitivity, 100.0);
    }

    #[test]
    fn pads_parse_from_json() {
        let json = r#"{
            "pads": [
                {"id": "wobble", "preset": {"set": [{"knob": "modSpeed", "value": 2}], "modulate": true}}
            ]
        }"#;
        let config = SirenConfig::from_json(json).unwrap();
        assert_eq!(config.pads[0].id, "wobble");
        assert!(config.pads[0].preset.modulate);
        assert_eq!(config.pads[0].preset.set[0].knob, KnobId::ModSpeed);
    }

    #[test]
    fn rejects_non_positive_fade() {
        let err = SirenConfig::from_json(r#"{"fadeSeconds": 0}"#).unwrap_err();
        assert!(matches!(err, SirenError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_initial_value_outside_range() {
        let mut config = SirenConfig::default();
        config.knobs[0].initial = 5000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_controls() {
        let mut config = SirenConfig::default();
        let first = config.knobs[0];
        config.knobs.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(SirenConfig::from_json("{"), Err(SirenError::Json(_))));
    }
}
