//! Rotary controls: bounded values, label text and indicator rotation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::KnobSpec;
use crate::error::SirenError;

/// Total sweep of a knob indicator in degrees, centred on 0.
pub const ROTATION_SWEEP_DEGREES: f64 = 270.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KnobId {
    Frequency,
    ReverbAmount,
    RoomSize,
    ModSpeed,
    DelayTime,
    Feedback,
    Volume,
}

impl KnobId {
    pub const ALL: [KnobId; 7] = [
        KnobId::Frequency,
        KnobId::ReverbAmount,
        KnobId::RoomSize,
        KnobId::ModSpeed,
        KnobId::DelayTime,
        KnobId::Feedback,
        KnobId::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnobId::Frequency => "frequency",
            KnobId::ReverbAmount => "reverbAmount",
            KnobId::RoomSize => "roomSize",
            KnobId::ModSpeed => "modSpeed",
            KnobId::DelayTime => "delayTime",
            KnobId::Feedback => "feedback",
            KnobId::Volume => "volume",
        }
    }

    /// Label text for `value` in this control's display unit.
    pub fn format_value(&self, value: f64) -> String {
        // Adding zero turns -0.0 into 0.0.
        let value = value + 0.0;
        match self {
            KnobId::Frequency => format!("{} Hz", value.round()),
            KnobId::DelayTime => format!("{}s", trim_decimals(value)),
            _ => format!("{value:.1}"),
        }
    }
}

/// Two decimals, trailing zeros dropped down to a single decimal.
fn trim_decimals(value: f64) -> String {
    let mut text = format!("{value:.2}");
    if text.ends_with('0') {
        text.pop();
    }
    text
}

impl fmt::Display for KnobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnobId {
    type Err = SirenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnobId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| SirenError::MissingControl(s.to_string()))
    }
}

/// One control's current value and declared range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobState {
    pub id: KnobId,
    value: f64,
    pub min: f64,
    pub max: f64,
}

impl KnobState {
    pub fn new(spec: &KnobSpec) -> Self {
        KnobState {
            id: spec.id,
            value: spec.initial.clamp(spec.min, spec.max),
            min: spec.min,
            max: spec.max,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Store `raw` clamped to the range and return the stored value.
    pub fn set(&mut self, raw: f64) -> f64 {
        self.value = self.clamp(raw);
        self.value
    }

    pub fn clamp(&self, raw: f64) -> f64 {
        if raw.is_nan() {
            return self.value;
        }
        raw.clamp(self.min, self.max)
    }

    /// Indicator angle: min → -135°, max → +135°.
    pub fn rotation_degrees(&self) -> f64 {
        rotation_degrees(self.value, self.min, self.max)
    }

    pub fn label(&self) -> String {
        self.id.format_value(self.value)
    }
}

pub fn rotation_degrees(value: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range <= 0.0 {
        return 0.0;
    }
    (value - min) / range * ROTATION_SWEEP_DEGREES - ROTATION_SWEEP_DEGREES / 2.0
}

/// A vertical drag in progress. Upward movement increases the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragGesture {
    pub knob: KnobId,
    pub start_y: f64,
    pub start_value: f64,
}

impl DragGesture {
    /// Unclamped value for a pointer at `y`.
    pub fn value_at(&self, y: f64, range: f64, sensitivity: f64) -> f64 {
        let delta = self.start_y - y;
        self.start_value + delta / sensitivity * range
    }
}

/// Every configured control, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct KnobBank {
    knobs: HashMap<KnobId, KnobState>,
}

impl KnobBank {
    pub fn new(specs: &[KnobSpec]) -> Self {
        KnobBank {
            knobs: specs.iter().map(|s| (s.id, KnobState::new(s))).collect(),
        }
    }

    pub fn get(&self, id: KnobId) -> Option<&KnobState> {
        self.knobs.get(&id)
    }

    pub fn get_mut(&mut self, id: KnobId) -> Option<&mut KnobState> {
        self.knobs.get_mut(&id)
    }

    /// Current value of `id`, or `fallback` when the control is absent.
    pub fn value_or(&self, id: KnobId, fallback: f64) -> f64 {
        self.get(id).map_or(fallback, KnobState::value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: KnobId, min: f64, max: f64, initial: f64) -> KnobSpec {
        KnobSpec { id, min, max, initial }
    }

    #[test]
    fn set_clamps_to_range() {
        let mut k = KnobState::new(&spec(KnobId::Frequency, 20.0, 2000.0, 440.0));
        assert_eq!(k.set(5000.0), 2000.0);
        assert_eq!(k.set(-3.0), 20.0);
        assert_eq!(k.set(660.0), 660.0);
    }

    #[test]
    fn nan_keeps_previous_value() {
        let mut k = KnobState::new(&spec(KnobId::Volume, 0.0, 1.0, 0.5));
        assert_eq!(k.set(f64::NAN), 0.5);
    }

    #[test]
    fn rotation_mapping() {
        assert_eq!(rotation_degrees(0.0, 0.0, 10.0), -135.0);
        assert_eq!(rotation_degrees(10.0, 0.0, 10.0), 135.0);
        assert_eq!(rotation_degrees(5.0, 0.0, 10.0), 0.0);
        assert_eq!(rotation_degrees(1010.0, 20.0, 2000.0), 0.0);
    }

    #[test]
    fn labels_use_control_units() {
        assert_eq!(KnobId::Frequency.format_value(880.4), "880 Hz");
        assert_eq!(KnobId::Frequency.format_value(2000.0), "2000 Hz");
        assert_eq!(KnobId::DelayTime.format_value(0.8), "0.8s");
        assert_eq!(KnobId::DelayTime.format_value(0.75), "0.75s");
        assert_eq!(KnobId::DelayTime.format_value(0.0), "0.0s");
        assert_eq!(KnobId::Feedback.format_value(0.7), "0.7");
        assert_eq!(KnobId::ModSpeed.format_value(5.0), "5.0");
    }

    #[test]
    fn negative_zero_is_labelled_as_zero() {
        assert_eq!(KnobId::DelayTime.format_value(-0.0), "0.0s");
        assert_eq!(KnobId::Feedback.format_value(-0.0), "0.0");
        assert_eq!(KnobId::Frequency.format_value(-0.0), "0 Hz");
    }

    #[test]
    fn drag_up_increases_value() {
        let drag = DragGesture {
            knob: KnobId::Volume,
            start_y: 300.0,
            start_value: 0.5,
        };
        assert!((drag.value_at(250.0, 1.0, 100.0) - 1.0).abs() < 1e-12);
        assert!((drag.value_at(320.0, 1.0, 100.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn ids_round_trip_through_strings() {
        for id in KnobId::ALL {
            assert_eq!(id.as_str().parse::<KnobId>().unwrap(), id);
        }
        assert!(matches!("pitch".parse::<KnobId>(), Err(SirenError::MissingControl(_))));
    }
}
