//! Automatable parameters with a value timeline.
//!
//! Events are kept sorted by time. A ramp starts from the event before it
//! (its time and value) and ends at its own time and value; after the end
//! the final value holds until the next event.

use crate::error::SirenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationKind {
    SetValue,
    LinearRamp,
    ExponentialRamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    pub kind: AutomationKind,
    pub value: f64,
    /// Context time in seconds.
    pub time: f64,
}

/// A single automatable parameter (frequency, gain, delay time).
#[derive(Debug, Clone)]
pub struct AudioParam {
    /// Value in effect before the first pending event.
    value: f64,
    /// Time at which `value` took effect. Start point of a leading ramp.
    anchor_time: f64,
    min: f64,
    max: f64,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(default_value: f64, min: f64, max: f64) -> Self {
        AudioParam {
            value: default_value.clamp(min, max),
            anchor_time: 0.0,
            min,
            max,
            events: Vec::new(),
        }
    }

    /// Replace the whole timeline with a constant value.
    pub fn set_value(&mut self, value: f64) {
        self.events.clear();
        self.value = value.clamp(self.min, self.max);
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> Result<(), SirenError> {
        self.insert(ParamEvent {
            kind: AutomationKind::SetValue,
            value,
            time,
        })
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> Result<(), SirenError> {
        self.insert(ParamEvent {
            kind: AutomationKind::LinearRamp,
            value,
            time: end_time,
        })
    }

    /// Multiplicative interpolation towards `value`. The target must be
    /// finite and non-zero.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> Result<(), SirenError> {
        if value == 0.0 || !value.is_finite() {
            return Err(SirenError::InvalidRampEndpoint(value));
        }
        self.insert(ParamEvent {
            kind: AutomationKind::ExponentialRamp,
            value,
            time: end_time,
        })
    }

    /// Drop every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time < time);
    }

    /// Pending events, oldest first.
    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    fn insert(&mut self, event: ParamEvent) -> Result<(), SirenError> {
        if !event.value.is_finite() || !event.time.is_finite() || event.time < 0.0 {
            return Err(SirenError::InvalidState(format!(
                "automation event needs a finite value and non-negative time, got {} at {}",
                event.value, event.time
            )));
        }
        let idx = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(idx, event);
        Ok(())
    }

    /// Computed value at context time `t`, clamped to the nominal range.
    pub fn value_at(&self, t: f64) -> f64 {
        let k = self.events.partition_point(|e| e.time <= t);
        let (t0, v0) = if k > 0 {
            let prev = self.events[k - 1];
            (prev.time, prev.value)
        } else {
            (self.anchor_time, self.value)
        };

        let value = match self.events.get(k) {
            None => v0,
            Some(next) => match next.kind {
                AutomationKind::SetValue => v0,
                AutomationKind::LinearRamp => {
                    let span = next.time - t0;
                    if span <= 0.0 {
                        next.value
                    } else {
                        v0 + (next.value - v0) * ((t - t0) / span).clamp(0.0, 1.0)
                    }
                }
                AutomationKind::ExponentialRamp => {
                    let span = next.time - t0;
                    if v0 == 0.0 || v0 * next.value < 0.0 {
                        // Undefined interpolation: hold until the ramp's end.
                        v0
                    } else if span <= 0.0 {
                        next.value
                    } else {
                        let progress = ((t - t0) / span).clamp(0.0, 1.0);
                        v0 * (next.value / v0).powf(progress)
                    }
                }
            },
        };

        value.clamp(self.min, self.max)
    }

    /// Whether the value is zero everywhere in `[t0, t1]`.
    pub fn is_silent_between(&self, t0: f64, t1: f64) -> bool {
        self.value_at(t0) == 0.0
            && self.value_at(t1) == 0.0
            && self
                .events
                .iter()
                .filter(|e| e.time > t0 && e.time < t1)
                .all(|e| self.value_at(e.time) == 0.0)
    }

    /// Fill `out` with per-sample values starting at `start_time`.
    pub fn fill(&self, start_time: f64, sample_rate: f64, out: &mut [f64]) {
        if self.events.is_empty() {
            out.fill(self.value);
            return;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.value_at(start_time + i as f64 / sample_rate);
        }
    }

    /// Collapse events that are entirely in the past at `t`.
    pub fn advance_to(&mut self, t: f64) {
        let k = self.events.partition_point(|e| e.time <= t);
        if k == 0 {
            return;
        }
        let last = self.events[k - 1];
        self.value = last.value.clamp(self.min, self.max);
        self.anchor_time = last.time;
        self.events.drain(..k);
    }
}
