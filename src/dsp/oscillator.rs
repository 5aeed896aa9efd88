//! Anti-aliased oscillators using PolyBLEP.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported waveform shapes, named the way the waveform selector names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "sawtooth" | "saw" => Ok(Waveform::Sawtooth),
            "triangle" => Ok(Waveform::Triangle),
            other => Err(format!("unknown waveform '{other}'")),
        }
    }
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
///
/// The frequency is supplied per sample so that automation on the
/// owning node's frequency parameter is applied at audio rate.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Generate the next sample at `frequency` Hz.
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let inc = (frequency / self.sample_rate).clamp(0.0, 0.5);
        let sample = match self.waveform {
            Waveform::Sine => self.sine(),
            Waveform::Sawtooth => self.sawtooth(inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => self.triangle(),
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn sine(&self) -> f64 {
        (2.0 * PI * self.phase).sin()
    }

    /// Naive sawtooth with PolyBLEP correction at the wrap.
    fn sawtooth(&self, inc: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, inc)
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Piecewise linear: -1→+1 over [0, 0.5], +1→-1 over [0.5, 1].
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}
