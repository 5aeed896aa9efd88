//! Processing nodes owned by an [`AudioContext`](super::AudioContext).

use crate::dsp::convolver::Convolver;
use crate::dsp::delay::DelayLine;
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::param::AudioParam;

/// Handle to a node inside one context. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

/// Which automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Frequency,
    Gain,
    DelayTime,
}

/// Oscillators run once: `Unstarted → Playing → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Unstarted,
    Playing,
    Stopped,
}

#[derive(Debug)]
pub struct OscillatorNode {
    pub(crate) osc: Oscillator,
    pub(crate) frequency: AudioParam,
    pub(crate) state: PlaybackState,
}

impl OscillatorNode {
    pub(crate) fn new(sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        OscillatorNode {
            osc: Oscillator::new(Waveform::Sine, sample_rate),
            frequency: AudioParam::new(440.0, -nyquist, nyquist),
            state: PlaybackState::Unstarted,
        }
    }
}

#[derive(Debug)]
pub struct DelayNode {
    pub(crate) line: DelayLine,
    pub(crate) delay_time: AudioParam,
}

#[derive(Debug)]
pub enum Node {
    Oscillator(OscillatorNode),
    Gain(AudioParam),
    Delay(DelayNode),
    Convolver(Box<Convolver>),
    Destination,
}

impl Node {
    pub(crate) fn gain() -> Self {
        Node::Gain(AudioParam::new(1.0, f64::MIN, f64::MAX))
    }

    pub(crate) fn delay(sample_rate: f64, max_delay_seconds: f64) -> Self {
        Node::Delay(DelayNode {
            line: DelayLine::new(sample_rate, max_delay_seconds),
            delay_time: AudioParam::new(0.0, 0.0, max_delay_seconds),
        })
    }

    /// Whether other nodes may connect into this one.
    pub fn accepts_input(&self) -> bool {
        !matches!(self, Node::Oscillator(_))
    }

    /// Whether this node produces output that can be routed onward.
    pub fn has_output(&self) -> bool {
        !matches!(self, Node::Destination)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Oscillator(_) => "oscillator",
            Node::Gain(_) => "gain",
            Node::Delay(_) => "delay",
            Node::Convolver(_) => "convolver",
            Node::Destination => "destination",
        }
    }

    pub(crate) fn param(&self, kind: ParamKind) -> Option<&AudioParam> {
        match (self, kind) {
            (Node::Oscillator(o), ParamKind::Frequency) => Some(&o.frequency),
            (Node::Gain(g), ParamKind::Gain) => Some(g),
            (Node::Delay(d), ParamKind::DelayTime) => Some(&d.delay_time),
            _ => None,
        }
    }

    pub(crate) fn param_mut(&mut self, kind: ParamKind) -> Option<&mut AudioParam> {
        match (self, kind) {
            (Node::Oscillator(o), ParamKind::Frequency) => Some(&mut o.frequency),
            (Node::Gain(g), ParamKind::Gain) => Some(g),
            (Node::Delay(d), ParamKind::DelayTime) => Some(&mut d.delay_time),
            _ => None,
        }
    }

    pub(crate) fn params_mut(&mut self) -> impl Iterator<Item = &mut AudioParam> {
        let param = match self {
            Node::Oscillator(o) => Some(&mut o.frequency),
            Node::Gain(g) => Some(g),
            Node::Delay(d) => Some(&mut d.delay_time),
            Node::Convolver(_) | Node::Destination => None,
        };
        param.into_iter()
    }
}
