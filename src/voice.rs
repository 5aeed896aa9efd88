//! Voice: the node set that realizes one sounding note.
//!
//! ```text
//! osc ─▶ gain ─┬─▶ dry ──────────────┐
//!              ├─▶ delay ─┬──────────┤
//!              │    ▲     ▼          ├─▶ mixer ─▶ destination
//!              │    └─ feedback      │
//!              └─▶ convolver ─▶ wet ─┘
//! ```
//!
//! A voice is built from scratch on every note-on and discarded after its
//! note-off fade; nothing is reused between notes.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dsp::oscillator::Waveform;
use crate::error::SirenError;
use crate::graph::{AudioContext, NodeId, ParamKind};

/// Initial oscillator and level settings for a new voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub waveform: Waveform,
    pub frequency: f64,
    pub volume: f64,
}

/// Effect settings pushed into a new voice before it starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    pub delay_time: f64,
    pub feedback: f64,
    /// Wet level; the dry path gets `1 - reverb_amount`.
    pub reverb_amount: f64,
}

impl Default for EffectParams {
    fn default() -> Self {
        EffectParams {
            delay_time: 0.0,
            feedback: 0.0,
            reverb_amount: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceNodes {
    pub oscillator: NodeId,
    pub gain: NodeId,
    pub delay: NodeId,
    pub feedback: NodeId,
    pub convolver: NodeId,
    pub dry: NodeId,
    pub wet: NodeId,
    pub mixer: NodeId,
}

impl VoiceNodes {
    /// Create, wire and start a fresh voice.
    pub fn build(
        ctx: &mut AudioContext,
        params: &VoiceParams,
        effects: &EffectParams,
        impulse: &[f32],
    ) -> Result<Self, SirenError> {
        let voice = VoiceNodes {
            oscillator: ctx.create_oscillator(),
            gain: ctx.create_gain(),
            delay: ctx.create_delay(),
            feedback: ctx.create_gain(),
            convolver: ctx.create_convolver(),
            dry: ctx.create_gain(),
            wet: ctx.create_gain(),
            mixer: ctx.create_gain(),
        };
        if let Err(e) = voice.wire(ctx, params, effects, impulse) {
            voice.discard(ctx);
            return Err(e);
        }
        debug!(
            "voice built: {} {:.1} Hz, volume {:.2}",
            params.waveform, params.frequency, params.volume
        );
        Ok(voice)
    }

    fn wire(
        &self,
        ctx: &mut AudioContext,
        params: &VoiceParams,
        effects: &EffectParams,
        impulse: &[f32],
    ) -> Result<(), SirenError> {
        let now = ctx.current_time();

        ctx.set_oscillator_type(self.oscillator, params.waveform)?;
        ctx.param_mut(self.oscillator, ParamKind::Frequency)?
            .set_value_at_time(params.frequency, now)?;
        ctx.param_mut(self.gain, ParamKind::Gain)?
            .set_value_at_time(params.volume, now)?;
        ctx.param_mut(self.delay, ParamKind::DelayTime)?
            .set_value_at_time(effects.delay_time, now)?;
        ctx.param_mut(self.feedback, ParamKind::Gain)?
            .set_value_at_time(effects.feedback, now)?;
        ctx.param_mut(self.dry, ParamKind::Gain)?
            .set_value_at_time(1.0 - effects.reverb_amount, now)?;
        ctx.param_mut(self.wet, ParamKind::Gain)?
            .set_value_at_time(effects.reverb_amount, now)?;
        ctx.param_mut(self.mixer, ParamKind::Gain)?
            .set_value_at_time(1.0, now)?;
        ctx.set_impulse_response(self.convolver, impulse)?;

        ctx.connect(self.oscillator, self.gain)?;
        ctx.connect(self.gain, self.dry)?;
        ctx.connect(self.dry, self.mixer)?;
        ctx.connect(self.gain, self.delay)?;
        ctx.connect(self.delay, self.feedback)?;
        ctx.connect(self.feedback, self.delay)?;
        ctx.connect(self.delay, self.mixer)?;
        ctx.connect(self.gain, self.convolver)?;
        ctx.connect(self.convolver, self.wet)?;
        ctx.connect(self.wet, self.mixer)?;
        ctx.connect(self.mixer, ctx.destination())?;

        ctx.start(self.oscillator)
    }

    pub fn nodes(&self) -> [NodeId; 8] {
        [
            self.oscillator,
            self.gain,
            self.delay,
            self.feedback,
            self.convolver,
            self.dry,
            self.wet,
            self.mixer,
        ]
    }

    pub fn set_waveform(&self, ctx: &mut AudioContext, waveform: Waveform) -> Result<(), SirenError> {
        ctx.set_oscillator_type(self.oscillator, waveform)
    }

    pub fn set_frequency(&self, ctx: &mut AudioContext, hz: f64) -> Result<(), SirenError> {
        set_now(ctx, self.oscillator, ParamKind::Frequency, hz)
    }

    pub fn set_volume(&self, ctx: &mut AudioContext, level: f64) -> Result<(), SirenError> {
        set_now(ctx, self.gain, ParamKind::Gain, level)
    }

    pub fn set_delay_time(&self, ctx: &mut AudioContext, seconds: f64) -> Result<(), SirenError> {
        set_now(ctx, self.delay, ParamKind::DelayTime, seconds)
    }

    pub fn set_feedback(&self, ctx: &mut AudioContext, amount: f64) -> Result<(), SirenError> {
        set_now(ctx, self.feedback, ParamKind::Gain, amount)
    }

    pub fn set_reverb_amount(&self, ctx: &mut AudioContext, amount: f64) -> Result<(), SirenError> {
        set_now(ctx, self.wet, ParamKind::Gain, amount)?;
        set_now(ctx, self.dry, ParamKind::Gain, 1.0 - amount)
    }

    pub fn load_impulse(&self, ctx: &mut AudioContext, impulse: &[f32]) -> Result<(), SirenError> {
        ctx.set_impulse_response(self.convolver, impulse)
    }

    /// Ramp every level that reaches the output down to silence over
    /// `fade_seconds`, starting from the value in effect now. The mixer is
    /// included so the echo still in the delay line is silent by the end.
    pub fn fade_out(&self, ctx: &mut AudioContext, fade_seconds: f64) -> Result<(), SirenError> {
        let now = ctx.current_time();
        for node in [self.gain, self.dry, self.wet, self.feedback, self.mixer] {
            let param = ctx.param_mut(node, ParamKind::Gain)?;
            let current = param.value_at(now);
            param.cancel_scheduled_values(now);
            param.set_value_at_time(current, now)?;
            param.linear_ramp_to_value_at_time(0.0, now + fade_seconds)?;
        }
        Ok(())
    }

    /// Halt the oscillator and remove every node. Halting an oscillator that
    /// is already stopped is reported and otherwise ignored.
    pub fn discard(self, ctx: &mut AudioContext) {
        if let Err(e) = ctx.stop(self.oscillator) {
            warn!("error stopping oscillator: {e}");
        }
        for node in self.nodes() {
            if let Err(e) = ctx.remove_node(node) {
                debug!("node already gone during voice teardown: {e}");
            }
        }
        debug!("voice discarded");
    }
}

fn set_now(ctx: &mut AudioContext, node: NodeId, kind: ParamKind, value: f64) -> Result<(), SirenError> {
    let now = ctx.current_time();
    ctx.param_mut(node, kind)?.set_value_at_time(value, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::RENDER_QUANTUM;
    use crate::graph::PlaybackState;

    fn params() -> VoiceParams {
        VoiceParams {
            waveform: Waveform::Sawtooth,
            frequency: 440.0,
            volume: 0.5,
        }
    }

    fn context() -> AudioContext {
        let mut ctx = AudioContext::new(8000.0, 1.0).unwrap();
        ctx.resume();
        ctx
    }

    #[test]
    fn build_wires_the_fixed_topology() {
        let mut ctx = context();
        let v = VoiceNodes::build(&mut ctx, &params(), &EffectParams::default(), &[1.0]).unwrap();
        assert!(ctx.is_connected(v.oscillator, v.gain));
        assert!(ctx.is_connected(v.gain, v.dry));
        assert!(ctx.is_connected(v.dry, v.mixer));
        assert!(ctx.is_connected(v.gain, v.delay));
        assert!(ctx.is_connected(v.delay, v.feedback));
        assert!(ctx.is_connected(v.feedback, v.delay));
        assert!(ctx.is_connected(v.delay, v.mixer));
        assert!(ctx.is_connected(v.gain, v.convolver));
        assert!(ctx.is_connected(v.convolver, v.wet));
        assert!(ctx.is_connected(v.wet, v.mixer));
        assert!(ctx.is_connected(v.mixer, ctx.destination()));
        assert_eq!(ctx.playback_state(v.oscillator), Some(PlaybackState::Playing));
        assert_eq!(ctx.oscillator_type(v.oscillator), Some(Waveform::Sawtooth));
    }

    #[test]
    fn initial_values_are_applied() {
        let mut ctx = context();
        let effects = EffectParams {
            delay_time: 0.25,
            feedback: 0.4,
            reverb_amount: 0.3,
        };
        let v = VoiceNodes::build(&mut ctx, &params(), &effects, &[1.0]).unwrap();
        let at = |ctx: &AudioContext, node, kind| ctx.param(node, kind).unwrap().value_at(0.0);
        assert_eq!(at(&ctx, v.oscillator, ParamKind::Frequency), 440.0);
        assert_eq!(at(&ctx, v.gain, ParamKind::Gain), 0.5);
        assert_eq!(at(&ctx, v.delay, ParamKind::DelayTime), 0.25);
        assert_eq!(at(&ctx, v.feedback, ParamKind::Gain), 0.4);
        assert_eq!(at(&ctx, v.wet, ParamKind::Gain), 0.3);
        assert!((at(&ctx, v.dry, ParamKind::Gain) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn fade_reaches_zero_at_window_end() {
        let mut ctx = context();
        let v = VoiceNodes::build(&mut ctx, &params(), &EffectParams::default(), &[1.0]).unwrap();
        let mut buf = vec![0.0; RENDER_QUANTUM];
        ctx.render_quantum(&mut buf).unwrap();

        let now = ctx.current_time();
        v.fade_out(&mut ctx, 0.05).unwrap();
        let gain = ctx.param(v.gain, ParamKind::Gain).unwrap();
        assert_eq!(gain.value_at(now), 0.5);
        assert!((gain.value_at(now + 0.025) - 0.25).abs() < 1e-9);
        assert_eq!(gain.value_at(now + 0.05), 0.0);
        for node in [v.dry, v.wet, v.feedback, v.mixer] {
            assert_eq!(ctx.param(node, ParamKind::Gain).unwrap().value_at(now + 0.05), 0.0);
        }
    }

    #[test]
    fn buffered_echo_is_silent_when_the_fade_ends() {
        let mut ctx = context();
        let effects = EffectParams {
            delay_time: 0.1,
            feedback: 0.5,
            reverb_amount: 0.0,
        };
        let v = VoiceNodes::build(&mut ctx, &params(), &effects, &[1.0]).unwrap();
        let mut buf = vec![0.0; RENDER_QUANTUM];
        for _ in 0..20 {
            ctx.render_quantum(&mut buf).unwrap();
        }
        v.fade_out(&mut ctx, 0.05).unwrap();
        // 0.05 s at 8000 Hz is 400 frames; the fifth quantum starts past it.
        for _ in 0..5 {
            ctx.render_quantum(&mut buf).unwrap();
        }
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn discard_removes_every_node_and_tolerates_double_stop() {
        let mut ctx = context();
        let before = ctx.node_count();
        let v = VoiceNodes::build(&mut ctx, &params(), &EffectParams::default(), &[1.0]).unwrap();
        assert_eq!(ctx.node_count(), before + 8);
        ctx.stop(v.oscillator).unwrap();
        v.discard(&mut ctx);
        assert_eq!(ctx.node_count(), before);
    }

    #[test]
    fn voice_is_audible() {
        let mut ctx = context();
        VoiceNodes::build(&mut ctx, &params(), &EffectParams::default(), &[1.0]).unwrap();
        let mut buf = vec![0.0; RENDER_QUANTUM];
        let mut peak = 0.0f32;
        for _ in 0..4 {
            ctx.render_quantum(&mut buf).unwrap();
            peak = buf.iter().fold(peak, |m, s| m.max(s.abs()));
        }
        assert!(peak > 0.2, "peak {peak}");
    }
}
