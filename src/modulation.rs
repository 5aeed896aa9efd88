//! Siren wobble: a timer-driven sweep of the oscillator frequency.
//!
//! Each period ramps the frequency up to twice the base over the first half
//! and back down to the base over the second half, both exponentially. The
//! up-ramp is scheduled by the periodic tick, the down-ramp by a one-shot
//! timer set at the tick; cancelling a session clears both.

use log::{debug, info};

use crate::error::SirenError;
use crate::graph::{AudioContext, ParamKind};
use crate::timer::{TimerId, TimerQueue, TimerTask};
use crate::voice::VoiceNodes;

#[derive(Debug, Clone, PartialEq)]
pub struct ModulationSession {
    pub id: u64,
    pub base_frequency: f64,
    /// Sweeps per second.
    pub speed: f64,
    pub tick_timer: TimerId,
    pub down_ramp_timer: Option<TimerId>,
}

impl ModulationSession {
    pub fn period_ms(&self) -> f64 {
        1000.0 / self.speed
    }
}

/// Idle when `session` is `None`, running otherwise.
#[derive(Debug, Default)]
pub struct Modulator {
    session: Option<ModulationSession>,
    next_id: u64,
}

impl Modulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ModulationSession> {
        self.session.as_ref()
    }

    /// Begin a session at `base_frequency`. Any previous session is
    /// cancelled first. Returns `Ok(false)` without scheduling anything when
    /// `speed` is not positive.
    pub fn start(
        &mut self,
        timers: &mut TimerQueue,
        ctx: &mut AudioContext,
        voice: &VoiceNodes,
        base_frequency: f64,
        speed: f64,
        now_ms: f64,
    ) -> Result<bool, SirenError> {
        self.cancel(timers);

        if !(speed > 0.0 && speed.is_finite()) {
            debug!("modulation skipped: speed {speed}");
            return Ok(false);
        }
        if !(base_frequency > 0.0 && base_frequency.is_finite()) {
            return Err(SirenError::InvalidRampEndpoint(base_frequency));
        }

        voice.set_frequency(ctx, base_frequency)?;

        self.next_id += 1;
        let id = self.next_id;
        let tick_timer = timers.set_interval(now_ms, 1000.0 / speed, TimerTask::ModulationTick { session: id });
        self.session = Some(ModulationSession {
            id,
            base_frequency,
            speed,
            tick_timer,
            down_ramp_timer: None,
        });
        info!("modulation started: base {base_frequency:.1} Hz, speed {speed:.1}");
        Ok(true)
    }

    /// Periodic firing. `live_speed` is the speed control's current value; a
    /// change re-times the following periods, and a speed of zero ends the
    /// session.
    pub fn tick(
        &mut self,
        session: u64,
        live_speed: f64,
        timers: &mut TimerQueue,
        ctx: &mut AudioContext,
        voice: &VoiceNodes,
        now_ms: f64,
    ) -> Result<(), SirenError> {
        if self.session.as_ref().map(|s| s.id) != Some(session) {
            return Ok(());
        }
        if !(live_speed > 0.0 && live_speed.is_finite()) {
            info!("modulation stopped: speed dropped to {live_speed}");
            self.cancel(timers);
            return Ok(());
        }
        let Some(s) = self.session.as_mut() else {
            return Ok(());
        };

        if live_speed != s.speed {
            timers.clear(s.tick_timer);
            s.speed = live_speed;
            s.tick_timer = timers.set_interval(now_ms, s.period_ms(), TimerTask::ModulationTick { session });
        }

        let now = ctx.current_time();
        let half = 1.0 / (2.0 * s.speed);
        ctx.param_mut(voice.oscillator, ParamKind::Frequency)?
            .exponential_ramp_to_value_at_time(2.0 * s.base_frequency, now + half)?;

        if let Some(stale) = s.down_ramp_timer.take() {
            timers.clear(stale);
        }
        s.down_ramp_timer = Some(timers.set_timeout(
            now_ms,
            s.period_ms() / 2.0,
            TimerTask::ModulationDownRamp {
                session,
                end_time: now + 2.0 * half,
            },
        ));
        Ok(())
    }

    /// Second half of a period: ramp back to the base by `end_time`.
    pub fn down_ramp(
        &mut self,
        session: u64,
        end_time: f64,
        ctx: &mut AudioContext,
        voice: &VoiceNodes,
    ) -> Result<(), SirenError> {
        let Some(s) = self.session.as_mut().filter(|s| s.id == session) else {
            return Ok(());
        };
        s.down_ramp_timer = None;
        ctx.param_mut(voice.oscillator, ParamKind::Frequency)?
            .exponential_ramp_to_value_at_time(s.base_frequency, end_time)
    }

    /// Return to idle, clearing the periodic and the pending one-shot timer.
    /// Safe to call when already idle.
    pub fn cancel(&mut self, timers: &mut TimerQueue) -> bool {
        let Some(s) = self.session.take() else {
            return false;
        };
        timers.clear(s.tick_timer);
        if let Some(down) = s.down_ramp_timer {
            timers.clear(down);
        }
        debug!("modulation session {} cancelled", s.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::oscillator::Waveform;
    use crate::dsp::param::AutomationKind;
    use crate::voice::{EffectParams, VoiceParams};

    struct Rig {
        ctx: AudioContext,
        voice: VoiceNodes,
        timers: TimerQueue,
        modulator: Modulator,
    }

    fn rig() -> Rig {
        let mut ctx = AudioContext::new(8000.0, 1.0).unwrap();
        ctx.resume();
        let params = VoiceParams {
            waveform: Waveform::Sine,
            frequency: 440.0,
            volume: 0.5,
        };
        let voice = VoiceNodes::build(&mut ctx, &params, &EffectParams::default(), &[1.0]).unwrap();
        Rig {
            ctx,
            voice,
            timers: TimerQueue::new(),
            modulator: Modulator::new(),
        }
    }

    #[test]
    fn zero_speed_schedules_nothing() {
        let mut r = rig();
        let started = r
            .modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 0.0, 0.0)
            .unwrap();
        assert!(!started);
        assert!(r.timers.is_empty());
        assert!(!r.modulator.is_running());
    }

    #[test]
    fn non_positive_base_is_rejected() {
        let mut r = rig();
        let err = r
            .modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 0.0, 5.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, SirenError::InvalidRampEndpoint(_)));
        assert!(r.timers.is_empty());
    }

    #[test]
    fn speed_five_ticks_every_200ms() {
        let mut r = rig();
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let s = r.modulator.session().unwrap();
        assert_eq!(r.timers.period(s.tick_timer), Some(200.0));
        assert_eq!(r.timers.deadline(s.tick_timer), Some(200.0));
    }

    #[test]
    fn tick_schedules_up_then_down_ramp() {
        let mut r = rig();
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let id = r.modulator.session().unwrap().id;
        r.modulator
            .tick(id, 5.0, &mut r.timers, &mut r.ctx, &r.voice, 200.0)
            .unwrap();

        let freq = r.ctx.param(r.voice.oscillator, ParamKind::Frequency).unwrap();
        let up = freq.events().last().copied().unwrap();
        assert_eq!(up.kind, AutomationKind::ExponentialRamp);
        assert_eq!(up.value, 880.0);
        assert!((up.time - 0.1).abs() < 1e-12);

        let down = r.modulator.session().unwrap().down_ramp_timer.unwrap();
        assert_eq!(r.timers.deadline(down), Some(300.0));
        let task = r.timers.clear(down).unwrap();
        let TimerTask::ModulationDownRamp { session, end_time } = task else {
            panic!("expected the down-ramp, got {task:?}");
        };
        r.modulator
            .down_ramp(session, end_time, &mut r.ctx, &r.voice)
            .unwrap();
        let freq = r.ctx.param(r.voice.oscillator, ParamKind::Frequency).unwrap();
        let back = freq.events().last().copied().unwrap();
        assert_eq!(back.kind, AutomationKind::ExponentialRamp);
        assert_eq!(back.value, 440.0);
        assert!((back.time - 0.2).abs() < 1e-12);
    }

    #[test]
    fn cancel_clears_both_timers() {
        let mut r = rig();
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let id = r.modulator.session().unwrap().id;
        r.modulator
            .tick(id, 5.0, &mut r.timers, &mut r.ctx, &r.voice, 200.0)
            .unwrap();
        assert_eq!(r.timers.len(), 2);
        assert!(r.modulator.cancel(&mut r.timers));
        assert!(r.timers.is_empty());
        assert!(!r.modulator.cancel(&mut r.timers));
    }

    #[test]
    fn stale_session_tasks_are_ignored() {
        let mut r = rig();
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let old = r.modulator.session().unwrap().id;
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let before = r
            .ctx
            .param(r.voice.oscillator, ParamKind::Frequency)
            .unwrap()
            .events()
            .len();
        r.modulator
            .tick(old, 5.0, &mut r.timers, &mut r.ctx, &r.voice, 200.0)
            .unwrap();
        r.modulator.down_ramp(old, 0.2, &mut r.ctx, &r.voice).unwrap();
        let after = r
            .ctx
            .param(r.voice.oscillator, ParamKind::Frequency)
            .unwrap()
            .events()
            .len();
        assert_eq!(before, after);
        assert_eq!(r.timers.len(), 1);
    }

    #[test]
    fn speed_change_retimes_the_period() {
        let mut r = rig();
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let id = r.modulator.session().unwrap().id;
        r.modulator
            .tick(id, 2.0, &mut r.timers, &mut r.ctx, &r.voice, 200.0)
            .unwrap();
        let s = r.modulator.session().unwrap();
        assert_eq!(s.speed, 2.0);
        assert_eq!(r.timers.period(s.tick_timer), Some(500.0));
        assert_eq!(r.timers.deadline(s.tick_timer), Some(700.0));
    }

    #[test]
    fn speed_dropping_to_zero_ends_the_session() {
        let mut r = rig();
        r.modulator
            .start(&mut r.timers, &mut r.ctx, &r.voice, 440.0, 5.0, 0.0)
            .unwrap();
        let id = r.modulator.session().unwrap().id;
        r.modulator
            .tick(id, 0.0, &mut r.timers, &mut r.ctx, &r.voice, 200.0)
            .unwrap();
        assert!(!r.modulator.is_running());
        assert!(r.timers.is_empty());
    }
}
