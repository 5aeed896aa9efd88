//! The siren engine: one instance owns the audio context, the live voice,
//! every control and the timer queue.
//!
//! All mutation goes through `&mut SynthEngine`. Timers fire at render
//! quantum boundaries against a wall clock that advances with every rendered
//! frame, whether or not the context is running.

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::SirenConfig;
use crate::dsp::RENDER_QUANTUM;
use crate::dsp::impulse::room_impulse;
use crate::dsp::oscillator::Waveform;
use crate::error::SirenError;
use crate::graph::{AudioContext, ContextState};
use crate::knob::{DragGesture, KnobBank, KnobId, KnobState};
use crate::modulation::{ModulationSession, Modulator};
use crate::pad::{PadBindingId, PadInput, PadPreset, PadRegistry, PadTrigger};
use crate::timer::{TimerQueue, TimerTask};
use crate::voice::{EffectParams, VoiceNodes, VoiceParams};

/// A change the UI host should reflect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SurfaceUpdate {
    Label { knob: KnobId, text: String },
    Rotation { knob: KnobId, degrees: f64 },
    PadActive { pad: String, active: bool },
}

#[derive(Debug)]
pub struct SynthEngine {
    config: SirenConfig,
    context: Option<AudioContext>,
    /// Set when a context was created suspended; the next gesture resumes it.
    resume_armed: bool,
    voice: Option<VoiceNodes>,
    knobs: KnobBank,
    waveform: Waveform,
    modulator: Modulator,
    timers: TimerQueue,
    wall_frames: u64,
    active_pad: Option<String>,
    pads: PadRegistry,
    drag: Option<DragGesture>,
    updates: Vec<SurfaceUpdate>,
    impulse: Vec<f32>,
    block: Vec<f32>,
    block_pos: usize,
}

impl SynthEngine {
    pub fn new(config: SirenConfig) -> Result<Self, SirenError> {
        config.validate()?;

        let mut pads = PadRegistry::new();
        for pad in &config.pads {
            pads.bind(&pad.id, pad.preset.clone());
        }
        let room = config
            .knob(KnobId::RoomSize)
            .map_or(0.5, |k| k.initial.clamp(k.min, k.max));
        let impulse = room_impulse(room, &config.reverb, config.sample_rate);

        let mut engine = SynthEngine {
            knobs: KnobBank::new(&config.knobs),
            waveform: config.waveform,
            context: None,
            resume_armed: false,
            voice: None,
            modulator: Modulator::new(),
            timers: TimerQueue::new(),
            wall_frames: 0,
            active_pad: None,
            pads,
            drag: None,
            updates: Vec::new(),
            impulse,
            block: vec![0.0; RENDER_QUANTUM],
            block_pos: RENDER_QUANTUM,
            config,
        };
        for spec in engine.config.knobs.clone() {
            if let Some(knob) = engine.knobs.get(spec.id).copied() {
                engine.emit_knob(&knob);
            }
        }
        Ok(engine)
    }

    pub fn from_json(json: &str) -> Result<Self, SirenError> {
        Self::new(SirenConfig::from_json(json)?)
    }

    pub fn config(&self) -> &SirenConfig {
        &self.config
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    pub fn voice(&self) -> Option<&VoiceNodes> {
        self.voice.as_ref()
    }

    pub fn knob(&self, id: KnobId) -> Option<&KnobState> {
        self.knobs.get(id)
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn active_pad(&self) -> Option<&str> {
        self.active_pad.as_deref()
    }

    pub fn modulation(&self) -> Option<&ModulationSession> {
        self.modulator.session()
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn pads(&self) -> &PadRegistry {
        &self.pads
    }

    /// Wall clock in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.wall_frames as f64 * 1000.0 / self.config.sample_rate
    }

    /// Drain pending display updates, oldest first.
    pub fn take_updates(&mut self) -> Vec<SurfaceUpdate> {
        std::mem::take(&mut self.updates)
    }

    // ---- Context lifecycle ----

    /// Create the audio context if there is none yet. A new context starts
    /// suspended and the resume hook is armed for the next gesture.
    pub fn ensure_context(&mut self) -> Result<(), SirenError> {
        if self.context.is_some() {
            return Ok(());
        }
        match AudioContext::new(self.config.sample_rate, self.config.max_delay_seconds) {
            Ok(ctx) => {
                self.resume_armed = ctx.state() == ContextState::Suspended;
                self.context = Some(ctx);
                Ok(())
            }
            Err(e) => {
                error!("audio initialization failed: {e}");
                Err(e)
            }
        }
    }

    /// A user gesture: create the context if needed and fire the resume
    /// hook once.
    pub fn gesture(&mut self) -> Result<(), SirenError> {
        self.ensure_context()?;
        if self.resume_armed {
            if let Some(ctx) = self.context.as_mut() {
                ctx.resume();
            }
            self.resume_armed = false;
        }
        Ok(())
    }

    // ---- Voice ----

    /// Replace any live voice with a fresh one built from `params` and the
    /// current effect controls.
    pub fn start_voice(&mut self, params: VoiceParams) -> Result<VoiceNodes, SirenError> {
        self.ensure_context()?;
        let effects = EffectParams {
            delay_time: self.knobs.value_or(KnobId::DelayTime, 0.0),
            feedback: self.knobs.value_or(KnobId::Feedback, 0.0),
            reverb_amount: self.knobs.value_or(KnobId::ReverbAmount, 0.0),
        };
        let Some(ctx) = self.context.as_mut() else {
            return Err(SirenError::ContextUnavailable("no audio context".into()));
        };

        self.modulator.cancel(&mut self.timers);
        if let Some(old) = self.voice.take() {
            old.discard(ctx);
        }
        let voice = VoiceNodes::build(ctx, &params, &effects, &self.impulse)?;
        self.voice = Some(voice);
        Ok(voice)
    }

    /// Voice parameters taken from the current controls.
    pub fn current_voice_params(&self) -> VoiceParams {
        VoiceParams {
            waveform: self.waveform,
            frequency: self.knobs.value_or(KnobId::Frequency, 440.0),
            volume: self.knobs.value_or(KnobId::Volume, 0.5),
        }
    }

    /// Fade the live voice out and schedule its teardown, cancel modulation
    /// and clear the active pad. Safe to call with nothing playing.
    pub fn stop_voice(&mut self) {
        self.modulator.cancel(&mut self.timers);
        if let Some(pad) = self.active_pad.take() {
            self.updates.push(SurfaceUpdate::PadActive { pad, active: false });
        }

        let Some(voice) = self.voice.take() else {
            debug!("stop requested with no live voice");
            return;
        };
        if let Some(ctx) = self.context.as_mut() {
            if let Err(e) = voice.fade_out(ctx, self.config.fade_seconds) {
                warn!("fade-out failed, discarding voice now: {e}");
                voice.discard(ctx);
                return;
            }
        }
        let now_ms = self.now_ms();
        let fade_ms = self.config.fade_seconds * 1000.0;
        self.timers
            .set_timeout(now_ms, fade_ms, TimerTask::FadeComplete { voice });
    }

    /// Store the waveform for future voices and apply it to the live one.
    pub fn set_waveform(&mut self, waveform: Waveform) -> Result<(), SirenError> {
        self.waveform = waveform;
        match (self.voice.as_ref(), self.context.as_mut()) {
            (Some(voice), Some(ctx)) => voice.set_waveform(ctx, waveform),
            _ => Ok(()),
        }
    }

    // ---- Parameters ----

    /// Clamp and store a control value, update its display and push it into
    /// the live voice. Returns the stored value.
    pub fn set_parameter(&mut self, id: KnobId, value: f64) -> Result<f64, SirenError> {
        let Some(knob) = self.knobs.get_mut(id) else {
            error!("control '{id}' is not configured");
            return Err(SirenError::MissingControl(id.to_string()));
        };
        let stored = knob.set(value);
        let knob = *knob;
        self.emit_knob(&knob);

        if id == KnobId::RoomSize {
            self.impulse = room_impulse(stored, &self.config.reverb, self.config.sample_rate);
        }
        self.push_to_voice(id, stored)?;
        Ok(stored)
    }

    /// [`set_parameter`](Self::set_parameter) addressed by control name.
    pub fn set_parameter_named(&mut self, name: &str, value: f64) -> Result<f64, SirenError> {
        let id = name.parse::<KnobId>().inspect_err(|e| error!("{e}"))?;
        self.set_parameter(id, value)
    }

    fn emit_knob(&mut self, knob: &KnobState) {
        self.updates.push(SurfaceUpdate::Label {
            knob: knob.id,
            text: knob.label(),
        });
        self.updates.push(SurfaceUpdate::Rotation {
            knob: knob.id,
            degrees: knob.rotation_degrees(),
        });
    }

    fn push_to_voice(&mut self, id: KnobId, value: f64) -> Result<(), SirenError> {
        let (Some(voice), Some(ctx)) = (self.voice.as_ref(), self.context.as_mut()) else {
            return Ok(());
        };
        match id {
            KnobId::Frequency => voice.set_frequency(ctx, value),
            KnobId::DelayTime => voice.set_delay_time(ctx, value),
            KnobId::Feedback => voice.set_feedback(ctx, value),
            KnobId::Volume => voice.set_volume(ctx, value),
            KnobId::ReverbAmount => voice.set_reverb_amount(ctx, value),
            KnobId::RoomSize => voice.load_impulse(ctx, &self.impulse),
            // Read by the modulation at each period.
            KnobId::ModSpeed => Ok(()),
        }
    }

    // ---- Drag gestures ----

    pub fn begin_drag(&mut self, id: KnobId, y: f64) -> Result<(), SirenError> {
        let Some(knob) = self.knobs.get(id) else {
            error!("control '{id}' is not configured");
            return Err(SirenError::MissingControl(id.to_string()));
        };
        self.drag = Some(DragGesture {
            knob: id,
            start_y: y,
            start_value: knob.value(),
        });
        Ok(())
    }

    /// Move the active drag to pointer position `y`. Returns the stored
    /// value, or `None` when no drag is in progress.
    pub fn drag_to(&mut self, y: f64) -> Result<Option<f64>, SirenError> {
        let Some(drag) = self.drag else {
            return Ok(None);
        };
        let Some(knob) = self.knobs.get(drag.knob) else {
            return Err(SirenError::MissingControl(drag.knob.to_string()));
        };
        let raw = drag.value_at(y, knob.max - knob.min, self.config.drag_sensitivity);
        self.set_parameter(drag.knob, raw).map(Some)
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    // ---- Modulation ----

    /// Start the frequency wobble on the live voice using the current
    /// frequency and speed controls. Returns whether a session started.
    pub fn start_modulation(&mut self) -> Result<bool, SirenError> {
        let now_ms = self.now_ms();
        let (Some(voice), Some(ctx)) = (self.voice.as_ref(), self.context.as_mut()) else {
            warn!("modulation requested without a live voice");
            return Ok(false);
        };
        let base = self.knobs.value_or(KnobId::Frequency, 440.0);
        let speed = self.knobs.value_or(KnobId::ModSpeed, 0.0);
        self.modulator
            .start(&mut self.timers, ctx, voice, base, speed, now_ms)
            .inspect_err(|e| warn!("modulation not started: {e}"))
    }

    // ---- Pads ----

    /// Register `preset` under `pad`, replacing any earlier binding.
    pub fn bind_pad(&mut self, pad: &str, preset: PadPreset) -> PadBindingId {
        let (id, _) = self.pads.bind(pad, preset);
        id
    }

    /// Deregister a binding. Stops the voice if that pad is playing.
    pub fn unbind_pad(&mut self, binding: PadBindingId) -> bool {
        let Some(removed) = self.pads.unbind(binding) else {
            return false;
        };
        if self.active_pad.as_deref() == Some(removed.pad.as_str()) {
            self.stop_voice();
        }
        true
    }

    /// Route a raw pointer event to a pad.
    pub fn pad_input(&mut self, pad: &str, input: PadInput) -> Result<(), SirenError> {
        let Some(binding) = self.pads.get_mut(pad) else {
            error!("pad '{pad}' is not bound");
            return Err(SirenError::UnknownPad(pad.to_string()));
        };
        match binding.handle(input) {
            PadTrigger::Press => self.pad_press(pad),
            PadTrigger::Release => {
                self.pad_release(pad);
                Ok(())
            }
            PadTrigger::Ignored => Ok(()),
        }
    }

    /// Start `pad`'s sound, stopping whichever pad was playing first.
    pub fn pad_press(&mut self, pad: &str) -> Result<(), SirenError> {
        let Some(preset) = self.pads.get(pad).map(|b| b.preset.clone()) else {
            error!("pad '{pad}' is not bound");
            return Err(SirenError::UnknownPad(pad.to_string()));
        };
        debug!("pad {pad} pressed");

        if self.active_pad.is_some() {
            self.stop_voice();
        }
        self.gesture()?;
        self.start_voice(self.current_voice_params())?;

        if let Err(e) = self.apply_preset(&preset) {
            error!("preset for pad {pad} failed: {e}");
            self.stop_voice();
            return Err(e);
        }
        self.active_pad = Some(pad.to_string());
        self.updates.push(SurfaceUpdate::PadActive {
            pad: pad.to_string(),
            active: true,
        });
        info!("sound started for pad {pad}");
        Ok(())
    }

    fn apply_preset(&mut self, preset: &PadPreset) -> Result<(), SirenError> {
        for assignment in &preset.set {
            self.set_parameter(assignment.knob, assignment.value)?;
        }
        if preset.modulate {
            self.start_modulation()?;
        }
        Ok(())
    }

    /// Stop the sound if `pad` is the one playing.
    pub fn pad_release(&mut self, pad: &str) {
        if self.active_pad.as_deref() == Some(pad) {
            self.stop_voice();
        } else {
            debug!("release on inactive pad {pad} ignored");
        }
    }

    // ---- Rendering ----

    /// Fill `out` with mono samples, firing due timers at each quantum.
    pub fn render(&mut self, out: &mut [f32]) {
        let mut written = 0;
        while written < out.len() {
            if self.block_pos == RENDER_QUANTUM {
                self.render_quantum();
                self.block_pos = 0;
            }
            let n = (RENDER_QUANTUM - self.block_pos).min(out.len() - written);
            out[written..written + n].copy_from_slice(&self.block[self.block_pos..self.block_pos + n]);
            self.block_pos += n;
            written += n;
        }
    }

    /// Render and discard `seconds` of audio.
    pub fn advance(&mut self, seconds: f64) {
        let frames = (seconds * self.config.sample_rate).round().max(0.0) as usize;
        let mut scratch = vec![0.0; RENDER_QUANTUM];
        let mut left = frames;
        while left > 0 {
            let n = left.min(RENDER_QUANTUM);
            self.render(&mut scratch[..n]);
            left -= n;
        }
    }

    fn render_quantum(&mut self) {
        self.fire_due_timers();
        match self.context.as_mut() {
            Some(ctx) => {
                if let Err(e) = ctx.render_quantum(&mut self.block) {
                    error!("render failed: {e}");
                    self.block.fill(0.0);
                }
            }
            None => self.block.fill(0.0),
        }
        self.wall_frames += RENDER_QUANTUM as u64;
    }

    fn fire_due_timers(&mut self) {
        let now_ms = self.now_ms();
        while let Some((_, task)) = self.timers.pop_due(now_ms) {
            if let Err(e) = self.dispatch(task, now_ms) {
                warn!("timer task failed: {e}");
            }
        }
    }

    fn dispatch(&mut self, task: TimerTask, now_ms: f64) -> Result<(), SirenError> {
        match task {
            TimerTask::FadeComplete { voice } => {
                if let Some(ctx) = self.context.as_mut() {
                    voice.discard(ctx);
                }
                Ok(())
            }
            TimerTask::ModulationTick { session } => {
                let (Some(voice), Some(ctx)) = (self.voice.as_ref(), self.context.as_mut()) else {
                    self.modulator.cancel(&mut self.timers);
                    return Ok(());
                };
                let speed = self.knobs.value_or(KnobId::ModSpeed, 0.0);
                self.modulator
                    .tick(session, speed, &mut self.timers, ctx, voice, now_ms)
            }
            TimerTask::ModulationDownRamp { session, end_time } => {
                let (Some(voice), Some(ctx)) = (self.voice.as_ref(), self.context.as_mut()) else {
                    return Ok(());
                };
                self.modulator.down_ramp(session, end_time, ctx, voice)
            }
        }
    }
}
