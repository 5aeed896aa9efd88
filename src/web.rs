//! Browser surface: a `wasm-bindgen` wrapper around [`SynthEngine`].
//!
//! Pointer events go through the pad bindings so touch and mouse input stay
//! mutually exclusive. Failures are logged to the console and the instrument
//! stays silent; only construction and explicit control calls report errors
//! back to JavaScript.

use log::error;
use wasm_bindgen::prelude::*;

use crate::dsp::oscillator::Waveform;
use crate::engine::SynthEngine;
use crate::knob::KnobId;
use crate::pad::PadInput;

/// Install console logging and the panic hook. Call once before anything
/// else.
#[wasm_bindgen]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

#[wasm_bindgen]
pub struct WebSiren {
    engine: SynthEngine,
}

#[wasm_bindgen]
impl WebSiren {
    /// Build an instrument from a JSON configuration (`"{}"` for the stock
    /// four-pad siren).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WebSiren, JsValue> {
        let engine = SynthEngine::from_json(config_json).map_err(js_err)?;
        Ok(WebSiren { engine })
    }

    pub fn sample_rate(&self) -> f64 {
        self.engine.config().sample_rate
    }

    pub fn pad_press(&mut self, pad: &str) {
        self.pad_event(pad, PadInput::MouseDown);
    }

    pub fn pad_release(&mut self, pad: &str) {
        self.pad_event(pad, PadInput::MouseUp);
    }

    pub fn pad_leave(&mut self, pad: &str) {
        self.pad_event(pad, PadInput::MouseLeave);
    }

    pub fn pad_touch_start(&mut self, pad: &str) {
        self.pad_event(pad, PadInput::TouchStart);
    }

    pub fn pad_touch_end(&mut self, pad: &str) {
        self.pad_event(pad, PadInput::TouchEnd);
    }

    /// Any other user gesture on the page; resumes a suspended context.
    pub fn gesture(&mut self) {
        if let Err(e) = self.engine.gesture() {
            error!("gesture: {e}");
        }
    }

    pub fn set_parameter(&mut self, knob: &str, value: f64) -> Result<f64, JsValue> {
        self.engine.set_parameter_named(knob, value).map_err(js_err)
    }

    pub fn knob_value(&self, knob: &str) -> Option<f64> {
        let id = knob.parse::<KnobId>().ok()?;
        self.engine.knob(id).map(|k| k.value())
    }

    pub fn begin_drag(&mut self, knob: &str, y: f64) -> Result<(), JsValue> {
        let id = knob.parse::<KnobId>().map_err(js_err)?;
        self.engine.begin_drag(id, y).map_err(js_err)
    }

    /// Returns the knob's new value while a drag is active.
    pub fn drag_to(&mut self, y: f64) -> Option<f64> {
        match self.engine.drag_to(y) {
            Ok(value) => value,
            Err(e) => {
                error!("drag: {e}");
                None
            }
        }
    }

    pub fn end_drag(&mut self) {
        self.engine.end_drag();
    }

    pub fn set_waveform(&mut self, waveform: &str) -> Result<(), JsValue> {
        let waveform: Waveform = waveform.parse().map_err(js_err)?;
        self.engine.set_waveform(waveform).map_err(js_err)
    }

    pub fn active_pad(&self) -> Option<String> {
        self.engine.active_pad().map(str::to_string)
    }

    /// Render `len` mono samples for an AudioWorklet buffer.
    pub fn render(&mut self, len: usize) -> Vec<f32> {
        let mut out = vec![0.0; len];
        self.engine.render(&mut out);
        out
    }

    /// Render in place into a buffer shared with JavaScript.
    pub fn render_into(&mut self, out: &mut [f32]) {
        self.engine.render(out);
    }

    /// Pending label, rotation and pad-highlight changes as an array of
    /// `{kind, ...}` objects.
    pub fn take_updates(&mut self) -> Result<JsValue, JsValue> {
        let updates = self.engine.take_updates();
        serde_wasm_bindgen::to_value(&updates).map_err(js_err)
    }
}

impl WebSiren {
    fn pad_event(&mut self, pad: &str, input: PadInput) {
        if let Err(e) = self.engine.pad_input(pad, input) {
            error!("pad {pad}: {e}");
        }
    }
}
