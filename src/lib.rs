pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod graph;
pub mod knob;
pub mod modulation;
pub mod pad;
pub mod renderer;
pub mod timer;
pub mod voice;
pub mod web;

pub use crate::config::SirenConfig;
pub use crate::engine::{SurfaceUpdate, SynthEngine};
pub use crate::error::SirenError;
pub use crate::knob::KnobId;
pub use crate::pad::{PadInput, PadPreset};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the dubsiren-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: render a JSON performance script to a WAV byte array.
#[wasm_bindgen]
pub fn render_performance_wav(config_json: &str, performance_json: &str, seconds: f64) -> Result<Vec<u8>, JsValue> {
    let config = SirenConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let performance =
        renderer::Performance::from_json(performance_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    renderer::render_wav(config, &performance, seconds).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a JSON performance script to mono f32 samples.
#[wasm_bindgen]
pub fn render_performance_samples(config_json: &str, performance_json: &str, seconds: f64) -> Result<Vec<f32>, JsValue> {
    let config = SirenConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let performance =
        renderer::Performance::from_json(performance_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    renderer::render_performance(config, &performance, seconds).map_err(|e| JsValue::from_str(&format!("{e}")))
}
