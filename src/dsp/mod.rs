//! DSP building blocks: pure Rust audio synthesis and processing.
//!
//! The same code runs inside an AudioWorklet (via WASM) and in the offline
//! renderer.

pub mod convolver;
pub mod delay;
pub mod impulse;
pub mod oscillator;
pub mod param;

/// Frames processed per block, matching the browser's render quantum.
pub const RENDER_QUANTUM: usize = 128;
