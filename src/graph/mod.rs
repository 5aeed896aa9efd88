//! Software audio platform: an audio context hosting oscillator, gain,
//! delay and convolver nodes wired into an arbitrary graph.

pub mod context;
pub mod node;

pub use context::{AudioContext, ContextState};
pub use node::{NodeId, ParamKind, PlaybackState};
