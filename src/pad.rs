//! Pads: preset triggers with press/release semantics.
//!
//! Each pad accepts mouse and touch input but treats them as mutually
//! exclusive: once a touch starts, mouse presses are ignored until the touch
//! ends, so hybrid devices that emit both never fire a pad twice.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::knob::KnobId;

/// One control value applied when a pad is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnobAssignment {
    pub knob: KnobId,
    pub value: f64,
}

/// What a pad does on press: assign control values, then optionally start
/// the frequency modulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PadPreset {
    #[serde(default)]
    pub set: Vec<KnobAssignment>,
    #[serde(default)]
    pub modulate: bool,
}

/// Raw pointer events delivered to a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PadInput {
    MouseDown,
    MouseUp,
    MouseLeave,
    TouchStart,
    TouchEnd,
}

/// Outcome of feeding a [`PadInput`] through a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadTrigger {
    Press,
    Release,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PadBindingId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum InputMode {
    #[default]
    Mouse,
    Touch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PadBinding {
    pub id: PadBindingId,
    pub pad: String,
    pub preset: PadPreset,
    mode: InputMode,
}

impl PadBinding {
    /// Map an input event to a trigger, updating the pad's input mode.
    pub fn handle(&mut self, input: PadInput) -> PadTrigger {
        match (input, self.mode) {
            (PadInput::TouchStart, _) => {
                self.mode = InputMode::Touch;
                PadTrigger::Press
            }
            (PadInput::TouchEnd, InputMode::Touch) => {
                self.mode = InputMode::Mouse;
                PadTrigger::Release
            }
            (PadInput::MouseDown, InputMode::Mouse) => PadTrigger::Press,
            (PadInput::MouseUp | PadInput::MouseLeave, InputMode::Mouse) => PadTrigger::Release,
            _ => PadTrigger::Ignored,
        }
    }

    pub fn in_touch_mode(&self) -> bool {
        self.mode == InputMode::Touch
    }
}

/// Registered pads, at most one binding per pad id.
#[derive(Debug, Default)]
pub struct PadRegistry {
    bindings: HashMap<String, PadBinding>,
    next_id: u64,
}

impl PadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `preset` under `pad`. A previous binding for the same pad is
    /// deregistered and returned.
    pub fn bind(&mut self, pad: &str, preset: PadPreset) -> (PadBindingId, Option<PadBinding>) {
        self.next_id += 1;
        let id = PadBindingId(self.next_id);
        let binding = PadBinding {
            id,
            pad: pad.to_string(),
            preset,
            mode: InputMode::Mouse,
        };
        let replaced = self.bindings.insert(pad.to_string(), binding);
        if replaced.is_some() {
            debug!("pad '{pad}' rebound");
        }
        (id, replaced)
    }

    /// Remove a binding by id. Stale ids are ignored.
    pub fn unbind(&mut self, id: PadBindingId) -> Option<PadBinding> {
        let pad = self
            .bindings
            .iter()
            .find(|(_, b)| b.id == id)
            .map(|(pad, _)| pad.clone())?;
        self.bindings.remove(&pad)
    }

    pub fn get(&self, pad: &str) -> Option<&PadBinding> {
        self.bindings.get(pad)
    }

    pub fn get_mut(&mut self, pad: &str) -> Option<&mut PadBinding> {
        self.bindings.get_mut(pad)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
