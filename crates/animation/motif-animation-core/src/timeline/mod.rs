//! Timeline compilation: AST -> per-element keyframe instructions.

pub mod builder;
pub mod compiler;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::style::Keyframe;

pub use compiler::build_keyframes;

/// One element's share of a compiled animation: keyframes plus resolved
/// timing. Invariants: keyframes are sorted by offset; the first offset is 0
/// and the last is 1 for any non-zero duration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineInstruction {
    pub element: ElementId,
    pub keyframes: Vec<Keyframe>,
    pub pre_style_props: Vec<String>,
    pub post_style_props: Vec<String>,
    pub duration: f64,
    pub delay: f64,
    pub total_time: f64,
    #[serde(default)]
    pub easing: Option<String>,
    /// Set when this instruction was spliced in from a pre-built child
    /// animation rather than compiled in place.
    pub is_sub_timeline: bool,
    /// When set, a later splice folds the delay into the keyframes as a
    /// leading gap instead of delaying the player.
    pub stretch_start_keyframe: bool,
}

impl TimelineInstruction {
    pub fn new(
        element: ElementId,
        keyframes: Vec<Keyframe>,
        pre_style_props: Vec<String>,
        post_style_props: Vec<String>,
        duration: f64,
        delay: f64,
        easing: Option<String>,
        is_sub_timeline: bool,
    ) -> Self {
        Self {
            element,
            keyframes,
            pre_style_props,
            post_style_props,
            duration,
            delay,
            total_time: duration + delay,
            easing,
            is_sub_timeline,
            stretch_start_keyframe: false,
        }
    }
}

/// Per-flush map of element -> already-built sub-instructions, consumed by
/// child-animation references (`AnimateChild` / `AnimateRef`).
#[derive(Debug, Default)]
pub struct ElementInstructionMap {
    map: HashMap<ElementId, Vec<TimelineInstruction>>,
}

impl ElementInstructionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, element: ElementId) -> Option<&[TimelineInstruction]> {
        self.map.get(&element).map(Vec::as_slice)
    }

    pub fn append(&mut self, element: ElementId, instructions: Vec<TimelineInstruction>) {
        self.map.entry(element).or_default().extend(instructions);
    }

    pub fn has(&self, element: ElementId) -> bool {
        self.map.contains_key(&element)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
