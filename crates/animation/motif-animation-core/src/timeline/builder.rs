//! Keyframe accumulation for one element over one timeline.
//!
//! Every timeline of a compile pass shares one per-element style table (the
//! arena). Each timeline keeps its own local writes plus a back-fill table
//! that lazily captures the value a property held before this timeline first
//! touched it. Keyframes record only their own writes; the lookup chain
//! (own -> back-fill) is resolved when the instruction is built, so a
//! back-fill entry written late still reaches keyframes emitted earlier.

use std::collections::HashMap;

use crate::ast::StyleToken;
use crate::element::ElementId;
use crate::error::AnimationError;
use crate::style::{Keyframe, StyleMap, StyleValue};
use crate::timeline::TimelineInstruction;
use crate::timing::{interpolate_params, ParamMap, TimingSpec};

const ONE_FRAME_IN_MILLISECONDS: f64 = 16.0;

/// Round offsets to three decimal places, mirroring driver precision.
pub(crate) fn round_offset(offset: f64) -> f64 {
    (offset * 1000.0).round() / 1000.0
}

/// Shared per-element style table for one compile pass. Records every write
/// any timeline makes for an element, so a later fork can back-fill the
/// property with the most recent value instead of a blind `Auto`.
#[derive(Debug, Default)]
pub struct StyleArena {
    tables: HashMap<ElementId, StyleMap>,
}

impl StyleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, element: ElementId, prop: &str, value: StyleValue) {
        self.tables
            .entry(element)
            .or_default()
            .insert(prop.to_string(), value);
    }

    pub fn get(&self, element: ElementId, prop: &str) -> Option<&StyleValue> {
        self.tables.get(&element).and_then(|t| t.get(prop))
    }

    pub fn table(&self, element: ElementId) -> Option<&StyleMap> {
        self.tables.get(&element)
    }
}

#[derive(Clone, Debug)]
struct StyleAtTime {
    time: f64,
    value: StyleValue,
}

#[derive(Clone, Debug, Default)]
struct TimedKeyframe {
    time: f64,
    styles: StyleMap,
    easing: Option<String>,
}

/// Pre-built keyframes spliced in from a child animation; replaces the
/// accumulation machinery for that timeline.
#[derive(Clone, Debug)]
pub struct SubTimeline {
    pub keyframes: Vec<Keyframe>,
    pub pre_style_props: Vec<String>,
    pub post_style_props: Vec<String>,
    pub timings: TimingSpec,
    pub stretch_start_keyframe: bool,
}

#[derive(Debug)]
pub struct TimelineBuilder {
    pub element: ElementId,
    pub start_time: f64,
    /// Current local time; also the key of the current keyframe.
    pub duration: f64,
    pub easing: Option<String>,
    keyframes: Vec<TimedKeyframe>,
    current: usize,
    previous: Option<usize>,
    back_fill: StyleMap,
    local: StyleMap,
    pending: StyleMap,
    style_summary: HashMap<String, StyleAtTime>,
    current_empty_step_keyframe: Option<usize>,
    sub: Option<SubTimeline>,
}

impl TimelineBuilder {
    pub fn new(element: ElementId, start_time: f64) -> Self {
        let mut builder = Self {
            element,
            start_time,
            duration: 0.0,
            easing: None,
            keyframes: Vec::new(),
            current: 0,
            previous: None,
            back_fill: StyleMap::new(),
            local: StyleMap::new(),
            pending: StyleMap::new(),
            style_summary: HashMap::new(),
            current_empty_step_keyframe: None,
            sub: None,
        };
        builder.load_keyframe();
        builder
    }

    pub fn new_sub(element: ElementId, sub: SubTimeline) -> Self {
        let start_time = sub.timings.delay;
        let mut builder = Self::new(element, start_time);
        builder.sub = Some(sub);
        builder
    }

    #[inline]
    pub fn current_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn contains_animation(&self) -> bool {
        if let Some(sub) = &self.sub {
            return sub.keyframes.len() > 1;
        }
        match self.keyframes.len() {
            0 => false,
            1 => self.has_current_style_properties(),
            _ => true,
        }
    }

    pub fn has_current_style_properties(&self) -> bool {
        !self.keyframes[self.current].styles.is_empty()
    }

    /// Whether outside styles (final state styles) may still be layered onto
    /// the current keyframe. An empty step owns its keyframe outright.
    pub fn allow_only_timeline_styles(&self) -> bool {
        self.current_empty_step_keyframe != Some(self.current)
    }

    fn load_keyframe(&mut self) {
        if !self.keyframes.is_empty() {
            self.previous = Some(self.current);
        }
        match self.keyframes.iter().position(|k| k.time == self.duration) {
            Some(pos) => self.current = pos,
            None => {
                self.keyframes.push(TimedKeyframe {
                    time: self.duration,
                    ..Default::default()
                });
                self.current = self.keyframes.len() - 1;
            }
        }
    }

    pub fn forward_frame(&mut self) {
        self.duration += ONE_FRAME_IN_MILLISECONDS;
        self.load_keyframe();
    }

    pub fn forward_time(&mut self, time: f64) {
        self.apply_styles_to_keyframe();
        self.duration = time;
        self.load_keyframe();
    }

    /// Push the next step out by `delay`. A timeline that has not produced
    /// any keyframes yet just shifts its start; one mid-flight materializes
    /// the gap (and snapshots pending start styles so the delayed step still
    /// departs from them).
    pub fn delay_next_step(&mut self, delay: f64, arena: &mut StyleArena) {
        let has_pre_style_step = self.keyframes.len() == 1 && !self.pending.is_empty();
        if self.duration > 0.0 || has_pre_style_step {
            self.forward_time(self.duration + delay);
            if has_pre_style_step {
                self.snapshot_current_styles(arena);
            }
        } else {
            self.start_time += delay;
        }
    }

    /// Fork a new timeline continuing at `current_time` (or an explicit
    /// time), sharing this pass's arena chain.
    pub fn fork(&mut self, element: ElementId, new_time: Option<f64>) -> TimelineBuilder {
        self.apply_styles_to_keyframe();
        let time = match new_time {
            Some(t) if t != 0.0 => t,
            _ => self.current_time(),
        };
        TimelineBuilder::new(element, time)
    }

    fn update_style(&mut self, prop: &str, value: StyleValue, arena: &mut StyleArena) {
        self.local.insert(prop.to_string(), value.clone());
        arena.set(self.element, prop, value.clone());
        self.style_summary.insert(
            prop.to_string(),
            StyleAtTime {
                time: self.current_time(),
                value,
            },
        );
    }

    /// `animate(duration)` with no styles: hold every known property via an
    /// `Auto` placeholder so later explicit values layer predictably on top.
    pub fn apply_empty_step(&mut self, easing: Option<&str>, arena: &mut StyleArena) {
        if let (Some(easing), Some(prev)) = (easing, self.previous) {
            self.keyframes[prev].easing = Some(easing.to_string());
        }
        if let Some(table) = arena.table(self.element) {
            let props: Vec<(String, StyleValue)> =
                table.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            for (prop, value) in props {
                self.back_fill.insert(prop.clone(), value);
                self.keyframes[self.current]
                    .styles
                    .insert(prop, StyleValue::Auto);
            }
        }
        self.current_empty_step_keyframe = Some(self.current);
    }

    pub fn set_styles(
        &mut self,
        tokens: &[StyleToken],
        easing: Option<&str>,
        params: &ParamMap,
        errors: &mut Vec<AnimationError>,
        arena: &mut StyleArena,
    ) {
        if let (Some(easing), Some(prev)) = (easing, self.previous) {
            self.keyframes[prev].easing = Some(easing.to_string());
        }
        let styles = self.flatten_tokens(tokens, arena);
        for (prop, value) in styles {
            let value = interpolate_params(&value, params, errors);
            self.pending.insert(prop.clone(), value.clone());
            if !self.local.contains_key(&prop) {
                let fill = arena
                    .get(self.element, &prop)
                    .cloned()
                    .unwrap_or(StyleValue::Auto);
                self.back_fill.insert(prop.clone(), fill);
            }
            self.update_style(&prop, value, arena);
        }
    }

    fn flatten_tokens(&self, tokens: &[StyleToken], arena: &StyleArena) -> Vec<(String, StyleValue)> {
        let mut out: Vec<(String, StyleValue)> = Vec::new();
        for token in tokens {
            match token {
                StyleToken::Wildcard => {
                    if let Some(table) = arena.table(self.element) {
                        for prop in table.keys() {
                            out.push((prop.clone(), StyleValue::Auto));
                        }
                    }
                }
                StyleToken::Styles(map) => {
                    for (prop, value) in map {
                        out.push((prop.clone(), value.clone()));
                    }
                }
            }
        }
        out
    }

    /// Flush pending styles into the current keyframe and carry forward
    /// every property this timeline already knows about.
    pub fn apply_styles_to_keyframe(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        for (prop, value) in pending {
            self.keyframes[self.current].styles.insert(prop, value);
        }
        let carried: Vec<(String, StyleValue)> = self
            .local_view()
            .filter(|(prop, _)| !self.keyframes[self.current].styles.contains_key(*prop))
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect();
        for (prop, value) in carried {
            self.keyframes[self.current].styles.insert(prop, value);
        }
    }

    /// Every property visible to this timeline: own writes shadow back-fill.
    fn local_view(&self) -> impl Iterator<Item = (&String, &StyleValue)> {
        self.local.iter().chain(
            self.back_fill
                .iter()
                .filter(|(prop, _)| !self.local.contains_key(*prop)),
        )
    }

    /// Re-assert every known style at the current time, so a following
    /// delayed or forked step departs from a consistent snapshot.
    pub fn snapshot_current_styles(&mut self, arena: &mut StyleArena) {
        let snapshot: Vec<(String, StyleValue)> = self
            .local_view()
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect();
        for (prop, value) in snapshot {
            self.pending.insert(prop.clone(), value.clone());
            self.update_style(&prop, value, arena);
        }
    }

    /// Adopt, for every property the other timeline wrote, whichever write
    /// happened last (timestamp comparison, not source order).
    pub fn merge_collected_styles(
        &mut self,
        summary: Vec<(String, f64, StyleValue)>,
        arena: &mut StyleArena,
    ) {
        for (prop, time, value) in summary {
            let newer = match self.style_summary.get(&prop) {
                Some(existing) => time > existing.time,
                None => true,
            };
            if newer {
                self.update_style(&prop, value, arena);
            }
        }
    }

    /// Snapshot of this timeline's style summary for merging into another.
    pub fn collected_styles(&self) -> Vec<(String, f64, StyleValue)> {
        self.style_summary
            .iter()
            .map(|(prop, at)| (prop.clone(), at.time, at.value.clone()))
            .collect()
    }

    /// Build the final instruction for this timeline.
    pub fn build(&mut self) -> TimelineInstruction {
        if self.sub.is_some() {
            return self.build_sub();
        }
        self.apply_styles_to_keyframe();

        let is_empty = self.keyframes.len() == 1 && self.duration == 0.0;
        let mut pre_props: Vec<String> = Vec::new();
        let mut post_props: Vec<String> = Vec::new();
        let mut final_keyframes: Vec<Keyframe> = Vec::new();

        for timed in &self.keyframes {
            // own writes shadow the shared back-fill table
            let mut styles = self.back_fill.clone();
            for (prop, value) in &timed.styles {
                styles.insert(prop.clone(), value.clone());
            }
            for (prop, value) in &styles {
                match value {
                    StyleValue::Pre => {
                        if !pre_props.contains(prop) {
                            pre_props.push(prop.clone());
                        }
                    }
                    StyleValue::Auto => {
                        if !post_props.contains(prop) {
                            post_props.push(prop.clone());
                        }
                    }
                    _ => {}
                }
            }
            let offset = if is_empty {
                0.0
            } else {
                timed.time / self.duration
            };
            final_keyframes.push(Keyframe::new(styles, offset, timed.easing.clone()));
        }

        if is_empty {
            let mut closing = final_keyframes[0].clone();
            closing.offset = 1.0;
            final_keyframes.push(closing);
        }

        TimelineInstruction::new(
            self.element,
            final_keyframes,
            pre_props,
            post_props,
            self.duration,
            self.start_time,
            self.easing.clone(),
            false,
        )
    }

    fn build_sub(&self) -> TimelineInstruction {
        let sub = self.sub.as_ref().expect("sub timeline payload");
        let mut keyframes = sub.keyframes.clone();
        let mut duration = sub.timings.duration;
        let mut delay = sub.timings.delay;
        let mut easing = sub.timings.easing.clone();

        if sub.stretch_start_keyframe && delay > 0.0 {
            let mut stretched: Vec<Keyframe> = Vec::with_capacity(keyframes.len() + 1);
            let total_time = duration + delay;
            let starting_gap = delay / total_time;

            // the original first keyframe now plays once the delay is done
            let mut first = keyframes[0].clone();
            first.offset = 0.0;
            stretched.push(first);
            let mut held = keyframes[0].clone();
            held.offset = round_offset(starting_gap);
            stretched.push(held);

            for kf in keyframes.iter().skip(1) {
                let mut kf = kf.clone();
                let time_at_keyframe = delay + kf.offset * duration;
                kf.offset = round_offset(time_at_keyframe / total_time);
                stretched.push(kf);
            }

            duration = total_time;
            delay = 0.0;
            easing = None;
            keyframes = stretched;
        }

        TimelineInstruction::new(
            self.element,
            keyframes,
            sub.pre_style_props.clone(),
            sub.post_style_props.clone(),
            duration,
            delay,
            easing,
            true,
        )
    }
}
