//! AST visitor producing per-element keyframe instructions.
//!
//! The pass owns every timeline it forks plus the shared style arena; walk
//! contexts are kept in an arena as well so a child context can reach back
//! to its parent (staggers accumulate time on the owning query context).

use crate::ast::{
    AnimateAst, AnimateChildAst, AnimateRefAst, AnimateStyle, AnimationNode, AnimationOptions,
    GroupAst, KeyframesAst, QueryAst, ReferenceAst, SequenceAst, StaggerAst, StyleAst, StyleToken,
};
use crate::driver::AnimationDriver;
use crate::element::ElementId;
use crate::error::AnimationError;
use crate::style::{StyleMap, StyleValue};
use crate::timeline::builder::{StyleArena, SubTimeline, TimelineBuilder};
use crate::timeline::{ElementInstructionMap, TimelineInstruction};
use crate::timing::{
    interpolate_params, resolve_time_value, resolve_timing, ParamMap, TimeValue, TimingSpec,
};
use crate::transition::{ENTER_TOKEN, LEAVE_TOKEN};

/// Compile an animation AST into time-ordered keyframe instructions.
///
/// Always returns at least one instruction: when nothing animates, a single
/// zero-duration instruction for the root element is emitted so the caller
/// can still apply the static start/end styles.
#[allow(clippy::too_many_arguments)]
pub fn build_keyframes(
    driver: &dyn AnimationDriver,
    root_element: ElementId,
    ast: &AnimationNode,
    enter_class: &str,
    leave_class: &str,
    starting_styles: &StyleMap,
    final_styles: &StyleMap,
    options: &AnimationOptions,
    sub_instructions: Option<&ElementInstructionMap>,
    errors: &mut Vec<AnimationError>,
) -> Vec<TimelineInstruction> {
    let empty_subs = ElementInstructionMap::new();
    let mut pass = CompilePass {
        driver,
        enter_selector: format!(".{enter_class}"),
        leave_selector: format!(".{leave_class}"),
        sub_instructions: sub_instructions.unwrap_or(&empty_subs),
        errors,
        arena: StyleArena::new(),
        timelines: vec![TimelineBuilder::new(root_element, 0.0)],
        contexts: Vec::new(),
    };
    pass.contexts.push(Ctx {
        element: root_element,
        timeline: 0,
        animate_timings: None,
        previous_node: PrevNode::Noop,
        sub_context_count: 0,
        options: ResolvedOptions::default(),
        query_index: 0,
        query_total: 0,
        stagger_time: 0.0,
        parent: None,
    });
    pass.update_options(0, Some(options), false);

    let delay = options
        .delay
        .as_ref()
        .map(resolve_time_value)
        .unwrap_or(0.0);
    pass.timelines[0].delay_next_step(delay, &mut pass.arena);
    let params = pass.contexts[0].options.params.clone();
    pass.timelines[0].set_styles(
        &[StyleToken::Styles(starting_styles.clone())],
        None,
        &params,
        pass.errors,
        &mut pass.arena,
    );

    pass.visit(ast, 0);

    let built: Vec<usize> = (0..pass.timelines.len())
        .filter(|&i| pass.timelines[i].contains_animation())
        .collect();

    if !built.is_empty() && !final_styles.is_empty() {
        // `Auto` end styles are replaced with the destination state's values
        // only on the root element's last timeline, and only when its final
        // step was an empty one (an explicit end style always wins).
        let last_root = built
            .iter()
            .rev()
            .copied()
            .find(|&i| pass.timelines[i].element == root_element);
        if let Some(last_root) = last_root {
            if !pass.timelines[last_root].allow_only_timeline_styles() {
                let params = pass.contexts[0].options.params.clone();
                pass.timelines[last_root].set_styles(
                    &[StyleToken::Styles(final_styles.clone())],
                    None,
                    &params,
                    pass.errors,
                    &mut pass.arena,
                );
            }
        }
    }

    if built.is_empty() {
        return vec![TimelineInstruction::new(
            root_element,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            0.0,
            delay,
            None,
            false,
        )];
    }
    built
        .into_iter()
        .map(|i| pass.timelines[i].build())
        .collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PrevNode {
    Noop,
    Style,
    Other,
}

#[derive(Clone, Debug, Default)]
struct ResolvedOptions {
    duration: Option<f64>,
    delay: Option<f64>,
    params: ParamMap,
}

#[derive(Debug)]
struct Ctx {
    element: ElementId,
    timeline: usize,
    animate_timings: Option<TimingSpec>,
    previous_node: PrevNode,
    sub_context_count: usize,
    options: ResolvedOptions,
    query_index: usize,
    query_total: usize,
    stagger_time: f64,
    parent: Option<usize>,
}

struct CompilePass<'a> {
    driver: &'a dyn AnimationDriver,
    enter_selector: String,
    leave_selector: String,
    sub_instructions: &'a ElementInstructionMap,
    errors: &'a mut Vec<AnimationError>,
    arena: StyleArena,
    timelines: Vec<TimelineBuilder>,
    contexts: Vec<Ctx>,
}

impl<'a> CompilePass<'a> {
    fn visit(&mut self, node: &AnimationNode, ctx: usize) {
        match node {
            AnimationNode::Sequence(ast) => self.visit_sequence(ast, ctx),
            AnimationNode::Group(ast) => self.visit_group(ast, ctx),
            AnimationNode::Style(ast) => self.visit_style(ast, ctx),
            AnimationNode::Animate(ast) => self.visit_animate(ast, ctx),
            AnimationNode::Keyframes(ast) => {
                if self.contexts[ctx].animate_timings.is_none() {
                    self.errors.push(AnimationError::InvalidExpression {
                        expression: "keyframes() must be placed inside of a call to animate()"
                            .into(),
                    });
                    return;
                }
                self.visit_keyframes(ast, ctx);
            }
            AnimationNode::Query(ast) => self.visit_query(ast, ctx),
            AnimationNode::Stagger(ast) => self.visit_stagger(ast, ctx),
            AnimationNode::Reference(ast) => self.visit_reference(ast, ctx),
            AnimationNode::AnimateChild(ast) => self.visit_animate_child(ast, ctx),
            AnimationNode::AnimateRef(ast) => self.visit_animate_ref(ast, ctx),
        }
    }

    // -- context plumbing ---------------------------------------------------

    fn update_options(
        &mut self,
        ctx: usize,
        options: Option<&AnimationOptions>,
        skip_if_exists: bool,
    ) {
        let Some(options) = options else { return };
        if let Some(duration) = &options.duration {
            self.contexts[ctx].options.duration = Some(resolve_time_value(duration));
        }
        if let Some(delay) = &options.delay {
            self.contexts[ctx].options.delay = Some(resolve_time_value(delay));
        }
        if let Some(new_params) = &options.params {
            let existing = self.contexts[ctx].options.params.clone();
            for (name, value) in new_params {
                if !skip_if_exists || !existing.contains_key(name) {
                    let value = interpolate_params(value, &existing, self.errors);
                    self.contexts[ctx].options.params.insert(name.clone(), value);
                }
            }
        }
    }

    fn create_sub_context(
        &mut self,
        parent: usize,
        options: Option<&AnimationOptions>,
        element: Option<ElementId>,
        new_time: Option<f64>,
    ) -> usize {
        let target = element.unwrap_or(self.contexts[parent].element);
        let parent_tl = self.contexts[parent].timeline;
        let forked = self.timelines[parent_tl].fork(target, new_time);
        self.timelines.push(forked);
        let timeline = self.timelines.len() - 1;

        let p = &self.contexts[parent];
        let ctx = Ctx {
            element: target,
            timeline,
            animate_timings: p.animate_timings.clone(),
            previous_node: p.previous_node,
            sub_context_count: 0,
            options: ResolvedOptions {
                duration: None,
                delay: None,
                params: p.options.params.clone(),
            },
            query_index: p.query_index,
            query_total: p.query_total,
            stagger_time: 0.0,
            parent: Some(parent),
        };
        self.contexts.push(ctx);
        let id = self.contexts.len() - 1;
        self.update_options(id, options, false);
        self.contexts[parent].sub_context_count += 1;
        id
    }

    fn transform_into_new_timeline(&mut self, ctx: usize, new_time: Option<f64>) {
        let tl = self.contexts[ctx].timeline;
        let element = self.contexts[ctx].element;
        let forked = self.timelines[tl].fork(element, new_time);
        self.timelines.push(forked);
        self.contexts[ctx].previous_node = PrevNode::Noop;
        self.contexts[ctx].timeline = self.timelines.len() - 1;
    }

    fn increment_time(&mut self, ctx: usize, time: f64) {
        let tl = self.contexts[ctx].timeline;
        let next = self.timelines[tl].duration + time;
        self.timelines[tl].forward_time(next);
    }

    fn delay_next_step(&mut self, ctx: usize, delay: f64) {
        // negative delays are not supported
        if delay > 0.0 {
            let tl = self.contexts[ctx].timeline;
            self.timelines[tl].delay_next_step(delay, &mut self.arena);
        }
    }

    fn current_time(&self, ctx: usize) -> f64 {
        self.timelines[self.contexts[ctx].timeline].current_time()
    }

    fn visit_timing(&mut self, timings: &TimeValue, ctx: usize) -> TimingSpec {
        match timings {
            TimeValue::Expr(expr) if expr.contains("{{") => {
                let params = self.contexts[ctx].options.params.clone();
                let interpolated =
                    interpolate_params(&StyleValue::Str(expr.clone()), &params, self.errors);
                resolve_timing(&TimeValue::Expr(interpolated.as_text()), self.errors, false)
            }
            other => resolve_timing(other, self.errors, false),
        }
    }

    // -- node visitors ------------------------------------------------------

    fn visit_sequence(&mut self, ast: &SequenceAst, ctx: usize) {
        let sub_count_before = self.contexts[ctx].sub_context_count;
        let mut cur = ctx;

        if let Some(options) = &ast.options {
            if options.params.is_some() || options.delay.is_some() {
                cur = self.create_sub_context(ctx, Some(options), None, None);
                self.transform_into_new_timeline(cur, None);
                if let Some(delay) = &options.delay {
                    if self.contexts[cur].previous_node == PrevNode::Style {
                        let tl = self.contexts[cur].timeline;
                        self.timelines[tl].snapshot_current_styles(&mut self.arena);
                        self.contexts[cur].previous_node = PrevNode::Noop;
                    }
                    let delay = resolve_time_value(delay);
                    self.delay_next_step(cur, delay);
                }
            }
        }

        if !ast.steps.is_empty() {
            for step in &ast.steps {
                self.visit(step, cur);
            }
            let tl = self.contexts[cur].timeline;
            self.timelines[tl].apply_styles_to_keyframe();

            // an inner step forked its own timeline, so the sequence must
            // not keep accumulating onto a timeline it may now overlap
            if self.contexts[cur].sub_context_count > sub_count_before {
                self.transform_into_new_timeline(cur, None);
            }
        }

        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn visit_group(&mut self, ast: &GroupAst, ctx: usize) {
        let mut inner_timelines: Vec<usize> = Vec::new();
        let mut furthest_time = self.current_time(ctx);
        let delay = ast
            .options
            .as_ref()
            .and_then(|o| o.delay.as_ref())
            .map(resolve_time_value)
            .unwrap_or(0.0);

        for step in &ast.steps {
            let inner = self.create_sub_context(ctx, ast.options.as_ref(), None, None);
            if delay > 0.0 {
                self.delay_next_step(inner, delay);
            }
            self.visit(step, inner);
            furthest_time = furthest_time.max(self.current_time(inner));
            inner_timelines.push(self.contexts[inner].timeline);
        }

        // merged after the walk so a parent update cannot leak into a later
        // fork's back-fill
        for tl in inner_timelines {
            let summary = self.timelines[tl].collected_styles();
            let target = self.contexts[ctx].timeline;
            self.timelines[target].merge_collected_styles(summary, &mut self.arena);
        }
        self.transform_into_new_timeline(ctx, Some(furthest_time));
        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn visit_animate(&mut self, ast: &AnimateAst, ctx: usize) {
        let timings = self.visit_timing(&ast.timings, ctx);
        self.contexts[ctx].animate_timings = Some(timings.clone());

        if timings.delay > 0.0 {
            self.increment_time(ctx, timings.delay);
            let tl = self.contexts[ctx].timeline;
            self.timelines[tl].snapshot_current_styles(&mut self.arena);
        }

        match &ast.style {
            AnimateStyle::Keyframes(kf) => self.visit_keyframes(kf, ctx),
            AnimateStyle::Style(style) => {
                self.increment_time(ctx, timings.duration);
                self.visit_style(style, ctx);
                let tl = self.contexts[ctx].timeline;
                self.timelines[tl].apply_styles_to_keyframe();
            }
        }

        self.contexts[ctx].animate_timings = None;
        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn visit_style(&mut self, ast: &StyleAst, ctx: usize) {
        let tl = self.contexts[ctx].timeline;
        let timings = self.contexts[ctx].animate_timings.clone();

        // a style() directly following an animate() needs its own frame
        if timings.is_none() && self.timelines[tl].has_current_style_properties() {
            self.timelines[tl].forward_frame();
        }

        let easing = timings
            .and_then(|t| t.easing)
            .or_else(|| ast.easing.clone());
        if ast.is_empty_step {
            self.timelines[tl].apply_empty_step(easing.as_deref(), &mut self.arena);
        } else {
            let params = self.contexts[ctx].options.params.clone();
            self.timelines[tl].set_styles(
                &ast.styles,
                easing.as_deref(),
                &params,
                self.errors,
                &mut self.arena,
            );
        }

        self.contexts[ctx].previous_node = PrevNode::Style;
    }

    fn visit_keyframes(&mut self, ast: &KeyframesAst, ctx: usize) {
        let timings = self
            .contexts[ctx]
            .animate_timings
            .clone()
            .expect("keyframes are visited within animate()");
        let start_time = self.current_time(ctx);
        let duration = timings.duration;

        let offsets = self.resolve_keyframe_offsets(ast);

        let inner = self.create_sub_context(ctx, None, None, None);
        let inner_tl = self.contexts[inner].timeline;
        self.timelines[inner_tl].easing = timings.easing.clone();

        for (step, offset) in ast.steps.iter().zip(offsets) {
            self.timelines[inner_tl].forward_time(offset * duration);
            let params = self.contexts[inner].options.params.clone();
            self.timelines[inner_tl].set_styles(
                &step.styles,
                step.easing.as_deref(),
                &params,
                self.errors,
                &mut self.arena,
            );
            self.timelines[inner_tl].apply_styles_to_keyframe();
        }

        // the parent timeline adopts the child's styles even if the fork
        // below never accumulates anything further
        let summary = self.timelines[inner_tl].collected_styles();
        let target = self.contexts[ctx].timeline;
        self.timelines[target].merge_collected_styles(summary, &mut self.arena);

        self.transform_into_new_timeline(ctx, Some(start_time + duration));
        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn resolve_keyframe_offsets(&mut self, ast: &KeyframesAst) -> Vec<f64> {
        let count = ast.steps.len();
        let mut offsets: Vec<f64> = Vec::with_capacity(count);
        let mut with_offset = 0usize;
        let mut previous = 0.0f64;
        for step in &ast.steps {
            let offset = step.offset.unwrap_or(0.0);
            if step.offset.is_some() {
                with_offset += 1;
                if !(0.0..=1.0).contains(&offset) || offset < previous {
                    self.errors
                        .push(AnimationError::InvalidKeyframeOffset { offset });
                }
                previous = offset;
            }
            offsets.push(offset);
        }

        if with_offset > 0 && with_offset < count {
            self.errors.push(AnimationError::PartialKeyframeOffsets);
        }
        if with_offset == 0 && count > 1 {
            let generated = 1.0 / (count as f64 - 1.0);
            for (i, offset) in offsets.iter_mut().enumerate() {
                *offset = if i == count - 1 {
                    1.0
                } else {
                    generated * i as f64
                };
            }
        }
        offsets
    }

    fn visit_query(&mut self, ast: &QueryAst, ctx: usize) {
        let start_time = self.current_time(ctx);
        let delay = ast
            .options
            .as_ref()
            .and_then(|o| o.delay.as_ref())
            .map(resolve_time_value)
            .unwrap_or(0.0);

        // a style step landing right before a delayed query must be applied
        // before the matched children start animating
        let tl = self.contexts[ctx].timeline;
        if delay > 0.0
            && (self.contexts[ctx].previous_node == PrevNode::Style
                || (start_time == 0.0 && self.timelines[tl].has_current_style_properties()))
        {
            self.timelines[tl].snapshot_current_styles(&mut self.arena);
            self.contexts[ctx].previous_node = PrevNode::Noop;
        }

        let mut furthest_time = start_time;
        let elements = self.invoke_query(ctx, ast);
        log::trace!(
            "query '{}' matched {} element(s)",
            ast.original_selector,
            elements.len()
        );

        self.contexts[ctx].query_total = elements.len();
        let mut same_element_timeline: Option<usize> = None;

        for (i, element) in elements.iter().copied().enumerate() {
            self.contexts[ctx].query_index = i;
            let inner = self.create_sub_context(ctx, ast.options.as_ref(), Some(element), None);
            if delay > 0.0 {
                self.delay_next_step(inner, delay);
            }
            if element == self.contexts[ctx].element {
                same_element_timeline = Some(self.contexts[inner].timeline);
            }
            self.visit(&ast.animation, inner);

            let inner_tl = self.contexts[inner].timeline;
            self.timelines[inner_tl].apply_styles_to_keyframe();
            furthest_time = furthest_time.max(self.current_time(inner));
        }

        self.contexts[ctx].query_index = 0;
        self.contexts[ctx].query_total = 0;
        self.transform_into_new_timeline(ctx, Some(furthest_time));

        if let Some(sub_tl) = same_element_timeline {
            // the query touched its own context element; its fork continues
            // the context's timeline, so the styles propagate upward
            let summary = self.timelines[sub_tl].collected_styles();
            let target = self.contexts[ctx].timeline;
            self.timelines[target].merge_collected_styles(summary, &mut self.arena);
            self.timelines[target].snapshot_current_styles(&mut self.arena);
        }

        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn invoke_query(&mut self, ctx: usize, ast: &QueryAst) -> Vec<ElementId> {
        let mut results: Vec<ElementId> = Vec::new();
        if ast.include_self {
            results.push(self.contexts[ctx].element);
        }
        if !ast.selector.is_empty() {
            let selector = ast
                .selector
                .replace(ENTER_TOKEN, &self.enter_selector)
                .replace(LEAVE_TOKEN, &self.leave_selector);
            let multi = ast.limit != 1;
            let mut elements = self
                .driver
                .query(self.contexts[ctx].element, &selector, multi);
            if ast.limit != 0 {
                if ast.limit < 0 {
                    let start = (elements.len() as i64 + ast.limit).max(0) as usize;
                    elements.drain(..start);
                } else {
                    elements.truncate(ast.limit as usize);
                }
            }
            results.extend(elements);
        }

        if !ast.optional && results.is_empty() {
            self.errors.push(AnimationError::InvalidQuery {
                selector: ast.original_selector.clone(),
            });
        }
        results
    }

    fn visit_stagger(&mut self, ast: &StaggerAst, ctx: usize) {
        let parent = self.contexts[ctx].parent.unwrap_or(ctx);
        let tl = self.contexts[ctx].timeline;

        let timings = match &ast.timings {
            TimeValue::Expr(expr) if expr.contains("{{") => {
                let params = self.contexts[ctx].options.params.clone();
                let interpolated =
                    interpolate_params(&StyleValue::Str(expr.clone()), &params, self.errors);
                resolve_timing(&TimeValue::Expr(interpolated.as_text()), self.errors, true)
            }
            other => resolve_timing(other, self.errors, true),
        };

        let duration = timings.duration.abs();
        let max_time = duration * (self.contexts[ctx].query_total.saturating_sub(1)) as f64;
        let mut delay = duration * self.contexts[ctx].query_index as f64;

        let transformer = if timings.duration < 0.0 {
            "reverse"
        } else {
            timings.easing.as_deref().unwrap_or("")
        };
        match transformer {
            "reverse" => delay = max_time - delay,
            "full" => delay = self.contexts[parent].stagger_time,
            _ => {}
        }

        if delay > 0.0 {
            self.timelines[tl].delay_next_step(delay, &mut self.arena);
        }

        let starting_time = self.timelines[tl].current_time();
        self.visit(&ast.animation, ctx);
        self.contexts[ctx].previous_node = PrevNode::Other;

        // the inner animation may carry its delay either as a player delay or
        // as a stretched start keyframe, so both components count
        let parent_tl_start = self.timelines[self.contexts[parent].timeline].start_time;
        self.contexts[parent].stagger_time = (self.timelines[tl].current_time() - starting_time)
            + (self.timelines[tl].start_time - parent_tl_start);
    }

    fn visit_reference(&mut self, ast: &ReferenceAst, ctx: usize) {
        self.update_options(ctx, ast.options.as_ref(), true);
        self.visit(&ast.animation, ctx);
        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn visit_animate_child(&mut self, ast: &AnimateChildAst, ctx: usize) {
        let element = self.contexts[ctx].element;
        let instructions: Option<Vec<TimelineInstruction>> =
            self.sub_instructions.get(element).map(<[_]>::to_vec);
        if let Some(instructions) = instructions {
            let inner = self.create_sub_context(ctx, ast.options.as_ref(), None, None);
            let start_time = self.current_time(ctx);
            let end_time = self.visit_sub_instructions(&instructions, inner);
            if start_time != end_time {
                // the sub context absorbed the splices; realign this context
                self.transform_into_new_timeline(ctx, Some(end_time));
            }
        }
        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn visit_sub_instructions(
        &mut self,
        instructions: &[TimelineInstruction],
        ctx: usize,
    ) -> f64 {
        let start_time = self.current_time(ctx);
        let mut furthest_time = start_time;
        let duration = self.contexts[ctx].options.duration;
        let delay = self.contexts[ctx].options.delay;

        // a zero duration override skips the child animation entirely
        if duration != Some(0.0) {
            for instruction in instructions {
                let timings = self.append_instruction_to_timeline(ctx, instruction, duration, delay);
                furthest_time = furthest_time.max(timings.duration + timings.delay);
            }
        }
        furthest_time
    }

    fn append_instruction_to_timeline(
        &mut self,
        ctx: usize,
        instruction: &TimelineInstruction,
        duration: Option<f64>,
        delay: Option<f64>,
    ) -> TimingSpec {
        let timings = TimingSpec {
            duration: duration.unwrap_or(instruction.duration),
            delay: self.current_time(ctx) + delay.unwrap_or(0.0) + instruction.delay,
            easing: None,
        };
        let sub = SubTimeline {
            keyframes: instruction.keyframes.clone(),
            pre_style_props: instruction.pre_style_props.clone(),
            post_style_props: instruction.post_style_props.clone(),
            timings: timings.clone(),
            stretch_start_keyframe: instruction.stretch_start_keyframe,
        };
        self.timelines
            .push(TimelineBuilder::new_sub(instruction.element, sub));
        timings
    }

    fn visit_animate_ref(&mut self, ast: &AnimateRefAst, ctx: usize) {
        let inner = self.create_sub_context(ctx, ast.options.as_ref(), None, None);
        self.transform_into_new_timeline(inner, None);
        self.apply_animation_ref_delays(
            &[ast.options.as_ref(), ast.animation.options.as_ref()],
            inner,
        );
        self.visit_reference(&ast.animation, inner);
        let end_time = self.current_time(inner);
        self.transform_into_new_timeline(ctx, Some(end_time));
        self.contexts[ctx].previous_node = PrevNode::Other;
    }

    fn apply_animation_ref_delays(
        &mut self,
        options_list: &[Option<&AnimationOptions>],
        ctx: usize,
    ) {
        for options in options_list.iter().copied().flatten() {
            if let Some(delay) = &options.delay {
                let delay_ms = match delay {
                    TimeValue::Millis(ms) => *ms,
                    TimeValue::Expr(expr) => {
                        let params = options.params.clone().unwrap_or_default();
                        let interpolated = interpolate_params(
                            &StyleValue::Str(expr.clone()),
                            &params,
                            self.errors,
                        );
                        resolve_time_value(&TimeValue::Expr(interpolated.as_text()))
                    }
                };
                self.delay_next_step(ctx, delay_ms);
            }
        }
    }
}
