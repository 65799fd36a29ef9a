//! Factory functions that assemble animation AST literals.
//!
//! These are deliberately trivial constructors: anything that needs timing or
//! element context to validate is deferred to compilation. The only eager
//! work done here is selector token normalization, so that the compiler never
//! sees raw `@trigger` / `:self` / `:animating` tokens.

use crate::ast::{
    AnimateAst, AnimateChildAst, AnimateRefAst, AnimateStyle, AnimationNode, AnimationOptions,
    GroupAst, KeyframesAst, QueryAst, ReferenceAst, SequenceAst, StaggerAst, StyleAst, StyleToken,
};
use crate::error::AnimationError;
use crate::style::{StyleMap, StyleValue};
use crate::timing::{ParamMap, TimeValue};
use crate::transition::trigger::{AnimationTrigger, TriggerItem};
use crate::transition::{ANIMATING_SELECTOR, TRIGGER_CLASSNAME, TRIGGER_SELECTOR};

/// Build a style map from property/value pairs.
pub fn style_map<V: Into<StyleValue>>(entries: Vec<(&str, V)>) -> StyleMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

/// `style({...})`
pub fn style<V: Into<StyleValue>>(entries: Vec<(&str, V)>) -> StyleAst {
    StyleAst {
        styles: vec![StyleToken::Styles(style_map(entries))],
        easing: None,
        offset: None,
        is_empty_step: false,
    }
}

/// `style("*")`: every property known for the element so far, valued `Auto`.
pub fn style_wildcard() -> StyleAst {
    StyleAst {
        styles: vec![StyleToken::Wildcard],
        easing: None,
        offset: None,
        is_empty_step: false,
    }
}

/// Attach an explicit keyframe offset to a style step.
pub fn with_offset(mut style: StyleAst, offset: f64) -> StyleAst {
    style.offset = Some(offset);
    style
}

/// `animate(timings, style(...))`
pub fn animate(timings: impl Into<TimeValue>, style: StyleAst) -> AnimationNode {
    AnimationNode::Animate(AnimateAst {
        timings: timings.into(),
        style: AnimateStyle::Style(style),
    })
}

/// `animate(timings, keyframes([...]))`
pub fn animate_keyframes(timings: impl Into<TimeValue>, steps: Vec<StyleAst>) -> AnimationNode {
    AnimationNode::Animate(AnimateAst {
        timings: timings.into(),
        style: AnimateStyle::Keyframes(KeyframesAst { steps }),
    })
}

/// `animate(timings)` with no style: an empty step that holds current styles.
pub fn animate_empty(timings: impl Into<TimeValue>) -> AnimationNode {
    AnimationNode::Animate(AnimateAst {
        timings: timings.into(),
        style: AnimateStyle::Style(StyleAst {
            styles: vec![StyleToken::Styles(StyleMap::new())],
            easing: None,
            offset: None,
            is_empty_step: true,
        }),
    })
}

/// `sequence([...])`
pub fn sequence(steps: Vec<AnimationNode>) -> AnimationNode {
    AnimationNode::Sequence(SequenceAst {
        steps,
        options: None,
    })
}

pub fn sequence_with_options(
    steps: Vec<AnimationNode>,
    options: AnimationOptions,
) -> AnimationNode {
    AnimationNode::Sequence(SequenceAst {
        steps,
        options: Some(options),
    })
}

/// `group([...])`
pub fn group(steps: Vec<AnimationNode>) -> AnimationNode {
    AnimationNode::Group(GroupAst {
        steps,
        options: None,
    })
}

pub fn group_with_options(steps: Vec<AnimationNode>, options: AnimationOptions) -> AnimationNode {
    AnimationNode::Group(GroupAst {
        steps,
        options: Some(options),
    })
}

/// `query(selector, animation)` with a required match.
pub fn query(selector: &str, animation: AnimationNode) -> AnimationNode {
    query_full(selector, animation, false, 0, None)
}

/// `query(selector, animation, {optional: true})`
pub fn query_optional(selector: &str, animation: AnimationNode) -> AnimationNode {
    query_full(selector, animation, true, 0, None)
}

pub fn query_full(
    selector: &str,
    animation: AnimationNode,
    optional: bool,
    limit: i64,
    options: Option<AnimationOptions>,
) -> AnimationNode {
    let (normalized, include_self) = normalize_selector(selector);
    AnimationNode::Query(QueryAst {
        selector: normalized,
        original_selector: selector.to_string(),
        limit,
        optional,
        include_self,
        animation: Box::new(animation),
        options,
    })
}

/// `stagger(timings, animation)`; a negative duration reverses the order.
pub fn stagger(timings: impl Into<TimeValue>, animation: AnimationNode) -> AnimationNode {
    AnimationNode::Stagger(StaggerAst {
        timings: timings.into(),
        animation: Box::new(animation),
    })
}

/// `animation([...], options)`: a reusable reference definition.
pub fn animation(steps: Vec<AnimationNode>, options: Option<AnimationOptions>) -> ReferenceAst {
    ReferenceAst {
        animation: Box::new(sequence(steps)),
        options,
    }
}

/// `useAnimation(ref, options)`
pub fn use_animation(reference: ReferenceAst, options: Option<AnimationOptions>) -> AnimationNode {
    AnimationNode::AnimateRef(AnimateRefAst {
        animation: reference,
        options,
    })
}

/// `animateChild(options)`
pub fn animate_child(options: Option<AnimationOptions>) -> AnimationNode {
    AnimationNode::AnimateChild(AnimateChildAst { options })
}

/// Options with only a delay.
pub fn delay_options(delay: impl Into<TimeValue>) -> AnimationOptions {
    AnimationOptions {
        duration: None,
        delay: Some(delay.into()),
        params: None,
    }
}

/// Options with only params.
pub fn param_options(params: ParamMap) -> AnimationOptions {
    AnimationOptions {
        duration: None,
        delay: None,
        params: Some(params),
    }
}

/// `state(name, style(...))`; the name may be a comma-separated list.
pub fn state(name: &str, styles: StyleAst) -> TriggerItem {
    TriggerItem::State {
        name: name.to_string(),
        styles,
        params: None,
    }
}

pub fn state_with_params(name: &str, styles: StyleAst, params: ParamMap) -> TriggerItem {
    TriggerItem::State {
        name: name.to_string(),
        styles,
        params: Some(params),
    }
}

/// `transition(expr, [...])`
pub fn transition(expr: &str, steps: Vec<AnimationNode>) -> TriggerItem {
    TriggerItem::Transition {
        expr: expr.to_string(),
        animation: sequence(steps),
        options: None,
    }
}

pub fn transition_with_options(
    expr: &str,
    steps: Vec<AnimationNode>,
    options: AnimationOptions,
) -> TriggerItem {
    TriggerItem::Transition {
        expr: expr.to_string(),
        animation: sequence(steps),
        options: Some(options),
    }
}

/// `trigger(name, [...])`; malformed transition expressions fail here.
pub fn trigger(name: &str, items: Vec<TriggerItem>) -> Result<AnimationTrigger, AnimationError> {
    AnimationTrigger::build(name, items)
}

/// Rewrite engine tokens inside a query selector.
///
/// `:self` (as a standalone comma-separated part) marks the query as
/// including the context element; `@*` and `@name` become trigger marker
/// class selectors; `:animating` becomes the active-animation marker.
/// `:enter`/`:leave` are left untouched here since their classes are only
/// known per compile pass.
pub fn normalize_selector(selector: &str) -> (String, bool) {
    let mut include_self = false;
    let parts: Vec<&str> = selector
        .split(',')
        .map(str::trim)
        .filter(|part| {
            if *part == ":self" {
                include_self = true;
                false
            } else {
                true
            }
        })
        .collect();
    let joined = parts.join(", ");

    let mut out = String::with_capacity(joined.len());
    let mut chars = joined.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '@' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'*') {
            chars.next();
            out.push_str(TRIGGER_SELECTOR);
        } else {
            let mut name = String::new();
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '_' || n == '-' {
                    name.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('@');
            } else {
                out.push('.');
                out.push_str(TRIGGER_CLASSNAME);
                out.push('-');
                out.push_str(&name);
            }
        }
    }
    (out.replace(":animating", ANIMATING_SELECTOR), include_self)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should rewrite trigger and animating tokens and strip :self
    #[test]
    fn selector_normalization() {
        let (sel, include_self) = normalize_selector(":self, @*, @fade, :animating, .plain");
        assert!(include_self);
        assert_eq!(
            sel,
            ".anim-trigger, .anim-trigger-fade, .anim-animating, .plain"
        );
    }

    /// it should keep :enter and :leave untouched for per-pass rewriting
    #[test]
    fn enter_leave_left_raw() {
        let (sel, include_self) = normalize_selector(":enter, :leave");
        assert!(!include_self);
        assert_eq!(sel, ":enter, :leave");
    }
}
