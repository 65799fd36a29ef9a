//! Trigger definitions: named per-element state machines whose transitions
//! map a (from, to) state change onto an animation AST.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{AnimationNode, AnimationOptions, StyleAst, StyleToken};
use crate::builders::sequence;
use crate::driver::AnimationDriver;
use crate::element::ElementId;
use crate::error::AnimationError;
use crate::style::StyleMap;
use crate::timeline::{build_keyframes, ElementInstructionMap, TimelineInstruction};
use crate::timing::{apply_param_defaults, interpolate_params, ParamMap};
use crate::transition::VOID_VALUE;

/// Raw trigger input as the host hands it over: either a bare value or a
/// value with explicit params.
#[derive(Clone, Debug, PartialEq)]
pub enum TriggerValue {
    Bare(String),
    WithParams { value: String, params: ParamMap },
}

impl TriggerValue {
    pub fn value(&self) -> &str {
        match self {
            TriggerValue::Bare(value) => value,
            TriggerValue::WithParams { value, .. } => value,
        }
    }

    pub fn has_explicit_params(&self) -> bool {
        matches!(self, TriggerValue::WithParams { .. })
    }
}

impl From<&str> for TriggerValue {
    fn from(value: &str) -> Self {
        TriggerValue::Bare(value.to_string())
    }
}

impl From<bool> for TriggerValue {
    fn from(value: bool) -> Self {
        TriggerValue::Bare(if value { "1" } else { "0" }.to_string())
    }
}

/// Normalized (value, params) pair for one trigger on one element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    pub value: String,
    pub params: ParamMap,
    pub namespace_id: String,
}

impl StateValue {
    pub fn new(input: TriggerValue, namespace_id: &str) -> Self {
        let (value, params) = match input {
            TriggerValue::Bare(value) => (value, ParamMap::new()),
            TriggerValue::WithParams { value, params } => (value, params),
        };
        Self {
            value,
            params,
            namespace_id: namespace_id.to_string(),
        }
    }

    pub fn void() -> Self {
        Self {
            value: VOID_VALUE.to_string(),
            params: ParamMap::new(),
            namespace_id: String::new(),
        }
    }

    /// Merge the previous state's params onto this one without overriding
    /// anything explicitly provided.
    pub fn absorb_params(&mut self, previous: &ParamMap) {
        for (name, value) in previous {
            self.params
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// One parsed matcher of a transition expression.
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionMatcher {
    States { from: String, to: String },
    Increment,
    Decrement,
    Always,
}

impl TransitionMatcher {
    pub fn matches(&self, from: &str, to: &str) -> bool {
        match self {
            TransitionMatcher::States { from: lhs, to: rhs } => {
                (lhs == "*" || lhs == from) && (rhs == "*" || rhs == to)
            }
            TransitionMatcher::Increment => match (from.parse::<f64>(), to.parse::<f64>()) {
                (Ok(from), Ok(to)) => to > from,
                _ => false,
            },
            TransitionMatcher::Decrement => match (from.parse::<f64>(), to.parse::<f64>()) {
                (Ok(from), Ok(to)) => to < from,
                _ => false,
            },
            TransitionMatcher::Always => true,
        }
    }
}

fn normalize_state_token(token: &str) -> Option<String> {
    let aliased = match token {
        "true" => "1",
        "false" => "0",
        other => other,
    };
    let valid = aliased == "*"
        || aliased
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid && !aliased.is_empty() {
        Some(aliased.to_string())
    } else {
        None
    }
}

/// Parse a transition expression into matchers. Supports `a => b`,
/// `a <=> b`, comma-separated lists, `*`/`void` tokens, boolean aliases and
/// the `:enter`/`:leave`/`:increment`/`:decrement` shorthands.
pub fn parse_transition_expr(expr: &str) -> Result<Vec<TransitionMatcher>, AnimationError> {
    let mut matchers = Vec::new();
    for part in expr.split(',').map(str::trim) {
        parse_inner_transition(part, &mut matchers).ok_or_else(|| {
            AnimationError::InvalidExpression {
                expression: expr.to_string(),
            }
        })?;
    }
    Ok(matchers)
}

fn parse_inner_transition(part: &str, out: &mut Vec<TransitionMatcher>) -> Option<()> {
    let part = match part {
        ":enter" => "void => *",
        ":leave" => "* => void",
        ":increment" => {
            out.push(TransitionMatcher::Increment);
            return Some(());
        }
        ":decrement" => {
            out.push(TransitionMatcher::Decrement);
            return Some(());
        }
        other if other.starts_with(':') => return None,
        other => other,
    };

    let (lhs, rhs, bidirectional) = if let Some(idx) = part.find("<=>") {
        (&part[..idx], &part[idx + 3..], true)
    } else if let Some(idx) = part.find("=>") {
        (&part[..idx], &part[idx + 2..], false)
    } else {
        return None;
    };

    let from = normalize_state_token(lhs.trim())?;
    let to = normalize_state_token(rhs.trim())?;
    let full_wildcard = from == "*" && to == "*";
    out.push(TransitionMatcher::States {
        from: from.clone(),
        to: to.clone(),
    });
    if bidirectional && !full_wildcard {
        out.push(TransitionMatcher::States { from: to, to: from });
    }
    Some(())
}

/// Styles registered for one named state, with its default params.
#[derive(Clone, Debug)]
pub struct StateStyles {
    styles: StyleAst,
    default_params: ParamMap,
}

impl StateStyles {
    pub fn new(styles: StyleAst, default_params: ParamMap) -> Self {
        Self {
            styles,
            default_params,
        }
    }

    pub fn build_styles(&self, params: &ParamMap, errors: &mut Vec<AnimationError>) -> StyleMap {
        let combined = apply_param_defaults(params, &self.default_params);
        let mut out = StyleMap::new();
        for token in &self.styles.styles {
            if let StyleToken::Styles(map) = token {
                for (prop, value) in map {
                    out.insert(prop.clone(), interpolate_params(value, &combined, errors));
                }
            }
        }
        out
    }
}

/// Everything the engine needs to run one matched transition.
#[derive(Clone, Debug)]
pub struct TransitionInstruction {
    pub element: ElementId,
    pub trigger_name: String,
    pub from_state: String,
    pub to_state: String,
    pub is_removal_transition: bool,
    pub from_styles: StyleMap,
    pub to_styles: StyleMap,
    pub timelines: Vec<TimelineInstruction>,
    pub queried_elements: Vec<ElementId>,
    pub pre_style_props: HashMap<ElementId, Vec<String>>,
    pub post_style_props: HashMap<ElementId, Vec<String>>,
    pub total_time: f64,
    pub errors: Vec<AnimationError>,
}

/// One transition rule of a trigger: matchers plus the animation to build
/// when they match.
#[derive(Clone, Debug)]
pub struct TransitionFactory {
    trigger_name: String,
    pub matchers: Vec<TransitionMatcher>,
    pub animation: AnimationNode,
    pub options: Option<AnimationOptions>,
    pub query_count: usize,
    pub dep_count: usize,
    state_styles: Rc<HashMap<String, StateStyles>>,
}

impl TransitionFactory {
    fn new(
        trigger_name: &str,
        matchers: Vec<TransitionMatcher>,
        animation: AnimationNode,
        options: Option<AnimationOptions>,
        state_styles: Rc<HashMap<String, StateStyles>>,
    ) -> Self {
        let query_count = animation.query_count();
        let dep_count = animation.dep_count();
        Self {
            trigger_name: trigger_name.to_string(),
            matchers,
            animation,
            options,
            query_count,
            dep_count,
            state_styles,
        }
    }

    pub fn matches(&self, from: &str, to: &str, _element: ElementId, _params: &ParamMap) -> bool {
        self.matchers.iter().any(|m| m.matches(from, to))
    }

    pub fn build_styles(
        &self,
        state_name: &str,
        params: &ParamMap,
        errors: &mut Vec<AnimationError>,
    ) -> StyleMap {
        let styles = self
            .state_styles
            .get(state_name)
            .or_else(|| self.state_styles.get("*"));
        styles
            .map(|s| s.build_styles(params, errors))
            .unwrap_or_default()
    }

    /// Build the transition instruction, compiling the animation AST against
    /// the current/destination state styles. Build errors end up on the
    /// instruction for the engine's batched report.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        driver: &dyn AnimationDriver,
        element: ElementId,
        current_state: &StateValue,
        next_state: &StateValue,
        enter_class: &str,
        leave_class: &str,
        sub_instructions: Option<&ElementInstructionMap>,
        skip_ast_build: bool,
    ) -> TransitionInstruction {
        let mut errors: Vec<AnimationError> = Vec::new();
        let transition_params = self
            .options
            .as_ref()
            .and_then(|o| o.params.clone())
            .unwrap_or_default();

        let from_styles = self.build_styles(&current_state.value, &current_state.params, &mut errors);
        let to_styles = self.build_styles(&next_state.value, &next_state.params, &mut errors);

        let is_removal = next_state.value == VOID_VALUE;
        let animation_options = AnimationOptions {
            duration: None,
            delay: self.options.as_ref().and_then(|o| o.delay.clone()),
            params: Some(apply_param_defaults(&next_state.params, &transition_params)),
        };

        let timelines = if skip_ast_build {
            Vec::new()
        } else {
            build_keyframes(
                driver,
                element,
                &self.animation,
                enter_class,
                leave_class,
                &from_styles,
                &to_styles,
                &animation_options,
                sub_instructions,
                &mut errors,
            )
        };

        let total_time = timelines
            .iter()
            .map(|tl| tl.duration + tl.delay)
            .fold(0.0f64, f64::max);

        if !errors.is_empty() {
            return TransitionInstruction {
                element,
                trigger_name: self.trigger_name.clone(),
                from_state: current_state.value.clone(),
                to_state: next_state.value.clone(),
                is_removal_transition: is_removal,
                from_styles,
                to_styles,
                timelines: Vec::new(),
                queried_elements: Vec::new(),
                pre_style_props: HashMap::new(),
                post_style_props: HashMap::new(),
                total_time,
                errors,
            };
        }

        let mut queried_elements: Vec<ElementId> = Vec::new();
        let mut pre_style_props: HashMap<ElementId, Vec<String>> = HashMap::new();
        let mut post_style_props: HashMap<ElementId, Vec<String>> = HashMap::new();
        for tl in &timelines {
            let pre = pre_style_props.entry(tl.element).or_default();
            for prop in &tl.pre_style_props {
                if !pre.contains(prop) {
                    pre.push(prop.clone());
                }
            }
            let post = post_style_props.entry(tl.element).or_default();
            for prop in &tl.post_style_props {
                if !post.contains(prop) {
                    post.push(prop.clone());
                }
            }
            if tl.element != element && !queried_elements.contains(&tl.element) {
                queried_elements.push(tl.element);
            }
        }

        TransitionInstruction {
            element,
            trigger_name: self.trigger_name.clone(),
            from_state: current_state.value.clone(),
            to_state: next_state.value.clone(),
            is_removal_transition: is_removal,
            from_styles,
            to_styles,
            timelines,
            queried_elements,
            pre_style_props,
            post_style_props,
            total_time,
            errors,
        }
    }
}

/// Items accepted by `trigger()`: state definitions and transition rules.
pub enum TriggerItem {
    State {
        name: String,
        styles: StyleAst,
        params: Option<ParamMap>,
    },
    Transition {
        expr: String,
        animation: AnimationNode,
        options: Option<AnimationOptions>,
    },
}

/// Named per-element animation state machine.
#[derive(Clone, Debug)]
pub struct AnimationTrigger {
    pub name: String,
    states: Rc<HashMap<String, StateStyles>>,
    pub transition_factories: Vec<Rc<TransitionFactory>>,
    pub fallback_transition: Rc<TransitionFactory>,
    pub query_count: usize,
}

impl AnimationTrigger {
    /// Build a trigger from its items. Malformed transition expressions are
    /// usage faults and fail registration immediately.
    pub fn build(name: &str, items: Vec<TriggerItem>) -> Result<Self, AnimationError> {
        let mut states: HashMap<String, StateStyles> = HashMap::new();
        let mut transitions: Vec<(Vec<TransitionMatcher>, AnimationNode, Option<AnimationOptions>)> =
            Vec::new();

        for item in items {
            match item {
                TriggerItem::State {
                    name,
                    styles,
                    params,
                } => {
                    let params = params.unwrap_or_default();
                    for state_name in name.split(',').map(str::trim) {
                        states.insert(
                            state_name.to_string(),
                            StateStyles::new(styles.clone(), params.clone()),
                        );
                    }
                }
                TriggerItem::Transition {
                    expr,
                    animation,
                    options,
                } => {
                    let matchers = parse_transition_expr(&expr)?;
                    transitions.push((matchers, animation, options));
                }
            }
        }

        balance_properties(&mut states, "true", "1");
        balance_properties(&mut states, "false", "0");

        let states = Rc::new(states);
        let transition_factories: Vec<Rc<TransitionFactory>> = transitions
            .into_iter()
            .map(|(matchers, animation, options)| {
                Rc::new(TransitionFactory::new(
                    name,
                    matchers,
                    animation,
                    options,
                    states.clone(),
                ))
            })
            .collect();
        let query_count = transition_factories.iter().map(|f| f.query_count).sum();

        let fallback_transition = Rc::new(TransitionFactory::new(
            name,
            vec![TransitionMatcher::Always],
            sequence(Vec::new()),
            None,
            states.clone(),
        ));

        Ok(Self {
            name: name.to_string(),
            states,
            transition_factories,
            fallback_transition,
            query_count,
        })
    }

    pub fn transition_count(&self) -> usize {
        self.transition_factories.len()
    }

    pub fn contains_queries(&self) -> bool {
        self.query_count > 0
    }

    /// First matching transition wins, scanned in declaration order.
    pub fn match_transition(
        &self,
        from: &str,
        to: &str,
        element: ElementId,
        params: &ParamMap,
    ) -> Option<Rc<TransitionFactory>> {
        self.transition_factories
            .iter()
            .find(|f| f.matches(from, to, element, params))
            .cloned()
    }

    /// Styles a state value resolves to, via the fallback transition.
    pub fn match_styles(
        &self,
        value: &str,
        params: &ParamMap,
        errors: &mut Vec<AnimationError>,
    ) -> StyleMap {
        self.fallback_transition.build_styles(value, params, errors)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }
}

/// Alias boolean state names both ways so `state('true', ...)` also covers
/// a normalized `"1"` trigger value.
fn balance_properties(states: &mut HashMap<String, StateStyles>, key1: &str, key2: &str) {
    match (states.get(key1).cloned(), states.get(key2).cloned()) {
        (Some(styles), None) => {
            states.insert(key2.to_string(), styles);
        }
        (None, Some(styles)) => {
            states.insert(key1.to_string(), styles);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should parse directional, bidirectional and alias expressions
    #[test]
    fn transition_expr_parsing() {
        let m = parse_transition_expr("open => closed").unwrap();
        assert_eq!(m.len(), 1);
        assert!(m[0].matches("open", "closed"));
        assert!(!m[0].matches("closed", "open"));

        let m = parse_transition_expr("a <=> b").unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.iter().any(|m| m.matches("a", "b")));
        assert!(m.iter().any(|m| m.matches("b", "a")));

        let m = parse_transition_expr(":enter").unwrap();
        assert!(m[0].matches("void", "anything"));

        let m = parse_transition_expr(":increment").unwrap();
        assert!(m[0].matches("1", "2"));
        assert!(!m[0].matches("2", "1"));

        let m = parse_transition_expr("true => false").unwrap();
        assert!(m[0].matches("1", "0"));

        assert!(parse_transition_expr("bogus").is_err());
        assert!(parse_transition_expr(":hover").is_err());
    }

    /// it should absorb previous params without overriding explicit ones
    #[test]
    fn state_value_param_absorption() {
        use crate::style::StyleValue;
        let mut previous = ParamMap::new();
        previous.insert("a".into(), StyleValue::Num(1.0));
        previous.insert("b".into(), StyleValue::Num(2.0));

        let mut state = StateValue::new(
            TriggerValue::WithParams {
                value: "open".into(),
                params: {
                    let mut p = ParamMap::new();
                    p.insert("b".into(), StyleValue::Num(9.0));
                    p
                },
            },
            "ns1",
        );
        state.absorb_params(&previous);
        assert_eq!(state.params["a"], StyleValue::Num(1.0));
        assert_eq!(state.params["b"], StyleValue::Num(9.0));
    }
}
