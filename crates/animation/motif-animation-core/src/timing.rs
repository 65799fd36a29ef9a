//! Timing resolution and `{{param}}` interpolation.
//!
//! Timing expressions take the form `"duration [delay] [easing]"` where the
//! time components are `<number>s` or `<number>ms` (bare numbers are
//! milliseconds). Parsing failures do not abort compilation; they push onto
//! the shared error list and resolve to a zeroed spec so sibling nodes keep
//! compiling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AnimationError;
use crate::style::StyleValue;

/// Fully resolved timing: numeric milliseconds plus an optional easing name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSpec {
    pub duration: f64,
    pub delay: f64,
    #[serde(default)]
    pub easing: Option<String>,
}

impl TimingSpec {
    pub fn new(duration: f64, delay: f64, easing: Option<String>) -> Self {
        Self {
            duration,
            delay,
            easing,
        }
    }
}

/// A duration/delay option value: already-numeric milliseconds or a time
/// expression still to be parsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Millis(f64),
    Expr(String),
}

impl From<f64> for TimeValue {
    fn from(ms: f64) -> Self {
        TimeValue::Millis(ms)
    }
}

impl From<&str> for TimeValue {
    fn from(expr: &str) -> Self {
        TimeValue::Expr(expr.to_string())
    }
}

/// Substitution parameters used by `{{name}}` interpolation.
pub type ParamMap = HashMap<String, StyleValue>;

fn parse_time_token(value: &str, unit: &str) -> Option<f64> {
    let num: f64 = value.parse().ok()?;
    match unit {
        "ms" => Some(num),
        "s" => Some(num * 1000.0),
        _ => None,
    }
}

/// Split a token like `"1.5s"` into its numeric part and unit suffix.
fn split_time_token(token: &str) -> Option<(String, String)> {
    let unit_start = token.find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))?;
    let (num, unit) = token.split_at(unit_start);
    if num.is_empty() {
        return None;
    }
    Some((num.to_string(), unit.to_string()))
}

/// Resolve a single loose time value (`1000`, `"1s"`, `"300ms"`) to ms.
/// Unparseable expressions resolve to 0.
pub fn resolve_time_value(value: &TimeValue) -> f64 {
    match value {
        TimeValue::Millis(ms) => *ms,
        TimeValue::Expr(expr) => {
            let token = expr.split_whitespace().next().unwrap_or("");
            match split_time_token(token) {
                Some((num, unit)) => parse_time_token(&num, &unit).unwrap_or(0.0),
                None => token.parse().unwrap_or(0.0),
            }
        }
    }
}

/// Parse a full timing expression into a [`TimingSpec`].
///
/// Negative duration/delay values are rejected unless `allow_negative` is
/// set (staggers use negative durations to signal reversal).
pub fn resolve_timing(
    value: &TimeValue,
    errors: &mut Vec<AnimationError>,
    allow_negative: bool,
) -> TimingSpec {
    let (duration, delay, easing) = match value {
        TimeValue::Millis(ms) => (*ms, 0.0, None),
        TimeValue::Expr(expr) => match parse_time_expression(expr) {
            Some(parts) => parts,
            None => {
                errors.push(AnimationError::InvalidTiming {
                    value: expr.clone(),
                });
                return TimingSpec::default();
            }
        },
    };

    if !allow_negative {
        let mut contains_errors = false;
        if duration < 0.0 {
            errors.push(AnimationError::NegativeStepValue { value: duration });
            contains_errors = true;
        }
        if delay < 0.0 {
            errors.push(AnimationError::NegativeDelayValue { value: delay });
            contains_errors = true;
        }
        if contains_errors {
            return TimingSpec::default();
        }
    }

    TimingSpec::new(duration, delay, easing)
}

fn parse_time_expression(expr: &str) -> Option<(f64, f64, Option<String>)> {
    let mut tokens = expr.split_whitespace().peekable();
    let first = tokens.next()?;
    let (num, unit) = split_time_token(first)?;
    let duration = parse_time_token(&num, &unit)?;

    let mut delay = 0.0;
    if let Some(token) = tokens.peek() {
        if let Some((num, unit)) = split_time_token(token) {
            if let Some(ms) = parse_time_token(&num, &unit) {
                delay = ms;
                tokens.next();
            }
        }
    }

    let easing: String = tokens.collect::<Vec<_>>().join(" ");
    if easing.is_empty() {
        return Some((duration, delay, None));
    }
    // easing names start with a letter: "linear", "ease-out", "cubic-bezier(...)"
    if !easing.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((duration, delay, Some(easing)))
}

/// Substitute every `{{name}}` occurrence within a style value.
///
/// Missing params push [`AnimationError::MissingParam`] and substitute the
/// empty string so the remainder of the pass still compiles.
pub fn interpolate_params(
    value: &StyleValue,
    params: &ParamMap,
    errors: &mut Vec<AnimationError>,
) -> StyleValue {
    let original = match value {
        StyleValue::Str(s) if s.contains("{{") => s.clone(),
        other => return other.clone(),
    };

    let mut out = String::with_capacity(original.len());
    let mut rest = original.as_str();
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match params.get(name) {
                    Some(v) => out.push_str(&v.as_text()),
                    None => {
                        errors.push(AnimationError::MissingParam {
                            name: name.to_string(),
                        });
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // unterminated interpolation; keep the raw text
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    StyleValue::Str(out)
}

/// Overlay `defaults` onto `params` without overriding provided values.
pub fn apply_param_defaults(params: &ParamMap, defaults: &ParamMap) -> ParamMap {
    let mut merged = defaults.clone();
    for (k, v) in params {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should parse duration, delay and easing from a full expression
    #[test]
    fn full_expression() {
        let mut errors = Vec::new();
        let spec = resolve_timing(&"1s 500ms ease-out".into(), &mut errors, false);
        assert!(errors.is_empty());
        assert_eq!(spec, TimingSpec::new(1000.0, 500.0, Some("ease-out".into())));
    }

    /// it should treat bare numbers as milliseconds
    #[test]
    fn bare_millis() {
        let mut errors = Vec::new();
        let spec = resolve_timing(&1234.0.into(), &mut errors, false);
        assert_eq!(spec.duration, 1234.0);
        assert_eq!(spec.delay, 0.0);
    }

    /// it should keep parenthesized easing expressions intact
    #[test]
    fn easing_with_args() {
        let mut errors = Vec::new();
        let spec = resolve_timing(&"1s cubic-bezier(0.1, 0.2, 0.3, 0.4)".into(), &mut errors, false);
        assert!(errors.is_empty());
        assert_eq!(spec.easing.as_deref(), Some("cubic-bezier(0.1, 0.2, 0.3, 0.4)"));
    }

    /// it should reject malformed expressions with an accumulated error
    #[test]
    fn invalid_expression() {
        let mut errors = Vec::new();
        let spec = resolve_timing(&"abc".into(), &mut errors, false);
        assert_eq!(spec, TimingSpec::default());
        assert_eq!(errors.len(), 1);
    }

    /// it should reject negative values unless explicitly allowed
    #[test]
    fn negative_values() {
        let mut errors = Vec::new();
        let spec = resolve_timing(&"-1s".into(), &mut errors, false);
        assert_eq!(spec, TimingSpec::default());
        assert!(!errors.is_empty());

        let mut errors = Vec::new();
        let spec = resolve_timing(&"-1s".into(), &mut errors, true);
        assert!(errors.is_empty());
        assert_eq!(spec.duration, -1000.0);
    }

    /// it should substitute params and report missing ones
    #[test]
    fn param_interpolation() {
        let mut params = ParamMap::new();
        params.insert("t".into(), StyleValue::Num(2.0));
        let mut errors = Vec::new();
        let out = interpolate_params(&StyleValue::Str("{{t}}s".into()), &params, &mut errors);
        assert_eq!(out, StyleValue::Str("2s".into()));
        assert!(errors.is_empty());

        let out = interpolate_params(&StyleValue::Str("{{missing}}".into()), &params, &mut errors);
        assert_eq!(out, StyleValue::Str(String::new()));
        assert_eq!(errors.len(), 1);
    }
}
