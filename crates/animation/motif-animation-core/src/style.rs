//! Style model shared by the timeline compiler and the transition engine.
//!
//! A style value is either a concrete literal (string or number), the `Auto`
//! placeholder (resolved against the destination state once it is known) or
//! the `Pre` placeholder (resolved against the element's rendered style
//! before playback starts).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AnimationError;

/// One style value as written by the user or produced by back-fill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StyleValue {
    /// Literal string value ("100px", "red", ...)
    Str(String),
    /// Literal numeric value; unit resolution is the normalizer's concern
    Num(f64),
    /// Placeholder substituted with the destination state's value
    Auto,
    /// Placeholder substituted with the element's current rendered value
    Pre,
}

impl StyleValue {
    /// Text rendering used for `{{param}}` substitution and driver handoff.
    pub fn as_text(&self) -> String {
        match self {
            StyleValue::Str(s) => s.clone(),
            StyleValue::Num(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            StyleValue::Auto => "*".to_string(),
            StyleValue::Pre => "!".to_string(),
        }
    }

    #[inline]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, StyleValue::Auto | StyleValue::Pre)
    }
}

impl From<&str> for StyleValue {
    fn from(s: &str) -> Self {
        match s {
            "*" => StyleValue::Auto,
            "!" => StyleValue::Pre,
            _ => StyleValue::Str(s.to_string()),
        }
    }
}

impl From<f64> for StyleValue {
    fn from(n: f64) -> Self {
        StyleValue::Num(n)
    }
}

/// Property -> value map. Keys are unique by construction.
pub type StyleMap = HashMap<String, StyleValue>;

/// One keyframe: a style snapshot anchored at a normalized offset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub styles: StyleMap,
    pub offset: f64,
    #[serde(default)]
    pub easing: Option<String>,
}

impl Keyframe {
    pub fn new(styles: StyleMap, offset: f64, easing: Option<String>) -> Self {
        Self {
            styles,
            offset,
            easing,
        }
    }
}

/// Canonicalizes property names and units before keyframes reach the driver.
pub trait StyleNormalizer {
    fn normalize_property_name(&self, prop: &str, errors: &mut Vec<AnimationError>) -> String;

    fn normalize_style_value(
        &self,
        user_prop: &str,
        normalized_prop: &str,
        value: &StyleValue,
        errors: &mut Vec<AnimationError>,
    ) -> StyleValue;
}

/// Pass-through normalizer; hosts with vendor-specific property handling
/// supply their own implementation.
#[derive(Debug, Default)]
pub struct NoopStyleNormalizer;

impl StyleNormalizer for NoopStyleNormalizer {
    fn normalize_property_name(&self, prop: &str, _errors: &mut Vec<AnimationError>) -> String {
        prop.to_string()
    }

    fn normalize_style_value(
        &self,
        _user_prop: &str,
        _normalized_prop: &str,
        value: &StyleValue,
        _errors: &mut Vec<AnimationError>,
    ) -> StyleValue {
        value.clone()
    }
}

/// Resolve placeholders and normalize every keyframe in an instruction.
///
/// `Pre` values read from `pre_styles` (computed before playback), `Auto`
/// values read from `post_styles` (the destination state snapshot). Keyframes
/// sharing an offset collapse into one entry, later writes winning.
pub fn normalize_keyframes(
    normalizer: &dyn StyleNormalizer,
    keyframes: &[Keyframe],
    pre_styles: &StyleMap,
    post_styles: &StyleMap,
) -> Result<Vec<Keyframe>, Vec<AnimationError>> {
    let mut errors: Vec<AnimationError> = Vec::new();
    let mut normalized: Vec<Keyframe> = Vec::new();
    let mut previous_offset = -1.0f64;

    for kf in keyframes {
        let same_offset = kf.offset == previous_offset;
        let mut target = if same_offset {
            normalized.pop().unwrap_or_default()
        } else {
            Keyframe::new(StyleMap::new(), kf.offset, kf.easing.clone())
        };
        if same_offset && kf.easing.is_some() {
            target.easing = kf.easing.clone();
        }
        for (prop, value) in &kf.styles {
            let normalized_prop = normalizer.normalize_property_name(prop, &mut errors);
            let normalized_value = match value {
                StyleValue::Pre => pre_styles.get(prop).cloned().unwrap_or(StyleValue::Auto),
                StyleValue::Auto => post_styles.get(prop).cloned().unwrap_or(StyleValue::Auto),
                other => {
                    normalizer.normalize_style_value(prop, &normalized_prop, other, &mut errors)
                }
            };
            target.styles.insert(normalized_prop, normalized_value);
        }
        normalized.push(target);
        previous_offset = kf.offset;
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

/// Collect the property names present in a style map.
pub fn style_props(styles: &StyleMap) -> Vec<String> {
    styles.keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_substitution() {
        let mut pre = StyleMap::new();
        pre.insert("width".into(), StyleValue::Str("50px".into()));
        let mut post = StyleMap::new();
        post.insert("height".into(), StyleValue::Str("10px".into()));

        let mut styles = StyleMap::new();
        styles.insert("width".into(), StyleValue::Pre);
        styles.insert("height".into(), StyleValue::Auto);
        let kfs = vec![Keyframe::new(styles, 0.0, None)];

        let out = normalize_keyframes(&NoopStyleNormalizer, &kfs, &pre, &post).unwrap();
        assert_eq!(out[0].styles["width"], StyleValue::Str("50px".into()));
        assert_eq!(out[0].styles["height"], StyleValue::Str("10px".into()));
    }

    #[test]
    fn same_offset_keyframes_collapse() {
        let mut a = StyleMap::new();
        a.insert("opacity".into(), StyleValue::Num(0.0));
        let mut b = StyleMap::new();
        b.insert("width".into(), StyleValue::Str("0px".into()));
        let kfs = vec![
            Keyframe::new(a, 0.0, None),
            Keyframe::new(b, 0.0, None),
            Keyframe::new(StyleMap::new(), 1.0, None),
        ];
        let out =
            normalize_keyframes(&NoopStyleNormalizer, &kfs, &StyleMap::new(), &StyleMap::new())
                .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].styles.len(), 2);
    }
}
