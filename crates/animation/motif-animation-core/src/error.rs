//! Error types for the animation core.

use serde::{Deserialize, Serialize};

/// Comprehensive error type for timeline compilation and transition scheduling.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnimationError {
    /// A timing expression could not be parsed
    #[error("invalid timing value: {value}")]
    InvalidTiming { value: String },

    /// Negative duration inside a step
    #[error("duration values below 0 are not supported: {value}")]
    NegativeStepValue { value: f64 },

    /// Negative delay inside a step
    #[error("delay values below 0 are not supported: {value}")]
    NegativeDelayValue { value: f64 },

    /// A `{{param}}` substitution had no value and no default
    #[error("unable to resolve the local animation param {name} in the given list of values")]
    MissingParam { name: String },

    /// A keyframe offset fell outside [0, 1] or offsets were not ascending
    #[error("keyframe offsets must be ascending and within [0, 1]: {offset}")]
    InvalidKeyframeOffset { offset: f64 },

    /// Some keyframes carried an explicit offset while others did not
    #[error("not all style() steps within the declared keyframes contain offsets")]
    PartialKeyframeOffsets,

    /// A required query matched zero elements
    #[error("`query(\"{selector}\")` returned zero elements (use `optional: true` if you wish to allow this)")]
    InvalidQuery { selector: String },

    /// A transition expression could not be parsed
    #[error("the provided transition expression \"{expression}\" is not supported")]
    InvalidExpression { expression: String },

    /// A style property failed validation or normalization
    #[error("the style property \"{property}\" is not supported: {reason}")]
    InvalidStyleProperty { property: String, reason: String },

    /// A state references a trigger that was never registered
    #[error("the provided animation trigger \"{name}\" has not been registered")]
    UnregisteredTrigger { name: String },

    /// A listener was attached with an unknown phase name
    #[error("the provided animation trigger event \"{phase}\" for the animation trigger \"{name}\" is not supported")]
    UnsupportedTriggerEvent { name: String, phase: String },

    /// A listener was attached with an empty phase name
    #[error("the provided animation trigger phase value for the animation trigger \"{name}\" is missing")]
    MissingTriggerEvent { name: String },

    /// A trigger was registered twice on the same namespace
    #[error("the animation trigger \"{name}\" has already been registered on this namespace")]
    DuplicateTrigger { name: String },

    /// One trigger failed to build its transition during a flush
    #[error("transition for trigger \"{trigger}\" failed: {}", format_error_list(.errors))]
    TransitionFailed {
        trigger: String,
        errors: Vec<AnimationError>,
    },

    /// Batched escalation of every failing trigger within one flush
    #[error("animation flush failed with {} error(s): {}", .errors.len(), format_error_list(.errors))]
    FlushFailed { errors: Vec<AnimationError> },
}

fn format_error_list(errors: &[AnimationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AnimationError {
    /// Get error category for logging/metrics
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidTiming { .. }
            | Self::NegativeStepValue { .. }
            | Self::NegativeDelayValue { .. }
            | Self::MissingParam { .. }
            | Self::InvalidKeyframeOffset { .. }
            | Self::PartialKeyframeOffsets
            | Self::InvalidExpression { .. } => "validation",
            Self::InvalidQuery { .. } => "query",
            Self::InvalidStyleProperty { .. } => "style",
            Self::UnregisteredTrigger { .. }
            | Self::UnsupportedTriggerEvent { .. }
            | Self::MissingTriggerEvent { .. }
            | Self::DuplicateTrigger { .. } => "usage",
            Self::TransitionFailed { .. } | Self::FlushFailed { .. } => "flush",
        }
    }

    /// Usage faults are programmer errors surfaced at the call site rather
    /// than accumulated for a batched report.
    #[inline]
    pub fn is_usage_fault(&self) -> bool {
        self.category() == "usage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let e = AnimationError::InvalidTiming {
            value: "abc".into(),
        };
        assert_eq!(e.category(), "validation");
        let e = AnimationError::UnregisteredTrigger { name: "t".into() };
        assert!(e.is_usage_fault());
    }

    #[test]
    fn flush_failed_lists_every_error() {
        let e = AnimationError::FlushFailed {
            errors: vec![
                AnimationError::InvalidQuery {
                    selector: ".a".into(),
                },
                AnimationError::MissingParam { name: "x".into() },
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains(".a"));
        assert!(msg.contains('x'));
    }
}
