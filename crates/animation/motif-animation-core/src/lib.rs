//! Motif Animation Core (engine-agnostic)
//!
//! Turns declarative, tree-structured animation descriptions (states,
//! transitions, sequences, groups, keyframes, queries, staggers) into
//! concrete, time-ordered style keyframes, then schedules those keyframes
//! against a live element tree while independent triggers fire concurrently.
//! All element access goes through an injected driver; output is discrete
//! keyframe lists consumed by the driver's players.

pub mod ast;
pub mod builders;
pub mod driver;
pub mod element;
pub mod error;
pub mod scheduler;
pub mod style;
pub mod timeline;
pub mod timing;
pub mod transition;

// Re-exports for consumers (hosts and drivers)
pub use ast::{AnimationNode, AnimationOptions, StyleAst, StyleToken};
pub use driver::{AnimationDriver, DriverRef};
pub use element::ElementId;
pub use error::AnimationError;
pub use scheduler::TaskQueue;
pub use style::{
    normalize_keyframes, Keyframe, NoopStyleNormalizer, StyleMap, StyleNormalizer, StyleValue,
};
pub use timeline::{build_keyframes, ElementInstructionMap, TimelineInstruction};
pub use timing::{
    interpolate_params, resolve_time_value, resolve_timing, ParamMap, TimeValue, TimingSpec,
};
pub use transition::engine::{ElementRemovalState, RemovalContext, TransitionAnimationEngine};
pub use transition::namespace::{AnimationEvent, ListenerHandle, ListenerPhase};
pub use transition::player::{
    optimize_group_player, AnimationGroupPlayer, AnimationPlayer, Callback, NoopAnimationPlayer,
    PlayerPhase, PlayerRef, TransitionAnimationPlayer,
};
pub use transition::trigger::{
    AnimationTrigger, StateValue, TransitionFactory, TransitionInstruction, TriggerItem,
    TriggerValue,
};
pub use transition::VOID_VALUE;
