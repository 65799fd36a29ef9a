//! Animation AST: the closed set of node kinds the timeline compiler walks.
//!
//! Nodes are plain data built by the factory functions in [`crate::builders`];
//! validation that needs timing/context information (keyframe offsets, query
//! matches, param resolution) happens during compilation, accumulating into
//! the shared error list rather than failing node construction.

use serde::{Deserialize, Serialize};

use crate::style::StyleMap;
use crate::timing::{ParamMap, TimeValue};

/// Options attachable to containers, queries and sub-animation references.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationOptions {
    #[serde(default)]
    pub duration: Option<TimeValue>,
    #[serde(default)]
    pub delay: Option<TimeValue>,
    #[serde(default)]
    pub params: Option<ParamMap>,
}

/// One token of a style step: an explicit map or the `*` wildcard that
/// expands to every property the element has touched so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StyleToken {
    Wildcard,
    Styles(StyleMap),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleAst {
    pub styles: Vec<StyleToken>,
    #[serde(default)]
    pub easing: Option<String>,
    #[serde(default)]
    pub offset: Option<f64>,
    /// Set for the style step synthesized by `animate(duration)` with no
    /// explicit styles; back-fills every known property with `Auto`.
    #[serde(default)]
    pub is_empty_step: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyframesAst {
    pub steps: Vec<StyleAst>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnimateStyle {
    Style(StyleAst),
    Keyframes(KeyframesAst),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimateAst {
    pub timings: TimeValue,
    pub style: AnimateStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceAst {
    pub steps: Vec<AnimationNode>,
    #[serde(default)]
    pub options: Option<AnimationOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupAst {
    pub steps: Vec<AnimationNode>,
    #[serde(default)]
    pub options: Option<AnimationOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryAst {
    /// Selector with engine tokens already normalized; `:enter`/`:leave`
    /// stay raw and are rewritten per compile pass.
    pub selector: String,
    /// User-facing selector kept for error reporting.
    pub original_selector: String,
    /// 0 = unlimited; negative takes a tail slice.
    pub limit: i64,
    pub optional: bool,
    pub include_self: bool,
    pub animation: Box<AnimationNode>,
    #[serde(default)]
    pub options: Option<AnimationOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaggerAst {
    pub timings: TimeValue,
    pub animation: Box<AnimationNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAst {
    pub animation: Box<AnimationNode>,
    #[serde(default)]
    pub options: Option<AnimationOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimateChildAst {
    #[serde(default)]
    pub options: Option<AnimationOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimateRefAst {
    pub animation: ReferenceAst,
    #[serde(default)]
    pub options: Option<AnimationOptions>,
}

/// The closed variant set. The compiler matches exhaustively; adding a kind
/// is a compile-time event for every consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnimationNode {
    Sequence(SequenceAst),
    Group(GroupAst),
    Style(StyleAst),
    Animate(AnimateAst),
    Keyframes(KeyframesAst),
    Query(QueryAst),
    Stagger(StaggerAst),
    Reference(ReferenceAst),
    AnimateChild(AnimateChildAst),
    AnimateRef(AnimateRefAst),
}

/// Discriminant used for the compiler's previous-node checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Sequence,
    Group,
    Style,
    Animate,
    Keyframes,
    Query,
    Stagger,
    Reference,
    AnimateChild,
    AnimateRef,
}

impl AnimationNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            AnimationNode::Sequence(_) => NodeKind::Sequence,
            AnimationNode::Group(_) => NodeKind::Group,
            AnimationNode::Style(_) => NodeKind::Style,
            AnimationNode::Animate(_) => NodeKind::Animate,
            AnimationNode::Keyframes(_) => NodeKind::Keyframes,
            AnimationNode::Query(_) => NodeKind::Query,
            AnimationNode::Stagger(_) => NodeKind::Stagger,
            AnimationNode::Reference(_) => NodeKind::Reference,
            AnimationNode::AnimateChild(_) => NodeKind::AnimateChild,
            AnimationNode::AnimateRef(_) => NodeKind::AnimateRef,
        }
    }

    /// Count of Query nodes in this subtree.
    pub fn query_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| {
            if matches!(node, AnimationNode::Query(_)) {
                count += 1;
            }
        });
        count
    }

    /// Count of sub-animation references (`AnimateChild`/`AnimateRef`) in
    /// this subtree; drives flush queue ordering.
    pub fn dep_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| {
            if matches!(
                node,
                AnimationNode::AnimateChild(_) | AnimationNode::AnimateRef(_)
            ) {
                count += 1;
            }
        });
        count
    }

    fn walk(&self, visit: &mut impl FnMut(&AnimationNode)) {
        visit(self);
        match self {
            AnimationNode::Sequence(ast) => ast.steps.iter().for_each(|s| s.walk(visit)),
            AnimationNode::Group(ast) => ast.steps.iter().for_each(|s| s.walk(visit)),
            AnimationNode::Query(ast) => ast.animation.walk(visit),
            AnimationNode::Stagger(ast) => ast.animation.walk(visit),
            AnimationNode::Reference(ast) => ast.animation.walk(visit),
            AnimationNode::AnimateRef(ast) => ast.animation.animation.walk(visit),
            AnimationNode::Style(_)
            | AnimationNode::Animate(_)
            | AnimationNode::Keyframes(_)
            | AnimationNode::AnimateChild(_) => {}
        }
    }
}
