//! Driver contract: the seam between the engine and the host's element tree.
//!
//! The engine is renderer-agnostic. Everything that touches real elements
//! (selector queries, computed styles, class/style mutation, building real
//! players) is delegated to an injected `AnimationDriver`.

use std::rc::Rc;

use crate::element::ElementId;
use crate::style::{Keyframe, StyleMap};
use crate::transition::player::PlayerRef;

pub trait AnimationDriver {
    /// Whether the host understands the given style property.
    fn validate_style_property(&self, _prop: &str) -> bool {
        true
    }

    /// Whether `element` matches the given selector.
    fn matches_element(&self, element: ElementId, selector: &str) -> bool;

    /// Whether `container` contains `element` (inclusive of itself).
    fn contains_element(&self, container: ElementId, element: ElementId) -> bool;

    /// The element's parent, if still attached.
    fn parent_element(&self, element: ElementId) -> Option<ElementId>;

    /// Query descendants of `root` by selector. `multi` requests every match
    /// rather than the first.
    fn query(&self, root: ElementId, selector: &str, multi: bool) -> Vec<ElementId>;

    /// Read one computed style property, falling back to `default_value`.
    fn compute_style(&self, element: ElementId, prop: &str, default_value: &str) -> String;

    fn add_class(&self, element: ElementId, class: &str);

    fn remove_class(&self, element: ElementId, class: &str);

    /// Apply inline styles to an element.
    fn set_styles(&self, element: ElementId, styles: &StyleMap);

    /// Remove the listed inline style properties from an element.
    fn erase_styles(&self, element: ElementId, styles: &StyleMap);

    /// Hide an element for a batched computed-style read, returning the
    /// previous inline display value so it can be restored afterwards.
    fn cloak_element(&self, element: ElementId, value: Option<&str>) -> Option<String>;

    /// Build a real player for the given keyframes.
    fn animate(
        &self,
        element: ElementId,
        keyframes: &[Keyframe],
        duration: f64,
        delay: f64,
        easing: Option<&str>,
        previous_players: &[PlayerRef],
    ) -> PlayerRef;
}

pub type DriverRef = Rc<dyn AnimationDriver>;
