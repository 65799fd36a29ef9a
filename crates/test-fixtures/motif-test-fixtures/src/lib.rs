//! Test fixtures: an in-memory element tree plus a mock animation driver and
//! mock players, so the core crates can exercise compile/flush behavior
//! without a real renderer.
//!
//! The tree is a slotmap arena with parent/child side maps. Selector support
//! covers what the engine and the tests actually use: `*`, tag names, class
//! selectors, compound `tag.class` forms, descendant chains separated by
//! whitespace and comma-separated alternatives.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use slotmap::{SecondaryMap, SlotMap};

use motif_animation_core::driver::AnimationDriver;
use motif_animation_core::element::ElementId;
use motif_animation_core::style::{Keyframe, StyleMap};
use motif_animation_core::transition::player::{
    AnimationPlayer, Callback, PlayerPhase, PlayerRef,
};

/// One recorded `driver.animate(...)` invocation.
#[derive(Clone, Debug)]
pub struct AnimateCall {
    pub element: ElementId,
    pub keyframes: Vec<Keyframe>,
    pub duration: f64,
    pub delay: f64,
    pub easing: Option<String>,
}

#[derive(Debug, Default)]
struct ElementData {
    tag: String,
    classes: HashSet<String>,
    inline_styles: HashMap<String, String>,
    computed_styles: HashMap<String, String>,
}

#[derive(Default)]
struct HostInner {
    nodes: SlotMap<ElementId, ElementData>,
    children: SecondaryMap<ElementId, Vec<ElementId>>,
    parent: SecondaryMap<ElementId, ElementId>,
    root: Option<ElementId>,
    animate_calls: Vec<AnimateCall>,
    players: Vec<Rc<MockPlayer>>,
}

/// Owns the element arena and doubles as the engine's driver.
pub struct MockHost {
    inner: RefCell<HostInner>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(HostInner::default()),
        }
    }

    pub fn new_rc() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Create the root element; subsequent elements attach below it.
    pub fn create_root(&self, tag: &str) -> ElementId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.nodes.insert(ElementData {
            tag: tag.to_string(),
            ..Default::default()
        });
        inner.children.insert(id, Vec::new());
        inner.root = Some(id);
        id
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> ElementId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.nodes.insert(ElementData {
            tag: tag.to_string(),
            ..Default::default()
        });
        inner.children.insert(id, Vec::new());
        id
    }

    pub fn append_child(&self, parent: ElementId, child: ElementId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(previous) = inner.parent.remove(child) {
            if let Some(siblings) = inner.children.get_mut(previous) {
                siblings.retain(|c| *c != child);
            }
        }
        inner.parent.insert(child, parent);
        if let Some(children) = inner.children.get_mut(parent) {
            children.push(child);
        }
    }

    /// Detach an element (and its subtree) from its parent. Records stay in
    /// the arena so late style reads observe the detached state.
    pub fn detach(&self, element: ElementId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(parent) = inner.parent.remove(element) {
            if let Some(siblings) = inner.children.get_mut(parent) {
                siblings.retain(|c| *c != element);
            }
        }
    }

    pub fn set_computed_style(&self, element: ElementId, prop: &str, value: &str) {
        if let Some(data) = self.inner.borrow_mut().nodes.get_mut(element) {
            data.computed_styles
                .insert(prop.to_string(), value.to_string());
        }
    }

    pub fn has_class(&self, element: ElementId, class: &str) -> bool {
        self.inner
            .borrow()
            .nodes
            .get(element)
            .is_some_and(|d| d.classes.contains(class))
    }

    pub fn inline_style(&self, element: ElementId, prop: &str) -> Option<String> {
        self.inner
            .borrow()
            .nodes
            .get(element)
            .and_then(|d| d.inline_styles.get(prop).cloned())
    }

    pub fn animate_calls(&self) -> Vec<AnimateCall> {
        self.inner.borrow().animate_calls.clone()
    }

    pub fn players(&self) -> Vec<Rc<MockPlayer>> {
        self.inner.borrow().players.clone()
    }

    /// Finish every mock player created so far, in creation order.
    pub fn finish_all_players(&self) {
        let players = self.players();
        for player in players {
            player.finish();
        }
    }

    fn is_attached(&self, inner: &HostInner, element: ElementId) -> bool {
        let Some(root) = inner.root else { return false };
        let mut cursor = element;
        loop {
            if cursor == root {
                return true;
            }
            match inner.parent.get(cursor) {
                Some(parent) => cursor = *parent,
                None => return false,
            }
        }
    }

    fn matches_compound(&self, inner: &HostInner, element: ElementId, compound: &str) -> bool {
        let Some(data) = inner.nodes.get(element) else {
            return false;
        };
        if compound == "*" {
            return true;
        }
        // split "tag.a.b" into the tag part and class parts
        let mut tag = String::new();
        let mut classes: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut in_class = false;
        for c in compound.chars() {
            if c == '.' {
                if in_class {
                    classes.push(std::mem::take(&mut current));
                } else {
                    tag = std::mem::take(&mut current);
                }
                in_class = true;
            } else {
                current.push(c);
            }
        }
        if in_class {
            classes.push(current);
        } else {
            tag = current;
        }
        if !tag.is_empty() && tag != "*" && data.tag != tag {
            return false;
        }
        classes.iter().all(|c| data.classes.contains(c))
    }

    fn matches_chain(&self, inner: &HostInner, element: ElementId, chain: &str) -> bool {
        let compounds: Vec<&str> = chain.split_whitespace().collect();
        let Some((last, ancestors)) = compounds.split_last() else {
            return false;
        };
        if !self.matches_compound(inner, element, last) {
            return false;
        }
        // remaining compounds must match ancestors, bottom-up
        let mut cursor = inner.parent.get(element).copied();
        let mut remaining = ancestors.iter().rev();
        let mut expected = remaining.next();
        while let (Some(current), Some(compound)) = (cursor, expected) {
            if self.matches_compound(inner, current, compound) {
                expected = remaining.next();
            }
            cursor = inner.parent.get(current).copied();
        }
        expected.is_none()
    }

    fn matches_selector(&self, inner: &HostInner, element: ElementId, selector: &str) -> bool {
        selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .any(|chain| self.matches_chain(inner, element, chain))
    }

    fn descendants(&self, inner: &HostInner, root: ElementId, out: &mut Vec<ElementId>) {
        if let Some(children) = inner.children.get(root) {
            for child in children {
                out.push(*child);
                self.descendants(inner, *child, out);
            }
        }
    }
}

impl AnimationDriver for MockHost {
    fn matches_element(&self, element: ElementId, selector: &str) -> bool {
        let inner = self.inner.borrow();
        self.matches_selector(&inner, element, selector)
    }

    fn contains_element(&self, container: ElementId, element: ElementId) -> bool {
        let inner = self.inner.borrow();
        let mut cursor = element;
        loop {
            if cursor == container {
                return true;
            }
            match inner.parent.get(cursor) {
                Some(parent) => cursor = *parent,
                None => return false,
            }
        }
    }

    fn parent_element(&self, element: ElementId) -> Option<ElementId> {
        self.inner.borrow().parent.get(element).copied()
    }

    fn query(&self, root: ElementId, selector: &str, multi: bool) -> Vec<ElementId> {
        let inner = self.inner.borrow();
        let mut candidates = Vec::new();
        self.descendants(&inner, root, &mut candidates);
        let mut results = Vec::new();
        for element in candidates {
            if self.matches_selector(&inner, element, selector) {
                results.push(element);
                if !multi {
                    break;
                }
            }
        }
        results
    }

    fn compute_style(&self, element: ElementId, prop: &str, default_value: &str) -> String {
        let inner = self.inner.borrow();
        if !self.is_attached(&inner, element) {
            // detached elements have no rendered style
            return String::new();
        }
        inner
            .nodes
            .get(element)
            .and_then(|d| {
                d.inline_styles
                    .get(prop)
                    .or_else(|| d.computed_styles.get(prop))
                    .cloned()
            })
            .unwrap_or_else(|| default_value.to_string())
    }

    fn add_class(&self, element: ElementId, class: &str) {
        if let Some(data) = self.inner.borrow_mut().nodes.get_mut(element) {
            data.classes.insert(class.to_string());
        }
    }

    fn remove_class(&self, element: ElementId, class: &str) {
        if let Some(data) = self.inner.borrow_mut().nodes.get_mut(element) {
            data.classes.remove(class);
        }
    }

    fn set_styles(&self, element: ElementId, styles: &StyleMap) {
        if let Some(data) = self.inner.borrow_mut().nodes.get_mut(element) {
            for (prop, value) in styles {
                data.inline_styles.insert(prop.clone(), value.as_text());
            }
        }
    }

    fn erase_styles(&self, element: ElementId, styles: &StyleMap) {
        if let Some(data) = self.inner.borrow_mut().nodes.get_mut(element) {
            for prop in styles.keys() {
                data.inline_styles.remove(prop);
            }
        }
    }

    fn cloak_element(&self, element: ElementId, value: Option<&str>) -> Option<String> {
        let mut inner = self.inner.borrow_mut();
        let data = inner.nodes.get_mut(element)?;
        let previous = data.inline_styles.get("display").cloned();
        match value {
            Some(value) => data
                .inline_styles
                .insert("display".to_string(), value.to_string()),
            None => data.inline_styles.remove("display"),
        };
        previous
    }

    fn animate(
        &self,
        element: ElementId,
        keyframes: &[Keyframe],
        duration: f64,
        delay: f64,
        easing: Option<&str>,
        _previous_players: &[PlayerRef],
    ) -> PlayerRef {
        log::trace!("mock animate on {element:?}: {duration}ms+{delay}ms");
        let player = MockPlayer::new(element, duration, delay);
        let mut inner = self.inner.borrow_mut();
        inner.animate_calls.push(AnimateCall {
            element,
            keyframes: keyframes.to_vec(),
            duration,
            delay,
            easing: easing.map(str::to_string),
        });
        inner.players.push(player.clone());
        player
    }
}

// ---------------------------------------------------------------------------
// MockPlayer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockPlayerState {
    on_done: Vec<Callback>,
    on_start: Vec<Callback>,
    on_destroy: Vec<Callback>,
    started: bool,
    finished: bool,
    destroyed: bool,
    position: f64,
    log: Vec<&'static str>,
}

/// Driver-built player under manual control: completion fires only when the
/// test calls `finish()`, modeling the external async boundary.
pub struct MockPlayer {
    pub element: ElementId,
    pub duration: f64,
    pub delay: f64,
    state: RefCell<MockPlayerState>,
}

impl MockPlayer {
    pub fn new(element: ElementId, duration: f64, delay: f64) -> Rc<Self> {
        Rc::new(Self {
            element,
            duration,
            delay,
            state: RefCell::new(MockPlayerState::default()),
        })
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.state.borrow().log.clone()
    }

    pub fn has_finished(&self) -> bool {
        self.state.borrow().finished
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    fn fire(&self, phase: PlayerPhase) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match phase {
                PlayerPhase::Start => std::mem::take(&mut state.on_start),
                PlayerPhase::Done => std::mem::take(&mut state.on_done),
                PlayerPhase::Destroy => std::mem::take(&mut state.on_destroy),
            }
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl AnimationPlayer for MockPlayer {
    fn on_done(&self, callback: Callback) {
        self.state.borrow_mut().on_done.push(callback);
    }

    fn on_start(&self, callback: Callback) {
        self.state.borrow_mut().on_start.push(callback);
    }

    fn on_destroy(&self, callback: Callback) {
        self.state.borrow_mut().on_destroy.push(callback);
    }

    fn init(&self) {
        self.state.borrow_mut().log.push("init");
    }

    fn has_started(&self) -> bool {
        self.state.borrow().started
    }

    fn play(&self) {
        let first_start = {
            let mut state = self.state.borrow_mut();
            state.log.push("play");
            let first = !state.started;
            state.started = true;
            first
        };
        if first_start {
            self.fire(PlayerPhase::Start);
        }
    }

    fn pause(&self) {
        self.state.borrow_mut().log.push("pause");
    }

    fn restart(&self) {
        self.state.borrow_mut().log.push("restart");
    }

    fn finish(&self) {
        let newly_finished = {
            let mut state = self.state.borrow_mut();
            let newly = !state.finished;
            state.finished = true;
            if newly {
                state.log.push("finish");
            }
            newly
        };
        if newly_finished {
            self.fire(PlayerPhase::Done);
        }
    }

    fn destroy(&self) {
        let newly_destroyed = {
            let mut state = self.state.borrow_mut();
            let newly = !state.destroyed;
            state.destroyed = true;
            if newly {
                state.log.push("destroy");
            }
            newly
        };
        if newly_destroyed {
            self.finish();
            self.fire(PlayerPhase::Destroy);
        }
    }

    fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.started = false;
        state.finished = false;
        state.log.push("reset");
    }

    fn set_position(&self, position: f64) {
        self.state.borrow_mut().position = position;
    }

    fn get_position(&self) -> f64 {
        self.state.borrow().position
    }

    fn total_time(&self) -> f64 {
        self.duration + self.delay
    }

    fn trigger_callback(&self, phase: PlayerPhase) {
        self.fire(phase);
    }

    fn element(&self) -> Option<ElementId> {
        Some(self.element)
    }
}

impl std::fmt::Debug for MockPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlayer")
            .field("element", &self.element)
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should match compound selectors and descendant chains
    #[test]
    fn selector_matching() {
        let host = MockHost::new();
        let root = host.create_root("body");
        let list = host.create_element("ul");
        let item = host.create_element("li");
        host.append_child(root, list);
        host.append_child(list, item);
        host.add_class(item, "active");

        assert!(host.matches_element(item, "li"));
        assert!(host.matches_element(item, ".active"));
        assert!(host.matches_element(item, "li.active"));
        assert!(host.matches_element(item, "ul li"));
        assert!(!host.matches_element(item, "div li"));
        assert_eq!(host.query(root, "li", true), vec![item]);
        assert_eq!(host.query(root, "*", true).len(), 2);
    }

    /// it should report empty computed styles once detached
    #[test]
    fn computed_styles_for_detached_elements() {
        let host = MockHost::new();
        let root = host.create_root("body");
        let child = host.create_element("div");
        host.append_child(root, child);
        host.set_computed_style(child, "width", "10px");
        assert_eq!(host.compute_style(child, "width", "*"), "10px");
        assert_eq!(host.compute_style(child, "height", "*"), "*");
        host.detach(child);
        assert_eq!(host.compute_style(child, "width", "*"), "");
    }
}
