//! Per-scope trigger ownership: one namespace per component instance, holding
//! its registered triggers, its request queue and its player roster.
//!
//! The queue/flush logic that needs whole-engine state lives on
//! [`crate::transition::engine::TransitionAnimationEngine`]; this module
//! keeps the namespace data plus the listener/event plumbing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::element::ElementId;
use crate::error::AnimationError;
use crate::timing::ParamMap;
use crate::transition::player::{AnimationPlayer, TransitionAnimationPlayer};
use crate::transition::trigger::{AnimationTrigger, StateValue, TransitionFactory};

/// Event payload delivered to trigger listeners.
#[derive(Clone, Debug)]
pub struct AnimationEvent {
    pub element: ElementId,
    pub trigger_name: String,
    pub from_state: String,
    pub to_state: String,
    pub phase: ListenerPhase,
    pub total_time: f64,
    pub disabled: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListenerPhase {
    Start,
    Done,
}

impl ListenerPhase {
    /// Parse a phase name; unknown phases are usage faults.
    pub fn parse(phase: &str, trigger_name: &str) -> Result<Self, AnimationError> {
        match phase {
            "" => Err(AnimationError::MissingTriggerEvent {
                name: trigger_name.to_string(),
            }),
            "start" => Ok(ListenerPhase::Start),
            "done" => Ok(ListenerPhase::Done),
            other => Err(AnimationError::UnsupportedTriggerEvent {
                name: trigger_name.to_string(),
                phase: other.to_string(),
            }),
        }
    }
}

/// Shared, repeatedly-invokable listener callback.
pub type ListenerRef = Rc<RefCell<Box<dyn FnMut(AnimationEvent)>>>;

#[derive(Clone)]
pub struct TriggerListener {
    pub id: u64,
    pub name: String,
    pub phase: ListenerPhase,
    pub callback: ListenerRef,
}

/// Handle returned by `listen`; passing it back deregisters the listener
/// (deferred until after the next flush so leave callbacks still fire).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerHandle {
    pub namespace_id: String,
    pub element: ElementId,
    pub id: u64,
}

/// One queued trigger activation, created per `trigger()` call and consumed
/// at flush.
pub struct QueueEntry {
    pub element: ElementId,
    pub trigger_name: String,
    pub transition: Rc<TransitionFactory>,
    pub from_state: StateValue,
    pub to_state: StateValue,
    pub player: Rc<TransitionAnimationPlayer>,
    pub is_fallback_transition: bool,
}

/// One scope's triggers, request queue and live players.
pub struct AnimationTransitionNamespace {
    pub id: String,
    pub host_element: ElementId,
    pub host_class_name: String,
    pub triggers: HashMap<String, Rc<AnimationTrigger>>,
    pub queue: Vec<QueueEntry>,
    pub players: Rc<RefCell<Vec<Rc<TransitionAnimationPlayer>>>>,
}

impl AnimationTransitionNamespace {
    pub fn new(id: &str, host_element: ElementId) -> Self {
        Self {
            id: id.to_string(),
            host_element,
            host_class_name: format!("anim-tns-{id}"),
            triggers: HashMap::new(),
            queue: Vec::new(),
            players: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Register a trigger; duplicate names are usage faults.
    pub fn register(&mut self, name: &str, trigger: AnimationTrigger) -> Result<(), AnimationError> {
        if self.triggers.contains_key(name) {
            return Err(AnimationError::DuplicateTrigger {
                name: name.to_string(),
            });
        }
        self.triggers.insert(name.to_string(), Rc::new(trigger));
        Ok(())
    }

    pub fn has_trigger(&self, name: &str) -> bool {
        self.triggers.contains_key(name)
    }

    pub fn get_trigger(&self, name: &str) -> Result<Rc<AnimationTrigger>, AnimationError> {
        self.triggers
            .get(name)
            .cloned()
            .ok_or_else(|| AnimationError::UnregisteredTrigger {
                name: name.to_string(),
            })
    }
}

/// Wire a listener callback to the matching lifecycle phase of a player.
/// Total time and the disabled flag are read off the player at fire time.
pub fn listen_on_player(
    player: &Rc<TransitionAnimationPlayer>,
    phase: ListenerPhase,
    base_event: AnimationEvent,
    callback: ListenerRef,
) {
    let weak: Weak<TransitionAnimationPlayer> = Rc::downgrade(player);
    let fire = move || {
        let mut event = base_event.clone();
        event.phase = phase;
        if let Some(player) = weak.upgrade() {
            event.total_time = player.total_time();
            event.disabled = player.disabled();
        }
        (*callback.borrow_mut())(event);
    };
    match phase {
        ListenerPhase::Start => player.on_start(Box::new(fire)),
        ListenerPhase::Done => player.on_done(Box::new(fire)),
    }
}

/// Build the event skeleton for a queued transition.
pub fn make_animation_event(
    element: ElementId,
    trigger_name: &str,
    from_state: &str,
    to_state: &str,
    phase: ListenerPhase,
    total_time: f64,
) -> AnimationEvent {
    AnimationEvent {
        element,
        trigger_name: trigger_name.to_string(),
        from_state: from_state.to_string(),
        to_state: to_state.to_string(),
        phase,
        total_time,
        disabled: false,
    }
}

/// Params for a state comparison: identical value and identical params mean
/// the trigger call is a no-op.
pub fn params_equal(a: &ParamMap, b: &ParamMap) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
}
