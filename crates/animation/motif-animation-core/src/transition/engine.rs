//! Cross-namespace scheduler: registration, enter/leave collection, flush,
//! priority resolution and player composition.
//!
//! All engine-level per-element records (trigger states, player rosters,
//! removal metadata, the disabled set) live in [`EngineShared`], which player
//! callbacks can reach through a shared handle. Namespace bookkeeping and
//! flush orchestration live on [`TransitionAnimationEngine`] itself.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::driver::DriverRef;
use crate::element::ElementId;
use crate::error::AnimationError;
use crate::scheduler::TaskQueue;
use crate::style::{normalize_keyframes, Keyframe, StyleMap, StyleNormalizer, StyleValue};
use crate::timeline::{ElementInstructionMap, TimelineInstruction};
use crate::transition::namespace::{
    listen_on_player, make_animation_event, params_equal, AnimationEvent,
    AnimationTransitionNamespace, ListenerHandle, ListenerPhase, QueueEntry, TriggerListener,
};
use crate::transition::player::{
    flatten_group_players, optimize_group_player, AnimationPlayer, Callback, NoopAnimationPlayer,
    PlayerRef, TransitionAnimationPlayer,
};
use crate::transition::trigger::{
    AnimationTrigger, StateValue, TransitionInstruction, TriggerValue,
};
use crate::transition::{
    ANIMATING_CLASSNAME, ANIMATING_SELECTOR, DISABLED_CLASSNAME, DISABLED_SELECTOR,
    ENTER_CLASSNAME, LEAVE_CLASSNAME, QUEUED_CLASSNAME, QUEUED_SELECTOR, STAR_CLASSNAME,
    STAR_SELECTOR, TRIGGER_CLASSNAME, TRIGGER_SELECTOR, VOID_VALUE,
};

/// Opaque payload forwarded to the removal-complete callback.
pub type RemovalContext = Rc<dyn Any>;

/// Out-of-band removal record for one element; write-once per removal cycle.
#[derive(Clone, Default)]
pub struct ElementRemovalState {
    pub namespace_id: String,
    pub set_for_removal: bool,
    pub context: Option<RemovalContext>,
    pub set_for_move: bool,
    pub has_animation: bool,
    pub removed_before_queried: bool,
    pub previous_triggers_values: Option<HashMap<String, String>>,
}

impl ElementRemovalState {
    /// Whether this record is the processed sentinel (nothing pending).
    pub fn is_settled(&self) -> bool {
        !self.set_for_removal && !self.set_for_move && !self.removed_before_queried
    }
}

type PlayersByElement = HashMap<ElementId, Vec<Rc<TransitionAnimationPlayer>>>;
type ListenersByElement = HashMap<ElementId, Vec<(String, TriggerListener)>>;

/// Engine state reachable from player callbacks.
pub struct EngineShared {
    pub driver: DriverRef,
    pub normalizer: Rc<dyn StyleNormalizer>,
    pub queue: Rc<TaskQueue>,
    pub root_element: ElementId,
    states_by_element: RefCell<HashMap<ElementId, HashMap<String, StateValue>>>,
    element_listeners: RefCell<ListenersByElement>,
    players_by_element: RefCell<PlayersByElement>,
    players_by_queried_element: RefCell<PlayersByElement>,
    removal_states: RefCell<HashMap<ElementId, ElementRemovalState>>,
    disabled_nodes: RefCell<HashSet<ElementId>>,
    players: RefCell<Vec<Rc<TransitionAnimationPlayer>>>,
    on_removal_complete: RefCell<Box<dyn FnMut(ElementId, Option<RemovalContext>)>>,
}

impl EngineShared {
    pub fn mark_element_as_disabled(&self, element: ElementId, value: bool) {
        let changed = {
            let mut disabled = self.disabled_nodes.borrow_mut();
            if value {
                disabled.insert(element)
            } else {
                disabled.remove(&element)
            }
        };
        if changed {
            if value {
                self.driver.add_class(element, DISABLED_CLASSNAME);
            } else {
                self.driver.remove_class(element, DISABLED_CLASSNAME);
            }
        }
    }

    pub fn is_disabled(&self, element: ElementId) -> bool {
        self.disabled_nodes.borrow().contains(&element)
    }

    /// Finalize a removal: destroy inner animations, clear cached state and
    /// notify the host so the element can actually detach.
    pub fn process_leave_node(&self, element: ElementId) {
        let pending = {
            let mut removals = self.removal_states.borrow_mut();
            match removals.get_mut(&element) {
                Some(details) if details.set_for_removal => {
                    let namespace_id = details.namespace_id.clone();
                    let context = details.context.take();
                    // reset to the processed sentinel so the element cannot
                    // be removed twice
                    *details = ElementRemovalState::default();
                    Some((namespace_id, context))
                }
                _ => None,
            }
        };
        if let Some((namespace_id, context)) = pending {
            log::debug!("processing leave node {element:?} (ns={namespace_id})");
            if !namespace_id.is_empty() {
                self.destroy_inner_animations(element);
                self.clear_element_cache(&namespace_id, element);
            }
            (*self.on_removal_complete.borrow_mut())(element, context);
        }
        if self.is_disabled(element) {
            self.mark_element_as_disabled(element, false);
        }
        for node in self.driver.query(element, DISABLED_SELECTOR, true) {
            self.mark_element_as_disabled(node, false);
        }
    }

    pub fn destroy_inner_animations(&self, container: ElementId) {
        for element in self.driver.query(container, TRIGGER_SELECTOR, true) {
            self.destroy_active_animations_for_element(element);
        }
        if self.players_by_queried_element.borrow().is_empty() {
            return;
        }
        for element in self.driver.query(container, ANIMATING_SELECTOR, true) {
            self.finish_active_queried_animation_on_element(element);
        }
    }

    pub fn destroy_active_animations_for_element(&self, element: ElementId) {
        let players = self
            .players_by_element
            .borrow()
            .get(&element)
            .cloned()
            .unwrap_or_default();
        for player in players {
            if player.queued() {
                // destruction is delayed until flush so attached listeners
                // still fire
                player.mark_for_destroy();
            } else {
                player.destroy();
            }
        }
    }

    pub fn finish_active_queried_animation_on_element(&self, element: ElementId) {
        let players = self
            .players_by_queried_element
            .borrow()
            .get(&element)
            .cloned()
            .unwrap_or_default();
        for player in players {
            player.finish();
        }
    }

    /// Drop every cached record one namespace holds for an element.
    pub fn clear_element_cache(&self, namespace_id: &str, element: ElementId) {
        self.states_by_element.borrow_mut().remove(&element);
        if let Some(listeners) = self.element_listeners.borrow_mut().get_mut(&element) {
            listeners.retain(|(ns, _)| ns != namespace_id);
        }
        let players = self.players_by_element.borrow_mut().remove(&element);
        if let Some(players) = players {
            for player in players {
                player.destroy();
            }
        }
    }

    fn get_previous_players(
        &self,
        element: ElementId,
        is_queried_element: bool,
        namespace_id: Option<&str>,
        trigger_name: Option<&str>,
        to_state_value: Option<&str>,
    ) -> Vec<Rc<TransitionAnimationPlayer>> {
        let mut players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        if is_queried_element {
            if let Some(queried) = self.players_by_queried_element.borrow().get(&element) {
                players = queried.clone();
            }
        } else if let Some(element_players) = self.players_by_element.borrow().get(&element) {
            let is_removal = to_state_value.map_or(true, |v| v == VOID_VALUE);
            for player in element_players {
                if player.queued() {
                    continue;
                }
                if !is_removal && trigger_name.is_some_and(|t| t != player.trigger_name) {
                    continue;
                }
                players.push(player.clone());
            }
        }
        if namespace_id.is_some() || trigger_name.is_some() {
            players.retain(|p| {
                namespace_id.map_or(true, |ns| ns == p.namespace_id)
                    && trigger_name.map_or(true, |t| t == p.trigger_name)
            });
        }
        players
    }
}

struct QueuedTransition {
    element: ElementId,
    instruction: TransitionInstruction,
    player: Rc<TransitionAnimationPlayer>,
}

type EngineFn = Box<dyn FnOnce(&mut TransitionAnimationEngine)>;

pub struct TransitionAnimationEngine {
    shared: Rc<EngineShared>,
    namespaces: HashMap<String, AnimationTransitionNamespace>,
    namespace_list: Vec<String>,
    namespaces_by_host: HashMap<ElementId, String>,
    new_host_elements: Vec<(ElementId, String)>,
    collected_enter_elements: Vec<ElementId>,
    collected_leave_elements: Vec<ElementId>,
    total_animations: usize,
    total_queued_players: usize,
    after_flush_fns: Vec<EngineFn>,
    after_quiet_fns: Vec<Callback>,
    next_listener_id: u64,
}

impl TransitionAnimationEngine {
    pub fn new(
        driver: DriverRef,
        normalizer: Rc<dyn StyleNormalizer>,
        queue: Rc<TaskQueue>,
        root_element: ElementId,
    ) -> Self {
        Self {
            shared: Rc::new(EngineShared {
                driver,
                normalizer,
                queue,
                root_element,
                states_by_element: RefCell::new(HashMap::new()),
                element_listeners: RefCell::new(HashMap::new()),
                players_by_element: RefCell::new(HashMap::new()),
                players_by_queried_element: RefCell::new(HashMap::new()),
                removal_states: RefCell::new(HashMap::new()),
                disabled_nodes: RefCell::new(HashSet::new()),
                players: RefCell::new(Vec::new()),
                on_removal_complete: RefCell::new(Box::new(|_, _| {})),
            }),
            namespaces: HashMap::new(),
            namespace_list: Vec::new(),
            namespaces_by_host: HashMap::new(),
            new_host_elements: Vec::new(),
            collected_enter_elements: Vec::new(),
            collected_leave_elements: Vec::new(),
            total_animations: 0,
            total_queued_players: 0,
            after_flush_fns: Vec::new(),
            after_quiet_fns: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn shared(&self) -> &Rc<EngineShared> {
        &self.shared
    }

    pub fn set_on_removal_complete(
        &mut self,
        callback: Box<dyn FnMut(ElementId, Option<RemovalContext>)>,
    ) {
        *self.shared.on_removal_complete.borrow_mut() = callback;
    }

    pub fn players(&self) -> Vec<Rc<TransitionAnimationPlayer>> {
        self.shared.players.borrow().clone()
    }

    // -- registration -------------------------------------------------------

    /// Create the namespace if it does not exist yet. Returns true when a
    /// new namespace was created.
    pub fn register(&mut self, namespace_id: &str, host_element: ElementId) -> bool {
        if self.namespaces.contains_key(namespace_id) {
            return false;
        }
        log::debug!("registering animation namespace {namespace_id}");
        let ns = AnimationTransitionNamespace::new(namespace_id, host_element);
        self.shared.driver.add_class(host_element, &ns.host_class_name);
        self.namespaces.insert(namespace_id.to_string(), ns);
        if self
            .shared
            .driver
            .contains_element(self.shared.root_element, host_element)
        {
            self.balance_namespace_list(namespace_id, host_element);
        } else {
            // the host is not attached yet; slot the namespace in during the
            // next flush when its position in the tree is known
            self.new_host_elements
                .push((host_element, namespace_id.to_string()));
            self.collect_enter_element(host_element);
        }
        true
    }

    pub fn register_trigger(
        &mut self,
        namespace_id: &str,
        name: &str,
        trigger: AnimationTrigger,
    ) -> Result<(), AnimationError> {
        let transition_count = trigger.transition_count();
        let ns = self.namespaces.get_mut(namespace_id).ok_or_else(|| {
            AnimationError::UnregisteredTrigger {
                name: name.to_string(),
            }
        })?;
        ns.register(name, trigger)?;
        self.total_animations += transition_count;
        Ok(())
    }

    fn balance_namespace_list(&mut self, namespace_id: &str, host_element: ElementId) {
        if !self.namespace_list.is_empty() {
            // ancestor namespaces must precede the namespaces of hosts they
            // contain; find the closest registered ancestor and slot in after
            let mut found = false;
            let mut ancestor = self.shared.driver.parent_element(host_element);
            while let Some(current) = ancestor {
                if let Some(ancestor_ns) = self.namespaces_by_host.get(&current) {
                    if let Some(pos) = self.namespace_list.iter().position(|n| n == ancestor_ns) {
                        self.namespace_list
                            .insert(pos + 1, namespace_id.to_string());
                        found = true;
                    }
                    break;
                }
                ancestor = self.shared.driver.parent_element(current);
            }
            if !found {
                self.namespace_list.insert(0, namespace_id.to_string());
            }
        } else {
            self.namespace_list.push(namespace_id.to_string());
        }
        self.namespaces_by_host
            .insert(host_element, namespace_id.to_string());
    }

    /// Queue namespace teardown: cache cleanup after the flush, player
    /// destruction once the cycle is quiet.
    pub fn destroy_namespace(&mut self, namespace_id: &str, context: Option<RemovalContext>) {
        if namespace_id.is_empty() || !self.namespaces.contains_key(namespace_id) {
            return;
        }
        let id = namespace_id.to_string();
        self.after_flush_fns.push(Box::new(move |engine| {
            let Some(host) = engine.namespaces.get(&id).map(|ns| ns.host_element) else {
                return;
            };
            engine.shared.clear_element_cache(&id, host);
            engine.signal_removal_for_inner_triggers(&id, host, context.clone());
            engine.namespaces_by_host.remove(&host);
            engine.namespace_list.retain(|n| n != &id);
            if let Some(ns) = engine.namespaces.remove(&id) {
                let players = ns.players.clone();
                engine.after_quiet_fns.push(Box::new(move || {
                    let list = players.borrow().clone();
                    for player in list {
                        player.destroy();
                    }
                }));
            }
        }));
    }

    // -- listeners ----------------------------------------------------------

    pub fn listen(
        &mut self,
        namespace_id: &str,
        element: ElementId,
        name: &str,
        phase: &str,
        callback: Box<dyn FnMut(AnimationEvent)>,
    ) -> Result<ListenerHandle, AnimationError> {
        let ns = self.namespaces.get(namespace_id).ok_or_else(|| {
            AnimationError::UnregisteredTrigger {
                name: name.to_string(),
            }
        })?;
        if !ns.has_trigger(name) {
            return Err(AnimationError::UnregisteredTrigger {
                name: name.to_string(),
            });
        }
        let phase = ListenerPhase::parse(phase, name)?;

        let id = self.next_listener_id;
        self.next_listener_id += 1;
        let listener = TriggerListener {
            id,
            name: name.to_string(),
            phase,
            callback: Rc::new(RefCell::new(callback)),
        };
        self.shared
            .element_listeners
            .borrow_mut()
            .entry(element)
            .or_default()
            .push((namespace_id.to_string(), listener));

        let mut tag_element = false;
        {
            let mut states = self.shared.states_by_element.borrow_mut();
            let table = states.entry(element).or_default();
            if !table.contains_key(name) {
                tag_element = true;
                table.insert(name.to_string(), StateValue::void());
            }
        }
        if tag_element {
            self.shared.driver.add_class(element, TRIGGER_CLASSNAME);
            self.shared
                .driver
                .add_class(element, &format!("{TRIGGER_CLASSNAME}-{name}"));
        }

        Ok(ListenerHandle {
            namespace_id: namespace_id.to_string(),
            element,
            id,
        })
    }

    /// Deregistration is deferred past the next flush so leave-animation
    /// callbacks can still reach the listener.
    pub fn unlisten(&mut self, handle: ListenerHandle) {
        self.after_flush_fns.push(Box::new(move |engine| {
            let mut listeners = engine.shared.element_listeners.borrow_mut();
            if let Some(list) = listeners.get_mut(&handle.element) {
                list.retain(|(ns, l)| !(ns == &handle.namespace_id && l.id == handle.id));
            }
        }));
    }

    // -- triggering ---------------------------------------------------------

    /// Fire one trigger value change. Returns whether a player was queued.
    pub fn trigger(
        &mut self,
        namespace_id: &str,
        element: ElementId,
        name: &str,
        value: TriggerValue,
    ) -> Result<bool, AnimationError> {
        Ok(self
            .namespace_trigger(namespace_id, element, name, value, true)?
            .is_some())
    }

    fn namespace_trigger(
        &mut self,
        namespace_id: &str,
        element: ElementId,
        trigger_name: &str,
        value: TriggerValue,
        default_to_fallback: bool,
    ) -> Result<Option<Rc<TransitionAnimationPlayer>>, AnimationError> {
        let trigger = self
            .namespaces
            .get(namespace_id)
            .ok_or_else(|| AnimationError::UnregisteredTrigger {
                name: trigger_name.to_string(),
            })?
            .get_trigger(trigger_name)?;

        let shared = self.shared.clone();
        let player = TransitionAnimationPlayer::new(
            namespace_id.to_string(),
            trigger_name.to_string(),
            element,
            shared.queue.clone(),
        );

        let has_explicit_params = value.has_explicit_params();
        let mut tag_element = false;
        let (from_state, to_state) = {
            let mut states = shared.states_by_element.borrow_mut();
            let table = states.entry(element).or_insert_with(|| {
                tag_element = true;
                HashMap::new()
            });
            let from = table.get(trigger_name).cloned();
            let mut to = StateValue::new(value, namespace_id);
            if !has_explicit_params {
                if let Some(previous) = &from {
                    to.absorb_params(&previous.params);
                }
            }
            table.insert(trigger_name.to_string(), to.clone());
            (from.unwrap_or_else(StateValue::void), to)
        };
        if tag_element {
            shared.driver.add_class(element, TRIGGER_CLASSNAME);
            shared
                .driver
                .add_class(element, &format!("{TRIGGER_CLASSNAME}-{trigger_name}"));
        }

        let is_removal = to_state.value == VOID_VALUE;
        if !is_removal && from_state.value == to_state.value {
            if !params_equal(&from_state.params, &to_state.params) {
                // same state, new params: no player, just restyle after flush
                let mut errors = Vec::new();
                let from_styles =
                    trigger.match_styles(&from_state.value, &from_state.params, &mut errors);
                let to_styles =
                    trigger.match_styles(&to_state.value, &to_state.params, &mut errors);
                if !errors.is_empty() {
                    return Err(AnimationError::FlushFailed { errors });
                }
                self.after_flush_fns.push(Box::new(move |engine| {
                    engine.shared.driver.erase_styles(element, &from_styles);
                    engine.shared.driver.set_styles(element, &to_styles);
                }));
            }
            return Ok(None);
        }

        // a newer activation supersedes any still-queued player on the same
        // (namespace, trigger, element); started players survive until flush
        let players_on_element = shared
            .players_by_element
            .borrow()
            .get(&element)
            .cloned()
            .unwrap_or_default();
        for existing in &players_on_element {
            if existing.namespace_id == namespace_id
                && existing.trigger_name == trigger_name
                && existing.queued()
            {
                existing.destroy();
            }
        }

        let mut transition =
            trigger.match_transition(&from_state.value, &to_state.value, element, &to_state.params);
        let mut is_fallback_transition = false;
        if transition.is_none() {
            if !default_to_fallback {
                return Ok(None);
            }
            transition = Some(trigger.fallback_transition.clone());
            is_fallback_transition = true;
        }

        self.total_queued_players += 1;
        let entry = QueueEntry {
            element,
            trigger_name: trigger_name.to_string(),
            transition: transition.take().ok_or_else(|| {
                AnimationError::UnregisteredTrigger {
                    name: trigger_name.to_string(),
                }
            })?,
            from_state,
            to_state,
            player: player.clone(),
            is_fallback_transition,
        };
        if let Some(ns) = self.namespaces.get_mut(namespace_id) {
            ns.queue.push(entry);

            if !is_fallback_transition {
                shared.driver.add_class(element, QUEUED_CLASSNAME);
                let driver = shared.driver.clone();
                player.on_start(Box::new(move || {
                    driver.remove_class(element, QUEUED_CLASSNAME)
                }));
            }

            // prune rosters once this player completes
            let ns_players = ns.players.clone();
            let shared_for_done = shared.clone();
            let me = player.clone();
            player.on_done(Box::new(move || {
                ns_players.borrow_mut().retain(|p| !Rc::ptr_eq(p, &me));
                let mut by_element = shared_for_done.players_by_element.borrow_mut();
                if let Some(list) = by_element.get_mut(&me.element) {
                    list.retain(|p| !Rc::ptr_eq(p, &me));
                }
            }));
            ns.players.borrow_mut().push(player.clone());
        }
        shared
            .players_by_element
            .borrow_mut()
            .entry(element)
            .or_default()
            .push(player.clone());

        Ok(Some(player))
    }

    // -- insertion / removal ------------------------------------------------

    pub fn collect_enter_element(&mut self, element: ElementId) {
        self.collected_enter_elements.push(element);
    }

    pub fn insert_node(
        &mut self,
        namespace_id: Option<&str>,
        element: ElementId,
        _parent: Option<ElementId>,
        insert_before: bool,
    ) {
        // an element removed then reinserted before flush is a move, not a
        // removal
        {
            let mut removals = self.shared.removal_states.borrow_mut();
            if let Some(details) = removals.get_mut(&element) {
                if details.set_for_removal {
                    details.set_for_removal = false;
                    details.context = None;
                    details.set_for_move = true;
                    if let Some(pos) = self
                        .collected_leave_elements
                        .iter()
                        .position(|e| *e == element)
                    {
                        self.collected_leave_elements.remove(pos);
                    }
                }
            }
        }
        if let Some(ns_id) = namespace_id {
            if let Some(ns) = self.namespaces.get(ns_id) {
                let class = ns.host_class_name.clone();
                self.shared.driver.add_class(element, &class);
            }
        }
        if insert_before {
            self.collect_enter_element(element);
        }
    }

    pub fn mark_element_as_removed(
        &mut self,
        namespace_id: &str,
        element: ElementId,
        has_animation: bool,
        context: Option<RemovalContext>,
        previous_triggers_values: Option<HashMap<String, String>>,
    ) {
        self.collected_leave_elements.push(element);
        self.shared.removal_states.borrow_mut().insert(
            element,
            ElementRemovalState {
                namespace_id: namespace_id.to_string(),
                set_for_removal: true,
                context,
                set_for_move: false,
                has_animation,
                removed_before_queried: false,
                previous_triggers_values,
            },
        );
    }

    pub fn remove_node(
        &mut self,
        namespace_id: Option<&str>,
        element: ElementId,
        context: Option<RemovalContext>,
    ) {
        match namespace_id {
            Some(ns_id) if self.namespaces.contains_key(ns_id) => {
                self.namespace_remove_node(ns_id.to_string(), element, context.clone());
            }
            _ => self.mark_element_as_removed("", element, false, context.clone(), None),
        }
        // the element may also host another namespace; that namespace gets
        // its own removal signal
        if let Some(host_ns) = self.namespaces_by_host.get(&element).cloned() {
            if namespace_id != Some(host_ns.as_str()) {
                self.namespace_remove_node(host_ns, element, context);
            }
        }
    }

    fn namespace_remove_node(
        &mut self,
        namespace_id: String,
        element: ElementId,
        context: Option<RemovalContext>,
    ) {
        let shared = self.shared.clone();
        self.signal_removal_for_inner_triggers(&namespace_id, element, context.clone());

        // a matching leave transition takes over the removal entirely
        if self.trigger_leave_animation(&namespace_id, element, context.clone(), true, false) {
            return;
        }

        // otherwise the element may still be claimed by an ancestor or
        // queried animation; defer detachment if that is plausible
        let mut contains_potential_parent_transition = false;
        if self.total_animations > 0 {
            let current_players = if shared.players.borrow().is_empty() {
                Vec::new()
            } else {
                shared
                    .players_by_queried_element
                    .borrow()
                    .get(&element)
                    .cloned()
                    .unwrap_or_default()
            };
            if !current_players.is_empty() {
                contains_potential_parent_transition = true;
            } else {
                let mut parent = shared.driver.parent_element(element);
                while let Some(current) = parent {
                    if shared.states_by_element.borrow().contains_key(&current) {
                        contains_potential_parent_transition = true;
                        break;
                    }
                    parent = shared.driver.parent_element(current);
                }
            }
        }

        // listeners must observe the leave no matter who sweeps the element
        self.prepare_leave_animation_listeners(&namespace_id, element);

        if contains_potential_parent_transition {
            self.mark_element_as_removed(&namespace_id, element, false, context, None);
        } else {
            let already_flagged = self
                .shared
                .removal_states
                .borrow()
                .get(&element)
                .is_some_and(|d| !d.is_settled());
            if !already_flagged {
                let ns_id = namespace_id.clone();
                self.after_flush_fns.push(Box::new(move |engine| {
                    engine.shared.clear_element_cache(&ns_id, element);
                }));
                shared.destroy_inner_animations(element);
                (*shared.on_removal_complete.borrow_mut())(element, context);
            }
        }
    }

    /// Fire a void transition for every trigger defined on `element`.
    /// Returns true when at least one player resulted (the removal is then
    /// animation-driven).
    fn trigger_leave_animation(
        &mut self,
        namespace_id: &str,
        element: ElementId,
        context: Option<RemovalContext>,
        destroy_after_complete: bool,
        default_to_fallback: bool,
    ) -> bool {
        let trigger_states = self
            .shared
            .states_by_element
            .borrow()
            .get(&element)
            .cloned();
        let Some(states) = trigger_states else {
            return false;
        };

        let mut previous_values: HashMap<String, String> = HashMap::new();
        let mut players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        for (trigger_name, state) in &states {
            previous_values.insert(trigger_name.clone(), state.value.clone());
            // the element may be removed on both the host and content level;
            // only fire triggers this namespace actually owns
            let owns = self
                .namespaces
                .get(namespace_id)
                .is_some_and(|ns| ns.has_trigger(trigger_name));
            if owns {
                if let Ok(Some(player)) = self.namespace_trigger(
                    namespace_id,
                    element,
                    trigger_name,
                    TriggerValue::Bare(VOID_VALUE.to_string()),
                    default_to_fallback,
                ) {
                    players.push(player);
                }
            }
        }

        if players.is_empty() {
            return false;
        }
        self.mark_element_as_removed(
            namespace_id,
            element,
            true,
            context,
            Some(previous_values),
        );
        if destroy_after_complete {
            let shared = self.shared.clone();
            let refs: Vec<PlayerRef> = players.iter().map(|p| p.clone() as PlayerRef).collect();
            optimize_group_player(refs, &self.shared.queue)
                .on_done(Box::new(move || shared.process_leave_node(element)));
        }
        true
    }

    /// Queue fallback leave entries for listened-to triggers so start/done
    /// callbacks fire even when an ancestor animation sweeps the element.
    fn prepare_leave_animation_listeners(&mut self, namespace_id: &str, element: ElementId) {
        let listeners: Vec<TriggerListener> = self
            .shared
            .element_listeners
            .borrow()
            .get(&element)
            .map(|list| {
                list.iter()
                    .filter(|(ns, _)| ns == namespace_id)
                    .map(|(_, l)| l.clone())
                    .collect()
            })
            .unwrap_or_default();
        let element_states = self
            .shared
            .states_by_element
            .borrow()
            .get(&element)
            .cloned();
        let (Some(states), false) = (element_states, listeners.is_empty()) else {
            return;
        };

        let mut visited: HashSet<String> = HashSet::new();
        for listener in listeners {
            if !visited.insert(listener.name.clone()) {
                continue;
            }
            let Some(ns) = self.namespaces.get_mut(namespace_id) else {
                return;
            };
            let Some(trigger) = ns.triggers.get(&listener.name).cloned() else {
                continue;
            };
            let player = TransitionAnimationPlayer::new(
                namespace_id.to_string(),
                listener.name.clone(),
                element,
                self.shared.queue.clone(),
            );
            self.total_queued_players += 1;
            ns.queue.push(QueueEntry {
                element,
                trigger_name: listener.name.clone(),
                transition: trigger.fallback_transition.clone(),
                from_state: states
                    .get(&listener.name)
                    .cloned()
                    .unwrap_or_else(StateValue::void),
                to_state: StateValue::new(
                    TriggerValue::Bare(VOID_VALUE.to_string()),
                    "",
                ),
                player,
                is_fallback_transition: true,
            });
        }
    }

    fn signal_removal_for_inner_triggers(
        &mut self,
        namespace_id: &str,
        root_element: ElementId,
        context: Option<RemovalContext>,
    ) {
        let elements = self
            .shared
            .driver
            .query(root_element, TRIGGER_SELECTOR, true);
        for element in &elements {
            // an inner remove() already kicked off this element's animation
            if self.shared.removal_states.borrow().contains_key(element) {
                continue;
            }
            let owning = self.fetch_namespaces_by_element(*element);
            if owning.is_empty() {
                self.shared.clear_element_cache(namespace_id, *element);
            } else {
                for ns_id in owning {
                    self.trigger_leave_animation(&ns_id, *element, context.clone(), false, true);
                }
            }
        }
        if !elements.is_empty() {
            // descendants removed along with the root might never finish
            // their animations; drop their cached records once quiet
            let shared = self.shared.clone();
            let ns_id = namespace_id.to_string();
            self.after_quiet_fns.push(Box::new(move || {
                for element in elements {
                    shared.clear_element_cache(&ns_id, element);
                }
            }));
        }
    }

    fn fetch_namespaces_by_element(&self, element: ElementId) -> Vec<String> {
        let mut namespaces: Vec<String> = Vec::new();
        if let Some(states) = self.shared.states_by_element.borrow().get(&element) {
            for state in states.values() {
                if !state.namespace_id.is_empty()
                    && self.namespaces.contains_key(&state.namespace_id)
                    && !namespaces.contains(&state.namespace_id)
                {
                    namespaces.push(state.namespace_id.clone());
                }
            }
        }
        namespaces
    }

    pub fn element_contains_data(&self, namespace_id: &str, element: ElementId) -> bool {
        if self
            .shared
            .removal_states
            .borrow()
            .get(&element)
            .is_some_and(|d| d.set_for_removal)
        {
            return true;
        }
        if self.shared.players_by_element.borrow().contains_key(&element)
            || self
                .shared
                .players_by_queried_element
                .borrow()
                .contains_key(&element)
            || self.shared.states_by_element.borrow().contains_key(&element)
        {
            return true;
        }
        if self
            .shared
            .element_listeners
            .borrow()
            .get(&element)
            .is_some_and(|list| list.iter().any(|(ns, _)| ns == namespace_id))
        {
            return true;
        }
        self.namespaces
            .get(namespace_id)
            .is_some_and(|ns| ns.queue.iter().any(|entry| entry.element == element))
    }

    // -- after-flush hooks ----------------------------------------------------

    pub fn after_flush(&mut self, callback: EngineFn) {
        self.after_flush_fns.push(callback);
    }

    pub fn after_flush_animations_done(&mut self, callback: Callback) {
        self.after_quiet_fns.push(callback);
    }

    /// Invoke `callback` once every currently-running root player finished,
    /// or on the next queue drain when idle.
    pub fn when_rendering_done(&self, callback: Callback) {
        let players: Vec<PlayerRef> = self
            .shared
            .players
            .borrow()
            .iter()
            .map(|p| p.clone() as PlayerRef)
            .collect();
        if players.is_empty() {
            self.shared.queue.schedule(callback);
        } else {
            optimize_group_player(players, &self.shared.queue).on_done(callback);
        }
    }

    // -- flush --------------------------------------------------------------

    pub fn flush(&mut self, microtask_id: i64) -> Result<(), AnimationError> {
        let mut players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();

        if !self.new_host_elements.is_empty() {
            let pending = std::mem::take(&mut self.new_host_elements);
            for (element, ns_id) in pending {
                self.balance_namespace_list(&ns_id, element);
            }
        }

        if self.total_animations > 0 && !self.collected_enter_elements.is_empty() {
            for element in &self.collected_enter_elements {
                self.shared.driver.add_class(*element, STAR_CLASSNAME);
            }
        }

        if !self.namespace_list.is_empty()
            && (self.total_queued_players > 0 || !self.collected_leave_elements.is_empty())
        {
            let mut cleanup: Vec<EngineFn> = Vec::new();
            let result = self.flush_animations(&mut cleanup, microtask_id);
            for cleanup_fn in cleanup {
                cleanup_fn(self);
            }
            match result {
                Ok(roots) => players = roots,
                Err(error) => {
                    // players of this pass were already destroyed; propagate
                    // the batched failure
                    return Err(error);
                }
            }
        } else {
            let leave = std::mem::take(&mut self.collected_leave_elements);
            for element in leave {
                self.shared.process_leave_node(element);
            }
        }

        self.total_queued_players = 0;
        self.collected_enter_elements.clear();
        self.collected_leave_elements.clear();

        let flush_fns = std::mem::take(&mut self.after_flush_fns);
        for callback in flush_fns {
            callback(self);
        }

        if !self.after_quiet_fns.is_empty() {
            let quiet_fns = std::mem::take(&mut self.after_quiet_fns);
            if players.is_empty() {
                for callback in quiet_fns {
                    callback();
                }
            } else {
                let refs: Vec<PlayerRef> = players.iter().map(|p| p.clone() as PlayerRef).collect();
                optimize_group_player(refs, &self.shared.queue).on_done(Box::new(move || {
                    for callback in quiet_fns {
                        callback();
                    }
                }));
            }
        }
        Ok(())
    }

    fn flush_animations(
        &mut self,
        cleanup: &mut Vec<EngineFn>,
        microtask_id: i64,
    ) -> Result<Vec<Rc<TransitionAnimationPlayer>>, AnimationError> {
        let shared = self.shared.clone();
        let driver = shared.driver.clone();
        log::debug!(
            "flush #{microtask_id}: {} queued player(s), {} leave element(s)",
            self.total_queued_players,
            self.collected_leave_elements.len()
        );

        let mut disabled_elements_set: HashSet<ElementId> = HashSet::new();
        for node in shared.disabled_nodes.borrow().iter() {
            disabled_elements_set.insert(*node);
            for queued in driver.query(*node, QUEUED_SELECTOR, true) {
                disabled_elements_set.insert(queued);
            }
        }

        let all_trigger_elements: Vec<ElementId> =
            shared.states_by_element.borrow().keys().copied().collect();
        let enter_node_map = build_root_map(
            driver.as_ref(),
            &all_trigger_elements,
            &self.collected_enter_elements,
        );
        let mut enter_node_map_ids: HashMap<ElementId, String> = HashMap::new();
        let mut marker_index = 0usize;
        for (root, nodes) in &enter_node_map {
            let class_name = format!("{ENTER_CLASSNAME}{marker_index}");
            marker_index += 1;
            for node in nodes {
                driver.add_class(*node, &class_name);
            }
            enter_node_map_ids.insert(*root, class_name);
        }

        let all_leave_nodes: Rc<RefCell<Vec<ElementId>>> = Rc::new(RefCell::new(Vec::new()));
        let mut merged_leave_nodes: Vec<ElementId> = Vec::new();
        let mut leave_nodes_without_animations: HashSet<ElementId> = HashSet::new();
        {
            let removals = shared.removal_states.borrow();
            for element in &self.collected_leave_elements {
                let Some(details) = removals.get(element) else {
                    continue;
                };
                if !details.set_for_removal {
                    continue;
                }
                all_leave_nodes.borrow_mut().push(*element);
                if !merged_leave_nodes.contains(element) {
                    merged_leave_nodes.push(*element);
                }
                if details.has_animation {
                    for inner in driver.query(*element, STAR_SELECTOR, true) {
                        if !merged_leave_nodes.contains(&inner) {
                            merged_leave_nodes.push(inner);
                        }
                    }
                } else {
                    leave_nodes_without_animations.insert(*element);
                }
            }
        }

        let leave_node_map =
            build_root_map(driver.as_ref(), &all_trigger_elements, &merged_leave_nodes);
        let mut leave_node_map_ids: HashMap<ElementId, String> = HashMap::new();
        for (root, nodes) in &leave_node_map {
            let class_name = format!("{LEAVE_CLASSNAME}{marker_index}");
            marker_index += 1;
            for node in nodes {
                driver.add_class(*node, &class_name);
            }
            leave_node_map_ids.insert(*root, class_name);
        }

        {
            // marker classes come off again once the pass settles; leave
            // nodes not consumed by the pass are detached here as well
            let enter_pairs: Vec<(ElementId, String)> = enter_node_map
                .iter()
                .flat_map(|(root, nodes)| {
                    let class = enter_node_map_ids[root].clone();
                    nodes.iter().map(move |n| (*n, class.clone()))
                })
                .collect();
            let leave_pairs: Vec<(ElementId, String)> = leave_node_map
                .iter()
                .flat_map(|(root, nodes)| {
                    let class = leave_node_map_ids[root].clone();
                    nodes.iter().map(move |n| (*n, class.clone()))
                })
                .collect();
            let leave_nodes = all_leave_nodes.clone();
            cleanup.push(Box::new(move |engine| {
                for (node, class) in &enter_pairs {
                    engine.shared.driver.remove_class(*node, class);
                }
                for (node, class) in &leave_pairs {
                    engine.shared.driver.remove_class(*node, class);
                }
                for element in leave_nodes.borrow_mut().drain(..) {
                    engine.shared.process_leave_node(element);
                }
            }));
        }

        // -- drain every namespace queue, newest registrations first --------

        let mut all_players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        let mut erroneous_transitions: Vec<TransitionInstruction> = Vec::new();
        let mut skipped_players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        let mut queued_instructions: Vec<QueuedTransition> = Vec::new();
        let mut queried_elements: PlayersByElement = HashMap::new();
        let mut all_pre_style_elements: HashMap<ElementId, HashSet<String>> = HashMap::new();
        let mut all_post_style_elements: HashMap<ElementId, HashSet<String>> = HashMap::new();
        let mut sub_timelines = ElementInstructionMap::new();

        let namespace_ids: Vec<String> = self.namespace_list.iter().rev().cloned().collect();
        let has_enter_elements = !self.collected_enter_elements.is_empty();
        for ns_id in namespace_ids {
            for entry in self.drain_queued_transitions(&ns_id, microtask_id) {
                let element = entry.element;
                let player = entry.player.clone();
                all_players.push(player.clone());

                if has_enter_elements {
                    let moved = {
                        let removals = shared.removal_states.borrow();
                        removals.get(&element).map(|d| {
                            (d.set_for_move, d.previous_triggers_values.clone())
                        })
                    };
                    if let Some((true, previous_values)) = moved {
                        // move operation: restore the pre-removal trigger
                        // value, the element never actually left
                        if let Some(previous) = previous_values
                            .as_ref()
                            .and_then(|values| values.get(&entry.trigger_name))
                        {
                            let mut states = shared.states_by_element.borrow_mut();
                            if let Some(state) = states
                                .get_mut(&element)
                                .and_then(|table| table.get_mut(&entry.trigger_name))
                            {
                                state.value = previous.clone();
                            }
                        }
                        player.destroy();
                        continue;
                    }
                }

                let node_is_orphaned = !driver.contains_element(shared.root_element, element);
                let enter_class = enter_node_map_ids
                    .get(&element)
                    .cloned()
                    .unwrap_or_else(|| ENTER_CLASSNAME.to_string());
                let leave_class = leave_node_map_ids
                    .get(&element)
                    .cloned()
                    .unwrap_or_else(|| LEAVE_CLASSNAME.to_string());
                let mut instruction = entry.transition.build(
                    driver.as_ref(),
                    element,
                    &entry.from_state,
                    &entry.to_state,
                    &enter_class,
                    &leave_class,
                    Some(&sub_timelines),
                    node_is_orphaned,
                );
                if !instruction.errors.is_empty() {
                    erroneous_transitions.push(instruction);
                    continue;
                }

                // an element no longer in the tree still gets styled so a
                // later re-projection looks right
                if node_is_orphaned {
                    style_only_player(&shared, &player, &instruction);
                    skipped_players.push(player);
                    continue;
                }

                // an unmatched transition must not cancel running animations
                // nor render anything of its own
                if entry.is_fallback_transition {
                    style_only_player(&shared, &player, &instruction);
                    skipped_players.push(player);
                    continue;
                }

                // when a parent animation consumes these timelines as a sub
                // trigger, the delay is folded into a stretched keyframe
                let mut timelines: Vec<TimelineInstruction> = Vec::new();
                for mut timeline in instruction.timelines.drain(..) {
                    timeline.stretch_start_keyframe = true;
                    if !shared.disabled_nodes.borrow().contains(&timeline.element) {
                        timelines.push(timeline);
                    }
                }
                instruction.timelines = timelines;
                sub_timelines.append(element, instruction.timelines.clone());

                for queried in &instruction.queried_elements {
                    queried_elements
                        .entry(*queried)
                        .or_default()
                        .push(player.clone());
                }
                for (pre_element, props) in &instruction.pre_style_props {
                    if !props.is_empty() {
                        let set = all_pre_style_elements.entry(*pre_element).or_default();
                        set.extend(props.iter().cloned());
                    }
                }
                for (post_element, props) in &instruction.post_style_props {
                    if !props.is_empty() {
                        let set = all_post_style_elements.entry(*post_element).or_default();
                        set.extend(props.iter().cloned());
                    }
                }
                queued_instructions.push(QueuedTransition {
                    element,
                    instruction,
                    player,
                });
            }
        }

        if !erroneous_transitions.is_empty() {
            let mut errors: Vec<AnimationError> = Vec::new();
            for instruction in erroneous_transitions {
                log::warn!(
                    "transition build failed for trigger '{}' on {:?}",
                    instruction.trigger_name,
                    instruction.element
                );
                errors.push(AnimationError::TransitionFailed {
                    trigger: instruction.trigger_name,
                    errors: instruction.errors,
                });
            }
            for player in &all_players {
                player.destroy();
            }
            return Err(AnimationError::FlushFailed { errors });
        }

        // -- priority bookkeeping -------------------------------------------

        let mut all_previous_players: PlayersByElement = HashMap::new();
        // None marks "no ancestor animation" for every hop already scanned
        let mut animation_element_map: HashMap<ElementId, Option<ElementId>> = HashMap::new();
        for entry in &queued_instructions {
            if sub_timelines.has(entry.element) {
                animation_element_map.insert(entry.element, Some(entry.element));
                self.before_animation_build(
                    &entry.player.namespace_id.clone(),
                    &entry.instruction,
                    &mut all_previous_players,
                );
            }
        }
        for player in &skipped_players {
            let previous = shared.get_previous_players(
                player.element,
                false,
                Some(player.namespace_id.as_str()),
                Some(player.trigger_name.as_str()),
                None,
            );
            for previous_player in previous {
                all_previous_players
                    .entry(player.element)
                    .or_default()
                    .push(previous_player.clone());
                previous_player.destroy();
            }
        }

        // nodes removed underneath a queried container keep their `Auto`
        // styles readable by treating them as pre styles
        let mut replace_nodes: Vec<ElementId> = all_leave_nodes
            .borrow()
            .iter()
            .copied()
            .filter(|node| {
                replace_post_styles_as_pre(
                    *node,
                    &mut all_pre_style_elements,
                    &mut all_post_style_elements,
                )
            })
            .collect();

        // POST STAGE: compute the destination styles for leaving elements
        let mut post_styles_map: HashMap<ElementId, StyleMap> = HashMap::new();
        let failed_leave_queries = cloak_and_compute_styles(
            &mut post_styles_map,
            driver.as_ref(),
            &leave_nodes_without_animations.iter().copied().collect::<Vec<_>>(),
            &all_post_style_elements,
            "*",
        );
        for node in failed_leave_queries {
            shared
                .removal_states
                .borrow_mut()
                .entry(node)
                .or_default()
                .removed_before_queried = true;
            if replace_post_styles_as_pre(
                node,
                &mut all_pre_style_elements,
                &mut all_post_style_elements,
            ) {
                replace_nodes.push(node);
            }
        }

        // PRE STAGE: compute the rendered styles entering elements start from
        let mut pre_styles_map: HashMap<ElementId, StyleMap> = HashMap::new();
        for nodes in enter_node_map.values() {
            cloak_and_compute_styles(
                &mut pre_styles_map,
                driver.as_ref(),
                nodes,
                &all_pre_style_elements,
                "!",
            );
        }

        for node in replace_nodes {
            let pre = pre_styles_map.get(&node).cloned().unwrap_or_default();
            let merged = post_styles_map.entry(node).or_default();
            for (prop, value) in pre {
                merged.insert(prop, value);
            }
        }

        // -- build players, resolve priority --------------------------------

        let mut root_players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        let mut sub_players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        let mut skipped_players_map: HashMap<ElementId, Vec<PlayerRef>> = HashMap::new();

        for entry in &queued_instructions {
            let element = entry.element;
            let player = &entry.player;
            let instruction = &entry.instruction;
            if sub_timelines.has(element) {
                if disabled_elements_set.contains(&element) {
                    // disabled: no styling, callbacks only
                    style_only_destroy_hook(&shared, player, instruction);
                    player.set_disabled(true);
                    player.override_total_time(instruction.total_time);
                    sub_players.push(player.clone());
                    continue;
                }

                // scan up for a competing ancestor animation, memoizing every
                // hop (including the "definitely none" outcome)
                let mut parent_with_animation: Option<ElementId> = None;
                if animation_element_map.len() > 1 {
                    let mut current = element;
                    let mut parents_to_add: Vec<ElementId> = Vec::new();
                    while let Some(parent) = driver.parent_element(current) {
                        if let Some(detected) = animation_element_map.get(&parent) {
                            parent_with_animation = *detected;
                            break;
                        }
                        parents_to_add.push(parent);
                        current = parent;
                    }
                    for parent in parents_to_add {
                        animation_element_map.insert(parent, parent_with_animation);
                    }
                }

                let inner_player = match self.build_animation(
                    &player.namespace_id.clone(),
                    instruction,
                    &mut all_previous_players,
                    &mut skipped_players_map,
                    &pre_styles_map,
                    &post_styles_map,
                ) {
                    Ok(inner_player) => inner_player,
                    Err(error) => {
                        // no half-started pass: tear down everything built
                        // so far before escalating
                        for built in &all_players {
                            built.destroy();
                        }
                        return Err(error);
                    }
                };
                player.set_real_player(inner_player);

                match parent_with_animation {
                    None => root_players.push(player.clone()),
                    Some(parent_element) => {
                        let parent_players = shared
                            .players_by_element
                            .borrow()
                            .get(&parent_element)
                            .cloned()
                            .unwrap_or_default();
                        if !parent_players.is_empty() {
                            let refs: Vec<PlayerRef> = parent_players
                                .iter()
                                .map(|p| p.clone() as PlayerRef)
                                .collect();
                            player
                                .set_parent_player(optimize_group_player(refs, &shared.queue));
                        }
                        skipped_players.push(player.clone());
                    }
                }
            } else {
                // never claimed by the compiler: immediate style application
                // with callback-only participation
                driver.erase_styles(element, &instruction.from_styles);
                style_only_destroy_hook(&shared, player, instruction);
                sub_players.push(player.clone());
                if disabled_elements_set.contains(&element) {
                    skipped_players.push(player.clone());
                }
            }
        }

        // sub players adopt whichever inner players their element ended up
        // with; with none they complete as noops after the next drain
        for player in &sub_players {
            if let Some(inner) = skipped_players_map.get(&player.element) {
                if !inner.is_empty() {
                    player.set_real_player(optimize_group_player(inner.clone(), &shared.queue));
                }
            }
        }

        // a skipped player only replays lifecycle callbacks
        for player in &skipped_players {
            match player.parent_player() {
                Some(parent) => player.sync_player_events(parent),
                None => player.destroy(),
            }
        }

        // removals not picked up by any query detach right away; the rest
        // wait for every covering player
        let leave_nodes: Vec<ElementId> = all_leave_nodes.borrow().clone();
        for element in leave_nodes {
            let has_animation = shared
                .removal_states
                .borrow()
                .get(&element)
                .is_some_and(|d| d.has_animation);
            if has_animation {
                continue;
            }
            let mut covering: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
            if !queried_elements.is_empty() {
                if let Some(players) = queried_elements.get(&element) {
                    covering.extend(players.iter().cloned());
                }
                for inner in driver.query(element, ANIMATING_SELECTOR, true) {
                    if let Some(players) = queried_elements.get(&inner) {
                        covering.extend(players.iter().cloned());
                    }
                }
            }
            let active: Vec<Rc<TransitionAnimationPlayer>> = covering
                .into_iter()
                .filter(|p| !p.destroyed())
                .collect();
            if active.is_empty() {
                shared.process_leave_node(element);
            } else {
                let shared_for_done = shared.clone();
                let refs: Vec<PlayerRef> = active.iter().map(|p| p.clone() as PlayerRef).collect();
                optimize_group_player(refs, &shared.queue)
                    .on_done(Box::new(move || shared_for_done.process_leave_node(element)));
            }
        }
        all_leave_nodes.borrow_mut().clear();

        // -- start the winners ----------------------------------------------

        for player in &root_players {
            shared.players.borrow_mut().push(player.clone());
            let shared_for_done = shared.clone();
            let me = player.clone();
            player.on_done(Box::new(move || {
                me.destroy();
                shared_for_done
                    .players
                    .borrow_mut()
                    .retain(|p| !Rc::ptr_eq(p, &me));
            }));
            player.play();
        }
        log::debug!("flush #{microtask_id}: {} root player(s) started", root_players.len());

        Ok(root_players)
    }

    fn drain_queued_transitions(&mut self, namespace_id: &str, _microtask_id: i64) -> Vec<QueueEntry> {
        let queue = match self.namespaces.get_mut(namespace_id) {
            Some(ns) => std::mem::take(&mut ns.queue),
            None => return Vec::new(),
        };

        let mut instructions: Vec<QueueEntry> = Vec::new();
        for entry in queue {
            if entry.player.destroyed() {
                continue;
            }
            let listeners: Vec<TriggerListener> = self
                .shared
                .element_listeners
                .borrow()
                .get(&entry.element)
                .map(|list| {
                    list.iter()
                        .filter(|(ns, listener)| {
                            ns == namespace_id && listener.name == entry.trigger_name
                        })
                        .map(|(_, listener)| listener.clone())
                        .collect()
                })
                .unwrap_or_default();
            for listener in listeners {
                let event = make_animation_event(
                    entry.element,
                    &entry.trigger_name,
                    &entry.from_state.value,
                    &entry.to_state.value,
                    listener.phase,
                    0.0,
                );
                listen_on_player(&entry.player, listener.phase, event, listener.callback.clone());
            }
            if entry.player.marked_for_destroy() {
                let player = entry.player.clone();
                self.after_flush_fns
                    .push(Box::new(move |_| player.destroy()));
            } else {
                instructions.push(entry);
            }
        }

        // zero-dependency entries first; otherwise containers start after
        // their contents so outer animations never observe inner elements
        // mid-setup
        let driver = self.shared.driver.clone();
        instructions.sort_by(|a, b| {
            let d0 = a.transition.dep_count;
            let d1 = b.transition.dep_count;
            if d0 == 0 || d1 == 0 {
                d0.cmp(&d1)
            } else if driver.contains_element(a.element, b.element) {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        });
        instructions
    }

    /// Destroy previous players that the new animation supersedes and wipe
    /// the origin state styles so computed reads see a clean slate.
    fn before_animation_build(
        &mut self,
        namespace_id: &str,
        instruction: &TransitionInstruction,
        all_previous_players: &mut PlayersByElement,
    ) {
        let root_element = instruction.element;
        // a removal collects previous players from every namespace/trigger
        let target_namespace = (!instruction.is_removal_transition).then_some(namespace_id);
        let target_trigger =
            (!instruction.is_removal_transition).then_some(instruction.trigger_name.as_str());

        for timeline in &instruction.timelines {
            let element = timeline.element;
            let is_queried = element != root_element;
            let previous = self.shared.get_previous_players(
                element,
                is_queried,
                target_namespace,
                target_trigger,
                Some(instruction.to_state.as_str()),
            );
            for player in previous {
                player.get_real_player().before_destroy();
                player.destroy();
                all_previous_players
                    .entry(element)
                    .or_default()
                    .push(player);
            }
        }
        self.shared
            .driver
            .erase_styles(root_element, &instruction.from_styles);
    }

    fn build_animation(
        &mut self,
        namespace_id: &str,
        instruction: &TransitionInstruction,
        all_previous_players: &mut PlayersByElement,
        skipped_players_map: &mut HashMap<ElementId, Vec<PlayerRef>>,
        pre_styles_map: &HashMap<ElementId, StyleMap>,
        post_styles_map: &HashMap<ElementId, StyleMap>,
    ) -> Result<PlayerRef, AnimationError> {
        let shared = self.shared.clone();
        let driver = shared.driver.clone();
        let root_element = instruction.element;
        let empty_styles = StyleMap::new();

        let mut all_queried_players: Vec<Rc<TransitionAnimationPlayer>> = Vec::new();
        let mut all_consumed_elements: Vec<ElementId> = Vec::new();
        let mut all_sub_elements: HashSet<ElementId> = HashSet::new();
        let mut all_new_players: Vec<PlayerRef> = Vec::new();

        for timeline in &instruction.timelines {
            let element = timeline.element;
            if !all_consumed_elements.contains(&element) {
                all_consumed_elements.push(element);
            }

            let removed_before_queried = shared
                .removal_states
                .borrow()
                .get(&element)
                .is_some_and(|d| d.removed_before_queried);
            if removed_before_queried {
                all_new_players.push(NoopAnimationPlayer::new(
                    shared.queue.clone(),
                    timeline.duration,
                    timeline.delay,
                ));
                continue;
            }

            let is_queried = element != root_element;
            let previous_refs: Vec<PlayerRef> = all_previous_players
                .get(&element)
                .map(|players| players.iter().map(|p| p.get_real_player()).collect())
                .unwrap_or_default();
            let previous_players: Vec<PlayerRef> = flatten_group_players(&previous_refs)
                .into_iter()
                .filter(|p| p.element() == Some(element))
                .collect();

            let pre_styles = pre_styles_map.get(&element).unwrap_or(&empty_styles);
            let post_styles = post_styles_map.get(&element).unwrap_or(&empty_styles);
            let keyframes = normalize_keyframes(
                shared.normalizer.as_ref(),
                &timeline.keyframes,
                pre_styles,
                post_styles,
            )
            .map_err(|errors| AnimationError::FlushFailed { errors })?;

            let player = build_player(&shared, timeline, keyframes, previous_players);
            if timeline.is_sub_timeline {
                all_sub_elements.insert(element);
            }
            if is_queried {
                let wrapped = TransitionAnimationPlayer::new(
                    namespace_id.to_string(),
                    instruction.trigger_name.clone(),
                    element,
                    shared.queue.clone(),
                );
                wrapped.set_real_player(player.clone());
                all_queried_players.push(wrapped);
            }
            all_new_players.push(player);
        }

        for queried_player in all_queried_players {
            shared
                .players_by_queried_element
                .borrow_mut()
                .entry(queried_player.element)
                .or_default()
                .push(queried_player.clone());
            let shared_for_done = shared.clone();
            let me = queried_player.clone();
            queried_player.on_done(Box::new(move || {
                let mut map = shared_for_done.players_by_queried_element.borrow_mut();
                if let Some(list) = map.get_mut(&me.element) {
                    list.retain(|p| !Rc::ptr_eq(p, &me));
                    if list.is_empty() {
                        map.remove(&me.element);
                    }
                }
            }));
        }

        for element in &all_consumed_elements {
            driver.add_class(*element, ANIMATING_CLASSNAME);
        }

        let player = optimize_group_player(all_new_players, &shared.queue);
        let to_styles = instruction.to_styles.clone();
        let consumed = all_consumed_elements;
        let driver_for_destroy = driver.clone();
        player.on_destroy(Box::new(move || {
            for element in &consumed {
                driver_for_destroy.remove_class(*element, ANIMATING_CLASSNAME);
            }
            driver_for_destroy.set_styles(root_element, &to_styles);
        }));

        // sub-element callbacks ride on this composed player
        for element in all_sub_elements {
            skipped_players_map
                .entry(element)
                .or_default()
                .push(player.clone());
        }
        Ok(player)
    }
}

/// Erase the origin styles on start, apply the destination styles once the
/// player winds down; no keyframes are ever built.
fn style_only_player(
    shared: &Rc<EngineShared>,
    player: &Rc<TransitionAnimationPlayer>,
    instruction: &TransitionInstruction,
) {
    let driver = shared.driver.clone();
    let element = instruction.element;
    let from_styles = instruction.from_styles.clone();
    player.on_start(Box::new(move || driver.erase_styles(element, &from_styles)));
    style_only_destroy_hook(shared, player, instruction);
}

fn style_only_destroy_hook(
    shared: &Rc<EngineShared>,
    player: &Rc<TransitionAnimationPlayer>,
    instruction: &TransitionInstruction,
) {
    let driver = shared.driver.clone();
    let element = instruction.element;
    let to_styles = instruction.to_styles.clone();
    player.on_destroy(Box::new(move || driver.set_styles(element, &to_styles)));
}

fn build_player(
    shared: &Rc<EngineShared>,
    timeline: &TimelineInstruction,
    keyframes: Vec<Keyframe>,
    previous_players: Vec<PlayerRef>,
) -> PlayerRef {
    if keyframes.is_empty() {
        return NoopAnimationPlayer::new(shared.queue.clone(), timeline.duration, timeline.delay);
    }
    shared.driver.animate(
        timeline.element,
        &keyframes,
        timeline.duration,
        timeline.delay,
        timeline.easing.as_deref(),
        &previous_players,
    )
}

/// Move an element's pending `Auto` style reads over to the pre-style set;
/// used when the element will be gone before the destination can render.
fn replace_post_styles_as_pre(
    element: ElementId,
    all_pre_style_elements: &mut HashMap<ElementId, HashSet<String>>,
    all_post_style_elements: &mut HashMap<ElementId, HashSet<String>>,
) -> bool {
    let Some(post) = all_post_style_elements.remove(&element) else {
        return false;
    };
    all_pre_style_elements
        .entry(element)
        .or_default()
        .extend(post);
    true
}

/// Group `nodes` under the nearest containing element of `roots`; nodes
/// owned by another collected node (rather than a root) are dropped.
fn build_root_map(
    driver: &dyn crate::driver::AnimationDriver,
    roots: &[ElementId],
    nodes: &[ElementId],
) -> HashMap<ElementId, Vec<ElementId>> {
    let mut root_map: HashMap<ElementId, Vec<ElementId>> =
        roots.iter().map(|r| (*r, Vec::new())).collect();
    if nodes.is_empty() {
        return root_map;
    }
    let node_set: HashSet<ElementId> = nodes.iter().copied().collect();
    // memo: Some(root) or None for "no owning root"
    let mut local_root_map: HashMap<ElementId, Option<ElementId>> = HashMap::new();

    for node in nodes {
        let mut chain: Vec<ElementId> = Vec::new();
        let mut cursor = *node;
        let root: Option<ElementId> = loop {
            if let Some(found) = local_root_map.get(&cursor) {
                break *found;
            }
            let Some(parent) = driver.parent_element(cursor) else {
                break None;
            };
            if root_map.contains_key(&parent) {
                break Some(parent);
            }
            if node_set.contains(&parent) {
                break None;
            }
            chain.push(parent);
            cursor = parent;
        };
        local_root_map.insert(*node, root);
        for visited in chain {
            local_root_map.insert(visited, root);
        }
        if let Some(root) = root {
            if let Some(children) = root_map.get_mut(&root) {
                children.push(*node);
            }
        }
    }
    root_map
}

/// Hide, read, restore: batch computed-style reads without visual flicker.
/// Returns the elements whose reads came back empty (already detached).
fn cloak_and_compute_styles(
    values_map: &mut HashMap<ElementId, StyleMap>,
    driver: &dyn crate::driver::AnimationDriver,
    elements_to_cloak: &[ElementId],
    element_props: &HashMap<ElementId, HashSet<String>>,
    default_value: &str,
) -> Vec<ElementId> {
    let cloaks: Vec<(ElementId, Option<String>)> = elements_to_cloak
        .iter()
        .map(|element| (*element, driver.cloak_element(*element, Some("none"))))
        .collect();

    let mut failed_elements: Vec<ElementId> = Vec::new();
    for (element, props) in element_props {
        let mut styles = StyleMap::new();
        for prop in props {
            let value = driver.compute_style(*element, prop, default_value);
            // a sub element may already have been detached by a parent
            // animation; there is no cheaper way to detect that here
            if value.is_empty() {
                if !failed_elements.contains(element) {
                    failed_elements.push(*element);
                }
            }
            styles.insert(prop.clone(), StyleValue::from(value.as_str()));
        }
        values_map.insert(*element, styles);
    }

    for (element, previous) in cloaks {
        driver.cloak_element(element, previous.as_deref());
    }
    failed_elements
}
