//! Player lifecycle: the trait real drivers implement, the trivial and
//! composite players the engine builds itself, and the queueing proxy that
//! defers real playback until flush-time priority resolution.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::element::ElementId;
use crate::scheduler::TaskQueue;

pub type Callback = Box<dyn FnOnce()>;

/// Handle to any player implementation.
pub type PlayerRef = Rc<dyn AnimationPlayer>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlayerPhase {
    Start,
    Done,
    Destroy,
}

/// Lifecycle contract every player implements. Completion is always signaled
/// asynchronously: a `Done` callback never fires inside the `play()` call
/// that started the animation.
pub trait AnimationPlayer {
    fn on_done(&self, callback: Callback);
    fn on_start(&self, callback: Callback);
    fn on_destroy(&self, callback: Callback);
    fn init(&self);
    fn has_started(&self) -> bool;
    fn play(&self);
    fn pause(&self);
    fn restart(&self);
    fn finish(&self);
    fn destroy(&self);
    fn reset(&self);
    fn set_position(&self, position: f64);
    fn get_position(&self) -> f64;
    fn total_time(&self) -> f64;

    /// Hook invoked right before a previous player is destroyed so the
    /// driver can capture whatever state it needs.
    fn before_destroy(&self) {}

    /// Replay buffered callbacks for a phase without playing. Skipped
    /// players use this so listeners observe start/done regardless.
    fn trigger_callback(&self, _phase: PlayerPhase) {}

    /// The element this player styles, when known.
    fn element(&self) -> Option<ElementId> {
        None
    }

    /// Member players, when this is a composite.
    fn group_players(&self) -> Option<Vec<PlayerRef>> {
        None
    }
}

// ---------------------------------------------------------------------------
// NoopAnimationPlayer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NoopState {
    on_done: Vec<Callback>,
    on_start: Vec<Callback>,
    on_destroy: Vec<Callback>,
    started: bool,
    destroyed: bool,
    finished: bool,
    position: f64,
}

/// A player with no styling work: it starts, defers its completion to the
/// task queue, and replays lifecycle callbacks like any real player.
pub struct NoopAnimationPlayer {
    queue: Rc<TaskQueue>,
    total_time: f64,
    weak: Weak<NoopAnimationPlayer>,
    state: RefCell<NoopState>,
}

impl NoopAnimationPlayer {
    pub fn new(queue: Rc<TaskQueue>, duration: f64, delay: f64) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            queue,
            total_time: duration + delay,
            weak: weak.clone(),
            state: RefCell::new(NoopState::default()),
        })
    }

    fn fire_start(&self) {
        let callbacks = std::mem::take(&mut self.state.borrow_mut().on_start);
        for callback in callbacks {
            callback();
        }
    }

    fn fire_finish(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.finished {
                return;
            }
            state.finished = true;
            std::mem::take(&mut state.on_done)
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl AnimationPlayer for NoopAnimationPlayer {
    fn on_done(&self, callback: Callback) {
        self.state.borrow_mut().on_done.push(callback);
    }

    fn on_start(&self, callback: Callback) {
        self.state.borrow_mut().on_start.push(callback);
    }

    fn on_destroy(&self, callback: Callback) {
        self.state.borrow_mut().on_destroy.push(callback);
    }

    fn init(&self) {}

    fn has_started(&self) -> bool {
        self.state.borrow().started
    }

    fn play(&self) {
        if !self.has_started() {
            self.fire_start();
            // the queued task keeps the player alive until completion fires
            if let Some(player) = self.weak.upgrade() {
                self.queue
                    .schedule(Box::new(move || player.fire_finish()));
            }
        }
        self.state.borrow_mut().started = true;
    }

    fn pause(&self) {}

    fn restart(&self) {}

    fn finish(&self) {
        self.fire_finish();
    }

    fn destroy(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        if !self.has_started() {
            self.fire_start();
        }
        self.fire_finish();
        let callbacks = std::mem::take(&mut self.state.borrow_mut().on_destroy);
        for callback in callbacks {
            callback();
        }
    }

    fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.started = false;
        state.finished = false;
    }

    fn set_position(&self, position: f64) {
        self.state.borrow_mut().position = if self.total_time > 0.0 {
            position * self.total_time
        } else {
            1.0
        };
    }

    fn get_position(&self) -> f64 {
        if self.total_time > 0.0 {
            self.state.borrow().position / self.total_time
        } else {
            1.0
        }
    }

    fn total_time(&self) -> f64 {
        self.total_time
    }

    fn trigger_callback(&self, phase: PlayerPhase) {
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

// ---------------------------------------------------------------------------
// AnimationGroupPlayer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GroupState {
    on_done: Vec<Callback>,
    on_start: Vec<Callback>,
    on_destroy: Vec<Callback>,
    finished: bool,
    started: bool,
    destroyed: bool,
    done_count: usize,
    start_count: usize,
    destroy_count: usize,
}

/// Plays a set of players together; finishes when every member finished.
pub struct AnimationGroupPlayer {
    players: Vec<PlayerRef>,
    total_time: f64,
    weak: Weak<AnimationGroupPlayer>,
    state: RefCell<GroupState>,
}

impl AnimationGroupPlayer {
    pub fn new(players: Vec<PlayerRef>, queue: Rc<TaskQueue>) -> Rc<Self> {
        let total_time = players
            .iter()
            .map(|p| p.total_time())
            .fold(0.0f64, f64::max);
        let group = Rc::new_cyclic(|weak| Self {
            players,
            total_time,
            weak: weak.clone(),
            state: RefCell::new(GroupState::default()),
        });

        // member callbacks hold the group strongly; they are consumed when
        // they fire, so the reference loop unwinds once the members settle
        let total = group.players.len();
        if total == 0 {
            let g = group.clone();
            queue.schedule(Box::new(move || g.fire_finish()));
        } else {
            for player in &group.players {
                let g = group.clone();
                player.on_done(Box::new(move || {
                    let ready = {
                        let mut state = g.state.borrow_mut();
                        state.done_count += 1;
                        state.done_count == total
                    };
                    if ready {
                        g.fire_finish();
                    }
                }));
                let g = group.clone();
                player.on_destroy(Box::new(move || {
                    let ready = {
                        let mut state = g.state.borrow_mut();
                        state.destroy_count += 1;
                        state.destroy_count == total
                    };
                    if ready {
                        g.destroy();
                    }
                }));
                let g = group.clone();
                player.on_start(Box::new(move || {
                    let ready = {
                        let mut state = g.state.borrow_mut();
                        state.start_count += 1;
                        state.start_count == total
                    };
                    if ready {
                        g.fire_start();
                    }
                }));
            }
        }
        group
    }

    fn fire_start(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.started {
                return;
            }
            state.started = true;
            std::mem::take(&mut state.on_start)
        };
        for callback in callbacks {
            callback();
        }
    }

    fn fire_finish(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.finished {
                return;
            }
            state.finished = true;
            std::mem::take(&mut state.on_done)
        };
        for callback in callbacks {
            callback();
        }
    }
}

impl AnimationPlayer for AnimationGroupPlayer {
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
        for player in &self.players {
            player.init();
        }
    }

    fn has_started(&self) -> bool {
        self.state.borrow().started
    }

    fn play(&self) {
        self.init();
        self.fire_start();
        for player in &self.players {
            player.play();
        }
    }

    fn pause(&self) {
        for player in &self.players {
            player.pause();
        }
    }

    fn restart(&self) {
        for player in &self.players {
            player.restart();
        }
    }

    fn finish(&self) {
        self.fire_finish();
        for player in &self.players {
            player.finish();
        }
    }

    fn destroy(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            std::mem::take(&mut state.on_destroy)
        };
        self.fire_finish();
        for player in &self.players {
            player.destroy();
        }
        for callback in callbacks {
            callback();
        }
    }

    fn reset(&self) {
        for player in &self.players {
            player.reset();
        }
        let mut state = self.state.borrow_mut();
        state.destroyed = false;
        state.finished = false;
        state.started = false;
    }

    fn set_position(&self, position: f64) {
        let time_at_position = position * self.total_time;
        for player in &self.players {
            let player_position = if player.total_time() > 0.0 {
                (time_at_position / player.total_time()).min(1.0)
            } else {
                1.0
            };
            player.set_position(player_position);
        }
    }

    fn get_position(&self) -> f64 {
        self.players
            .iter()
            .max_by(|a, b| a.total_time().total_cmp(&b.total_time()))
            .map(|p| p.get_position())
            .unwrap_or(0.0)
    }

    fn total_time(&self) -> f64 {
        self.total_time
    }

    fn before_destroy(&self) {
        for player in &self.players {
            player.before_destroy();
        }
    }

    fn trigger_callback(&self, phase: PlayerPhase) {
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

    fn group_players(&self) -> Option<Vec<PlayerRef>> {
        Some(self.players.clone())
    }
}

/// Collapse a player list: empty lists become a deferred noop, single
/// players pass through, anything else groups.
pub fn optimize_group_player(players: Vec<PlayerRef>, queue: &Rc<TaskQueue>) -> PlayerRef {
    match players.len() {
        0 => NoopAnimationPlayer::new(queue.clone(), 0.0, 0.0),
        1 => players.into_iter().next().expect("one player"),
        _ => AnimationGroupPlayer::new(players, queue.clone()),
    }
}

/// Flatten nested group players into their leaf players.
pub fn flatten_group_players(players: &[PlayerRef]) -> Vec<PlayerRef> {
    let mut flat = Vec::new();
    for player in players {
        match player.group_players() {
            Some(members) => flat.extend(flatten_group_players(&members)),
            None => flat.push(player.clone()),
        }
    }
    flat
}

// ---------------------------------------------------------------------------
// TransitionAnimationPlayer (queueing proxy)
// ---------------------------------------------------------------------------

/// Proxy queued by `trigger()`; playback calls are no-ops until the engine
/// resolves priority and binds the real player. Callback registration is
/// buffered while queued and replayed on bind.
pub struct TransitionAnimationPlayer {
    pub namespace_id: String,
    pub trigger_name: String,
    pub element: ElementId,
    weak: Weak<TransitionAnimationPlayer>,
    inner: RefCell<PlayerRef>,
    contains_real_player: Cell<bool>,
    queued_callbacks: RefCell<Vec<(PlayerPhase, Callback)>>,
    destroyed: Cell<bool>,
    parent_player: RefCell<Option<PlayerRef>>,
    marked_for_destroy: Cell<bool>,
    disabled: Cell<bool>,
    queued: Cell<bool>,
    total_time: Cell<f64>,
}

impl TransitionAnimationPlayer {
    pub fn new(
        namespace_id: String,
        trigger_name: String,
        element: ElementId,
        queue: Rc<TaskQueue>,
    ) -> Rc<Self> {
        let inner: PlayerRef = NoopAnimationPlayer::new(queue, 0.0, 0.0);
        Rc::new_cyclic(|weak| Self {
            namespace_id,
            trigger_name,
            element,
            weak: weak.clone(),
            inner: RefCell::new(inner),
            contains_real_player: Cell::new(false),
            queued_callbacks: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
            parent_player: RefCell::new(None),
            marked_for_destroy: Cell::new(false),
            disabled: Cell::new(false),
            queued: Cell::new(true),
            total_time: Cell::new(0.0),
        })
    }

    #[inline]
    pub fn queued(&self) -> bool {
        self.queued.get()
    }

    #[inline]
    pub fn destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn mark_for_destroy(&self) {
        self.marked_for_destroy.set(true);
    }

    #[inline]
    pub fn marked_for_destroy(&self) -> bool {
        self.marked_for_destroy.get()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.set(disabled);
    }

    #[inline]
    pub fn disabled(&self) -> bool {
        self.disabled.get()
    }

    pub fn override_total_time(&self, total_time: f64) {
        self.total_time.set(total_time);
    }

    pub fn set_parent_player(&self, parent: PlayerRef) {
        *self.parent_player.borrow_mut() = Some(parent);
    }

    pub fn parent_player(&self) -> Option<PlayerRef> {
        self.parent_player.borrow().clone()
    }

    pub fn get_real_player(&self) -> PlayerRef {
        self.inner.borrow().clone()
    }

    /// Bind the real player. Idempotent-once: only the first call replays
    /// buffered callbacks, copies the total duration and clears `queued`.
    pub fn set_real_player(&self, player: PlayerRef) {
        if self.contains_real_player.get() {
            return;
        }
        for (phase, callback) in self.queued_callbacks.borrow_mut().drain(..) {
            match phase {
                PlayerPhase::Start => player.on_start(callback),
                PlayerPhase::Done => player.on_done(callback),
                PlayerPhase::Destroy => player.on_destroy(callback),
            }
        }
        *self.inner.borrow_mut() = player;
        self.contains_real_player.set(true);
        self.total_time.set(self.inner.borrow().total_time());
        self.queued.set(false);
    }

    /// Mirror another player's lifecycle onto this one: the other player's
    /// start replays this player's buffered start callbacks, its completion
    /// finishes this player, its destruction destroys it.
    pub fn sync_player_events(&self, player: PlayerRef) {
        let inner = self.get_real_player();
        player.on_start(Box::new(move || inner.trigger_callback(PlayerPhase::Start)));
        if let Some(me) = self.weak.upgrade() {
            player.on_done(Box::new(move || me.finish()));
        }
        if let Some(me) = self.weak.upgrade() {
            player.on_destroy(Box::new(move || me.destroy()));
        }
    }

    fn queue_event(&self, phase: PlayerPhase, callback: Callback) {
        self.queued_callbacks.borrow_mut().push((phase, callback));
    }
}

impl AnimationPlayer for TransitionAnimationPlayer {
    fn on_done(&self, callback: Callback) {
        if self.queued() {
            self.queue_event(PlayerPhase::Done, callback);
        } else {
            self.inner.borrow().on_done(callback);
        }
    }

    fn on_start(&self, callback: Callback) {
        if self.queued() {
            self.queue_event(PlayerPhase::Start, callback);
        } else {
            self.inner.borrow().on_start(callback);
        }
    }

    fn on_destroy(&self, callback: Callback) {
        if self.queued() {
            self.queue_event(PlayerPhase::Destroy, callback);
        } else {
            self.inner.borrow().on_destroy(callback);
        }
    }

    fn init(&self) {
        self.inner.borrow().init();
    }

    fn has_started(&self) -> bool {
        if self.queued() {
            false
        } else {
            self.inner.borrow().has_started()
        }
    }

    fn play(&self) {
        if !self.queued() {
            self.inner.borrow().play();
        }
    }

    fn pause(&self) {
        if !self.queued() {
            self.inner.borrow().pause();
        }
    }

    fn restart(&self) {
        if !self.queued() {
            self.inner.borrow().restart();
        }
    }

    fn finish(&self) {
        self.inner.borrow().finish();
    }

    fn destroy(&self) {
        if self.destroyed.replace(true) {
            // the one-shot flag is already set; the inner player guards its
            // own repeated destruction
            self.inner.borrow().destroy();
            return;
        }
        if self.queued() {
            // never bound: replay buffered callbacks through the inner noop
            // so listeners still observe the lifecycle
            let inner = self.get_real_player();
            for (phase, callback) in self.queued_callbacks.borrow_mut().drain(..) {
                match phase {
                    PlayerPhase::Start => inner.on_start(callback),
                    PlayerPhase::Done => inner.on_done(callback),
                    PlayerPhase::Destroy => inner.on_destroy(callback),
                }
            }
            self.queued.set(false);
        }
        self.inner.borrow().destroy();
    }

    fn reset(&self) {
        if !self.queued() {
            self.inner.borrow().reset();
        }
    }

    fn set_position(&self, position: f64) {
        if !self.queued() {
            self.inner.borrow().set_position(position);
        }
    }

    fn get_position(&self) -> f64 {
        if self.queued() {
            0.0
        } else {
            self.inner.borrow().get_position()
        }
    }

    fn total_time(&self) -> f64 {
        self.total_time.get()
    }

    fn before_destroy(&self) {
        self.inner.borrow().before_destroy();
    }

    fn element(&self) -> Option<ElementId> {
        Some(self.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn hits() -> (Rc<Cell<usize>>, impl Fn() -> Callback) {
        let count = Rc::new(Cell::new(0));
        let for_cb = count.clone();
        (count, move || {
            let c = for_cb.clone();
            Box::new(move || c.set(c.get() + 1)) as Callback
        })
    }

    /// it should defer noop completion to the task queue
    #[test]
    fn noop_defers_done() {
        let queue = TaskQueue::new();
        let player = NoopAnimationPlayer::new(queue.clone(), 100.0, 0.0);
        let (count, cb) = hits();
        player.on_done(cb());
        player.play();
        assert_eq!(count.get(), 0);
        queue.drain();
        assert_eq!(count.get(), 1);
    }

    /// it should replay buffered callbacks once a real player is bound
    #[test]
    fn proxy_replays_on_bind() {
        let queue = TaskQueue::new();
        let proxy = TransitionAnimationPlayer::new(
            "ns".into(),
            "t".into(),
            ElementId::default(),
            queue.clone(),
        );
        let (count, cb) = hits();
        proxy.on_done(cb());
        assert!(proxy.queued());

        let real = NoopAnimationPlayer::new(queue.clone(), 50.0, 25.0);
        proxy.set_real_player(real.clone());
        assert!(!proxy.queued());
        assert_eq!(proxy.total_time(), 75.0);

        // a second bind is ignored
        let other = NoopAnimationPlayer::new(queue.clone(), 999.0, 0.0);
        proxy.set_real_player(other);
        assert_eq!(proxy.total_time(), 75.0);

        proxy.play();
        queue.drain();
        assert_eq!(count.get(), 1);
    }

    /// it should fire destroy-phase callbacks when a queued proxy dies
    #[test]
    fn queued_proxy_destroy_fires_callbacks() {
        let queue = TaskQueue::new();
        let proxy = TransitionAnimationPlayer::new(
            "ns".into(),
            "t".into(),
            ElementId::default(),
            queue.clone(),
        );
        let (count, cb) = hits();
        proxy.on_start(cb());
        proxy.on_done(cb());
        proxy.on_destroy(cb());
        proxy.destroy();
        assert!(proxy.destroyed());
        assert_eq!(count.get(), 3);
        // safe to call repeatedly
        proxy.destroy();
        assert_eq!(count.get(), 3);
    }

    /// it should finish a group only after every member finished
    #[test]
    fn group_waits_for_members() {
        let queue = TaskQueue::new();
        let a = NoopAnimationPlayer::new(queue.clone(), 100.0, 0.0);
        let b = NoopAnimationPlayer::new(queue.clone(), 300.0, 0.0);
        let group = AnimationGroupPlayer::new(vec![a.clone(), b.clone()], queue.clone());
        assert_eq!(group.total_time(), 300.0);

        let (count, cb) = hits();
        group.on_done(cb());
        a.finish();
        assert_eq!(count.get(), 0);
        b.finish();
        assert_eq!(count.get(), 1);
    }
}
