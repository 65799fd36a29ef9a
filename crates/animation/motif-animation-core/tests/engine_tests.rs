use std::cell::{Cell, RefCell};
use std::rc::Rc;

use motif_animation_core::builders::{
    animate, query, state, state_with_params, style, transition, trigger,
};
use motif_animation_core::{
    AnimationDriver, AnimationError, AnimationTrigger, ElementId, NoopStyleNormalizer, StyleValue,
    TaskQueue, TransitionAnimationEngine, TriggerValue,
};
use motif_test_fixtures::MockHost;

struct Rig {
    host: Rc<MockHost>,
    queue: Rc<TaskQueue>,
    engine: TransitionAnimationEngine,
    root: ElementId,
    comp: ElementId,
    el: ElementId,
}

fn rig() -> Rig {
    let host = MockHost::new_rc();
    let root = host.create_root("body");
    let comp = host.create_element("app");
    host.append_child(root, comp);
    let el = host.create_element("div");
    host.append_child(comp, el);

    let queue = TaskQueue::new();
    let engine = TransitionAnimationEngine::new(
        host.clone(),
        Rc::new(NoopStyleNormalizer),
        queue.clone(),
        root,
    );
    Rig {
        host,
        queue,
        engine,
        root,
        comp,
        el,
    }
}

fn fade_trigger() -> AnimationTrigger {
    trigger(
        "fade",
        vec![
            state("a", style(vec![("opacity", StyleValue::Num(0.0))])),
            state("b", style(vec![("opacity", StyleValue::Num(1.0))])),
            transition(
                "a => b",
                vec![animate(
                    500.0,
                    style(vec![("opacity", StyleValue::Num(1.0))]),
                )],
            ),
        ],
    )
    .expect("valid trigger")
}

/// it should run a matched transition through the driver and settle final styles
#[test]
fn matched_transition_builds_a_real_player() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    r.engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap();

    // void => a has no matching transition: fallback, style-only
    assert!(r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap());
    r.engine.flush(1).unwrap();
    r.queue.drain();
    assert_eq!(r.host.animate_calls().len(), 0);
    assert_eq!(r.host.inline_style(r.el, "opacity").as_deref(), Some("0"));

    // a => b matches and animates
    assert!(r.engine.trigger("ns1", r.el, "fade", "b".into()).unwrap());
    r.engine.flush(2).unwrap();
    let calls = r.host.animate_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].element, r.el);
    assert_eq!(calls[0].duration, 500.0);
    // origin state styles were erased before playback
    assert_eq!(r.host.inline_style(r.el, "opacity"), None);
    assert!(r.host.has_class(r.el, "anim-animating"));

    // completion settles the destination styles and cleans up
    r.host.finish_all_players();
    r.queue.drain();
    assert_eq!(r.host.inline_style(r.el, "opacity").as_deref(), Some("1"));
    assert!(!r.host.has_class(r.el, "anim-animating"));
    assert!(r.engine.players().is_empty());
}

/// it should treat a repeated trigger call with identical value and params as a no-op
#[test]
fn identical_trigger_value_is_a_noop() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    r.engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap();

    assert!(r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap());
    assert!(!r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap());
}

/// it should destroy the first queued player when a second activation lands before flush
#[test]
fn second_activation_supersedes_queued_player() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    let t = trigger(
        "fade",
        vec![transition(
            "* => *",
            vec![animate(
                200.0,
                style(vec![("opacity", StyleValue::Num(1.0))]),
            )],
        )],
    )
    .unwrap();
    r.engine.register_trigger("ns1", "fade", t).unwrap();

    assert!(r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap());
    assert!(r.engine.trigger("ns1", r.el, "fade", "b".into()).unwrap());
    r.engine.flush(1).unwrap();

    // only the second activation survived the drain
    assert_eq!(r.host.animate_calls().len(), 1);
}

/// it should fire start and done listeners with the transition payload
#[test]
fn listeners_observe_the_transition() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    r.engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap();

    let events: Rc<RefCell<Vec<(String, String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    for phase in ["start", "done"] {
        let log = events.clone();
        let tag = phase.to_string();
        r.engine
            .listen(
                "ns1",
                r.el,
                "fade",
                phase,
                Box::new(move |event| {
                    log.borrow_mut().push((
                        tag.clone(),
                        event.from_state.clone(),
                        event.to_state.clone(),
                    ));
                }),
            )
            .unwrap();
    }

    r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap();
    r.engine.flush(1).unwrap();
    r.queue.drain();
    events.borrow_mut().clear();

    r.engine.trigger("ns1", r.el, "fade", "b".into()).unwrap();
    r.engine.flush(2).unwrap();
    assert_eq!(
        events.borrow().as_slice(),
        &[("start".to_string(), "a".to_string(), "b".to_string())]
    );
    r.host.finish_all_players();
    assert_eq!(
        events.borrow().as_slice(),
        &[
            ("start".to_string(), "a".to_string(), "b".to_string()),
            ("done".to_string(), "a".to_string(), "b".to_string()),
        ]
    );
}

/// it should reject unknown listener phases and unregistered triggers eagerly
#[test]
fn listener_usage_faults() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    r.engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap();

    let err = r
        .engine
        .listen("ns1", r.el, "fade", "midway", Box::new(|_| {}))
        .unwrap_err();
    assert!(matches!(
        err,
        AnimationError::UnsupportedTriggerEvent { .. }
    ));

    let err = r
        .engine
        .listen("ns1", r.el, "missing", "start", Box::new(|_| {}))
        .unwrap_err();
    assert!(matches!(err, AnimationError::UnregisteredTrigger { .. }));

    let err = r
        .engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap_err();
    assert!(matches!(err, AnimationError::DuplicateTrigger { .. }));
}

/// it should drop an element from the pending-removal set when it is reinserted before flush
#[test]
fn reinsert_before_flush_cancels_removal() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    r.engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap();
    let host_trigger = trigger("host", vec![]).unwrap();
    r.engine
        .register_trigger("ns1", "host", host_trigger)
        .unwrap();
    // give the ancestor trigger state so the removal defers
    r.engine
        .listen("ns1", r.comp, "host", "start", Box::new(|_| {}))
        .unwrap();

    let removed = Rc::new(Cell::new(false));
    let removed_flag = removed.clone();
    r.engine
        .set_on_removal_complete(Box::new(move |_, _| removed_flag.set(true)));

    r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap();
    r.engine.flush(1).unwrap();
    r.queue.drain();

    r.engine.remove_node(Some("ns1"), r.el, None);
    assert!(!removed.get());
    r.engine
        .insert_node(Some("ns1"), r.el, Some(r.comp), true);
    r.engine.flush(2).unwrap();
    r.queue.drain();
    assert!(!removed.get());
}

/// it should defer detachment until the leave animation finishes
#[test]
fn leave_animation_defers_detachment() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    let t = trigger(
        "slide",
        vec![transition(
            ":leave",
            vec![animate(
                300.0,
                style(vec![("opacity", StyleValue::Num(0.0))]),
            )],
        )],
    )
    .unwrap();
    r.engine.register_trigger("ns1", "slide", t).unwrap();

    let removed = Rc::new(Cell::new(false));
    let removed_flag = removed.clone();
    let host_for_removal = r.host.clone();
    r.engine
        .set_on_removal_complete(Box::new(move |element, _| {
            host_for_removal.detach(element);
            removed_flag.set(true);
        }));

    r.engine.trigger("ns1", r.el, "slide", "a".into()).unwrap();
    r.engine.flush(1).unwrap();
    r.queue.drain();

    r.engine.remove_node(Some("ns1"), r.el, None);
    assert!(!removed.get());
    r.engine.flush(2).unwrap();

    // the leave animation is running; detachment is still pending
    assert_eq!(r.host.animate_calls().len(), 1);
    assert_eq!(r.host.animate_calls()[0].duration, 300.0);
    assert!(!removed.get());

    r.host.finish_all_players();
    r.queue.drain();
    assert!(removed.get());
    assert!(!r.host.contains_element(r.root, r.el));
}

/// it should still fire leave listeners when the removal resolves without a matching transition
#[test]
fn leave_listeners_fire_for_fallback_removal() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    r.engine
        .register_trigger("ns1", "fade", fade_trigger())
        .unwrap();

    let events: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    for phase in ["start", "done"] {
        let log = events.clone();
        let tag = phase.to_string();
        r.engine
            .listen(
                "ns1",
                r.el,
                "fade",
                phase,
                Box::new(move |event| {
                    log.borrow_mut().push((tag.clone(), event.to_state.clone()));
                }),
            )
            .unwrap();
    }

    let removed = Rc::new(Cell::new(false));
    let removed_flag = removed.clone();
    r.engine
        .set_on_removal_complete(Box::new(move |_, _| removed_flag.set(true)));

    r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap();
    r.engine.flush(1).unwrap();
    r.queue.drain();
    events.borrow_mut().clear();

    // a => void matches nothing; removal completes immediately but the
    // queued fallback still replays the listener lifecycle
    r.engine.remove_node(Some("ns1"), r.el, None);
    assert!(removed.get());
    r.engine.flush(2).unwrap();
    r.queue.drain();

    let seen = events.borrow().clone();
    assert!(seen.contains(&("start".to_string(), "void".to_string())));
    assert!(seen.contains(&("done".to_string(), "void".to_string())));
}

/// it should tag freshly inserted elements so :enter queries can claim them
#[test]
fn enter_query_claims_inserted_elements() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    let t = trigger(
        "list",
        vec![transition(
            "* => go",
            vec![query(
                ":enter",
                animate(400.0, style(vec![("opacity", StyleValue::Num(1.0))])),
            )],
        )],
    )
    .unwrap();
    r.engine.register_trigger("ns1", "list", t).unwrap();

    let item = r.host.create_element("li");
    r.host.append_child(r.comp, item);
    r.engine.insert_node(Some("ns1"), item, Some(r.comp), true);

    r.engine.trigger("ns1", r.comp, "list", "go".into()).unwrap();
    r.engine.flush(1).unwrap();

    let calls = r.host.animate_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].element, item);
    assert_eq!(calls[0].duration, 400.0);
    // per-pass marker classes are cleaned up again
    assert!(!r.host.has_class(item, "anim-enter0"));
}

/// it should skip styling entirely inside disabled subtrees
#[test]
fn disabled_subtree_skips_playback() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    let t = trigger(
        "fade",
        vec![transition(
            "* => *",
            vec![animate(
                200.0,
                style(vec![("opacity", StyleValue::Num(1.0))]),
            )],
        )],
    )
    .unwrap();
    r.engine.register_trigger("ns1", "fade", t).unwrap();

    r.engine.shared().mark_element_as_disabled(r.comp, true);
    r.engine.trigger("ns1", r.el, "fade", "a".into()).unwrap();
    r.engine.flush(1).unwrap();
    r.queue.drain();

    assert_eq!(r.host.animate_calls().len(), 0);
}

/// it should apply the new state styles when only params change
#[test]
fn param_only_change_restyles_without_a_player() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    let mut defaults = motif_animation_core::ParamMap::new();
    defaults.insert("w".to_string(), StyleValue::Num(0.0));
    let t = trigger(
        "size",
        vec![state_with_params(
            "s",
            style(vec![("width", "{{w}}px")]),
            defaults,
        )],
    )
    .unwrap();
    r.engine.register_trigger("ns1", "size", t).unwrap();

    let mut params = motif_animation_core::ParamMap::new();
    params.insert("w".to_string(), StyleValue::Num(10.0));
    assert!(r
        .engine
        .trigger(
            "ns1",
            r.el,
            "size",
            TriggerValue::WithParams {
                value: "s".to_string(),
                params,
            },
        )
        .unwrap());
    r.engine.flush(1).unwrap();
    r.queue.drain();
    assert_eq!(r.host.inline_style(r.el, "width").as_deref(), Some("10px"));

    let mut params = motif_animation_core::ParamMap::new();
    params.insert("w".to_string(), StyleValue::Num(20.0));
    assert!(!r
        .engine
        .trigger(
            "ns1",
            r.el,
            "size",
            TriggerValue::WithParams {
                value: "s".to_string(),
                params,
            },
        )
        .unwrap());
    r.engine.flush(2).unwrap();
    r.queue.drain();
    assert_eq!(r.host.inline_style(r.el, "width").as_deref(), Some("20px"));
}

/// it should batch build failures into one error and destroy the pass's players
#[test]
fn failing_flush_reports_every_trigger() {
    let mut r = rig();
    r.engine.register("ns1", r.comp);
    let t = trigger(
        "go",
        vec![transition(
            "a => b",
            vec![query(
                ".missing",
                animate(100.0, style(vec![("opacity", StyleValue::Num(0.0))])),
            )],
        )],
    )
    .unwrap();
    r.engine.register_trigger("ns1", "go", t).unwrap();

    r.engine.trigger("ns1", r.el, "go", "a".into()).unwrap();
    r.engine.flush(1).unwrap();
    r.queue.drain();

    r.engine.trigger("ns1", r.el, "go", "b".into()).unwrap();
    let err = r.engine.flush(2).unwrap_err();
    match err {
        AnimationError::FlushFailed { errors } => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(
                &errors[0],
                AnimationError::TransitionFailed { trigger, .. } if trigger == "go"
            ));
        }
        other => panic!("expected FlushFailed, got {other:?}"),
    }
    assert_eq!(r.host.animate_calls().len(), 0);
}

/// it should resolve when_rendering_done on the next drain when idle
#[test]
fn when_rendering_done_while_idle() {
    let r = rig();
    let called = Rc::new(Cell::new(false));
    let flag = called.clone();
    r.engine
        .when_rendering_done(Box::new(move || flag.set(true)));
    assert!(!called.get());
    r.queue.drain();
    assert!(called.get());
}
