use std::collections::HashMap;

use motif_animation_core::builders::{
    animate, animate_empty, animate_keyframes, group, query, sequence, stagger, style, style_map,
    with_offset,
};
use motif_animation_core::{
    build_keyframes, AnimationDriver, AnimationError, AnimationNode, AnimationOptions, ElementId,
    StyleMap, StyleValue, TimelineInstruction,
};
use motif_test_fixtures::MockHost;
use pretty_assertions::assert_eq;

fn compile(
    host: &MockHost,
    root: ElementId,
    ast: &AnimationNode,
    starting: StyleMap,
    finals: StyleMap,
) -> (Vec<TimelineInstruction>, Vec<AnimationError>) {
    let mut errors = Vec::new();
    let instructions = build_keyframes(
        host,
        root,
        ast,
        "anim-enter0",
        "anim-leave0",
        &starting,
        &finals,
        &AnimationOptions::default(),
        None,
        &mut errors,
    );
    (instructions, errors)
}

fn offsets(instruction: &TimelineInstruction) -> Vec<f64> {
    instruction.keyframes.iter().map(|k| k.offset).collect()
}

/// it should compile a style+animate sequence into a single two-keyframe instruction
#[test]
fn sequence_style_then_animate() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = sequence(vec![
        style(vec![("opacity", StyleValue::Num(0.0))]),
        animate(1000.0, style(vec![("opacity", StyleValue::Num(1.0))])),
    ]);

    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 1);

    let instruction = &instructions[0];
    assert_eq!(instruction.element, root);
    assert_eq!(instruction.duration, 1000.0);
    assert_eq!(instruction.delay, 0.0);
    assert_eq!(offsets(instruction), vec![0.0, 1.0]);
    assert_eq!(
        instruction.keyframes[0].styles["opacity"],
        StyleValue::Num(0.0)
    );
    assert_eq!(
        instruction.keyframes[1].styles["opacity"],
        StyleValue::Num(1.0)
    );
}

/// it should emit one zero-duration instruction when nothing animates
#[test]
fn static_fallback_instruction() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = sequence(vec![]);
    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].duration, 0.0);
    assert!(instructions[0].keyframes.is_empty());
}

/// it should run group children in parallel, each normalized to its own duration
#[test]
fn group_children_keep_their_own_duration() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = group(vec![
        animate("1s", style(vec![("width", "100px")])),
        animate("2s", style(vec![("height", "50px")])),
    ]);

    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 2);

    let total = instructions
        .iter()
        .map(|i| i.duration + i.delay)
        .fold(0.0f64, f64::max);
    assert_eq!(total, 2000.0);

    for instruction in &instructions {
        assert_eq!(offsets(instruction), vec![0.0, 1.0]);
    }
    assert_eq!(instructions[0].duration, 1000.0);
    assert_eq!(instructions[1].duration, 2000.0);
}

/// it should back-fill a late property into every earlier keyframe
#[test]
fn back_fill_reaches_earlier_keyframes() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = sequence(vec![
        style(vec![("opacity", StyleValue::Num(0.0))]),
        animate(1000.0, style(vec![("opacity", StyleValue::Num(1.0))])),
        animate(500.0, style(vec![("width", "100px")])),
    ]);

    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 1);

    let instruction = &instructions[0];
    assert_eq!(instruction.duration, 1500.0);
    // width was first written at 1500ms, yet the earlier keyframes carry its
    // back-filled placeholder
    assert_eq!(instruction.keyframes[0].styles["width"], StyleValue::Auto);
    assert_eq!(instruction.keyframes[1].styles["width"], StyleValue::Auto);
    assert_eq!(
        instruction.keyframes[2].styles["width"],
        StyleValue::Str("100px".into())
    );
    // opacity carries forward into the final keyframe
    assert_eq!(
        instruction.keyframes[2].styles["opacity"],
        StyleValue::Num(1.0)
    );
    assert_eq!(instruction.post_style_props, vec!["width".to_string()]);
}

/// it should scale inner keyframe offsets by their fraction of the animate duration
#[test]
fn keyframes_offsets_preserved() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = animate_keyframes(
        "1s",
        vec![
            with_offset(style(vec![("height", "0px")]), 0.0),
            with_offset(style(vec![("height", "100px")]), 0.5),
            with_offset(style(vec![("height", "50px")]), 1.0),
        ],
    );

    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].duration, 1000.0);
    assert_eq!(offsets(&instructions[0]), vec![0.0, 0.5, 1.0]);
}

/// it should generate evenly spaced offsets when keyframes declare none
#[test]
fn keyframes_generated_offsets() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = animate_keyframes(
        "900ms",
        vec![
            style(vec![("opacity", StyleValue::Num(0.0))]),
            style(vec![("opacity", StyleValue::Num(0.2))]),
            style(vec![("opacity", StyleValue::Num(1.0))]),
        ],
    );

    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(offsets(&instructions[0]), vec![0.0, 0.5, 1.0]);
}

/// it should reject partially offset keyframes through the error list
#[test]
fn keyframes_partial_offsets_error() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = animate_keyframes(
        "1s",
        vec![
            with_offset(style(vec![("opacity", StyleValue::Num(0.0))]), 0.0),
            style(vec![("opacity", StyleValue::Num(1.0))]),
        ],
    );
    let (_, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnimationError::PartialKeyframeOffsets)));
}

/// it should error into the shared list when a required query matches nothing
#[test]
fn required_query_zero_matches() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = query(
        ".missing",
        animate(300.0, style(vec![("opacity", StyleValue::Num(0.0))])),
    );
    let (_, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert_eq!(
        errors,
        vec![AnimationError::InvalidQuery {
            selector: ".missing".into()
        }]
    );
}

/// it should compile one instruction per matched element with reversed stagger delays
#[test]
fn query_with_reverse_stagger() {
    let host = MockHost::new();
    let root = host.create_root("ul");
    let mut items = Vec::new();
    for _ in 0..3 {
        let item = host.create_element("li");
        host.add_class(item, "item");
        host.append_child(root, item);
        items.push(item);
    }

    let ast = query(
        ".item",
        stagger(
            -100.0,
            animate(500.0, style(vec![("opacity", StyleValue::Num(1.0))])),
        ),
    );
    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 3);

    let delays: Vec<f64> = items
        .iter()
        .map(|item| {
            instructions
                .iter()
                .find(|i| i.element == *item)
                .expect("instruction per item")
                .delay
        })
        .collect();
    assert_eq!(delays, vec![200.0, 100.0, 0.0]);
    for instruction in &instructions {
        assert_eq!(instruction.duration, 500.0);
    }
}

/// it should respect a negative query limit as a tail slice
#[test]
fn query_negative_limit() {
    let host = MockHost::new();
    let root = host.create_root("ul");
    let mut items = Vec::new();
    for _ in 0..4 {
        let item = host.create_element("li");
        host.add_class(item, "item");
        host.append_child(root, item);
        items.push(item);
    }

    let ast = motif_animation_core::builders::query_full(
        ".item",
        animate(100.0, style(vec![("opacity", StyleValue::Num(0.0))])),
        false,
        -2,
        None,
    );
    let (instructions, errors) = compile(&host, root, &ast, StyleMap::new(), StyleMap::new());
    assert!(errors.is_empty());
    let compiled: Vec<ElementId> = instructions.iter().map(|i| i.element).collect();
    assert_eq!(compiled, items[2..].to_vec());
}

/// it should apply destination state styles when the final step is empty
#[test]
fn final_styles_layer_onto_empty_step() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = animate_empty(400.0);

    let finals = style_map(vec![("opacity", StyleValue::Num(1.0))]);
    let starting = style_map(vec![("opacity", StyleValue::Num(0.0))]);
    let (instructions, errors) = compile(&host, root, &ast, starting, finals);
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 1);
    let last = instructions[0].keyframes.last().expect("final keyframe");
    assert_eq!(last.styles["opacity"], StyleValue::Num(1.0));
    assert_eq!(
        instructions[0].keyframes[0].styles["opacity"],
        StyleValue::Num(0.0)
    );
}

/// it should splice pre-built child instructions and stretch their delayed start
#[test]
fn animate_child_splices_with_stretched_start() {
    use motif_animation_core::builders::animate_child;
    use motif_animation_core::{ElementInstructionMap, Keyframe};

    let host = MockHost::new();
    let root = host.create_root("div");
    let child = host.create_element("span");
    host.add_class(child, "child");
    host.append_child(root, child);

    // a child animation compiled earlier in the pass: 1s keyframes behind a
    // 1s delay, flagged for start-keyframe stretching
    let kf = |offset: f64, opacity: f64| {
        Keyframe::new(
            style_map(vec![("opacity", StyleValue::Num(opacity))]),
            offset,
            None,
        )
    };
    let mut child_instruction = TimelineInstruction::new(
        child,
        vec![kf(0.0, 0.0), kf(1.0, 1.0)],
        Vec::new(),
        Vec::new(),
        1000.0,
        1000.0,
        None,
        false,
    );
    child_instruction.stretch_start_keyframe = true;
    let mut subs = ElementInstructionMap::new();
    subs.append(child, vec![child_instruction]);

    let ast = query(".child", animate_child(None));
    let mut errors = Vec::new();
    let instructions = build_keyframes(
        &host,
        root,
        &ast,
        "anim-enter0",
        "anim-leave0",
        &StyleMap::new(),
        &StyleMap::new(),
        &AnimationOptions::default(),
        Some(&subs),
        &mut errors,
    );
    assert!(errors.is_empty());
    assert_eq!(instructions.len(), 1);

    let spliced = &instructions[0];
    assert!(spliced.is_sub_timeline);
    assert_eq!(spliced.element, child);
    // the delay folded into the keyframes as a leading gap
    assert_eq!(spliced.duration, 2000.0);
    assert_eq!(spliced.delay, 0.0);
    assert_eq!(offsets(spliced), vec![0.0, 0.5, 1.0]);
    assert_eq!(
        spliced.keyframes[1].styles["opacity"],
        StyleValue::Num(0.0)
    );
}

/// it should resolve timing params supplied through animation options
#[test]
fn dynamic_timings_resolve_from_params() {
    let host = MockHost::new();
    let root = host.create_root("div");
    let ast = animate("{{ms}}ms", style(vec![("opacity", StyleValue::Num(1.0))]));

    let mut params = HashMap::new();
    params.insert("ms".to_string(), StyleValue::Num(750.0));
    let options = AnimationOptions {
        duration: None,
        delay: None,
        params: Some(params),
    };
    let mut errors = Vec::new();
    let instructions = build_keyframes(
        &host,
        root,
        &ast,
        "anim-enter0",
        "anim-leave0",
        &StyleMap::new(),
        &StyleMap::new(),
        &options,
        None,
        &mut errors,
    );
    assert!(errors.is_empty());
    assert_eq!(instructions[0].duration, 750.0);
}
