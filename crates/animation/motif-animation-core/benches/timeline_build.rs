use criterion::{black_box, criterion_group, criterion_main, Criterion};

use motif_animation_core::builders::{animate, query, sequence, stagger, style};
use motif_animation_core::{
    build_keyframes, AnimationDriver, AnimationOptions, StyleMap, StyleValue,
};
use motif_test_fixtures::MockHost;

fn timeline_build(c: &mut Criterion) {
    let host = MockHost::new();
    let root = host.create_root("ul");
    for _ in 0..20 {
        let item = host.create_element("li");
        host.add_class(item, "item");
        host.append_child(root, item);
    }

    let ast = sequence(vec![
        style(vec![("opacity", StyleValue::Num(0.0))]),
        animate(250.0, style(vec![("opacity", StyleValue::Num(1.0))])),
        query(
            ".item",
            stagger(
                50.0,
                animate(300.0, style(vec![("width", "100px")])),
            ),
        ),
    ]);

    c.bench_function("build_keyframes_20_items", |b| {
        b.iter(|| {
            let mut errors = Vec::new();
            let instructions = build_keyframes(
                &host,
                root,
                black_box(&ast),
                "anim-enter0",
                "anim-leave0",
                &StyleMap::new(),
                &StyleMap::new(),
                &AnimationOptions::default(),
                None,
                &mut errors,
            );
            assert!(errors.is_empty());
            black_box(instructions)
        })
    });
}

criterion_group!(benches, timeline_build);
criterion_main!(benches);
