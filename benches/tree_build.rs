use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use property_inspector::reflection::{PropertyKind, PropertySpec, ScalarKind, TypeBuilder, TypeRegistry};
use property_inspector::tree::EditorContext;
use property_inspector::{InspectorConfig, ObjectRef, ObjectWorld, PropertyTree};
use std::sync::Arc;

fn world() -> Arc<ObjectWorld> {
    let mut registry = TypeRegistry::new();
    TypeBuilder::structure("Vector")
        .property(PropertySpec::scalar("X", ScalarKind::Float))
        .property(PropertySpec::scalar("Y", ScalarKind::Float))
        .property(PropertySpec::scalar("Z", ScalarKind::Float))
        .register(&mut registry)
        .unwrap();

    let mut actor = TypeBuilder::class("Actor");
    for i in 0..32 {
        let category = format!("Group{}.Sub{}", i % 4, i % 3);
        actor = actor
            .property(PropertySpec::scalar(format!("Value{i}"), ScalarKind::Int).category(category.clone()))
            .property(PropertySpec::structure(format!("Offset{i}"), "Vector").category(category));
    }
    actor
        .property(
            PropertySpec::array(
                "Points",
                PropertyKind::Struct {
                    type_name: "Vector".to_string(),
                },
            )
            .category("Group0"),
        )
        .register(&mut registry)
        .unwrap();

    Arc::new(ObjectWorld::new(registry))
}

fn spawn(world: &ObjectWorld, count: usize) -> Vec<ObjectRef> {
    (0..count)
        .map(|i| {
            let object = world.spawn("Actor", format!("Actor_{i}")).unwrap();
            world.set_array_len(object, "Points", 16).unwrap();
            object
        })
        .collect()
}

fn bench_bind(c: &mut Criterion) {
    let world = world();
    let mut group = c.benchmark_group("bind");

    for count in [1, 8, 64] {
        let objects = spawn(&world, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &objects, |b, objects| {
            let ctx = EditorContext::in_memory(Arc::clone(&world), InspectorConfig::default());
            let mut tree = PropertyTree::new(ctx);
            b.iter(|| {
                tree.bind(black_box(objects));
                black_box(tree.visible_nodes().len())
            });
        });
    }

    group.finish();
}

fn bench_filter_and_tick(c: &mut Criterion) {
    let world = world();
    let objects = spawn(&world, 8);
    let ctx = EditorContext::in_memory(Arc::clone(&world), InspectorConfig::default());
    let mut tree = PropertyTree::new(ctx);
    tree.bind(&objects);
    tree.expand_all();

    c.bench_function("filter", |b| {
        b.iter(|| {
            tree.set_filter_text(black_box("offset y"));
            tree.set_filter_text("");
        });
    });

    c.bench_function("tick_unchanged", |b| {
        b.iter(|| black_box(tree.tick()));
    });
}

criterion_group!(benches, bench_bind, bench_filter_and_tick);
criterion_main!(benches);
