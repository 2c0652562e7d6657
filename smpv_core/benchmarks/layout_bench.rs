use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use smpv_core::{
    config::ViewerConfig, ForceLayout, GraphRenderer, LayoutConfig, LinkParams, SampleSpec,
    SimulationData, SmpStore,
};
use smpv_schema::{ActorId, BargainId, DimensionId, NodeId};

/// Star of bargains around a ring of actors, roughly the shape a real turn has.
fn build_layout(actors: i64) -> ForceLayout {
    let config = ViewerConfig::builtin();
    let mut layout = ForceLayout::new(LayoutConfig::from_graph_config(&config.graph), 7);
    for id in 0..actors {
        layout.add_node(NodeId::Actor(ActorId(id)));
    }
    for id in 0..actors {
        let bargain = NodeId::Bargain(BargainId(id));
        layout.add_node(bargain);
        layout.add_link(NodeId::Actor(ActorId(id)), bargain, 2.0, 50.0);
        layout.add_link(bargain, NodeId::Actor(ActorId((id + 1) % actors)), 2.0, 50.0);
    }
    layout
}

fn bench_layout_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_settle");
    group.sample_size(20);

    for actors in [8i64, 32, 96] {
        group.bench_with_input(BenchmarkId::new("ring", actors), &actors, |b, &actors| {
            b.iter_batched(
                || build_layout(actors),
                |mut layout| layout.settle(),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_graph_turn(c: &mut Criterion) {
    let config = ViewerConfig::builtin();
    let spec = SampleSpec {
        actors: 24,
        ..SampleSpec::default()
    };
    let store = SmpStore::open_memory().expect("memory store");
    smpv_core::write_sample(&store, &spec).expect("sample data");
    let mut data = SimulationData::open_default(
        store,
        Some(spec.scenario.clone()),
        DimensionId(0),
        LinkParams::from_graph_config(&config.graph),
    )
    .expect("simulation data");
    let snapshot = data.load_turn(spec.turns - 1).expect("last turn");

    c.bench_function("graph_turn_render", |b| {
        b.iter_batched(
            || GraphRenderer::new(&snapshot, &config.graph),
            |mut graph| {
                graph.settle().expect("active graph");
                graph.render_svg().expect("active graph")
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(layout_benches, bench_layout_settle, bench_graph_turn);
criterion_main!(layout_benches);
