use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use smpv_core::{
    stack, ActorPower, BinnedTurn, ChartKey, LinkParams, PowerHistory, SampleSpec, SimulationData,
    SmpStore,
};
use smpv_schema::{ActorId, DimensionId, HslColor};

fn synthetic_turn(actors: i64) -> (Vec<ChartKey>, Vec<ActorPower>) {
    let keys = (0..actors)
        .map(|id| ChartKey {
            actor: ActorId(id),
            label: format!("Actor {id}"),
            color: HslColor::from_power((id % 50) as f64, 50.0),
        })
        .collect();
    let samples = (0..actors)
        .map(|id| ActorPower {
            actor: ActorId(id),
            power: Some(10.0 + (id % 7) as f64),
            position: Some(((id * 37) % 100) as f64),
        })
        .collect();
    (keys, samples)
}

fn bench_bin_and_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_and_stack");

    for actors in [16i64, 128, 1024] {
        let (keys, samples) = synthetic_turn(actors);
        let order: Vec<ActorId> = keys.iter().map(|key| key.actor).collect();
        group.bench_with_input(BenchmarkId::new("actors", actors), &actors, |b, _| {
            b.iter(|| {
                let binned = BinnedTurn::bin(0, keys.clone(), &samples);
                stack(&binned, &order)
            });
        });
    }

    group.finish();
}

fn bench_power_history(c: &mut Criterion) {
    let spec = SampleSpec {
        actors: 40,
        turns: 30,
        ..SampleSpec::default()
    };
    let store = SmpStore::open_memory().expect("memory store");
    smpv_core::write_sample(&store, &spec).expect("sample data");
    let data = SimulationData::open_default(
        store,
        Some(spec.scenario.clone()),
        DimensionId(0),
        LinkParams::default(),
    )
    .expect("simulation data");

    let power = data
        .store()
        .effective_power_history(data.scope())
        .expect("power rows");
    let positions = data
        .store()
        .position_history(data.scope())
        .expect("position rows");

    c.bench_function("power_history_from_rows", |b| {
        b.iter(|| PowerHistory::from_rows(&power, &positions).highest_range());
    });
    c.bench_function("power_history_query", |b| {
        b.iter(|| data.power_history().expect("history").highest_range());
    });
}

criterion_group!(binning_benches, bench_bin_and_stack, bench_power_history);
criterion_main!(binning_benches);
