//! Deterministic synthetic SMP databases for demos, benches and tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use smpv_schema::{ActorId, BargainId, DimensionId, ScenarioId, Turn};
use tracing::info;

use crate::{
    error::Result,
    store::{BargainRecord, SmpStore, ViewScope},
};

const ACTOR_NAMES: &[&str] = &[
    "Business",
    "Labor",
    "Farmers",
    "Military",
    "Clergy",
    "Students",
    "Press",
    "Opposition",
    "Gov't Party",
    "U.N.",
    "Exporters",
    "Bankers",
    "Unions",
    "Regions",
    "Courts",
    "Media",
];

const DIMENSION_NAMES: &[&str] = &["Tax Policy", "Trade", "Security", "Reform"];

#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub scenario: ScenarioId,
    pub actors: usize,
    /// Number of turns; the last turn index is `turns - 1`.
    pub turns: Turn,
    pub dimensions: u32,
    pub seed: u64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            scenario: ScenarioId::new("sample"),
            actors: 12,
            turns: 8,
            dimensions: 2,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleStats {
    pub actors: usize,
    pub turns: Turn,
    pub bargains: usize,
    pub self_bargains: usize,
}

fn actor_name(index: usize) -> String {
    match ACTOR_NAMES.get(index) {
        Some(name) => (*name).to_string(),
        None => format!("Actor {index}"),
    }
}

/// Writes one scenario into `store`. Capability is recorded on turn 0 and
/// then only every third turn; positions drift towards the mean.
pub fn write_sample(store: &SmpStore, spec: &SampleSpec) -> Result<SampleStats> {
    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    let scenario = &spec.scenario;
    let tx = store.connection().unchecked_transaction()?;

    store.insert_scenario(scenario, scenario.as_str(), "synthetic bargaining scenario")?;
    for dim in 0..spec.dimensions {
        let name = DIMENSION_NAMES
            .get(dim as usize)
            .copied()
            .unwrap_or("Dimension");
        store.insert_dimension(scenario, DimensionId(dim), name)?;
    }
    for index in 0..spec.actors {
        store.insert_actor(scenario, ActorId(index as i64), &actor_name(index), "")?;
    }

    let mut capability: Vec<f64> = (0..spec.actors)
        .map(|_| rng.gen_range(20.0..100.0))
        .collect();
    let mut positions: Vec<Vec<f64>> = (0..spec.dimensions)
        .map(|_| (0..spec.actors).map(|_| rng.gen_range(0.0..100.0)).collect())
        .collect();

    let mut stats = SampleStats {
        actors: spec.actors,
        turns: spec.turns,
        bargains: 0,
        self_bargains: 0,
    };
    let mut next_bargain = 1i64;

    for turn in 0..spec.turns {
        if turn % 3 == 0 {
            for (index, cap) in capability.iter_mut().enumerate() {
                if turn > 0 {
                    *cap = (*cap * rng.gen_range(0.9..1.1)).clamp(5.0, 120.0);
                }
                store.insert_capability(scenario, turn, ActorId(index as i64), *cap)?;
            }
        }

        for (dim, dim_positions) in positions.iter_mut().enumerate() {
            let scope = ViewScope::new(scenario.clone(), DimensionId(dim as u32));
            let mean = dim_positions.iter().sum::<f64>() / dim_positions.len().max(1) as f64;
            for (index, position) in dim_positions.iter_mut().enumerate() {
                if turn > 0 {
                    let pull = (mean - *position) * rng.gen_range(0.05..0.25);
                    *position = (*position + pull + rng.gen_range(-2.0..2.0)).clamp(0.0, 99.9);
                }
                let actor = ActorId(index as i64);
                store.insert_salience(&scope, turn, actor, rng.gen_range(0.1..1.0))?;
                store.insert_position(&scope, turn, actor, *position)?;
            }
        }

        if spec.actors == 0 {
            continue;
        }
        for _ in 0..spec.actors.div_ceil(2) {
            let initiator = rng.gen_range(0..spec.actors);
            let receiver = if rng.gen_bool(0.1) {
                initiator
            } else {
                rng.gen_range(0..spec.actors)
            };
            if initiator == receiver {
                stats.self_bargains += 1;
            }
            store.insert_bargain(
                scenario,
                &BargainRecord {
                    turn,
                    bargain: BargainId(next_bargain),
                    initiator: ActorId(initiator as i64),
                    receiver: ActorId(receiver as i64),
                    init_selected: rng.gen_bool(0.4),
                    recd_selected: rng.gen_bool(0.3),
                },
            )?;
            next_bargain += 1;
            stats.bargains += 1;
        }
    }

    tx.commit()?;
    info!(
        target: "smpv::store",
        scenario = %scenario,
        actors = stats.actors,
        turns = stats.turns,
        bargains = stats.bargains,
        "sample.written"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_reproducible() {
        let spec = SampleSpec::default();
        let first = SmpStore::open_memory().unwrap();
        let second = SmpStore::open_memory().unwrap();
        let a = write_sample(&first, &spec).unwrap();
        let b = write_sample(&second, &spec).unwrap();
        assert_eq!(a, b);

        let scope = ViewScope::new(spec.scenario.clone(), DimensionId(0));
        assert_eq!(
            first.position_history(&scope).unwrap(),
            second.position_history(&scope).unwrap()
        );
    }

    #[test]
    fn sample_covers_every_turn() {
        let spec = SampleSpec::default();
        let store = SmpStore::open_memory().unwrap();
        write_sample(&store, &spec).unwrap();
        assert_eq!(store.max_turn(&spec.scenario).unwrap(), spec.turns - 1);

        let scope = ViewScope::new(spec.scenario.clone(), DimensionId(1));
        let power = store.effective_power(&scope, spec.turns - 1).unwrap();
        assert_eq!(power.len(), spec.actors);
        assert!(power.iter().all(|row| row.power > 0.0));
    }

    #[test]
    fn names_beyond_the_list_are_numbered() {
        assert_eq!(actor_name(0), "Business");
        assert_eq!(actor_name(40), "Actor 40");
    }
}
