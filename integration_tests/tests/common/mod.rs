#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;

use smpv_core::store::BargainRecord;
use smpv_core::{SmpStore, ViewScope};
use smpv_schema::{ActorId, BargainId, DimensionId, ScenarioId};

static INIT: Once = Once::new();

pub const UNIONS: ActorId = ActorId(0);
pub const INDUSTRY: ActorId = ActorId(1);
pub const GOVERNMENT: ActorId = ActorId(2);
pub const PRESS: ActorId = ActorId(3);

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_viewer_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test viewer config at {}",
            config_path.display()
        );

        std::env::set_var("SMPV_CONFIG_PATH", &config_path);
    });
}

pub fn civic() -> ScenarioId {
    ScenarioId::new("civic")
}

pub fn budget_scope() -> ViewScope {
    ViewScope::new(civic(), DimensionId(0))
}

/// Four actors over two turns on the "Budget" dimension.
///
/// | actor      | power | turn 0 pos | turn 1 pos |
/// |------------|-------|------------|------------|
/// | Unions     | 42    | 35         | 45         |
/// | Industry   | 30    | 72         | 72         |
/// | Government | 40    | 99.9       | 99.9       |
/// | Press Corps| 10    | 0          | 0          |
///
/// Capability is only recorded on turn 0. Turn 0 has bargain 100
/// (Unions -> Industry, initiator accepts), 101 (Government with itself) and
/// 102 (Press -> Unions, receiver accepts). Turn 1 has bargain 200
/// (Industry -> Press, both accept).
pub fn populate(store: &SmpStore) -> anyhow::Result<()> {
    let scenario = civic();
    let scope = budget_scope();
    store.insert_scenario(&scenario, "Civic budget", "integration fixture")?;
    store.insert_dimension(&scenario, DimensionId(0), "Budget")?;
    for (actor, name) in [
        (UNIONS, "Unions"),
        (INDUSTRY, "Industry"),
        (GOVERNMENT, "Government"),
        (PRESS, "Press Corps"),
    ] {
        store.insert_actor(&scenario, actor, name, "")?;
    }

    for (actor, capability) in [(UNIONS, 84.0), (INDUSTRY, 60.0), (GOVERNMENT, 40.0), (PRESS, 10.0)] {
        store.insert_capability(&scenario, 0, actor, capability)?;
    }
    for turn in 0..=1u32 {
        for (actor, salience, position) in [
            (UNIONS, 0.5, if turn == 0 { 35.0 } else { 45.0 }),
            (INDUSTRY, 0.5, 72.0),
            (GOVERNMENT, 1.0, 99.9),
            (PRESS, 1.0, 0.0),
        ] {
            store.insert_salience(&scope, turn, actor, salience)?;
            store.insert_position(&scope, turn, actor, position)?;
        }
    }

    for (turn, bargain, initiator, receiver, init_selected, recd_selected) in [
        (0, 100, UNIONS, INDUSTRY, true, false),
        (0, 101, GOVERNMENT, GOVERNMENT, true, true),
        (0, 102, PRESS, UNIONS, false, true),
        (1, 200, INDUSTRY, PRESS, true, true),
    ] {
        store.insert_bargain(
            &scenario,
            &BargainRecord {
                turn,
                bargain: BargainId(bargain),
                initiator,
                receiver,
                init_selected,
                recd_selected,
            },
        )?;
    }
    Ok(())
}

pub fn civic_store() -> SmpStore {
    let store = SmpStore::open_memory().expect("memory store");
    populate(&store).expect("fixture rows");
    store
}

/// Writes the fixture to `dir/civic.db` and returns the path.
pub fn write_civic_db(dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join("civic.db");
    let store = SmpStore::create(&path)?;
    populate(&store)?;
    Ok(path)
}
