mod common;

use smpv_core::store::BargainRecord;
use smpv_core::{AppState, ChartKind, ChartMode, SmpStore, SmpvError, ViewerConfig};
use smpv_schema::{BargainId, DimensionId};

fn open_file_state(dir: &std::path::Path) -> anyhow::Result<AppState> {
    let path = common::write_civic_db(dir)?;
    let state = AppState::open(&path, None, DimensionId(0), ViewerConfig::builtin())?;
    Ok(state)
}

#[test]
fn opens_the_first_scenario_on_turn_zero() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = open_file_state(dir.path())?;

    assert_eq!(state.scope(), &common::budget_scope());
    assert_eq!(state.turn(), 0);
    assert_eq!(state.max_turn(), 1);
    assert_eq!(state.highest_range(), 42.0);
    assert_eq!(state.mode(), ChartMode::Fixed);
    assert_eq!(state.kind(), ChartKind::Bar);
    assert!(state.path().is_some());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = AppState::open(
        &dir.path().join("absent.db"),
        None,
        DimensionId(0),
        ViewerConfig::builtin(),
    );
    assert!(matches!(result, Err(SmpvError::Io { .. })));
}

#[test]
fn hidden_actors_survive_turn_changes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut state = open_file_state(dir.path())?;

    assert_eq!(state.toggle_actor(common::GOVERNMENT)?, false);
    assert_eq!(state.step_turn(1)?, 1);
    assert!(state.hidden().contains(&common::GOVERNMENT));
    assert_eq!(state.chart().totals()[9], 0.0);
    assert_eq!(state.chart().totals()[4], 42.0);

    assert_eq!(state.step_turn(10)?, 1);
    assert_eq!(state.step_turn(-10)?, 0);
    Ok(())
}

#[test]
fn export_writes_both_documents() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut state = open_file_state(dir.path())?;
    state.select_turn(1)?;

    let out = dir.path().join("svg");
    let written = state.export_svgs(&out)?;
    let names: Vec<String> = written
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["bars_turn_1.svg", "graph_turn_1.svg"]);

    let bars = std::fs::read_to_string(out.join("bars_turn_1.svg"))?;
    let graph = std::fs::read_to_string(out.join("graph_turn_1.svg"))?;
    assert!(bars.contains("class='bar-chart'"));
    assert!(graph.contains("class='bargain-graph'"));
    assert!(state.graph().is_settled());
    Ok(())
}

#[test]
fn reload_picks_up_rows_written_to_the_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut state = open_file_state(dir.path())?;
    state.toggle_actor(common::PRESS)?;
    state.set_mode(ChartMode::Responsive);

    let path = state.path().map(|path| path.to_path_buf()).unwrap();
    {
        let writer = SmpStore::create(&path)?;
        let scope = common::budget_scope();
        for actor in [common::UNIONS, common::INDUSTRY, common::GOVERNMENT, common::PRESS] {
            writer.insert_salience(&scope, 2, actor, 1.0)?;
            writer.insert_position(&scope, 2, actor, 50.0)?;
        }
        writer.insert_bargain(
            &scope.scenario,
            &BargainRecord {
                turn: 2,
                bargain: BargainId(300),
                initiator: common::GOVERNMENT,
                receiver: common::UNIONS,
                init_selected: true,
                recd_selected: true,
            },
        )?;
    }

    state.reload()?;
    assert_eq!(state.max_turn(), 2);
    assert_eq!(state.turn(), 0);
    assert_eq!(state.mode(), ChartMode::Responsive);
    assert!(state.hidden().contains(&common::PRESS));
    // Everyone at position 50 with full salience: 84 + 60 + 40 + 10.
    assert_eq!(state.highest_range(), 194.0);

    state.select_turn(2)?;
    assert_eq!(state.snapshot().accepted_links().count(), 2);
    assert_eq!(state.chart().totals()[5], 184.0);
    Ok(())
}

#[test]
fn summary_serializes_bucket_totals() -> anyhow::Result<()> {
    let state = AppState::from_store(
        common::civic_store(),
        Some(common::civic()),
        DimensionId(0),
        ViewerConfig::builtin(),
    )?;
    let summary = serde_json::to_value(state.summary())?;

    assert_eq!(summary["turn"], 0);
    assert_eq!(summary["total_power"], 122.0);
    assert_eq!(summary["bargains"], 2);
    assert_eq!(summary["accepted_links"], 2);
    assert_eq!(summary["bucket_totals"][3], 42.0);
    Ok(())
}
