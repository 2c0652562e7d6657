//! Application state shared by the command line and the terminal viewer.
//!
//! Everything the views need (loaded data, turn, selections) lives on
//! [`AppState`] and is handed to the renderers explicitly. Changing the turn
//! rebuilds the chart and tears down the graph renderer before creating a
//! new one; the legend selection survives turn changes.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use smpv_schema::{ActorId, DimensionId, ScenarioId, Turn};
use tracing::{info, instrument};

use crate::{
    chart::{BarChart, ChartMode, HoverTarget},
    config::ViewerConfig,
    error::{Result, SmpvError},
    graph::GraphRenderer,
    snapshot::{LinkParams, SimulationData, TurnSnapshot},
    store::{SmpStore, ViewScope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Bar,
    Graph,
}

impl ChartKind {
    pub fn toggled(self) -> Self {
        match self {
            ChartKind::Bar => ChartKind::Graph,
            ChartKind::Graph => ChartKind::Bar,
        }
    }
}

/// Bucket totals of one turn, as printed by `summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSummary {
    pub turn: Turn,
    pub bucket_totals: Vec<f64>,
    pub total_power: f64,
    pub actors: usize,
    pub bargains: usize,
    pub accepted_links: usize,
    pub rejected_links: usize,
}

impl TurnSummary {
    pub fn from_snapshot(snapshot: &TurnSnapshot, power_reference: f64) -> Self {
        let binned = snapshot.binned(power_reference);
        Self {
            turn: snapshot.turn,
            bucket_totals: binned.totals(),
            total_power: binned.total_power(),
            actors: snapshot.persistent_actors().count(),
            bargains: snapshot.bargain_nodes().count(),
            accepted_links: snapshot.accepted_links().count(),
            rejected_links: snapshot.rejected_links().count(),
        }
    }
}

pub struct AppState {
    path: Option<PathBuf>,
    config: Arc<ViewerConfig>,
    data: SimulationData,
    highest_range: f64,
    turn: Turn,
    snapshot: TurnSnapshot,
    mode: ChartMode,
    kind: ChartKind,
    hidden: BTreeSet<ActorId>,
    chart: BarChart,
    graph: GraphRenderer,
}

impl AppState {
    /// Opens a database file and shows turn 0. `scenario` defaults to the
    /// first scenario in the file.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(
        path: &Path,
        scenario: Option<ScenarioId>,
        dimension: DimensionId,
        config: Arc<ViewerConfig>,
    ) -> Result<Self> {
        let store = SmpStore::open(path)?;
        let mut state = Self::from_store(store, scenario, dimension, config)?;
        state.path = Some(path.to_path_buf());
        Ok(state)
    }

    pub fn from_store(
        store: SmpStore,
        scenario: Option<ScenarioId>,
        dimension: DimensionId,
        config: Arc<ViewerConfig>,
    ) -> Result<Self> {
        let link_params = LinkParams::from_graph_config(&config.graph);
        let data = SimulationData::open_default(store, scenario, dimension, link_params)?;
        Self::from_data(
            None,
            data,
            config,
            ChartMode::default(),
            ChartKind::default(),
            BTreeSet::new(),
            0,
        )
    }

    fn from_data(
        path: Option<PathBuf>,
        mut data: SimulationData,
        config: Arc<ViewerConfig>,
        mode: ChartMode,
        kind: ChartKind,
        hidden: BTreeSet<ActorId>,
        turn: Turn,
    ) -> Result<Self> {
        let highest_range = data.power_history()?.highest_range();
        let turn = turn.min(data.max_turn());
        let snapshot = data.load_turn(turn)?;
        let chart = BarChart::new(
            config.chart.clone(),
            snapshot.binned(config.graph.power_reference),
            mode,
            highest_range,
            &hidden,
        );
        let graph = GraphRenderer::new(&snapshot, &config.graph);
        Ok(Self {
            path,
            config,
            data,
            highest_range,
            turn,
            snapshot,
            mode,
            kind,
            hidden,
            chart,
            graph,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scope(&self) -> &ViewScope {
        self.data.scope()
    }

    pub fn data(&self) -> &SimulationData {
        &self.data
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn max_turn(&self) -> Turn {
        self.data.max_turn()
    }

    pub fn mode(&self) -> ChartMode {
        self.mode
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn hidden(&self) -> &BTreeSet<ActorId> {
        &self.hidden
    }

    pub fn highest_range(&self) -> f64 {
        self.highest_range
    }

    pub fn snapshot(&self) -> &TurnSnapshot {
        &self.snapshot
    }

    pub fn chart(&self) -> &BarChart {
        &self.chart
    }

    pub fn graph(&self) -> &GraphRenderer {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphRenderer {
        &mut self.graph
    }

    pub fn summary(&self) -> TurnSummary {
        TurnSummary::from_snapshot(&self.snapshot, self.config.graph.power_reference)
    }

    /// Loads `turn` and rebuilds both views. On error the previous turn
    /// stays on screen.
    pub fn select_turn(&mut self, turn: Turn) -> Result<()> {
        let snapshot = self.data.load_turn(turn)?;
        self.show(snapshot);
        info!(target: "smpv::state", turn, "state.turn_selected");
        Ok(())
    }

    /// Moves by `delta` turns, clamped to the recorded range.
    pub fn step_turn(&mut self, delta: i64) -> Result<Turn> {
        let target = (i64::from(self.turn) + delta).clamp(0, i64::from(self.max_turn()));
        let target = Turn::try_from(target).unwrap_or(self.turn);
        if target != self.turn {
            self.select_turn(target)?;
        }
        Ok(self.turn)
    }

    pub fn set_mode(&mut self, mode: ChartMode) {
        self.mode = mode;
        self.chart.set_mode(mode);
    }

    pub fn toggle_mode(&mut self) -> ChartMode {
        self.set_mode(self.mode.toggled());
        self.mode
    }

    pub fn toggle_chart_kind(&mut self) -> ChartKind {
        self.kind = self.kind.toggled();
        self.kind
    }

    /// Flips the legend entry of `actor`. Returns whether it is now visible.
    pub fn toggle_actor(&mut self, actor: ActorId) -> Result<bool> {
        let visible = self.chart.toggle_actor(actor)?;
        if visible {
            self.hidden.remove(&actor);
        } else {
            self.hidden.insert(actor);
        }
        Ok(visible)
    }

    pub fn hover(&mut self, target: HoverTarget) -> Result<Option<String>> {
        self.chart.hover(target)
    }

    pub fn clear_hover(&mut self) {
        self.chart.clear_hover();
    }

    /// Re-reads the database, replacing the loaded dataset. The turn is kept
    /// when it still exists, otherwise the last turn is shown.
    #[instrument(skip(self))]
    pub fn reload(&mut self) -> Result<()> {
        match &self.path {
            Some(path) => {
                let data = SimulationData::open(
                    SmpStore::open(path)?,
                    self.data.scope().clone(),
                    self.data.link_params(),
                )?;
                let next = Self::from_data(
                    self.path.clone(),
                    data,
                    Arc::clone(&self.config),
                    self.mode,
                    self.kind,
                    self.hidden.clone(),
                    self.turn,
                )?;
                self.graph.destroy();
                *self = next;
            }
            None => {
                let history = self.data.power_history()?;
                let snapshot = self.data.refresh(self.turn)?;
                self.highest_range = history.highest_range();
                self.show(snapshot);
            }
        }
        info!(target: "smpv::state", max_turn = self.max_turn(), "state.reloaded");
        Ok(())
    }

    /// Writes `bars_turn_<N>.svg` and `graph_turn_<N>.svg` into `dir`. The
    /// graph is settled first.
    pub fn export_svgs(&mut self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|source| SmpvError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        self.graph.settle()?;

        let bars = dir.join(format!("bars_turn_{}.svg", self.turn));
        let graph = dir.join(format!("graph_turn_{}.svg", self.turn));
        for (path, contents) in [
            (&bars, self.chart.render_svg()),
            (&graph, self.graph.render_svg()?),
        ] {
            fs::write(path, contents).map_err(|source| SmpvError::Io {
                path: path.clone(),
                source,
            })?;
        }
        info!(
            target: "smpv::state",
            turn = self.turn,
            dir = %dir.display(),
            "state.exported"
        );
        Ok(vec![bars, graph])
    }

    fn show(&mut self, snapshot: TurnSnapshot) {
        self.graph.destroy();
        self.graph = GraphRenderer::new(&snapshot, &self.config.graph);
        self.chart = self.build_chart(&snapshot);
        self.turn = snapshot.turn;
        self.snapshot = snapshot;
    }

    fn build_chart(&self, snapshot: &TurnSnapshot) -> BarChart {
        BarChart::new(
            self.config.chart.clone(),
            snapshot.binned(self.config.graph.power_reference),
            self.mode,
            self.highest_range,
            &self.hidden,
        )
    }
}
