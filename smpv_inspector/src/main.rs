use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde::Serialize;
use smpv_core::{load_viewer_config_from_env, AppState, ChartMode, TurnSummary, ViewScope};
use smpv_schema::{ActorId, DimensionId, ScenarioId, Turn};
use tracing::info;

mod app;
mod ui;

use app::InspectorApp;

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "SMP results viewer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct DbArgs {
    /// SMP SQLite database produced by the simulation.
    #[arg(long)]
    db: PathBuf,
    /// Scenario id; defaults to the first scenario in the file.
    #[arg(long)]
    scenario: Option<String>,
    #[arg(long, default_value_t = 0)]
    dimension: u32,
}

impl DbArgs {
    fn open(&self) -> Result<AppState> {
        let (config, metadata) = load_viewer_config_from_env();
        if let Some(path) = metadata.path() {
            info!(path = %path.display(), "viewer_config.path");
        }
        AppState::open(
            &self.db,
            self.scenario.clone().map(ScenarioId::new),
            DimensionId(self.dimension),
            config,
        )
        .wrap_err_with(|| format!("failed to open {}", self.db.display()))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the bar chart and graph of one turn as SVG files.
    Render {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long, default_value_t = 0)]
        turn: Turn,
        #[arg(long, default_value_t = ChartMode::Fixed)]
        mode: ChartMode,
        /// Actor id or name to leave out of the bar chart. Repeatable.
        #[arg(long)]
        hide: Vec<String>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print per-turn bucket totals as JSON.
    Summary {
        #[command(flatten)]
        db: DbArgs,
        /// Only this turn instead of every turn.
        #[arg(long)]
        turn: Option<Turn>,
    },
    /// Interactive terminal viewer.
    Inspect {
        #[command(flatten)]
        db: DbArgs,
        /// Reload whenever the database file changes.
        #[arg(long)]
        watch: bool,
        /// Directory the `e` key exports into.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    scope: &'a ViewScope,
    max_turn: Turn,
    highest_range: f64,
    turns: Vec<TurnSummary>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            db,
            turn,
            mode,
            hide,
            out,
        } => {
            init_stderr_logging();
            render(&db, turn, mode, &hide, &out)
        }
        Command::Summary { db, turn } => {
            init_stderr_logging();
            summary(&db, turn)
        }
        Command::Inspect { db, watch, out } => {
            let (log_tx, log_rx) = mpsc::channel::<String>();
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .compact()
                .with_ansi(false)
                .with_writer(move || ChannelWriter {
                    sender: log_tx.clone(),
                })
                .init();

            let state = db.open()?;
            info!(db = %db.db.display(), watch, "inspector.started");
            let app = InspectorApp::new(state, log_rx, out, watch)?;
            app.run()
        }
    }
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

fn render(db: &DbArgs, turn: Turn, mode: ChartMode, hide: &[String], out: &Path) -> Result<()> {
    let mut state = db.open()?;
    state.select_turn(turn)?;
    state.set_mode(mode);
    for name in hide {
        let actor = resolve_actor(&state, name)
            .ok_or_else(|| eyre!("no actor {name:?} in turn {turn}"))?;
        state.toggle_actor(actor)?;
    }
    for path in state.export_svgs(out)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn summary(db: &DbArgs, turn: Option<Turn>) -> Result<()> {
    let mut state = db.open()?;
    let turns: Vec<Turn> = match turn {
        Some(turn) => vec![turn],
        None => (0..=state.max_turn()).collect(),
    };
    let mut summaries = Vec::with_capacity(turns.len());
    for turn in turns {
        state.select_turn(turn)?;
        summaries.push(state.summary());
    }
    let report = SummaryReport {
        scope: state.scope(),
        max_turn: state.max_turn(),
        highest_range: state.highest_range(),
        turns: summaries,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Accepts a numeric actor id or an actor name from the current turn.
fn resolve_actor(state: &AppState, name: &str) -> Option<ActorId> {
    let keys = state.chart().keys();
    if let Ok(id) = name.parse::<i64>() {
        if keys.iter().any(|key| key.actor == ActorId(id)) {
            return Some(ActorId(id));
        }
    }
    keys.iter()
        .find(|key| key.label.eq_ignore_ascii_case(name))
        .map(|key| key.actor)
}
