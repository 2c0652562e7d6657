use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use color_eyre::eyre::eyre;
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use smpv_core::{AppState, ChartKind, HoverTarget};
use tracing::{error, info, trace, warn};

use crate::ui::{draw_ui, UiState};

/// Layout steps per drawn frame while the graph is still moving.
const GRAPH_TICKS_PER_FRAME: u32 = 4;
/// SQLite rewrites come in bursts; wait for them to settle before reloading.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(300);

struct FileWatch {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<notify::Event>>,
    pending_since: Option<Instant>,
}

impl FileWatch {
    fn new(path: PathBuf) -> Result<Self> {
        let (sender, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(sender)?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "watch.started");
        Ok(Self {
            _watcher: watcher,
            events,
            pending_since: None,
        })
    }

    /// True once a burst of modifications has gone quiet.
    fn poll(&mut self) -> bool {
        while let Ok(event) = self.events.try_recv() {
            match event {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    trace!(kind = ?event.kind, "watch.event");
                    self.pending_since = Some(Instant::now());
                }
                Ok(_) => {}
                Err(err) => warn!("File watch error: {}", err),
            }
        }
        match self.pending_since {
            Some(since) if since.elapsed() >= RELOAD_DEBOUNCE => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

pub struct InspectorApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    state: AppState,
    ui_state: UiState,
    log_receiver: Receiver<String>,
    watch: Option<FileWatch>,
    export_dir: PathBuf,
}

impl InspectorApp {
    pub fn new(
        state: AppState,
        log_receiver: Receiver<String>,
        export_dir: PathBuf,
        watch: bool,
    ) -> Result<Self> {
        let watch = if watch {
            let path = state
                .path()
                .ok_or_else(|| eyre!("--watch needs a database file"))?
                .to_path_buf();
            Some(FileWatch::new(path)?)
        } else {
            None
        };

        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            state,
            ui_state: UiState::default(),
            log_receiver,
            watch,
            export_dir,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let result = self.event_loop();
        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        self.terminal.clear()?;
        result
    }

    fn event_loop(&mut self) -> Result<()> {
        let mut last_draw = Instant::now();

        loop {
            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if self.watch.as_mut().is_some_and(FileWatch::poll) {
                info!("Database changed on disk, reloading");
                self.reload();
            }

            if self.state.kind() == ChartKind::Graph && !self.state.graph().is_settled() {
                for _ in 0..GRAPH_TICKS_PER_FRAME {
                    match self.state.graph_mut().tick() {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => {
                            error!("Graph step failed: {}", err);
                            break;
                        }
                    }
                }
            }

            if last_draw.elapsed() >= Duration::from_millis(100) {
                let (state, ui_state) = (&self.state, &self.ui_state);
                self.terminal
                    .draw(|frame| draw_ui(frame, state, ui_state))?;
                last_draw = Instant::now();
            }

            if event::poll(Duration::from_millis(30))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Left => self.step(-1),
                        KeyCode::Right => self.step(1),
                        KeyCode::Home => self.select(0),
                        KeyCode::End => self.select(self.state.max_turn()),
                        KeyCode::Char('m') => {
                            let mode = self.state.toggle_mode();
                            self.ui_state.push_log(format!("Axis mode: {mode}"));
                        }
                        KeyCode::Char('g') => {
                            let kind = self.state.toggle_chart_kind();
                            trace!(?kind, "view.toggled");
                        }
                        KeyCode::Up => self.move_legend(-1),
                        KeyCode::Down => self.move_legend(1),
                        KeyCode::Char(',') => self.ui_state.move_bucket(-1),
                        KeyCode::Char('.') => self.ui_state.move_bucket(1),
                        KeyCode::Char(' ') => self.toggle_selected(),
                        KeyCode::Char('h') => self.hover_selected(),
                        KeyCode::Char('e') => self.export(),
                        KeyCode::Char('r') => self.reload(),
                        _ => {}
                    }
                }
            }
        }

        Ok(())
    }

    fn step(&mut self, delta: i64) {
        match self.state.step_turn(delta) {
            Ok(turn) => trace!(turn, "turn.stepped"),
            Err(err) => error!("Failed to change turn: {}", err),
        }
        self.clamp_legend();
    }

    fn select(&mut self, turn: u32) {
        if let Err(err) = self.state.select_turn(turn) {
            error!("Failed to load turn {}: {}", turn, err);
        }
        self.clamp_legend();
    }

    fn move_legend(&mut self, delta: isize) {
        let len = self.state.chart().keys().len();
        self.ui_state.move_legend(delta, len);
    }

    fn clamp_legend(&mut self) {
        self.move_legend(0);
    }

    fn toggle_selected(&mut self) {
        let Some(actor) = self.ui_state.selected_actor(&self.state) else {
            return;
        };
        match self.state.toggle_actor(actor) {
            Ok(visible) => info!(actor = %actor, visible, "legend.toggled"),
            Err(err) => warn!("Cannot toggle actor {}: {}", actor, err),
        }
    }

    fn hover_selected(&mut self) {
        let Some(actor) = self.ui_state.selected_actor(&self.state) else {
            return;
        };
        let target = HoverTarget::Segment {
            actor,
            bucket: self.ui_state.selected_bucket,
        };
        if self.state.chart().hovered() == Some(target) {
            self.state.clear_hover();
            return;
        }
        if let Err(err) = self.state.hover(target) {
            warn!("Cannot highlight actor {}: {}", actor, err);
        }
    }

    fn export(&mut self) {
        match self.state.export_svgs(&self.export_dir) {
            Ok(paths) => {
                for path in paths {
                    self.ui_state
                        .push_log(format!("Wrote {}", path.display()));
                }
            }
            Err(err) => error!("Export failed: {}", err),
        }
    }

    fn reload(&mut self) {
        match self.state.reload() {
            Ok(()) => self
                .ui_state
                .push_log(format!("Reloaded, {} turns", self.state.max_turn() + 1)),
            Err(err) => error!("Reload failed: {}", err),
        }
        self.clamp_legend();
    }
}
