use std::collections::VecDeque;

use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Circle, Line as CanvasLine};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use smpv_core::chart::{X_LABEL, Y_LABEL};
use smpv_core::{AppState, ChartKind};
use smpv_schema::{ActorId, ActorKind, HslColor, NodeId, BUCKET_COUNT, BUCKET_WIDTH};

pub struct UiState {
    pub logs: VecDeque<String>,
    pub max_logs: usize,
    /// Index into the legend of the current turn.
    pub selected_legend: usize,
    pub selected_bucket: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            logs: VecDeque::new(),
            max_logs: 8,
            selected_legend: 0,
            selected_bucket: 0,
        }
    }
}

impl UiState {
    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }

    pub fn move_legend(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected_legend = 0;
            return;
        }
        let next = self.selected_legend as isize + delta;
        self.selected_legend = next.clamp(0, len as isize - 1) as usize;
    }

    pub fn move_bucket(&mut self, delta: isize) {
        let next = self.selected_bucket as isize + delta;
        self.selected_bucket = next.clamp(0, BUCKET_COUNT as isize - 1) as usize;
    }

    pub fn selected_actor(&self, state: &AppState) -> Option<ActorId> {
        state
            .chart()
            .keys()
            .get(self.selected_legend)
            .map(|key| key.actor)
    }
}

/// Terminal approximation of `hsl(hue,100%,50%)`.
pub fn hsl_color(color: HslColor) -> Color {
    let hue = color.hue.rem_euclid(360.0) / 60.0;
    let x = 1.0 - (hue % 2.0 - 1.0).abs();
    let (r, g, b) = match hue as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    let channel = |value: f64| (value * 255.0).round() as u8;
    Color::Rgb(channel(r), channel(g), channel(b))
}

pub fn draw_ui(frame: &mut Frame, state: &AppState, ui: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(4),
            Constraint::Length(10),
        ])
        .split(frame.size());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(72), Constraint::Percentage(28)])
        .split(chunks[1]);

    draw_header(frame, chunks[0], state);
    match state.kind() {
        ChartKind::Bar => draw_bars(frame, body[0], state, ui),
        ChartKind::Graph => draw_graph(frame, body[0], state),
    }
    draw_legend(frame, body[1], state, ui);
    draw_details(frame, chunks[2], state, ui);
    draw_logs(frame, chunks[3], ui);
}

fn inner(area: Rect) -> Rect {
    area.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    })
}

fn draw_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let scope = state.scope();
    let block = Block::default()
        .borders(Borders::ALL)
        .title("SMP Results Viewer");
    let line = Line::from(vec![
        Span::styled(
            format!("scenario {} dim {}", scope.scenario, scope.dimension.0),
            Style::default().fg(Color::Green),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("turn {}/{}", state.turn(), state.max_turn()),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!(" | axis {} | ", state.mode())),
        Span::raw(match state.kind() {
            ChartKind::Bar => "bars",
            ChartKind::Graph => "graph",
        }),
        Span::raw(
            " | ←/→ turn  m axis  g view  ↑/↓ legend  space toggle  ,/. bucket  h hover  e export  r reload  q quit",
        ),
    ]);
    let text = Paragraph::new(line).wrap(Wrap { trim: true });
    frame.render_widget(block, area);
    frame.render_widget(text, inner(area));
}

fn draw_bars(frame: &mut Frame, area: Rect, state: &AppState, ui: &UiState) {
    let chart = state.chart();
    let totals = chart.totals();
    let bars: Vec<Bar> = totals
        .iter()
        .enumerate()
        .map(|(bucket, total)| {
            let color = if bucket == ui.selected_bucket {
                Color::Yellow
            } else {
                Color::Cyan
            };
            Bar::default()
                .value(total.max(0.0).round() as u64)
                .text_value(format!("{total:.0}"))
                .label(Line::from(format!("{:.0}", bucket as f64 * BUCKET_WIDTH)))
                .style(Style::default().fg(color))
        })
        .collect();
    let (_, y_max) = chart.y_domain();
    let width = (area.width.saturating_sub(2) / BUCKET_COUNT as u16).saturating_sub(1);

    let widget = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{Y_LABEL} by {X_LABEL} [{}]", chart.mode())),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(width.max(1))
        .bar_gap(1)
        .max(y_max.ceil().max(1.0) as u64);
    frame.render_widget(widget, area);
}

struct CanvasNode {
    x: f64,
    y: f64,
    radius: f64,
    color: Color,
    label: Option<String>,
}

fn draw_graph(frame: &mut Frame, area: Rect, state: &AppState) {
    let config = &state.config().graph;
    let (width, height) = (config.width, config.height);
    let block = Block::default().borders(Borders::ALL).title(format!(
        "Bargains, turn {}{}",
        state.turn(),
        if state.graph().is_settled() {
            ""
        } else {
            " (settling)"
        }
    ));

    let (nodes, links) = match (state.graph().placed_nodes(), state.graph().placed_links()) {
        (Ok(nodes), Ok(links)) => (nodes, links),
        _ => {
            let text = Paragraph::new("graph not available").block(block);
            frame.render_widget(text, area);
            return;
        }
    };

    let snapshot = state.snapshot();
    let nodes: Vec<CanvasNode> = nodes
        .into_iter()
        .map(|placed| {
            let color = match placed.node.id {
                NodeId::Actor(id) => snapshot
                    .actor(id)
                    .and_then(|actor| actor.color(config.power_reference))
                    .map(hsl_color)
                    .unwrap_or(Color::White),
                NodeId::Bargain(_) => Color::DarkGray,
            };
            CanvasNode {
                x: placed.x,
                y: height - placed.y,
                radius: placed.node.radius,
                color,
                label: (placed.node.kind == ActorKind::Actor).then_some(placed.node.label),
            }
        })
        .collect();

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            for link in &links {
                ctx.draw(&CanvasLine {
                    x1: link.from.0,
                    y1: height - link.from.1,
                    x2: link.to.0,
                    y2: height - link.to.1,
                    color: if link.accepted {
                        Color::Red
                    } else {
                        Color::DarkGray
                    },
                });
            }
            ctx.layer();
            for node in &nodes {
                ctx.draw(&Circle {
                    x: node.x,
                    y: node.y,
                    radius: node.radius,
                    color: node.color,
                });
            }
            ctx.layer();
            for node in &nodes {
                if let Some(label) = &node.label {
                    ctx.print(
                        node.x + config.label_font_size,
                        node.y,
                        Line::from(label.clone()),
                    );
                }
            }
        });
    frame.render_widget(canvas, area);
}

fn draw_legend(frame: &mut Frame, area: Rect, state: &AppState, ui: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Legend");
    let chart = state.chart();
    let lines: Vec<Line> = chart
        .keys()
        .iter()
        .enumerate()
        .map(|(index, key)| {
            let visible = chart.is_visible(key.actor);
            let mut style = if visible {
                Style::default().fg(hsl_color(key.color))
            } else {
                Style::default().fg(Color::DarkGray)
            };
            if chart.opacity(key.actor) < 1.0 {
                style = style.add_modifier(Modifier::DIM);
            }
            if index == ui.selected_legend {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(vec![
                Span::raw(if visible { "■ " } else { "□ " }),
                Span::styled(key.label.clone(), style),
            ])
        })
        .collect();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner(area));
}

fn draw_details(frame: &mut Frame, area: Rect, state: &AppState, ui: &UiState) {
    let summary = state.summary();
    let low = ui.selected_bucket as f64 * BUCKET_WIDTH;
    let tooltip = state.chart().tooltip().unwrap_or("-");
    let hovered = state
        .chart()
        .hovered()
        .and_then(|target| {
            state
                .chart()
                .keys()
                .iter()
                .find(|key| key.actor == target.actor())
        })
        .map(|key| key.label.as_str())
        .unwrap_or("-");
    let line = Line::from(vec![
        Span::styled(
            format!("bucket {:.0}-{:.0}", low, low + BUCKET_WIDTH),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!(" | hover {hovered} | {tooltip}")),
        Span::raw(format!(
            " | power {:.1} | bargains {} | accepted {} | rejected {}",
            summary.total_power, summary.bargains, summary.accepted_links, summary.rejected_links
        )),
    ]);
    let block = Block::default().borders(Borders::ALL).title("Details");
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(line).wrap(Wrap { trim: true }), inner(area));
}

fn draw_logs(frame: &mut Frame, area: Rect, ui: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Logs");
    let lines: Vec<Line> = ui
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner(area));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsl_endpoints_map_to_green_and_red() {
        assert_eq!(hsl_color(HslColor { hue: 120.0 }), Color::Rgb(0, 255, 0));
        assert_eq!(hsl_color(HslColor { hue: 0.0 }), Color::Rgb(255, 0, 0));
        assert_eq!(hsl_color(HslColor { hue: 60.0 }), Color::Rgb(255, 255, 0));
    }

    #[test]
    fn selection_is_clamped() {
        let mut ui = UiState::default();
        ui.move_legend(-1, 3);
        assert_eq!(ui.selected_legend, 0);
        ui.move_legend(5, 3);
        assert_eq!(ui.selected_legend, 2);
        ui.move_bucket(20);
        assert_eq!(ui.selected_bucket, BUCKET_COUNT - 1);
    }

    #[test]
    fn log_lines_are_trimmed_and_capped() {
        let mut ui = UiState::default();
        ui.push_log("\n");
        assert!(ui.logs.is_empty());
        for i in 0..20 {
            ui.push_log(format!("line {i}\n"));
        }
        assert_eq!(ui.logs.len(), ui.max_logs);
        assert_eq!(ui.logs.front().map(String::as_str), Some("line 19"));
    }
}
