//! Force-directed drawing of actors and the bargains between them.

use std::fmt::Write as _;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use smpv_schema::{ActorKind, Link, LinkKind, NodeId, Turn};
use tracing::{debug, info};

use crate::{
    config::GraphConfig,
    error::{Result, SmpvError},
    layout::{ForceLayout, LayoutConfig},
    snapshot::TurnSnapshot,
    svg::{escape_text, num},
};

const LINK_STROKE: &str = "rgba(50, 50, 50, 0.2)";
const BARGAIN_FILL: &str = "gray";
const MARKER_PATH: &str = "M 0,-5 L 5 ,0 L 0,5";

/// Drawing attributes of a node; position lives in the layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub label: String,
    pub kind: ActorKind,
    pub radius: f64,
    pub fill: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedNode {
    #[serde(flatten)]
    pub node: GraphNode,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLink {
    pub kind: LinkKind,
    pub accepted: bool,
    pub to_self: bool,
    pub from: (f64, f64),
    /// Already pulled back to the edge of the target circle.
    pub to: (f64, f64),
    /// Arc radius for self-referential links.
    pub arc_radius: Option<f64>,
}

impl PlacedLink {
    pub fn path(&self) -> String {
        let (sx, sy) = self.from;
        let (tx, ty) = self.to;
        match self.arc_radius {
            Some(radius) => format!(
                "M{},{}A{},{} 0 0,1 {},{}",
                num(sx),
                num(sy),
                num(radius),
                num(radius),
                num(tx),
                num(ty)
            ),
            None => format!("M{},{}L{},{}", num(sx), num(sy), num(tx), num(ty)),
        }
    }

    pub fn class(&self) -> String {
        if self.accepted {
            format!("link {}", self.kind.as_str())
        } else {
            format!("link {} rejectb", self.kind.as_str())
        }
    }
}

pub struct ActiveGraph {
    turn: Turn,
    nodes: Vec<GraphNode>,
    links: Vec<Link>,
    layout: ForceLayout,
    config: GraphConfig,
}

pub enum GraphLifecycle {
    Active(Box<ActiveGraph>),
    Destroyed,
}

/// Owns one turn's layout. A new turn needs a new renderer.
pub struct GraphRenderer {
    lifecycle: GraphLifecycle,
}

impl GraphRenderer {
    pub fn new(snapshot: &TurnSnapshot, config: &GraphConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed ^ u64::from(snapshot.turn));
        let mut layout = ForceLayout::new(LayoutConfig::from_graph_config(config), config.seed);

        let nodes: Vec<GraphNode> = snapshot
            .actors
            .iter()
            .map(|actor| {
                layout.add_node(actor.id);
                let (radius, fill) = match actor.kind {
                    ActorKind::Actor => {
                        let jitter = if config.radius_jitter > 0.0 {
                            rng.gen_range(0.0..config.radius_jitter)
                        } else {
                            0.0
                        };
                        let power = actor.effective_power.unwrap_or(0.0).max(0.0);
                        let fill = actor
                            .color(config.power_reference)
                            .map(|color| color.to_string())
                            .unwrap_or_else(|| BARGAIN_FILL.to_string());
                        (power / 2.0 + jitter, fill)
                    }
                    ActorKind::Bargain => (config.bargain_radius, BARGAIN_FILL.to_string()),
                };
                GraphNode {
                    id: actor.id,
                    label: actor.label.clone(),
                    kind: actor.kind,
                    radius,
                    fill,
                }
            })
            .collect();

        let mut links = Vec::with_capacity(snapshot.links.len());
        for link in &snapshot.links {
            if layout.add_link(link.source, link.target, link.strength, link.distance) {
                links.push(link.clone());
            } else {
                debug!(
                    target: "smpv::graph",
                    from = %link.source,
                    to = %link.target,
                    "link.skipped=missing_node"
                );
            }
        }

        info!(
            target: "smpv::graph",
            turn = snapshot.turn,
            nodes = nodes.len(),
            links = links.len(),
            "graph.created"
        );

        Self {
            lifecycle: GraphLifecycle::Active(Box::new(ActiveGraph {
                turn: snapshot.turn,
                nodes,
                links,
                layout,
                config: config.clone(),
            })),
        }
    }

    fn active(&self) -> Result<&ActiveGraph> {
        match &self.lifecycle {
            GraphLifecycle::Active(graph) => Ok(&**graph),
            GraphLifecycle::Destroyed => Err(SmpvError::GraphDestroyed),
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveGraph> {
        match &mut self.lifecycle {
            GraphLifecycle::Active(graph) => Ok(&mut **graph),
            GraphLifecycle::Destroyed => Err(SmpvError::GraphDestroyed),
        }
    }

    pub fn lifecycle(&self) -> &GraphLifecycle {
        &self.lifecycle
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.lifecycle, GraphLifecycle::Destroyed)
    }

    pub fn turn(&self) -> Option<Turn> {
        self.active().ok().map(|graph| graph.turn)
    }

    pub fn is_settled(&self) -> bool {
        self.active()
            .map(|graph| graph.layout.is_settled())
            .unwrap_or(true)
    }

    /// One layout step. Returns `false` once the layout is at rest.
    pub fn tick(&mut self) -> Result<bool> {
        Ok(self.active_mut()?.layout.tick())
    }

    pub fn settle(&mut self) -> Result<u32> {
        let graph = self.active_mut()?;
        let ticks = graph.layout.settle();
        debug!(target: "smpv::graph", turn = graph.turn, ticks, "graph.settled");
        Ok(ticks)
    }

    /// Stops the layout and drops the node and link sets.
    pub fn destroy(&mut self) {
        if let GraphLifecycle::Active(graph) = &self.lifecycle {
            debug!(target: "smpv::graph", turn = graph.turn, "graph.destroyed");
        }
        self.lifecycle = GraphLifecycle::Destroyed;
    }

    pub fn placed_nodes(&self) -> Result<Vec<PlacedNode>> {
        let graph = self.active()?;
        Ok(graph
            .nodes
            .iter()
            .filter_map(|node| {
                let placed = graph.layout.node(node.id)?;
                Some(PlacedNode {
                    node: node.clone(),
                    x: placed.x,
                    y: placed.y,
                })
            })
            .collect())
    }

    pub fn placed_links(&self) -> Result<Vec<PlacedLink>> {
        let graph = self.active()?;
        Ok(graph
            .links
            .iter()
            .filter_map(|link| graph.place_link(link))
            .collect())
    }

    pub fn render_svg(&self) -> Result<String> {
        let graph = self.active()?;
        let config = &graph.config;
        let mut svg = String::new();
        let _ = writeln!(
            svg,
            "<svg xmlns='http://www.w3.org/2000/svg' width='{w}' height='{h}' viewBox='0 0 {w} {h}' class='bargain-graph'>",
            w = num(config.width),
            h = num(config.height)
        );

        let _ = writeln!(svg, "  <defs>");
        for kind in [LinkKind::FromBargain, LinkKind::ToBargain] {
            let _ = writeln!(
                svg,
                "    <marker id='{}' viewBox='-0 -5 10 10' refX='5' refY='0' orient='auto' markerWidth='8' markerHeight='8' xoverflow='visible'><path d='{MARKER_PATH}' fill='red' stroke='none'/></marker>",
                kind.as_str()
            );
        }
        let _ = writeln!(svg, "  </defs>");

        let _ = writeln!(svg, "  <g class='links'>");
        for link in graph.links.iter().filter_map(|link| graph.place_link(link)) {
            let dash = if link.accepted {
                ""
            } else {
                " stroke-dasharray='4 2'"
            };
            let marker = match link.kind {
                LinkKind::FromBargain => " marker-end='url(#fromb)'",
                LinkKind::ToBargain => "",
            };
            let _ = writeln!(
                svg,
                "    <path class='{}' d='{}' fill='none' stroke-width='1.5px' stroke='{LINK_STROKE}'{dash}{marker}/>",
                link.class(),
                link.path()
            );
        }
        let _ = writeln!(svg, "  </g>");

        let placed = self.placed_nodes()?;
        let _ = writeln!(svg, "  <g class='nodes'>");
        for node in &placed {
            let _ = writeln!(
                svg,
                "    <circle class='{}' r='{}' cx='{}' cy='{}' fill='{}'><title>{}</title></circle>",
                node.node.kind.as_str(),
                num(node.node.radius),
                num(node.x),
                num(node.y),
                escape_text(&node.node.fill),
                escape_text(&node.node.label)
            );
        }
        let _ = writeln!(svg, "  </g>");

        let _ = writeln!(svg, "  <g class='texts'>");
        for node in placed.iter().filter(|node| !node.node.label.is_empty()) {
            let _ = writeln!(
                svg,
                "    <text x='{}' y='{}' font-size='{}' dx='15' dy='4'>{}</text>",
                num(node.x),
                num(node.y),
                num(config.label_font_size),
                escape_text(&node.node.label)
            );
        }
        let _ = writeln!(svg, "  </g>");
        let _ = writeln!(svg, "</svg>");
        Ok(svg)
    }
}

impl ActiveGraph {
    fn radius(&self, id: NodeId) -> f64 {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .map(|node| node.radius)
            .unwrap_or(0.0)
    }

    fn place_link(&self, link: &Link) -> Option<PlacedLink> {
        let source = self.layout.node(link.source)?;
        let target = self.layout.node(link.target)?;
        let dx = target.x - source.x;
        let dy = target.y - source.y;
        let length = (dx * dx + dy * dy).sqrt();
        let (offset_x, offset_y) = if length > 0.0 {
            let radius = self.radius(link.target);
            (dx * radius / length, dy * radius / length)
        } else {
            (0.0, 0.0)
        };
        Some(PlacedLink {
            kind: link.kind,
            accepted: link.accepted,
            to_self: link.to_self,
            from: (source.x, source.y),
            to: (target.x - offset_x, target.y - offset_y),
            arc_radius: link.to_self.then_some(length),
        })
    }
}
