//! Force-directed layout for the bargaining graph.
//!
//! Follows the usual velocity-Verlet style simulation: every tick decays
//! `alpha` towards zero, lets each force add to node velocities, then damps
//! the velocities and moves the nodes. Forces, in application order:
//! - link springs with a per-link rest distance and strength, split between
//!   the endpoints by degree
//! - many-body charge between every pair of nodes (exact, no quadtree)
//! - centering, which translates the whole graph so its mean sits on the
//!   canvas center
//!
//! The simulation is stepped cooperatively; it never runs on its own.
//!
//! ```ignore
//! let mut layout = ForceLayout::new(LayoutConfig::from_graph_config(&config), seed);
//! layout.add_node(a);
//! layout.add_node(b);
//! layout.add_link(a, b, 2.0, 50.0);
//! while layout.tick() {
//!     draw(layout.nodes());
//! }
//! ```

use std::{collections::HashMap, f64::consts::PI};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smpv_schema::NodeId;

use crate::config::GraphConfig;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Many-body strength; negative repels.
    pub charge_strength: f64,
    /// Fraction of velocity removed every tick.
    pub velocity_decay: f64,
    /// The simulation is at rest once alpha drops below this.
    pub alpha_min: f64,
    pub alpha_decay: f64,
    /// Point the centering force pulls the mean position to.
    pub center: (f64, f64),
}

impl LayoutConfig {
    pub fn from_graph_config(config: &GraphConfig) -> Self {
        Self {
            charge_strength: config.charge_strength,
            velocity_decay: config.velocity_decay,
            alpha_min: config.alpha_min,
            alpha_decay: config.alpha_decay(),
            center: (config.width / 2.0, config.height / 2.0),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::from_graph_config(&GraphConfig::default())
    }
}

// =============================================================================
// NODES AND LINKS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    vx: f64,
    vy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LayoutLink {
    source: usize,
    target: usize,
    strength: f64,
    distance: f64,
}

// Spacing of the initial sunflower arrangement.
const INITIAL_RADIUS: f64 = 10.0;
// Distances below 1px are softened in the charge force.
const DISTANCE_MIN2: f64 = 1.0;

// =============================================================================
// FORCE LAYOUT
// =============================================================================

#[derive(Debug, Clone)]
pub struct ForceLayout {
    nodes: Vec<LayoutNode>,
    node_index: HashMap<NodeId, usize>,
    links: Vec<LayoutLink>,
    degree: Vec<usize>,
    config: LayoutConfig,
    alpha: f64,
    ticks: u32,
    rng: ChaCha8Rng,
}

impl ForceLayout {
    pub fn new(config: LayoutConfig, seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            links: Vec::new(),
            degree: Vec::new(),
            config,
            alpha: 1.0,
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    // =========================================================================
    // NODE MANAGEMENT
    // =========================================================================

    /// Adds a node on the next phyllotaxis slot around the center. Adding an
    /// id twice keeps the first node.
    pub fn add_node(&mut self, id: NodeId) {
        if self.node_index.contains_key(&id) {
            return;
        }
        let index = self.nodes.len();
        let radius = INITIAL_RADIUS * (0.5 + index as f64).sqrt();
        let angle = index as f64 * PI * (3.0 - 5f64.sqrt());
        let (cx, cy) = self.config.center;
        self.nodes.push(LayoutNode {
            id,
            x: cx + radius * angle.cos(),
            y: cy + radius * angle.sin(),
            vx: 0.0,
            vy: 0.0,
        });
        self.degree.push(0);
        self.node_index.insert(id, index);
    }

    /// Returns `false` when either endpoint is not in the layout.
    pub fn add_link(&mut self, source: NodeId, target: NodeId, strength: f64, distance: f64) -> bool {
        let (Some(&source), Some(&target)) =
            (self.node_index.get(&source), self.node_index.get(&target))
        else {
            return false;
        };
        self.degree[source] += 1;
        self.degree[target] += 1;
        self.links.push(LayoutLink {
            source,
            target,
            strength,
            distance,
        });
        true
    }

    pub fn node(&self, id: NodeId) -> Option<&LayoutNode> {
        self.node_index.get(&id).map(|&index| &self.nodes[index])
    }

    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    // =========================================================================
    // SIMULATION
    // =========================================================================

    pub fn is_settled(&self) -> bool {
        self.alpha < self.config.alpha_min
    }

    /// Runs one step. Returns `false` once the simulation is at rest.
    pub fn tick(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.alpha += (0.0 - self.alpha) * self.config.alpha_decay;
        self.ticks += 1;

        self.apply_links();
        self.apply_charge();
        self.apply_center();

        let keep = 1.0 - self.config.velocity_decay;
        for node in &mut self.nodes {
            node.vx *= keep;
            node.vy *= keep;
            node.x += node.vx;
            node.y += node.vy;
        }
        !self.is_settled()
    }

    /// Ticks until at rest and returns the number of ticks taken.
    pub fn settle(&mut self) -> u32 {
        let start = self.ticks;
        while self.tick() {}
        self.ticks - start
    }

    fn jiggle(&mut self) -> f64 {
        (self.rng.gen::<f64>() - 0.5) * 1e-6
    }

    fn apply_links(&mut self) {
        for i in 0..self.links.len() {
            let link = self.links[i];
            let (source, target) = (&self.nodes[link.source], &self.nodes[link.target]);
            let mut x = target.x + target.vx - source.x - source.vx;
            let mut y = target.y + target.vy - source.y - source.vy;
            if x == 0.0 {
                x = self.jiggle();
            }
            if y == 0.0 {
                y = self.jiggle();
            }
            let length = (x * x + y * y).sqrt();
            let scale = (length - link.distance) / length * self.alpha * link.strength;
            x *= scale;
            y *= scale;

            let source_degree = self.degree[link.source] as f64;
            let bias = source_degree / (source_degree + self.degree[link.target] as f64);
            let target = &mut self.nodes[link.target];
            target.vx -= x * bias;
            target.vy -= y * bias;
            let source = &mut self.nodes[link.source];
            source.vx += x * (1.0 - bias);
            source.vy += y * (1.0 - bias);
        }
    }

    fn apply_charge(&mut self) {
        let strength = self.config.charge_strength;
        if strength == 0.0 {
            return;
        }
        let count = self.nodes.len();
        for i in 0..count {
            let (mut dvx, mut dvy) = (0.0, 0.0);
            for j in 0..count {
                if i == j {
                    continue;
                }
                let mut x = self.nodes[j].x - self.nodes[i].x;
                let mut y = self.nodes[j].y - self.nodes[i].y;
                if x == 0.0 {
                    x = self.jiggle();
                }
                if y == 0.0 {
                    y = self.jiggle();
                }
                let mut l = x * x + y * y;
                if l < DISTANCE_MIN2 {
                    l = (DISTANCE_MIN2 * l).sqrt();
                }
                dvx += x * strength * self.alpha / l;
                dvy += y * strength * self.alpha / l;
            }
            self.nodes[i].vx += dvx;
            self.nodes[i].vy += dvy;
        }
    }

    fn apply_center(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        let count = self.nodes.len() as f64;
        let (sum_x, sum_y) = self
            .nodes
            .iter()
            .fold((0.0, 0.0), |(sx, sy), node| (sx + node.x, sy + node.y));
        let (cx, cy) = self.config.center;
        let shift_x = sum_x / count - cx;
        let shift_y = sum_y / count - cy;
        for node in &mut self.nodes {
            node.x -= shift_x;
            node.y -= shift_y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smpv_schema::{ActorId, BargainId};

    fn distance(layout: &ForceLayout, a: NodeId, b: NodeId) -> f64 {
        let (a, b) = (layout.node(a).unwrap(), layout.node(b).unwrap());
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }

    const A: NodeId = NodeId::Actor(ActorId(1));
    const B: NodeId = NodeId::Actor(ActorId(2));
    const G: NodeId = NodeId::Bargain(BargainId(1));

    #[test]
    fn settles_after_configured_ticks() {
        let mut layout = ForceLayout::new(LayoutConfig::default(), 1);
        layout.add_node(A);
        layout.add_node(B);
        let ticks = layout.settle();
        assert!(layout.is_settled());
        assert!((299..=301).contains(&ticks), "ticks {ticks}");
        assert!(!layout.tick());
    }

    #[test]
    fn charge_pushes_unlinked_nodes_apart() {
        let mut layout = ForceLayout::new(LayoutConfig::default(), 1);
        layout.add_node(A);
        layout.add_node(B);
        let before = distance(&layout, A, B);
        layout.settle();
        assert!(distance(&layout, A, B) > before);
    }

    #[test]
    fn link_settles_near_rest_distance() {
        let config = LayoutConfig {
            charge_strength: 0.0,
            ..LayoutConfig::default()
        };
        let mut layout = ForceLayout::new(config, 1);
        layout.add_node(A);
        layout.add_node(G);
        assert!(layout.add_link(A, G, 2.0, 50.0));
        layout.settle();
        let d = distance(&layout, A, G);
        assert!((d - 50.0).abs() < 2.0, "distance {d}");
    }

    #[test]
    fn mean_position_stays_centered() {
        let mut layout = ForceLayout::new(LayoutConfig::default(), 3);
        for id in 0..6 {
            layout.add_node(NodeId::Actor(ActorId(id)));
        }
        layout.settle();
        let count = layout.len() as f64;
        let mean_x: f64 = layout.nodes().iter().map(|node| node.x).sum::<f64>() / count;
        let mean_y: f64 = layout.nodes().iter().map(|node| node.y).sum::<f64>() / count;
        assert!((mean_x - 480.0).abs() < 1.0);
        assert!((mean_y - 300.0).abs() < 1.0);
    }

    #[test]
    fn links_to_missing_nodes_are_refused() {
        let mut layout = ForceLayout::new(LayoutConfig::default(), 1);
        layout.add_node(A);
        assert!(!layout.add_link(A, B, 2.0, 50.0));
        assert_eq!(layout.link_count(), 0);
    }

    #[test]
    fn same_seed_gives_same_layout() {
        let run = || {
            let mut layout = ForceLayout::new(LayoutConfig::default(), 42);
            layout.add_node(A);
            layout.add_node(B);
            layout.add_node(G);
            layout.add_link(A, G, 2.0, 50.0);
            layout.add_link(G, B, 2.0, 50.0);
            layout.settle();
            layout.nodes().to_vec()
        };
        assert_eq!(run(), run());
    }
}
