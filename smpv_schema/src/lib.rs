//! Shared record types for the SMP viewer.
//!
//! These are the typed shapes that database rows are decoded into and that
//! the chart and graph renderers consume. They carry no behaviour beyond
//! small derivations (colors, bucket bounds).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of fixed-width position buckets on the chart's x axis.
pub const BUCKET_COUNT: usize = 10;
/// Width of a single position bucket.
pub const BUCKET_WIDTH: f64 = 10.0;
/// Upper end of the position scale.
pub const POSITION_DOMAIN_MAX: f64 = BUCKET_COUNT as f64 * BUCKET_WIDTH;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DimensionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BargainId(pub i64);

impl fmt::Display for BargainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discrete simulation step (`Turn_t`).
pub type Turn = u32;

/// Graph node identity. Actors and bargain events come from different id
/// spaces in the database, so they are kept apart here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Actor(ActorId),
    Bargain(BargainId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Actor(id) => write!(f, "actor-{}", id),
            NodeId::Bargain(id) => write!(f, "bargain-{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Persistent stakeholder described in `ActorDescription`.
    Actor,
    /// Transient node standing for one bargain of the current turn.
    Bargain,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Actor => "actor",
            ActorKind::Bargain => "bargain",
        }
    }
}

/// A node of the per-turn working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: NodeId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub kind: ActorKind,
    /// Capability x salience on the viewed dimension, when known this turn.
    pub effective_power: Option<f64>,
    /// Position on the 0-100 scale, when known this turn.
    pub position: Option<f64>,
}

impl Actor {
    pub fn persistent(id: ActorId, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: NodeId::Actor(id),
            label: label.into(),
            description: description.into(),
            kind: ActorKind::Actor,
            effective_power: None,
            position: None,
        }
    }

    pub fn bargain(id: BargainId) -> Self {
        Self {
            id: NodeId::Bargain(id),
            label: String::new(),
            description: String::new(),
            kind: ActorKind::Bargain,
            effective_power: None,
            position: None,
        }
    }

    pub fn actor_id(&self) -> Option<ActorId> {
        match self.id {
            NodeId::Actor(id) => Some(id),
            NodeId::Bargain(_) => None,
        }
    }

    pub fn is_bargain(&self) -> bool {
        self.kind == ActorKind::Bargain
    }

    /// Power-derived color, `None` for bargain nodes.
    pub fn color(&self, power_reference: f64) -> Option<HslColor> {
        match self.kind {
            ActorKind::Actor => Some(HslColor::from_power(
                self.effective_power.unwrap_or(0.0),
                power_reference,
            )),
            ActorKind::Bargain => None,
        }
    }

    /// Drops the per-turn values while keeping identity and label.
    pub fn clear_turn_values(&mut self) {
        self.effective_power = None;
        self.position = None;
    }
}

/// Fully saturated HSL color on the green (weak) to red (strong) hue scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HslColor {
    pub hue: f64,
}

impl HslColor {
    /// `power / reference` is capped to [0, 1] and mapped to hue 120..0.
    pub fn from_power(power: f64, reference: f64) -> Self {
        let ratio = if reference > 0.0 && power.is_finite() {
            (power / reference).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            hue: (1.0 - ratio) * 120.0,
        }
    }
}

impl fmt::Display for HslColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsl({},100%,50%)", trim_float(self.hue))
    }
}

fn trim_float(value: f64) -> String {
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Initiator to bargain.
    #[serde(rename = "tob")]
    ToBargain,
    /// Bargain to receiver.
    #[serde(rename = "fromb")]
    FromBargain,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::ToBargain => "tob",
            LinkKind::FromBargain => "fromb",
        }
    }
}

/// Links are unique per (bargain, direction) within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    pub bargain: BargainId,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: LinkKind,
    pub strength: f64,
    pub distance: f64,
    pub to_self: bool,
    pub accepted: bool,
}

impl Link {
    pub fn key(&self) -> Option<LinkKey> {
        let bargain = match (self.kind, self.source, self.target) {
            (LinkKind::ToBargain, _, NodeId::Bargain(id)) => id,
            (LinkKind::FromBargain, NodeId::Bargain(id), _) => id,
            _ => return None,
        };
        Some(LinkKey {
            bargain,
            kind: self.kind,
        })
    }
}

/// One position range on the chart and the power every chart key holds in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub index: usize,
    /// One entry per chart key, zero when the key falls elsewhere.
    pub values: Vec<f64>,
}

impl Bucket {
    pub fn empty(index: usize, keys: usize) -> Self {
        Self {
            index,
            values: vec![0.0; keys],
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.index as f64 * BUCKET_WIDTH
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StackSegment {
    pub bucket: usize,
    pub low: f64,
    pub high: f64,
}

impl StackSegment {
    pub fn value(&self) -> f64 {
        self.high - self.low
    }
}

/// Cumulative intervals for one actor across all buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSeries {
    pub actor: ActorId,
    pub label: String,
    pub color: HslColor,
    pub segments: Vec<StackSegment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hue_is_capped_at_reference() {
        assert_eq!(HslColor::from_power(0.0, 50.0).hue, 120.0);
        assert_eq!(HslColor::from_power(25.0, 50.0).hue, 60.0);
        assert_eq!(HslColor::from_power(80.0, 50.0).hue, 0.0);
        assert_eq!(HslColor::from_power(-4.0, 50.0).hue, 120.0);
        assert_eq!(HslColor::from_power(25.0, 50.0).to_string(), "hsl(60,100%,50%)");
    }

    #[test]
    fn link_kinds_keep_short_wire_names() {
        let encoded = serde_json::to_string(&LinkKind::FromBargain).unwrap();
        assert_eq!(encoded, "\"fromb\"");
        assert_eq!(LinkKind::ToBargain.as_str(), "tob");
    }

    #[test]
    fn link_key_follows_bargain_end() {
        let tob = Link {
            source: NodeId::Actor(ActorId(1)),
            target: NodeId::Bargain(BargainId(9)),
            kind: LinkKind::ToBargain,
            strength: 2.0,
            distance: 50.0,
            to_self: false,
            accepted: false,
        };
        let fromb = Link {
            source: NodeId::Bargain(BargainId(9)),
            target: NodeId::Actor(ActorId(2)),
            kind: LinkKind::FromBargain,
            ..tob.clone()
        };
        assert_eq!(tob.key().unwrap().bargain, BargainId(9));
        assert_eq!(fromb.key().unwrap().kind, LinkKind::FromBargain);
    }

    #[test]
    fn bucket_bounds_and_totals() {
        let mut bucket = Bucket::empty(3, 2);
        bucket.values[1] = 42.0;
        assert_eq!(bucket.lower_bound(), 30.0);
        assert_eq!(bucket.total(), 42.0);
    }
}
