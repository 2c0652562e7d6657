//! Fixed-width position buckets.
//!
//! Every chart key (actor) gets a value in every bucket; keys that fall in a
//! different range hold zero there so all rows have the same length.

use std::collections::BTreeMap;

use serde::Serialize;
use smpv_schema::{Actor, ActorId, Bucket, HslColor, Turn, BUCKET_COUNT, BUCKET_WIDTH};

use crate::store::{EffectivePowerRow, PositionRow};

/// Bucket for a position: `floor(position / 10)` clamped to `[0, 9]`.
///
/// Ranges are half-open, so a boundary value belongs to the higher bucket.
/// Non-finite positions have no bucket.
pub fn bucket_index(position: f64) -> Option<usize> {
    if !position.is_finite() {
        return None;
    }
    let raw = (position / BUCKET_WIDTH).floor();
    Some(raw.clamp(0.0, (BUCKET_COUNT - 1) as f64) as usize)
}

/// One stacked series on the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartKey {
    pub actor: ActorId,
    pub label: String,
    pub color: HslColor,
}

/// Power and position of a single actor in a single turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorPower {
    pub actor: ActorId,
    pub power: Option<f64>,
    pub position: Option<f64>,
}

impl ActorPower {
    pub fn from_actor(actor: &Actor) -> Option<Self> {
        Some(Self {
            actor: actor.actor_id()?,
            power: actor.effective_power,
            position: actor.position,
        })
    }

    /// Bucket and power when both values are present.
    pub fn placement(&self) -> Option<(usize, f64)> {
        let power = self.power.filter(|power| power.is_finite())?;
        Some((bucket_index(self.position?)?, power))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinnedTurn {
    pub turn: Turn,
    pub keys: Vec<ChartKey>,
    pub buckets: Vec<Bucket>,
}

impl BinnedTurn {
    /// Places each sample's power into its bucket under the sample's key.
    /// Samples for actors without a key are ignored.
    pub fn bin(turn: Turn, keys: Vec<ChartKey>, samples: &[ActorPower]) -> Self {
        let mut buckets: Vec<Bucket> = (0..BUCKET_COUNT)
            .map(|index| Bucket::empty(index, keys.len()))
            .collect();
        let slots: BTreeMap<ActorId, usize> = keys
            .iter()
            .enumerate()
            .map(|(slot, key)| (key.actor, slot))
            .collect();

        for sample in samples {
            let Some(&slot) = slots.get(&sample.actor) else {
                continue;
            };
            if let Some((bucket, power)) = sample.placement() {
                buckets[bucket].values[slot] = power;
            }
        }

        Self {
            turn,
            keys,
            buckets,
        }
    }

    pub fn key_index(&self, actor: ActorId) -> Option<usize> {
        self.keys.iter().position(|key| key.actor == actor)
    }

    pub fn value(&self, actor: ActorId, bucket: usize) -> f64 {
        match (self.key_index(actor), self.buckets.get(bucket)) {
            (Some(slot), Some(bucket)) => bucket.values[slot],
            _ => 0.0,
        }
    }

    pub fn totals(&self) -> Vec<f64> {
        self.buckets.iter().map(Bucket::total).collect()
    }

    /// Largest bucket total of this turn (responsive axis).
    pub fn max_total(&self) -> f64 {
        self.totals().into_iter().fold(0.0, f64::max)
    }

    pub fn total_power(&self) -> f64 {
        self.buckets.iter().map(Bucket::total).sum()
    }
}

/// Power and positions for every turn of a scope, used for the fixed axis.
#[derive(Debug, Clone, Default)]
pub struct PowerHistory {
    turns: BTreeMap<Turn, Vec<ActorPower>>,
}

impl PowerHistory {
    pub fn from_rows(power: &[EffectivePowerRow], positions: &[PositionRow]) -> Self {
        let mut samples: BTreeMap<(Turn, ActorId), ActorPower> = BTreeMap::new();
        for row in power {
            samples
                .entry((row.turn, row.actor))
                .or_insert(ActorPower {
                    actor: row.actor,
                    power: None,
                    position: None,
                })
                .power = Some(row.power);
        }
        for row in positions {
            samples
                .entry((row.turn, row.actor))
                .or_insert(ActorPower {
                    actor: row.actor,
                    power: None,
                    position: None,
                })
                .position = Some(row.position);
        }

        let mut turns: BTreeMap<Turn, Vec<ActorPower>> = BTreeMap::new();
        for ((turn, _), sample) in samples {
            turns.entry(turn).or_default().push(sample);
        }
        Self { turns }
    }

    pub fn turn(&self, turn: Turn) -> &[ActorPower] {
        self.turns.get(&turn).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn bucket_totals(&self, turn: Turn) -> [f64; BUCKET_COUNT] {
        let mut totals = [0.0; BUCKET_COUNT];
        for sample in self.turn(turn) {
            if let Some((bucket, power)) = sample.placement() {
                totals[bucket] += power;
            }
        }
        totals
    }

    /// Largest single-bucket total across every recorded turn.
    pub fn highest_range(&self) -> f64 {
        self.turns
            .keys()
            .flat_map(|&turn| self.bucket_totals(turn))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: i64) -> ChartKey {
        ChartKey {
            actor: ActorId(id),
            label: format!("A{id}"),
            color: HslColor::from_power(0.0, 50.0),
        }
    }

    fn sample(id: i64, power: f64, position: f64) -> ActorPower {
        ActorPower {
            actor: ActorId(id),
            power: Some(power),
            position: Some(position),
        }
    }

    #[test]
    fn bucket_is_floor_of_tenth() {
        for (position, expected) in [
            (0.0, 0),
            (9.999, 0),
            (10.0, 1),
            (35.0, 3),
            (89.5, 8),
            (99.99, 9),
        ] {
            assert_eq!(bucket_index(position), Some(expected), "position {position}");
        }
    }

    #[test]
    fn out_of_range_positions_are_clamped() {
        assert_eq!(bucket_index(-3.0), Some(0));
        assert_eq!(bucket_index(100.0), Some(9));
        assert_eq!(bucket_index(f64::NAN), None);
    }

    #[test]
    fn power_lands_only_in_its_bucket() {
        let binned = BinnedTurn::bin(0, vec![key(1)], &[sample(1, 42.0, 35.0)]);
        for bucket in &binned.buckets {
            let expected = if bucket.index == 3 { 42.0 } else { 0.0 };
            assert_eq!(bucket.values, vec![expected]);
        }
    }

    #[test]
    fn rows_have_one_value_per_key() {
        let keys = vec![key(1), key(2), key(3)];
        let binned = BinnedTurn::bin(0, keys, &[sample(2, 5.0, 71.0)]);
        assert_eq!(binned.buckets.len(), BUCKET_COUNT);
        assert!(binned.buckets.iter().all(|bucket| bucket.values.len() == 3));
        assert_eq!(binned.value(ActorId(2), 7), 5.0);
    }

    #[test]
    fn total_matches_power_of_positioned_actors() {
        let samples = [
            sample(1, 10.0, 5.0),
            sample(2, 7.5, 55.0),
            sample(3, 2.5, 55.0),
            ActorPower {
                actor: ActorId(4),
                power: Some(100.0),
                position: None,
            },
        ];
        let binned = BinnedTurn::bin(0, vec![key(1), key(2), key(3), key(4)], &samples);
        assert_eq!(binned.total_power(), 20.0);
        assert_eq!(binned.max_total(), 10.0);
    }

    #[test]
    fn unknown_actors_are_ignored() {
        let binned = BinnedTurn::bin(0, vec![key(1)], &[sample(9, 3.0, 12.0)]);
        assert_eq!(binned.total_power(), 0.0);
    }

    #[test]
    fn highest_range_spans_all_turns() {
        let power = [
            EffectivePowerRow {
                actor: ActorId(1),
                turn: 0,
                power: 10.0,
            },
            EffectivePowerRow {
                actor: ActorId(2),
                turn: 0,
                power: 15.0,
            },
            EffectivePowerRow {
                actor: ActorId(1),
                turn: 1,
                power: 10.0,
            },
            EffectivePowerRow {
                actor: ActorId(2),
                turn: 1,
                power: 15.0,
            },
        ];
        let positions = [
            PositionRow {
                actor: ActorId(1),
                turn: 0,
                position: 12.0,
            },
            PositionRow {
                actor: ActorId(2),
                turn: 0,
                position: 80.0,
            },
            PositionRow {
                actor: ActorId(1),
                turn: 1,
                position: 44.0,
            },
            PositionRow {
                actor: ActorId(2),
                turn: 1,
                position: 40.0,
            },
        ];
        let history = PowerHistory::from_rows(&power, &positions);
        assert_eq!(history.turn_count(), 2);
        assert_eq!(history.bucket_totals(0)[1], 10.0);
        assert_eq!(history.highest_range(), 25.0);
        insta::assert_debug_snapshot!(history.bucket_totals(1), @r###"
        [
            0.0,
            0.0,
            0.0,
            0.0,
            25.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
        ]
        "###);
    }
}
