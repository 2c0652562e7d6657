//! Cumulative series for stacked bars.

use smpv_schema::{ActorId, StackSegment, StackSeries};

use crate::binning::BinnedTurn;

/// Stacks the binned values of `active` keys in key order.
///
/// Keys that are not active contribute nothing, so the totals always come
/// from the binned rows rather than from the previous stack.
pub fn stack(binned: &BinnedTurn, active: &[ActorId]) -> Vec<StackSeries> {
    let mut baseline = vec![0.0; binned.buckets.len()];
    let mut series = Vec::with_capacity(active.len());

    for key in binned.keys.iter().filter(|key| active.contains(&key.actor)) {
        let Some(slot) = binned.key_index(key.actor) else {
            continue;
        };
        let segments = binned
            .buckets
            .iter()
            .zip(baseline.iter_mut())
            .map(|(bucket, low)| {
                let value = bucket.values[slot];
                let segment = StackSegment {
                    bucket: bucket.index,
                    low: *low,
                    high: *low + value,
                };
                *low = segment.high;
                segment
            })
            .collect();
        series.push(StackSeries {
            actor: key.actor,
            label: key.label.clone(),
            color: key.color,
            segments,
        });
    }
    series
}

/// Height of every stacked bar.
pub fn stack_totals(series: &[StackSeries], buckets: usize) -> Vec<f64> {
    match series.last() {
        Some(top) => top.segments.iter().map(|segment| segment.high).collect(),
        None => vec![0.0; buckets],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{ActorPower, ChartKey};
    use smpv_schema::{HslColor, BUCKET_COUNT};

    fn binned() -> BinnedTurn {
        let keys = (1..=3)
            .map(|id| ChartKey {
                actor: ActorId(id),
                label: format!("A{id}"),
                color: HslColor::from_power(10.0, 50.0),
            })
            .collect();
        let samples = [
            (1, 4.0, 12.0),
            (2, 6.0, 15.0),
            (3, 9.0, 91.0),
        ]
        .map(|(id, power, position)| ActorPower {
            actor: ActorId(id),
            power: Some(power),
            position: Some(position),
        });
        BinnedTurn::bin(0, keys, &samples)
    }

    #[test]
    fn segments_accumulate_in_key_order() {
        let binned = binned();
        let series = stack(&binned, &[ActorId(1), ActorId(2), ActorId(3)]);
        assert_eq!(series.len(), 3);
        let second = &series[1].segments[1];
        assert_eq!((second.low, second.high), (4.0, 10.0));
        assert_eq!(second.value(), 6.0);
        assert_eq!(series[2].segments[9].low, 0.0);
        assert_eq!(series[2].segments[9].high, 9.0);
    }

    #[test]
    fn top_series_matches_bucket_totals() {
        let binned = binned();
        let series = stack(&binned, &[ActorId(1), ActorId(2), ActorId(3)]);
        assert_eq!(stack_totals(&series, BUCKET_COUNT), binned.totals());
    }

    #[test]
    fn inactive_keys_are_left_out() {
        let binned = binned();
        let series = stack(&binned, &[ActorId(2), ActorId(3)]);
        assert_eq!(series.len(), 2);
        let totals = stack_totals(&series, BUCKET_COUNT);
        assert_eq!(totals[1], 6.0);
        assert_eq!(totals[9], 9.0);
    }

    #[test]
    fn empty_stack_has_zero_totals() {
        let binned = binned();
        assert_eq!(stack_totals(&stack(&binned, &[]), BUCKET_COUNT), vec![0.0; 10]);
    }
}
