//! Pure traffic-distribution arithmetic. No I/O;
//! every invariant here is checked by property tests in this module.

use predictor_common::{Error, PredictorId, Result};
use std::collections::HashMap;

/// `redistribute(current, target_id, target_value)`.
pub fn redistribute(
    current: &HashMap<PredictorId, u32>,
    target_id: &str,
    target_value: u32,
) -> Result<HashMap<PredictorId, u32>> {
    if target_value > 100 {
        return Err(Error::InvalidTraffic(format!(
            "target_value {target_value} out of range [0, 100]"
        )));
    }
    let current_target = *current
        .get(target_id)
        .ok_or_else(|| Error::UnknownPredictor(target_id.to_string()))?;

    let delta = target_value as i64 - current_target as i64;
    if delta == 0 {
        return Ok(current.clone());
    }

    let others: HashMap<PredictorId, u32> = current
        .iter()
        .filter(|(id, _)| id.as_str() != target_id)
        .map(|(id, v)| (id.clone(), *v))
        .collect();

    if others.is_empty() {
        let mut result = HashMap::new();
        result.insert(target_id.to_string(), target_value);
        return Ok(result);
    }

    let spread_result = spread(&others, -delta);

    let mut result = spread_result;
    result.insert(target_id.to_string(), target_value);
    reconcile(&mut result, &others, target_id);
    Ok(result)
}

/// `spread(others, -delta)` — distributes `-delta` across `others` in
/// proportion to their current value.
fn spread(others: &HashMap<PredictorId, u32>, delta: i64) -> HashMap<PredictorId, u32> {
    let contributing: HashMap<&PredictorId, u32> =
        others.iter().filter(|(_, v)| **v > 0).map(|(id, v)| (id, *v)).collect();
    let total_contributing: u64 = contributing.values().map(|v| *v as u64).sum();

    if total_contributing == 0 {
        return others.clone();
    }

    let mut result = others.clone();
    for (id, v) in contributing {
        let adjustment = round_half_to_even(delta.unsigned_abs() as f64 * v as f64 / total_contributing as f64);
        let new_v = if delta < 0 {
            // giving traffic to target: others lose
            (v as i64 - adjustment).max(0) as u32
        } else {
            // pulling traffic back to target: others gain
            (v as i64 + adjustment) as u32
        };
        result.insert(id.clone(), new_v);
    }
    result
}

/// Fixes rounding drift so `Σ result == 100`, adding/subtracting the
/// residue to the contributor with the largest pre-adjustment value
/// (deterministic tie-break: lexicographically smallest predictor id).
fn reconcile(result: &mut HashMap<PredictorId, u32>, pre_adjustment_others: &HashMap<PredictorId, u32>, target_id: &str) {
    let sum: i64 = result.values().map(|v| *v as i64).sum();
    let residue = 100 - sum;
    if residue == 0 {
        return;
    }

    let mut candidates: Vec<(&PredictorId, u32)> = pre_adjustment_others
        .iter()
        .filter(|(id, _)| id.as_str() != target_id)
        .map(|(id, v)| (id, *v))
        .collect();
    candidates.sort_by(|(id_a, v_a), (id_b, v_b)| v_b.cmp(v_a).then_with(|| id_a.cmp(id_b)));

    if let Some((winner_id, _)) = candidates.first() {
        let winner_id = (*winner_id).clone();
        let current = *result.get(&winner_id).unwrap_or(&0) as i64;
        let adjusted = (current + residue).clamp(0, 100) as u32;
        result.insert(winner_id, adjusted);
    }
}

/// Round-half-to-even ("banker's rounding").
fn round_half_to_even(x: f64) -> i64 {
    let floor = x.floor();
    let remainder = x - floor;
    let floor_i = floor as i64;
    if (remainder - 0.5).abs() < 1e-9 {
        if floor_i % 2 == 0 {
            floor_i
        } else {
            floor_i + 1
        }
    } else if remainder > 0.5 {
        floor_i + 1
    } else {
        floor_i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, u32)]) -> HashMap<PredictorId, u32> {
        pairs.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn target_value_out_of_range_fails() {
        let current = map(&[("v1", 100)]);
        let err = redistribute(&current, "v1", 101).unwrap_err();
        assert!(matches!(err, Error::InvalidTraffic(_)));
    }

    #[test]
    fn unknown_target_fails() {
        let current = map(&[("v1", 100)]);
        let err = redistribute(&current, "v2", 50).unwrap_err();
        assert!(matches!(err, Error::UnknownPredictor(_)));
    }

    #[test]
    fn no_op_when_value_unchanged() {
        let current = map(&[("v1", 60), ("v2", 40)]);
        let result = redistribute(&current, "v1", 60).unwrap();
        assert_eq!(result, current);
    }

    #[test]
    fn scenario_shift_newest_first_call() {
        // seed {v1: 100, v2: 0}; shift v2 to 5.
        let current = map(&[("v1", 100), ("v2", 0)]);
        let result = redistribute(&current, "v2", 5).unwrap();
        assert_eq!(result.get("v2"), Some(&5));
        assert_eq!(result.get("v1"), Some(&95));
        assert_eq!(result.values().sum::<u32>(), 100);
    }

    #[test]
    fn scenario_deactivate() {
        // {v1:50, v2:50}; deactivate v1 -> {v1:0, v2:100}.
        let current = map(&[("v1", 50), ("v2", 50)]);
        let result = redistribute(&current, "v1", 0).unwrap();
        assert_eq!(result.get("v1"), Some(&0));
        assert_eq!(result.get("v2"), Some(&100));
    }

    #[test]
    fn scenario_set_with_rounding() {
        // {v1:33, v2:33, v3:34}; set v1 to 50 -> v2+v3 == 50, each within ±1 of proportional share.
        let current = map(&[("v1", 33), ("v2", 33), ("v3", 34)]);
        let result = redistribute(&current, "v1", 50).unwrap();
        assert_eq!(result.get("v1"), Some(&50));
        let v2 = *result.get("v2").unwrap();
        let v3 = *result.get("v3").unwrap();
        assert_eq!(v2 + v3, 50);
        assert!((v2 as i64 - 25).abs() <= 1);
        assert!((v3 as i64 - 25).abs() <= 1);
        assert_eq!(result.values().sum::<u32>(), 100);
    }

    #[test]
    fn sum_always_conserved_across_random_shifts() {
        let mut current = map(&[("a", 20), ("b", 30), ("c", 50)]);
        for target_value in [10u32, 90, 0, 100, 25] {
            current = redistribute(&current, "a", target_value).unwrap();
            assert_eq!(current.values().sum::<u32>(), 100);
            assert!(current.values().all(|v| *v <= 100));
        }
    }

    proptest::proptest! {
        /// Traffic conservation: for any sequence of targets
        /// drawn against a fixed three-predictor distribution, every
        /// successful `redistribute` leaves Σ == 100 and every value in
        /// [0, 100].
        #[test]
        fn conservation_holds_for_arbitrary_target_sequences(
            targets in proptest::collection::vec(0u32..=100, 1..20),
        ) {
            let mut current = map(&[("a", 34), ("b", 33), ("c", 33)]);
            for target_value in targets {
                current = redistribute(&current, "a", target_value).unwrap();
                prop_assert_eq!(current.values().sum::<u32>(), 100);
                prop_assert!(current.values().all(|v| *v <= 100));
            }
        }
    }
}
