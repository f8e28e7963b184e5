//! Pure selection primitives over a set of candidate executor indices.

use kestrel_core::Executor;
use rand::{Rng, RngCore};

/// Pick one of `candidates` (indices into `executors`) with probability
/// proportional to its weight.
///
/// Weight-0 executors never win. Returns `None` when the candidate set is
/// empty or every candidate has zero weight.
pub fn weighted_pick(
    executors: &[Executor],
    candidates: &[usize],
    rng: &mut dyn RngCore,
) -> Option<usize> {
    let total: u64 = candidates
        .iter()
        .filter_map(|&i| executors.get(i))
        .map(|e| u64::from(e.weight))
        .sum();
    if total == 0 {
        return None;
    }

    let draw = rng.gen_range(0..total);
    let mut cumulative = 0u64;
    for &idx in candidates {
        let Some(executor) = executors.get(idx) else {
            continue;
        };
        cumulative += u64::from(executor.weight);
        if draw < cumulative {
            return Some(idx);
        }
    }
    None
}

/// Stable sort of `candidates` by role priority (primary first).
pub fn by_role_priority(executors: &[Executor], candidates: &mut [usize]) {
    candidates.sort_by_key(|&i| {
        executors
            .get(i)
            .map(|e| e.role.priority())
            .unwrap_or((u8::MAX, u32::MAX))
    });
}
