//! Tab focus navigation with wraparound.
//!
//! Both functions are total: when no other slot qualifies they return the
//! slot they would fall back to, never an unbound one (given slot 0 is bound).

use settings::constants::slots::{COUNT, PRIMARY};

/// First bound slot after `from`, wrapping around. Falls back to the primary slot.
pub fn next(from: usize, is_bound: impl Fn(usize) -> bool) -> usize {
    (1..COUNT)
        .map(|step| (from + step) % COUNT)
        .find(|&slot| is_bound(slot))
        .unwrap_or(PRIMARY)
}

/// First bound slot before `from`, scanning down. From the primary slot the
/// scan starts at the last slot. Falls back to `from`.
pub fn previous(from: usize, is_bound: impl Fn(usize) -> bool) -> usize {
    let base = if from == PRIMARY { COUNT - 1 } else { from };
    (0..=base)
        .rev()
        .filter(|&slot| slot != from)
        .find(|&slot| is_bound(slot))
        .unwrap_or(from)
}
