//! Common time/period helpers for gate_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Number of whole `period_ms` ticks in `secs` seconds, at least one.
///
/// Used to arm countdown timers that are decremented once per loop period.
#[inline]
pub fn ticks_for_secs(secs: u32, period_ms: u64) -> u32 {
    let ticks = u64::from(secs) * MILLIS_PER_SEC / period_ms.max(1);
    u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
}

/// Inclusive range test used for every position comparison.
#[inline]
pub fn pos_in_range(pos: i32, min: i32, max: i32) -> bool {
    (min..=max).contains(&pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3, 100, 30)]
    #[case(1, 100, 10)]
    #[case(2, 100, 20)]
    #[case(0, 100, 1)]
    #[case(1, 0, 1000)]
    fn ticks_for_secs_cases(#[case] secs: u32, #[case] period_ms: u64, #[case] want: u32) {
        assert_eq!(ticks_for_secs(secs, period_ms), want);
    }

    #[test]
    fn pos_in_range_is_inclusive() {
        assert!(pos_in_range(-5, -5, 5));
        assert!(pos_in_range(5, -5, 5));
        assert!(!pos_in_range(6, -5, 5));
    }
}
