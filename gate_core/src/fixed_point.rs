//! Integer rounding helpers for the fixed-point PI controller.
//!
//! The controller keeps its gains scaled by 1000 and works in `i64`
//! intermediates so the hot path never touches floating point.

/// Floor division (rounds toward negative infinity). `d` must be non-zero.
#[inline]
pub const fn div_floor(n: i64, d: i64) -> i64 {
    let q = n / d;
    if (n % d != 0) && ((n < 0) != (d < 0)) {
        q - 1
    } else {
        q
    }
}

/// Ceiling division (rounds toward positive infinity). `d` must be non-zero.
#[inline]
pub const fn div_ceil(n: i64, d: i64) -> i64 {
    let q = n / d;
    if (n % d != 0) && ((n < 0) == (d < 0)) {
        q + 1
    } else {
        q
    }
}

/// Saturating narrow of an `i64` into `i32`.
#[inline]
pub fn saturate_i32(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(7, 2, 3, 4)]
    #[case(-7, 2, -4, -3)]
    #[case(6, 3, 2, 2)]
    #[case(-6, 3, -2, -2)]
    #[case(7, -2, -4, -3)]
    #[case(0, 5, 0, 0)]
    fn floor_and_ceil(#[case] n: i64, #[case] d: i64, #[case] floor: i64, #[case] ceil: i64) {
        assert_eq!(div_floor(n, d), floor);
        assert_eq!(div_ceil(n, d), ceil);
    }

    #[test]
    fn saturate_extremes() {
        assert_eq!(saturate_i32(i64::MAX), i32::MAX);
        assert_eq!(saturate_i32(i64::MIN), i32::MIN);
        assert_eq!(saturate_i32(-12), -12);
    }
}
