//! Linear range translation between hardware and logical units.

/// Translate `value` from `[old_min, old_max]` into `[new_min, new_max]`.
///
/// The input is clamped into the old range first, and the result is rounded to
/// one decimal place (half-up). The new range may be reversed
/// (`new_min > new_max`) to express an inverted scale.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::remap;
///
/// assert_eq!(remap(50.0, 0.0, 100.0, 0.0, 360.0), 180.0);
/// assert_eq!(remap(150.0, 0.0, 100.0, 0.0, 10.0), 10.0);
/// assert_eq!(remap(-5.0, 0.0, 100.0, 0.0, 10.0), 0.0);
/// assert_eq!(remap(128.0, 0.0, 255.0, 0.0, 100.0), 50.2);
/// ```
pub fn remap(value: f64, old_min: f64, old_max: f64, new_min: f64, new_max: f64) -> f64 {
    let (lo, hi) = if old_min <= old_max {
        (old_min, old_max)
    } else {
        (old_max, old_min)
    };
    if hi == lo {
        return round_tenths(new_min);
    }
    let clamped = value.clamp(lo, hi);
    let scaled = new_min + (clamped - old_min) * (new_max - new_min) / (old_max - old_min);
    round_tenths(scaled)
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_is_monotonic() {
        let mut last = f64::MIN;
        for x in -20..=120 {
            let y = remap(x as f64, 0.0, 100.0, 0.0, 360.0);
            assert!(y >= last, "remap({x}) = {y} decreased from {last}");
            last = y;
        }
    }

    #[test]
    fn test_remap_clamps() {
        assert_eq!(remap(-1.0, 0.0, 100.0, 0.0, 360.0), 0.0);
        assert_eq!(remap(101.0, 0.0, 100.0, 0.0, 360.0), 360.0);
        assert_eq!(remap(150.0, 0.0, 100.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn test_remap_rounds_half_up() {
        // 1/255 * 100 = 0.392...
        assert_eq!(remap(1.0, 0.0, 255.0, 0.0, 100.0), 0.4);
        // 0.25 rounds up, not to even
        assert_eq!(remap(25.0, 0.0, 100.0, 0.0, 1.0), 0.3);
    }

    #[test]
    fn test_remap_reversed_target() {
        assert_eq!(remap(0.0, 0.0, 255.0, 500.0, 153.0), 500.0);
        assert_eq!(remap(255.0, 0.0, 255.0, 500.0, 153.0), 153.0);
    }

    #[test]
    fn test_remap_degenerate_source() {
        assert_eq!(remap(7.0, 5.0, 5.0, 0.0, 100.0), 0.0);
    }
}
