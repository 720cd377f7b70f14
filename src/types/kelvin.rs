//! Color temperature conversions.

/// Coolest temperature the hardware scale represents (about 6535K).
pub const MIREDS_MIN: f64 = 153.0;
/// Warmest temperature the hardware scale represents (2000K).
pub const MIREDS_MAX: f64 = 500.0;

/// Convert Kelvin to mireds, clamped to the hardware scale.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::kelvin_to_mireds;
///
/// assert_eq!(kelvin_to_mireds(4000), 250.0);
/// assert_eq!(kelvin_to_mireds(10000), 153.0);
/// assert_eq!(kelvin_to_mireds(1000), 500.0);
/// ```
pub fn kelvin_to_mireds(kelvin: u32) -> f64 {
    if kelvin == 0 {
        return MIREDS_MAX;
    }
    (1_000_000.0 / kelvin as f64).clamp(MIREDS_MIN, MIREDS_MAX)
}

/// Convert mireds to Kelvin, rounding down.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::mireds_to_kelvin;
///
/// assert_eq!(mireds_to_kelvin(250.0), 4000);
/// assert_eq!(mireds_to_kelvin(153.0), 6535);
/// ```
pub fn mireds_to_kelvin(mireds: f64) -> u32 {
    if mireds <= 0.0 {
        return 0;
    }
    (1_000_000.0 / mireds).floor() as u32
}
