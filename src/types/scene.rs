//! Color modes and built-in effects.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which channel set currently drives the bulb.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ColorMode {
    /// Hue/saturation/value color.
    #[strum(serialize = "RGB")]
    #[serde(rename = "RGB")]
    Rgb,
    /// Tunable white.
    #[strum(serialize = "CT")]
    #[serde(rename = "CT")]
    Ct,
}

/// A built-in effect, addressed by its 1-based slot.
///
/// The bulb names effects by mode value: slot `n` is `scene_n`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Effect(u8);

impl Effect {
    const PREFIX: &'static str = "scene";

    /// Returns None if `slot` is outside `1..=count`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tuya_lights_rs::Effect;
    ///
    /// assert!(Effect::create(1, 4).is_some());
    /// assert!(Effect::create(0, 4).is_none());
    /// assert!(Effect::create(5, 4).is_none());
    /// ```
    pub fn create(slot: u8, count: u8) -> Option<Self> {
        (1..=count).contains(&slot).then_some(Effect(slot))
    }

    pub fn slot(&self) -> u8 {
        self.0
    }

    /// Mode datapoint value selecting this effect.
    pub fn mode_value(&self) -> String {
        format!("{}_{}", Self::PREFIX, self.0)
    }

    /// Whether a mode datapoint value selects an effect.
    pub fn is_effect_mode(mode: &str) -> bool {
        mode.starts_with(Self::PREFIX)
    }

    /// Parse the slot back out of a mode value such as `scene_3`.
    pub fn from_mode_value(mode: &str) -> Option<Self> {
        mode.strip_prefix(Self::PREFIX)?
            .strip_prefix('_')?
            .parse()
            .ok()
            .map(Effect)
    }

    /// Next slot, wrapping after `count`.
    pub fn next(current: Option<Self>, count: u8) -> Option<Self> {
        let slot = match current {
            Some(Effect(n)) if n < count => n + 1,
            _ => 1,
        };
        Self::create(slot, count)
    }

    /// Previous slot, wrapping before 1.
    pub fn previous(current: Option<Self>, count: u8) -> Option<Self> {
        let slot = match current {
            Some(Effect(n)) if n > 1 && n <= count => n - 1,
            _ => count,
        };
        Self::create(slot, count)
    }
}
