//! Attribute change events.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::types::{ColorMode, ColorName, Switch};

/// A logical attribute surfaced to subscribers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Attribute {
    Switch,
    Hue,
    Saturation,
    Level,
    ColorTemperature,
    ColorMode,
    ColorName,
    EffectName,
    Retries,
    Errors,
}

/// Value carried by an attribute event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Switch(Switch),
    Number(f64),
    Mode(ColorMode),
    Name(ColorName),
    Text(String),
    Count(u64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Switch(s) => write!(f, "{s}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Mode(m) => write!(f, "{m}"),
            AttributeValue::Name(n) => write!(f, "{n}"),
            AttributeValue::Text(t) => write!(f, "{t}"),
            AttributeValue::Count(c) => write!(f, "{c}"),
        }
    }
}

/// A change to one attribute of one bulb.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::{Attribute, DeviceEvent};
///
/// let event = DeviceEvent::level(50.0);
/// assert_eq!(event.attribute, Attribute::Level);
/// assert_eq!(event.to_string(), "level: 50");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub attribute: Attribute,
    pub value: AttributeValue,
}

impl DeviceEvent {
    pub fn new(attribute: Attribute, value: AttributeValue) -> Self {
        DeviceEvent { attribute, value }
    }

    pub fn switch(switch: Switch) -> Self {
        Self::new(Attribute::Switch, AttributeValue::Switch(switch))
    }

    pub fn hue(hue: f64) -> Self {
        Self::new(Attribute::Hue, AttributeValue::Number(hue))
    }

    pub fn saturation(saturation: f64) -> Self {
        Self::new(Attribute::Saturation, AttributeValue::Number(saturation))
    }

    pub fn level(level: f64) -> Self {
        Self::new(Attribute::Level, AttributeValue::Number(level))
    }

    pub fn color_temperature(kelvin: u32) -> Self {
        Self::new(
            Attribute::ColorTemperature,
            AttributeValue::Number(f64::from(kelvin)),
        )
    }

    pub fn color_mode(mode: ColorMode) -> Self {
        Self::new(Attribute::ColorMode, AttributeValue::Mode(mode))
    }

    pub fn color_name(name: ColorName) -> Self {
        Self::new(Attribute::ColorName, AttributeValue::Name(name))
    }

    pub fn effect_name(name: &str) -> Self {
        Self::new(Attribute::EffectName, AttributeValue::Text(name.to_string()))
    }

    pub fn retries(count: u64) -> Self {
        Self::new(Attribute::Retries, AttributeValue::Count(count))
    }

    pub fn errors(count: u64) -> Self {
        Self::new(Attribute::Errors, AttributeValue::Count(count))
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.attribute, self.value)
    }
}

/// Receives every event a bulb emits, with the bulb's id.
pub type EventCallback = Box<dyn Fn(&str, &DeviceEvent) + Send + Sync + 'static>;

/// Log each event and pass it to the subscriber, if there is one.
pub(crate) fn emit(callback: Option<&EventCallback>, id: &str, events: &[DeviceEvent]) {
    for event in events {
        debug!("{id} {event}");
        if let Some(callback) = callback {
            callback(id, event);
        }
    }
}
