//! Canonical device state and the change-detection gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{Attribute, AttributeValue, DeviceEvent};
use crate::types::{ColorMode, Effect, Switch};

/// Last known value of every attribute reported for a bulb.
///
/// Events only surface when they change a value held here, so replaying an
/// identical state produces nothing.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::{DeviceEvent, DeviceState, Switch};
///
/// let mut state = DeviceState::default();
/// assert!(state.record(DeviceEvent::switch(Switch::On)).is_some());
/// assert!(state.record(DeviceEvent::switch(Switch::On)).is_none());
/// assert_eq!(state.switch(), Some(Switch::On));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceState {
    values: BTreeMap<Attribute, AttributeValue>,
}

impl DeviceState {
    /// Store `event` if it changes the attribute, returning it back when it did.
    pub fn record(&mut self, event: DeviceEvent) -> Option<DeviceEvent> {
        if self.values.get(&event.attribute) == Some(&event.value) {
            return None;
        }
        self.values.insert(event.attribute, event.value.clone());
        Some(event)
    }

    /// Run a batch of candidates through [`DeviceState::record`].
    pub fn record_all(&mut self, events: impl IntoIterator<Item = DeviceEvent>) -> Vec<DeviceEvent> {
        events.into_iter().filter_map(|e| self.record(e)).collect()
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttributeValue> {
        self.values.get(&attribute)
    }

    pub fn switch(&self) -> Option<Switch> {
        match self.get(Attribute::Switch) {
            Some(AttributeValue::Switch(s)) => Some(*s),
            _ => None,
        }
    }

    pub fn color_mode(&self) -> Option<ColorMode> {
        match self.get(Attribute::ColorMode) {
            Some(AttributeValue::Mode(m)) => Some(*m),
            _ => None,
        }
    }

    pub fn hue(&self) -> Option<f64> {
        self.number(Attribute::Hue)
    }

    pub fn saturation(&self) -> Option<f64> {
        self.number(Attribute::Saturation)
    }

    pub fn level(&self) -> Option<f64> {
        self.number(Attribute::Level)
    }

    pub fn color_temperature(&self) -> Option<u32> {
        self.number(Attribute::ColorTemperature).map(|k| k as u32)
    }

    pub fn effect_name(&self) -> Option<&str> {
        match self.get(Attribute::EffectName) {
            Some(AttributeValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// The effect slot currently selected, if the effect name is one.
    pub fn effect(&self) -> Option<Effect> {
        self.effect_name().and_then(Effect::from_mode_value)
    }

    fn number(&self, attribute: Attribute) -> Option<f64> {
        match self.get(attribute) {
            Some(AttributeValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
