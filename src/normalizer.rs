//! Decoding of raw datapoints into canonical attribute events.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::config::{Function, FunctionMap};
use crate::event::DeviceEvent;
use crate::protocol::{Datapoints, DpValue};
use crate::status::DeviceState;
use crate::types::{
    ColorMode, ColorName, Effect, MIREDS_MAX, MIREDS_MIN, Switch, mireds_to_kelvin, remap,
};

/// Hardware channels packed in the trailing eight hex digits of a colour value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HsvChannels {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl HsvChannels {
    const HEX_LEN: usize = 8;

    /// Parse `rrggbbhhhhssvv`. The RGB prefix is a redundant pre-render and is
    /// ignored.
    pub fn parse(colour: &str) -> Option<Self> {
        let start = colour.len().checked_sub(Self::HEX_LEN)?;
        let tail = colour.get(start..).filter(|tail| tail.is_ascii())?;
        Some(HsvChannels {
            hue: u16::from_str_radix(&tail[0..4], 16).ok()?,
            saturation: u8::from_str_radix(&tail[4..6], 16).ok()?,
            value: u8::from_str_radix(&tail[6..8], 16).ok()?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("{:04x}{:02x}{:02x}", self.hue, self.saturation, self.value)
    }
}

/// Turn datapoints into candidate events, without change detection.
///
/// `state` supplies the current color mode when the datapoints do not imply
/// one. Unknown codes are ignored.
pub fn candidates(functions: &FunctionMap, state: &DeviceState, dps: &Datapoints) -> Vec<DeviceEvent> {
    let mut readings: BTreeMap<Function, &DpValue> = BTreeMap::new();
    for (code, value) in dps {
        match functions.function_for(code) {
            Some(function) => {
                readings.insert(function, value);
            }
            None => debug!("Ignoring unrecognized datapoint {code}={value}"),
        }
    }

    let mut events = Vec::new();

    if let Some(on) = readings.get(&Function::Power).and_then(|v| v.as_bool()) {
        events.push(DeviceEvent::switch(Switch::from(on)));
    }

    let mode = readings.get(&Function::Mode).and_then(|v| v.as_str());
    let inferred = match mode {
        Some(mode) if Effect::is_effect_mode(mode) => {
            events.push(DeviceEvent::effect_name(mode));
            None
        }
        Some("colour") => Some(ColorMode::Rgb),
        Some(_) => Some(ColorMode::Ct),
        None if readings.contains_key(&Function::Temperature) => Some(ColorMode::Ct),
        None if readings.contains_key(&Function::Colour) => Some(ColorMode::Rgb),
        None => None,
    };
    if let Some(mode) = inferred {
        events.push(DeviceEvent::color_mode(mode));
    }
    let color_mode = inferred.or_else(|| state.color_mode());

    if let Some(raw) = readings.get(&Function::Temperature).and_then(|v| v.as_f64()) {
        let range = functions.range(Function::Temperature);
        // Hardware minimum is the warmest setting.
        let mireds = remap(raw, range.min, range.max, MIREDS_MAX, MIREDS_MIN);
        events.push(DeviceEvent::color_temperature(mireds_to_kelvin(mireds)));
    }

    if color_mode == Some(ColorMode::Ct) {
        if let Some(raw) = readings.get(&Function::Brightness).and_then(|v| v.as_f64()) {
            let range = functions.range(Function::Brightness);
            events.push(DeviceEvent::level(remap(raw, range.min, range.max, 0.0, 100.0)));
        }
    }

    if color_mode == Some(ColorMode::Rgb) {
        if let Some(colour) = readings.get(&Function::Colour).and_then(|v| v.as_str()) {
            match HsvChannels::parse(colour) {
                Some(channels) => events.extend(colour_events(functions, channels)),
                None => warn!("Ignoring malformed colour datapoint {colour:?}"),
            }
        }
    }

    events
}

fn colour_events(functions: &FunctionMap, channels: HsvChannels) -> [DeviceEvent; 4] {
    let ranges = functions.colour_ranges();
    // Hardware saturation starts at 1; a reported 0 is read as 1.
    let saturation = f64::from(channels.saturation.max(1));

    let hue = remap(f64::from(channels.hue), ranges.h.min, ranges.h.max, 0.0, 100.0);
    let saturation = remap(saturation, ranges.s.min, ranges.s.max, 0.0, 100.0);
    let level = remap(f64::from(channels.value), ranges.v.min, ranges.v.max, 0.0, 100.0);

    [
        DeviceEvent::hue(hue),
        DeviceEvent::saturation(saturation),
        DeviceEvent::level(level),
        DeviceEvent::color_name(ColorName::from_hue_saturation(hue, saturation)),
    ]
}

/// Apply datapoints to `state`, returning only the attributes that changed.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::{DeviceState, FunctionMap, Datapoints, DpValue, apply_datapoints};
///
/// let functions = FunctionMap::default();
/// let mut state = DeviceState::default();
/// let dps = Datapoints::from([("1".to_string(), DpValue::Bool(true))]);
///
/// assert_eq!(apply_datapoints(&functions, &mut state, &dps).len(), 1);
/// assert!(apply_datapoints(&functions, &mut state, &dps).is_empty());
/// ```
pub fn apply_datapoints(
    functions: &FunctionMap,
    state: &mut DeviceState,
    dps: &Datapoints,
) -> Vec<DeviceEvent> {
    let events = candidates(functions, state, dps);
    state.record_all(events)
}
