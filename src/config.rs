//! Persisted bulb configuration and the per-function encoding metadata.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// A device function the driver knows how to encode and decode.
///
/// This is the closed set that datapoint codes dispatch onto; a code that does
/// not map to one of these is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Function {
    Power,
    Mode,
    Brightness,
    Temperature,
    Colour,
}

/// Numeric range metadata for a scalar function.
///
/// `min`, `max` and datapoint values share one raw unit, so levels are
/// remapped between `min` and `max` directly. `scale` is the decimal
/// exponent of that unit and cancels out of the ratio; it is kept for
/// round-tripping the metadata. Encoded values land on the `step` grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub scale: u8,
    #[serde(default = "Range::default_step")]
    pub step: u32,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Range {
            min,
            max,
            scale: 0,
            step: 1,
        }
    }

    pub const fn with_step(self, step: u32) -> Self {
        Range { step, ..self }
    }

    fn default_step() -> u32 {
        1
    }

    /// Round a raw value onto the step grid that starts at `min`, staying
    /// inside the range.
    pub fn snap(&self, raw: f64) -> i64 {
        let step = f64::from(self.step.max(1));
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        let mut snapped = lo + ((raw - lo) / step).round() * step;
        if snapped > hi {
            snapped -= step;
        }
        snapped.clamp(lo, hi).round() as i64
    }
}

/// Per-channel metadata for the composite colour function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColourRanges {
    pub h: Range,
    pub s: Range,
    pub v: Range,
}

impl Default for ColourRanges {
    fn default() -> Self {
        ColourRanges {
            h: Range::new(0.0, 360.0),
            s: Range::new(0.0, 255.0),
            v: Range::new(0.0, 255.0),
        }
    }
}

/// Encoding metadata attached to a function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionValues {
    Scalar(Range),
    Composite(ColourRanges),
}

/// Hardware code and metadata for one function.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub code: String,
    #[serde(default)]
    pub values: Option<FunctionValues>,
}

impl FunctionSpec {
    pub fn new(code: &str, values: Option<FunctionValues>) -> Self {
        FunctionSpec {
            code: code.to_string(),
            values,
        }
    }
}

/// Mapping from device function to its datapoint code and metadata.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::{Function, FunctionMap};
///
/// let map = FunctionMap::default();
/// assert_eq!(map.code(Function::Brightness), Some("3"));
/// assert_eq!(map.function_for("5"), Some(Function::Colour));
/// assert_eq!(map.function_for("99"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionMap(BTreeMap<Function, FunctionSpec>);

impl Default for FunctionMap {
    fn default() -> Self {
        FunctionMap(BTreeMap::from([
            (Function::Power, FunctionSpec::new("1", None)),
            (Function::Mode, FunctionSpec::new("2", None)),
            (
                Function::Brightness,
                FunctionSpec::new("3", Some(FunctionValues::Scalar(Range::new(25.0, 255.0)))),
            ),
            (
                Function::Temperature,
                FunctionSpec::new("4", Some(FunctionValues::Scalar(Range::new(0.0, 255.0)))),
            ),
            (
                Function::Colour,
                FunctionSpec::new("5", Some(FunctionValues::Composite(ColourRanges::default()))),
            ),
        ]))
    }
}

impl FunctionMap {
    pub fn new(functions: impl IntoIterator<Item = (Function, FunctionSpec)>) -> Self {
        FunctionMap(functions.into_iter().collect())
    }

    pub fn get(&self, function: Function) -> Option<&FunctionSpec> {
        self.0.get(&function)
    }

    /// Datapoint code for a function, if the device has it.
    pub fn code(&self, function: Function) -> Option<&str> {
        self.0.get(&function).map(|spec| spec.code.as_str())
    }

    /// Which function a datapoint code belongs to.
    pub fn function_for(&self, code: &str) -> Option<Function> {
        self.0
            .iter()
            .find(|(_, spec)| spec.code == code)
            .map(|(function, _)| *function)
    }

    /// Scalar range for a function, falling back to 0-100 when unspecified.
    pub fn range(&self, function: Function) -> Range {
        match self.get(function).and_then(|spec| spec.values) {
            Some(FunctionValues::Scalar(range)) => range,
            _ => Range::new(0.0, 100.0),
        }
    }

    /// Channel ranges for the colour function.
    pub fn colour_ranges(&self) -> ColourRanges {
        match self.get(Function::Colour).and_then(|spec| spec.values) {
            Some(FunctionValues::Composite(ranges)) => ranges,
            _ => ColourRanges::default(),
        }
    }

    pub(crate) fn set_code(&mut self, function: Function, code: &str) {
        self.0
            .entry(function)
            .and_modify(|spec| spec.code = code.to_string())
            .or_insert_with(|| FunctionSpec::new(code, None));
    }
}

/// Persisted settings for one bulb.
///
/// Numeric settings are clamped into their supported ranges when read.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::BulbConfig;
///
/// let config: BulbConfig = serde_json::from_str(
///     r#"{"id": "bf01", "localKey": "0123456789abcdef", "address": "192.168.1.40", "repeat": 9}"#,
/// ).unwrap();
/// assert_eq!(config.repeat(), 5);
/// assert_eq!(config.timeout().as_secs(), 1);
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulbConfig {
    pub id: String,
    pub local_key: String,
    pub address: Option<Ipv4Addr>,
    pub power_dp: String,
    pub repeat: u8,
    pub timeout_secs: u8,
    pub heartbeat_secs: u8,
    pub effect_count: u8,
    pub functions: FunctionMap,
}

impl Default for BulbConfig {
    fn default() -> Self {
        BulbConfig {
            id: String::new(),
            local_key: String::new(),
            address: None,
            power_dp: "1".to_string(),
            repeat: Self::DEFAULT_REPEAT,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            heartbeat_secs: Self::DEFAULT_HEARTBEAT_SECS,
            effect_count: Self::DEFAULT_EFFECT_COUNT,
            functions: FunctionMap::default(),
        }
    }
}

impl BulbConfig {
    pub const DEFAULT_REPEAT: u8 = 3;
    pub const DEFAULT_TIMEOUT_SECS: u8 = 1;
    pub const DEFAULT_HEARTBEAT_SECS: u8 = 20;
    pub const DEFAULT_EFFECT_COUNT: u8 = 4;

    pub fn new(id: &str, local_key: &str, address: Option<Ipv4Addr>) -> Self {
        BulbConfig {
            id: id.to_string(),
            local_key: local_key.to_string(),
            address,
            ..Self::default()
        }
    }

    /// Attempts per command, 0-5.
    pub fn repeat(&self) -> u32 {
        u32::from(self.repeat.min(5))
    }

    /// Per-attempt acknowledgment window, 1-5 seconds.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_secs.clamp(1, 5)))
    }

    /// Heartbeat interval, or None when disabled.
    pub fn heartbeat(&self) -> Option<Duration> {
        match self.heartbeat_secs.min(60) {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    /// Number of built-in effects, 0-9.
    pub fn effect_count(&self) -> u8 {
        self.effect_count.min(9)
    }

    /// The function map with the configured power code applied.
    pub fn function_map(&self) -> FunctionMap {
        let mut map = self.functions.clone();
        map.set_code(Function::Power, &self.power_dp);
        map
    }
}
