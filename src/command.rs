//! Building datapoint maps from logical values.

use crate::config::{Function, FunctionMap};
use crate::errors::Error;
use crate::normalizer::HsvChannels;
use crate::protocol::{Datapoints, DpValue};
use crate::types::{Color, MIREDS_MAX, MIREDS_MIN, kelvin_to_mireds, remap};

type Result<T> = std::result::Result<T, Error>;

/// Mode value selecting the colour channels.
pub const MODE_COLOUR: &str = "colour";
/// Mode value selecting tunable white.
pub const MODE_WHITE: &str = "white";

/// Accumulates datapoints for one command, encoding logical values into the
/// bulb's hardware ranges.
///
/// # Examples
///
/// ```
/// use tuya_lights_rs::{CommandBuilder, DpValue, FunctionMap};
///
/// let functions = FunctionMap::default();
/// let mut builder = CommandBuilder::new(&functions);
/// builder.power(true).unwrap().brightness(100.0).unwrap();
/// let dps = builder.build();
///
/// assert_eq!(dps.get("1"), Some(&DpValue::Bool(true)));
/// assert_eq!(dps.get("3"), Some(&DpValue::Integer(255)));
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    functions: &'a FunctionMap,
    dps: Datapoints,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(functions: &'a FunctionMap) -> Self {
        CommandBuilder {
            functions,
            dps: Datapoints::new(),
        }
    }

    fn code(&self, function: Function) -> Result<String> {
        self.functions
            .code(function)
            .map(String::from)
            .ok_or_else(|| Error::invalid_argument(format!("bulb has no {function} function")))
    }

    fn set(&mut self, function: Function, value: DpValue) -> Result<&mut Self> {
        let code = self.code(function)?;
        self.dps.insert(code, value);
        Ok(self)
    }

    pub fn power(&mut self, on: bool) -> Result<&mut Self> {
        self.set(Function::Power, DpValue::Bool(on))
    }

    pub fn mode(&mut self, mode: &str) -> Result<&mut Self> {
        self.set(Function::Mode, DpValue::from(mode))
    }

    /// White brightness from a 0-100 level.
    pub fn brightness(&mut self, level: f64) -> Result<&mut Self> {
        let range = self.functions.range(Function::Brightness);
        let raw = remap(level, 0.0, 100.0, range.min, range.max);
        self.set(Function::Brightness, DpValue::Integer(range.snap(raw)))
    }

    /// White temperature from Kelvin.
    pub fn temperature(&mut self, kelvin: u32) -> Result<&mut Self> {
        let range = self.functions.range(Function::Temperature);
        let mireds = kelvin_to_mireds(kelvin);
        let raw = remap(mireds, MIREDS_MAX, MIREDS_MIN, range.min, range.max);
        self.set(Function::Temperature, DpValue::Integer(range.snap(raw)))
    }

    /// Composite colour from hue, saturation and level, each 0-100.
    ///
    /// The value is a six digit RGB pre-render followed by the hardware hue,
    /// saturation and value channels.
    pub fn colour(&mut self, hue: f64, saturation: f64, level: f64) -> Result<&mut Self> {
        let ranges = self.functions.colour_ranges();
        let channel = |value: f64, min: f64, max: f64| remap(value, 0.0, 100.0, min, max).round();

        let channels = HsvChannels {
            hue: channel(hue, ranges.h.min, ranges.h.max).clamp(0.0, f64::from(u16::MAX)) as u16,
            saturation: channel(saturation, ranges.s.min, ranges.s.max).clamp(0.0, 255.0) as u8,
            value: channel(level, ranges.v.min, ranges.v.max).clamp(0.0, 255.0) as u8,
        };
        let rgb = Color::from_hsv(hue * 3.6, saturation, level);

        self.set(
            Function::Colour,
            DpValue::Text(format!("{}{}", rgb.to_hex(), channels.to_hex())),
        )
    }

    /// Set an arbitrary datapoint code.
    pub fn raw(&mut self, code: &str, value: DpValue) -> &mut Self {
        self.dps.insert(code.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dps.is_empty()
    }

    pub fn build(self) -> Datapoints {
        self.dps
    }
}
