//! Value types for bulb attributes and unit conversion.

mod color;
mod kelvin;
mod power;
mod remap;
mod scene;

pub use color::{Color, ColorName};
pub use kelvin::{MIREDS_MAX, MIREDS_MIN, kelvin_to_mireds, mireds_to_kelvin};
pub use power::Switch;
pub use remap::remap;
pub use scene::{ColorMode, Effect};
