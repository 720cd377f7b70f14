//! RGB pre-rendering and human-readable color names.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// An RGB color with red, green, and blue components (0-255 each).
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Color {
    /// Create a color with the given RGB values.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// Convert hue (0-360 degrees), saturation and value (0-100 percent) to RGB.
    ///
    /// # Examples
    ///
    /// ```
    /// use tuya_lights_rs::Color;
    ///
    /// assert_eq!(Color::from_hsv(0.0, 100.0, 100.0), Color::rgb(255, 0, 0));
    /// assert_eq!(Color::from_hsv(120.0, 100.0, 100.0), Color::rgb(0, 255, 0));
    /// assert_eq!(Color::from_hsv(0.0, 0.0, 100.0), Color::rgb(255, 255, 255));
    /// ```
    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Self {
        let s = (saturation / 100.0).clamp(0.0, 1.0);
        let v = (value / 100.0).clamp(0.0, 1.0);
        let to_byte = |c: f64| (c * 255.0).round() as u8;

        if s == 0.0 {
            let gray = to_byte(v);
            return Color::rgb(gray, gray, gray);
        }

        let h = hue.rem_euclid(360.0) / 60.0;
        let i = h.floor() as i32;
        let f = h - i as f64;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match i % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };

        Color::rgb(to_byte(r), to_byte(g), to_byte(b))
    }

    /// Lowercase six-digit hex rendering, e.g. `ff8000`.
    pub fn to_hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Coarse name for a hue, as shown next to the color picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum ColorName {
    White,
    Red,
    Orange,
    Yellow,
    Chartreuse,
    Green,
    Spring,
    Cyan,
    Azure,
    Blue,
    Violet,
    Magenta,
    Rose,
}

impl ColorName {
    /// Name the color for a hue and saturation, both on a 0-100 scale.
    ///
    /// Saturation below 1 is always white. Red straddles the wheel's origin.
    ///
    /// # Examples
    ///
    /// ```
    /// use tuya_lights_rs::ColorName;
    ///
    /// assert_eq!(ColorName::from_hue_saturation(0.0, 50.0), ColorName::Red);
    /// assert_eq!(ColorName::from_hue_saturation(50.0, 50.0), ColorName::Cyan);
    /// assert_eq!(ColorName::from_hue_saturation(30.0, 0.0), ColorName::White);
    /// ```
    pub fn from_hue_saturation(hue: f64, saturation: f64) -> Self {
        if saturation < 1.0 {
            return ColorName::White;
        }
        let degrees = (hue * 3.6).round().clamp(0.0, 360.0) as u16;
        match degrees {
            0..=15 => ColorName::Red,
            16..=45 => ColorName::Orange,
            46..=75 => ColorName::Yellow,
            76..=105 => ColorName::Chartreuse,
            106..=135 => ColorName::Green,
            136..=165 => ColorName::Spring,
            166..=195 => ColorName::Cyan,
            196..=225 => ColorName::Azure,
            226..=255 => ColorName::Blue,
            256..=285 => ColorName::Violet,
            286..=315 => ColorName::Magenta,
            316..=345 => ColorName::Rose,
            _ => ColorName::Red,
        }
    }
}
