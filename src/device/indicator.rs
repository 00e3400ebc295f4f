//! Indicator color assigned to each player's device

use crate::device::ColorParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RGB color shown on a connected device, written as `#RRGGBB` in config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndicatorColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl IndicatorColor {
    pub const RED: IndicatorColor = IndicatorColor::new(0xFF, 0x00, 0x00);
    pub const BLUE: IndicatorColor = IndicatorColor::new(0x00, 0x00, 0xFF);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl FromStr for IndicatorColor {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ColorParseError {
            input: s.to_string(),
        };
        let hex = s.trim().strip_prefix('#').ok_or_else(error)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(error());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| error())
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for IndicatorColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IndicatorColor> for String {
    fn from(color: IndicatorColor) -> Self {
        color.to_string()
    }
}

impl fmt::Display for IndicatorColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}
