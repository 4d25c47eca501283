use crate::error::{Error, Result};
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pad palette. The discriminant is the note velocity the surface expects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, ToPrimitive,
    Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Color {
    Off = 0,
    Dim = 1,
    Gray = 2,
    White = 3,
    LightRed = 4,
    Red = 5,
    DarkRed = 6,
    VeryDarkRed = 7,
    LightOrange = 8,
    Orange = 9,
    DarkOrange = 10,
    Brown = 11,
    LightYellow = 12,
    Yellow = 13,
    DarkYellow = 14,
    VeryDarkYellow = 15,
    LightLime = 16,
    Lime = 17,
    DarkLime = 18,
    VeryDarkLime = 19,
    LightGreen = 20,
    Green = 21,
    DarkGreen = 22,
    VeryDarkGreen = 23,
    LightBlue = 44,
    Blue = 45,
    DarkBlue = 46,
    VeryDarkBlue = 47,
}

const BLACK: &str = "#000000";

// (color, name, hex), ordered by velocity
const TABLE: [(Color, &str, &str); 28] = [
    (Color::Off, "OFF", "#000000"),
    (Color::Dim, "DIM", "#1E1E1E"),
    (Color::Gray, "GRAY", "#7F7F7F"),
    (Color::White, "WHITE", "#FFFFFF"),
    (Color::LightRed, "LIGHT_RED", "#FF4C4C"),
    (Color::Red, "RED", "#FF0000"),
    (Color::DarkRed, "DARK_RED", "#590000"),
    (Color::VeryDarkRed, "VERY_DARK_RED", "#190000"),
    (Color::LightOrange, "LIGHT_ORANGE", "#FFBD6C"),
    (Color::Orange, "ORANGE", "#FF5400"),
    (Color::DarkOrange, "DARK_ORANGE", "#591D00"),
    (Color::Brown, "BROWN", "#271B00"),
    (Color::LightYellow, "LIGHT_YELLOW", "#FFFF4C"),
    (Color::Yellow, "YELLOW", "#FFFF00"),
    (Color::DarkYellow, "DARK_YELLOW", "#595900"),
    (Color::VeryDarkYellow, "VERY_DARK_YELLOW", "#191900"),
    (Color::LightLime, "LIGHT_LIME", "#88FF4C"),
    (Color::Lime, "LIME", "#54FF00"),
    (Color::DarkLime, "DARK_LIME", "#1D5900"),
    (Color::VeryDarkLime, "VERY_DARK_LIME", "#142B00"),
    (Color::LightGreen, "LIGHT_GREEN", "#4CFF4C"),
    (Color::Green, "GREEN", "#00FF00"),
    (Color::DarkGreen, "DARK_GREEN", "#005900"),
    (Color::VeryDarkGreen, "VERY_DARK_GREEN", "#001900"),
    (Color::LightBlue, "LIGHT_BLUE", "#4C4CFF"),
    (Color::Blue, "BLUE", "#0000FF"),
    (Color::DarkBlue, "DARK_BLUE", "#000059"),
    (Color::VeryDarkBlue, "VERY_DARK_BLUE", "#000019"),
];

impl Color {
    pub const ALL: [Color; 28] = {
        let mut all = [Color::Off; 28];
        let mut i = 0;
        while i < TABLE.len() {
            all[i] = TABLE[i].0;
            i += 1;
        }
        all
    };

    pub fn velocity(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        TABLE[self.index()].1
    }

    pub fn hex(self) -> &'static str {
        TABLE[self.index()].2
    }

    pub fn is_off(self) -> bool {
        self == Color::Off
    }

    /// Palette entry for a wire velocity, if there is one.
    pub fn from_velocity(velocity: u8) -> Option<Color> {
        num::FromPrimitive::from_u8(velocity)
    }

    /// Resolves a palette name to its velocity and display hex.
    pub fn resolve(name: &str) -> Result<(u8, &'static str)> {
        let color: Color = name.parse()?;
        Ok((color.velocity(), color.hex()))
    }

    fn index(self) -> usize {
        TABLE
            .iter()
            .position(|(c, _, _)| *c == self)
            .unwrap_or_default()
    }
}

/// Display hex for any velocity the surface may report. Velocities outside
/// the palette render as black.
pub fn hex_for(velocity: u8) -> &'static str {
    Color::from_velocity(velocity).map_or(BLACK, Color::hex)
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        TABLE
            .iter()
            .find(|(_, name, _)| *name == wanted)
            .map(|(color, _, _)| *color)
            .ok_or_else(|| Error::UnknownColor(s.to_string()))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
