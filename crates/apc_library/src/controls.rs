use crate::error::{Error, Result};
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const GRID_SIZE: u8 = 8;
pub const PAD_COUNT: u8 = GRID_SIZE * GRID_SIZE;
pub const BUTTON_SLOTS: u8 = 8;

// Note ranges of the two indicator rows, disjoint from the pads (0..64)
const TRACK_NOTE_BASE: u8 = 0x64;
const SCENE_NOTE_BASE: u8 = 0x70;

/// Indicator buttons are always driven on this channel.
pub const BUTTON_CHANNEL: u8 = 0;

/// Static brightness in percent for channels 0..=6
const BRIGHTNESS_PERCENT: [u8; 7] = [10, 25, 50, 65, 75, 90, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ButtonKind {
    Track,
    Scene,
}

impl ButtonKind {
    fn note_base(self) -> u8 {
        match self {
            ButtonKind::Track => TRACK_NOTE_BASE,
            ButtonKind::Scene => SCENE_NOTE_BASE,
        }
    }
}

/// One addressable LED on the surface.
///
/// Ordering follows the clear-all order: pads by index, then track buttons,
/// then scene buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControlAddress {
    /// Grid pad, `row * 8 + col` with row 0 at the bottom
    Pad(u8),
    Button(ButtonKind, u8),
}

impl ControlAddress {
    pub fn pad(index: u8) -> Result<Self> {
        ControlAddress::Pad(index).validate()
    }

    pub fn pad_at(row: u8, col: u8) -> Result<Self> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(Error::InvalidAddress(format!("row {row}, col {col}")));
        }
        Ok(ControlAddress::Pad(row * GRID_SIZE + col))
    }

    pub fn track(slot: u8) -> Result<Self> {
        ControlAddress::Button(ButtonKind::Track, slot).validate()
    }

    pub fn scene(slot: u8) -> Result<Self> {
        ControlAddress::Button(ButtonKind::Scene, slot).validate()
    }

    pub fn validate(self) -> Result<Self> {
        match self {
            ControlAddress::Pad(index) if index >= PAD_COUNT => {
                Err(Error::InvalidAddress(format!("pad {index}")))
            }
            ControlAddress::Button(kind, slot) if slot >= BUTTON_SLOTS => {
                Err(Error::InvalidAddress(format!("{kind:?} button {slot}")))
            }
            _ => Ok(self),
        }
    }

    /// Maps an inbound note back to the control that sent it.
    pub fn from_note(note: u8) -> Option<Self> {
        match note {
            n if n < PAD_COUNT => Some(ControlAddress::Pad(n)),
            n if (TRACK_NOTE_BASE..TRACK_NOTE_BASE + BUTTON_SLOTS).contains(&n) => Some(
                ControlAddress::Button(ButtonKind::Track, n - TRACK_NOTE_BASE),
            ),
            n if (SCENE_NOTE_BASE..SCENE_NOTE_BASE + BUTTON_SLOTS).contains(&n) => Some(
                ControlAddress::Button(ButtonKind::Scene, n - SCENE_NOTE_BASE),
            ),
            _ => None,
        }
    }

    pub fn note(self) -> u8 {
        match self {
            ControlAddress::Pad(index) => index,
            ControlAddress::Button(kind, slot) => kind.note_base() + slot,
        }
    }

    /// `(row, col)` of a pad, row 0 being the bottom row.
    pub fn row_col(self) -> Option<(u8, u8)> {
        match self {
            ControlAddress::Pad(index) => Some((index / GRID_SIZE, index % GRID_SIZE)),
            ControlAddress::Button(..) => None,
        }
    }

    pub fn is_pad(self) -> bool {
        matches!(self, ControlAddress::Pad(_))
    }

    pub fn pads() -> impl Iterator<Item = ControlAddress> {
        (0..PAD_COUNT).map(ControlAddress::Pad)
    }

    pub fn buttons() -> impl Iterator<Item = ControlAddress> {
        [ButtonKind::Track, ButtonKind::Scene]
            .into_iter()
            .flat_map(|kind| (0..BUTTON_SLOTS).map(move |slot| ControlAddress::Button(kind, slot)))
    }

    /// Every control in clear-all order.
    pub fn all() -> impl Iterator<Item = ControlAddress> {
        Self::pads().chain(Self::buttons())
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAddress::Pad(index) => write!(f, "pad {index}"),
            ControlAddress::Button(ButtonKind::Track, slot) => write!(f, "track {}", slot + 1),
            ControlAddress::Button(ButtonKind::Scene, slot) => write!(f, "scene {}", slot + 1),
        }
    }
}

/// Second wire parameter of a pad write: brightness or animation speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    pub const MAX: u8 = 15;
    pub const OFF: Channel = Channel(0);
    pub const FULL_BRIGHTNESS: Channel = Channel(6);

    pub fn new(channel: u8) -> Result<Self> {
        if channel > Self::MAX {
            return Err(Error::InvalidChannel(channel));
        }
        Ok(Channel(channel))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn mode(self) -> LightMode {
        LightMode::from(self)
    }

    /// Blink channels turn indicator buttons into blinking ones.
    pub fn is_blink(self) -> bool {
        matches!(self.mode(), LightMode::Blink(_))
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::FULL_BRIGHTNESS
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Channel::new(value)
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> u8 {
        channel.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum PulseRate {
    Sixteenth = 7,
    Eighth = 8,
    Quarter = 9,
    Half = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum BlinkRate {
    TwentyFourth = 11,
    Sixteenth = 12,
    Eighth = 13,
    Quarter = 14,
    Half = 15,
}

/// How a pad renders its color, as picked in a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightMode {
    /// Brightness step 0..=6 (10% to 100%)
    Static(u8),
    Pulse(PulseRate),
    Blink(BlinkRate),
}

impl LightMode {
    pub fn channel(self) -> Result<Channel> {
        match self {
            LightMode::Static(level) if level <= Channel::FULL_BRIGHTNESS.0 => Ok(Channel(level)),
            LightMode::Static(level) => Err(Error::InvalidChannel(level)),
            LightMode::Pulse(rate) => Ok(Channel(rate as u8)),
            LightMode::Blink(rate) => Ok(Channel(rate as u8)),
        }
    }
}

impl From<Channel> for LightMode {
    fn from(channel: Channel) -> Self {
        let pulse: Option<PulseRate> = num::FromPrimitive::from_u8(channel.0);
        let blink: Option<BlinkRate> = num::FromPrimitive::from_u8(channel.0);
        match (pulse, blink) {
            (Some(rate), _) => LightMode::Pulse(rate),
            (_, Some(rate)) => LightMode::Blink(rate),
            _ => LightMode::Static(channel.0),
        }
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fraction = |n: u8| format!("1/{n}");
        match self {
            LightMode::Static(level) => {
                let percent = BRIGHTNESS_PERCENT
                    .get(*level as usize)
                    .copied()
                    .unwrap_or(100);
                write!(f, "static {percent}%")
            }
            LightMode::Pulse(rate) => {
                let n = match rate {
                    PulseRate::Sixteenth => 16,
                    PulseRate::Eighth => 8,
                    PulseRate::Quarter => 4,
                    PulseRate::Half => 2,
                };
                write!(f, "pulse {}", fraction(n))
            }
            LightMode::Blink(rate) => {
                let n = match rate {
                    BlinkRate::TwentyFourth => 24,
                    BlinkRate::Sixteenth => 16,
                    BlinkRate::Eighth => 8,
                    BlinkRate::Quarter => 4,
                    BlinkRate::Half => 2,
                };
                write!(f, "blink {}", fraction(n))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_index_round_trips_through_row_col() {
        for i in 0..PAD_COUNT {
            let (row, col) = ControlAddress::Pad(i).row_col().unwrap();
            assert_eq!(ControlAddress::pad_at(row, col), Ok(ControlAddress::Pad(i)));
        }
        assert_eq!(ControlAddress::Pad(9).row_col(), Some((1, 1)));
        assert_eq!(ControlAddress::Pad(56).row_col(), Some((7, 0)));
    }

    #[test]
    fn button_notes() {
        assert_eq!(ControlAddress::track(0).unwrap().note(), 0x64);
        assert_eq!(ControlAddress::track(7).unwrap().note(), 0x6B);
        assert_eq!(ControlAddress::scene(0).unwrap().note(), 0x70);
        assert_eq!(ControlAddress::scene(7).unwrap().note(), 0x77);
    }

    #[test]
    fn notes_map_back_to_controls() {
        for address in ControlAddress::all() {
            assert_eq!(ControlAddress::from_note(address.note()), Some(address));
        }
        assert_eq!(ControlAddress::from_note(64), None);
        assert_eq!(ControlAddress::from_note(0x6C), None);
        assert_eq!(ControlAddress::from_note(0x78), None);
        assert_eq!(ControlAddress::all().count(), 80);
    }

    #[test]
    fn out_of_range_addresses_are_rejected() {
        assert!(ControlAddress::pad(64).is_err());
        assert!(ControlAddress::pad_at(8, 0).is_err());
        assert!(ControlAddress::scene(8).is_err());
        assert!(ControlAddress::Button(ButtonKind::Track, 9).validate().is_err());
    }

    #[test]
    fn clear_order_is_pads_then_tracks_then_scenes() {
        let all: Vec<_> = ControlAddress::all().collect();
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
        assert_eq!(all[64], ControlAddress::Button(ButtonKind::Track, 0));
        assert_eq!(all[72], ControlAddress::Button(ButtonKind::Scene, 0));
    }

    #[test]
    fn channel_modes() {
        assert_eq!(Channel::new(16), Err(Error::InvalidChannel(16)));
        assert_eq!(Channel::new(3).unwrap().mode(), LightMode::Static(3));
        assert_eq!(Channel::new(7).unwrap().mode(), LightMode::Pulse(PulseRate::Sixteenth));
        assert_eq!(Channel::new(10).unwrap().mode(), LightMode::Pulse(PulseRate::Half));
        assert_eq!(Channel::new(11).unwrap().mode(), LightMode::Blink(BlinkRate::TwentyFourth));
        assert!(Channel::new(15).unwrap().is_blink());
        assert!(!Channel::new(10).unwrap().is_blink());
        assert_eq!(LightMode::Blink(BlinkRate::Quarter).channel(), Ok(Channel(14)));
        assert!(LightMode::Static(7).channel().is_err());
        assert_eq!(LightMode::Static(6).to_string(), "static 100%");
        assert_eq!(LightMode::Pulse(PulseRate::Eighth).to_string(), "pulse 1/8");
    }
}
