use crate::colors::Color;
use crate::controls::{BUTTON_CHANNEL, Channel, ControlAddress};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

// Indicator button velocities
const BUTTON_OFF: u8 = 0;
const BUTTON_ON: u8 = 1;
const BUTTON_BLINK: u8 = 2;

/// What a control was last told to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedEntry {
    pub color: Color,
    pub channel: Channel,
}

impl LedEntry {
    pub const OFF: LedEntry = LedEntry {
        color: Color::Off,
        channel: Channel::OFF,
    };

    pub fn new(color: Color, channel: u8) -> Result<Self> {
        Ok(Self {
            color,
            channel: Channel::new(channel)?,
        })
    }

    /// Wire form of this entry for `address`.
    ///
    /// Pads carry the color as velocity and the channel as is. Buttons are not
    /// RGB: off/on/blink is sent as velocity 0/1/2 on the button channel.
    pub fn message_for(self, address: ControlAddress) -> NoteMessage {
        if address.is_pad() {
            return NoteMessage {
                note: address.note(),
                velocity: self.color.velocity(),
                channel: self.channel.value(),
            };
        }
        let velocity = if self.color.is_off() {
            BUTTON_OFF
        } else if self.channel.is_blink() {
            BUTTON_BLINK
        } else {
            BUTTON_ON
        };
        NoteMessage {
            note: address.note(),
            velocity,
            channel: BUTTON_CHANNEL,
        }
    }
}

/// A single outbound note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteMessage {
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
}

/// Mirror of every LED on the surface. Only what has been written is known.
#[derive(Debug, Default)]
pub struct Lights {
    entries: Mutex<BTreeMap<ControlAddress, LedEntry>>,
}

impl Lights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write and returns what was there before. A bad channel or
    /// address leaves the store untouched.
    pub fn write(
        &self,
        address: ControlAddress,
        color: Color,
        channel: u8,
    ) -> Result<Option<LedEntry>> {
        let address = address.validate()?;
        let entry = LedEntry::new(color, channel)?;
        Ok(self.set(address, entry))
    }

    pub fn set(&self, address: ControlAddress, entry: LedEntry) -> Option<LedEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, entry)
    }

    pub fn read(&self, address: ControlAddress) -> Option<LedEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .copied()
    }

    /// Every known entry in address order.
    pub fn snapshot(&self) -> Vec<(ControlAddress, LedEntry)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(address, entry)| (*address, *entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ButtonKind;
    use crate::error::Error;

    #[test]
    fn write_returns_previous_entry() {
        let lights = Lights::new();
        let pad = ControlAddress::Pad(3);
        assert_eq!(lights.read(pad), None);
        assert_eq!(lights.write(pad, Color::Red, 6), Ok(None));
        assert_eq!(
            lights.write(pad, Color::Off, 0),
            Ok(Some(LedEntry::new(Color::Red, 6).unwrap()))
        );
        assert_eq!(lights.read(pad), Some(LedEntry::OFF));
    }

    #[test]
    fn invalid_channel_keeps_previous_entry() {
        let lights = Lights::new();
        let pad = ControlAddress::Pad(10);
        lights.write(pad, Color::Green, 4).unwrap();
        assert_eq!(
            lights.write(pad, Color::Blue, 16),
            Err(Error::InvalidChannel(16))
        );
        assert_eq!(lights.read(pad), Some(LedEntry::new(Color::Green, 4).unwrap()));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let lights = Lights::new();
        assert!(lights.write(ControlAddress::Pad(64), Color::Red, 6).is_err());
        assert!(lights.snapshot().is_empty());
    }

    #[test]
    fn pad_message_carries_color_and_channel() {
        let entry = LedEntry::new(Color::Red, 6).unwrap();
        assert_eq!(
            entry.message_for(ControlAddress::Pad(0)),
            NoteMessage { note: 0, velocity: 5, channel: 6 }
        );
    }

    #[test]
    fn button_message_uses_on_off_blink() {
        let track = ControlAddress::Button(ButtonKind::Track, 0);
        let solid = LedEntry::new(Color::Red, 9).unwrap();
        let blink = LedEntry::new(Color::Red, 12).unwrap();
        assert_eq!(
            solid.message_for(track),
            NoteMessage { note: 0x64, velocity: 1, channel: 0 }
        );
        assert_eq!(
            blink.message_for(track),
            NoteMessage { note: 0x64, velocity: 2, channel: 0 }
        );
        assert_eq!(
            LedEntry::new(Color::Off, 13).unwrap().message_for(track),
            NoteMessage { note: 0x64, velocity: 0, channel: 0 }
        );
    }

    #[test]
    fn snapshot_is_address_ordered() {
        let lights = Lights::new();
        lights.write(ControlAddress::Button(ButtonKind::Scene, 1), Color::Green, 6).unwrap();
        lights.write(ControlAddress::Pad(63), Color::Red, 6).unwrap();
        lights.write(ControlAddress::Pad(2), Color::Red, 6).unwrap();
        let order: Vec<_> = lights.snapshot().into_iter().map(|(a, _)| a).collect();
        assert_eq!(
            order,
            vec![
                ControlAddress::Pad(2),
                ControlAddress::Pad(63),
                ControlAddress::Button(ButtonKind::Scene, 1)
            ]
        );
    }
}
