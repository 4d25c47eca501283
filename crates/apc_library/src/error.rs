//! Error type shared by every part of the library.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A MIDI port could not be found or connected.
    DeviceOpen(String),
    /// The output is closed or the backend refused the message.
    DeviceWrite(String),
    /// Channel outside 0..=15.
    InvalidChannel(u8),
    /// Color name not in the palette.
    UnknownColor(String),
    /// Animation name not in the catalogue.
    UnknownAnimation(String),
    /// Pad index or button slot out of range, or a note that maps to no control.
    InvalidAddress(String),
    /// Pattern is not 8 rows of 8 colors.
    InvalidPattern(String),
    /// A background thread could not be started.
    Thread(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceOpen(e) => write!(f, "couldn't open MIDI device: {e}"),
            Error::DeviceWrite(e) => write!(f, "couldn't write to MIDI device: {e}"),
            Error::InvalidChannel(ch) => write!(f, "channel must be 0 to 15 (got {ch})"),
            Error::UnknownColor(name) => write!(f, "unknown color {name:?}"),
            Error::UnknownAnimation(name) => write!(f, "unknown animation {name:?}"),
            Error::InvalidAddress(e) => write!(f, "invalid control address: {e}"),
            Error::InvalidPattern(e) => write!(f, "invalid pattern: {e}"),
            Error::Thread(e) => write!(f, "couldn't start thread: {e}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
