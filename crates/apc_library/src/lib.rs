pub mod animation;
pub mod behavior;
pub mod colors;
pub mod controller;
pub mod controls;
pub mod error;
pub mod lights;
pub mod link;
mod worker;

#[cfg(test)]
mod test_utils;

pub use animation::Animation;
pub use behavior::{BehaviorConfig, PressKind, PressMode};
pub use colors::Color;
pub use controller::{Controller, ControllerOptions, SurfaceSnapshot};
pub use controls::{ButtonKind, Channel, ControlAddress, LightMode};
pub use error::{Error, Result};
pub use lights::LedEntry;
pub use link::{InputEvent, PortList, list_ports};
