//! Per-control press behaviour: toggle or flash between two configured looks.

use crate::controls::ControlAddress;
use crate::lights::LedEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressMode {
    /// Each press flips between pressed and unpressed; releases are ignored.
    Toggle,
    /// Pressed look while held, unpressed look once released.
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    pub enabled: bool,
    pub mode: PressMode,
    pub pressed: LedEntry,
    pub unpressed: LedEntry,
}

impl BehaviorConfig {
    pub fn toggle(pressed: LedEntry, unpressed: LedEntry) -> Self {
        Self {
            enabled: true,
            mode: PressMode::Toggle,
            pressed,
            unpressed,
        }
    }

    pub fn flash(pressed: LedEntry, unpressed: LedEntry) -> Self {
        Self {
            enabled: true,
            mode: PressMode::Flash,
            pressed,
            unpressed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressKind {
    Press,
    Release,
}

/// What the engine wants done for one press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Write(LedEntry),
    /// Configured, but this event changes nothing (toggle release).
    Ignore,
    /// No enabled behavior: the caller's global selection applies.
    PassThrough,
}

#[derive(Debug, Default)]
pub struct BehaviorEngine {
    configs: BTreeMap<ControlAddress, BehaviorConfig>,
    toggles: BTreeMap<ControlAddress, bool>,
}

impl BehaviorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or removes the behavior of one control and resets its toggle
    /// bit. What is currently lit is left alone until the next press.
    pub fn configure(
        &mut self,
        address: ControlAddress,
        config: Option<BehaviorConfig>,
    ) -> Option<BehaviorConfig> {
        self.toggles.remove(&address);
        match config {
            Some(config) => self.configs.insert(address, config),
            None => self.configs.remove(&address),
        }
    }

    pub fn config(&self, address: ControlAddress) -> Option<BehaviorConfig> {
        self.configs.get(&address).copied()
    }

    pub fn configs(&self) -> Vec<(ControlAddress, BehaviorConfig)> {
        self.configs.iter().map(|(a, c)| (*a, *c)).collect()
    }

    pub fn react(&mut self, address: ControlAddress, press: PressKind) -> Reaction {
        let Some(config) = self.configs.get(&address).filter(|c| c.enabled) else {
            return Reaction::PassThrough;
        };
        match (config.mode, press) {
            (PressMode::Flash, PressKind::Press) => Reaction::Write(config.pressed),
            (PressMode::Flash, PressKind::Release) => Reaction::Write(config.unpressed),
            (PressMode::Toggle, PressKind::Release) => Reaction::Ignore,
            (PressMode::Toggle, PressKind::Press) => {
                let (pressed, unpressed) = (config.pressed, config.unpressed);
                let toggled = self.toggles.entry(address).or_insert(false);
                *toggled = !*toggled;
                if *toggled {
                    Reaction::Write(pressed)
                } else {
                    Reaction::Write(unpressed)
                }
            }
        }
    }

    pub fn is_toggled(&self, address: ControlAddress) -> bool {
        self.toggles.get(&address).copied().unwrap_or(false)
    }

    pub fn set_toggled(&mut self, address: ControlAddress, toggled: bool) {
        self.toggles.insert(address, toggled);
    }

    pub fn toggles(&self) -> Vec<(ControlAddress, bool)> {
        self.toggles.iter().map(|(a, t)| (*a, *t)).collect()
    }

    pub fn reset_toggles(&mut self) {
        self.toggles.clear();
    }

    /// Forgets every behavior and toggle.
    pub fn clear(&mut self) {
        self.configs.clear();
        self.toggles.clear();
    }

    /// Look of an enabled control while nobody is touching it: the pressed
    /// look for a toggled-on control, the unpressed look otherwise.
    pub fn resting_entry(&self, address: ControlAddress) -> Option<LedEntry> {
        let config = self.configs.get(&address).filter(|c| c.enabled)?;
        if config.mode == PressMode::Toggle && self.is_toggled(address) {
            Some(config.pressed)
        } else {
            Some(config.unpressed)
        }
    }
}
