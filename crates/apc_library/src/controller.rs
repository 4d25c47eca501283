//! The surface as a whole: LED mirror, device link, press behaviors and the
//! animation scheduler behind one handle.

use crate::animation::{Animation, DEFAULT_STOP_TIMEOUT, LedWriter, Scheduler};
use crate::behavior::{BehaviorConfig, BehaviorEngine, PressKind, Reaction};
use crate::colors::Color;
use crate::controls::{ButtonKind, Channel, ControlAddress, GRID_SIZE};
use crate::error::{Error, Result};
use crate::lights::{LedEntry, Lights};
use crate::link::{DeviceLink, InputEvent, LinkOptions};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub link: LinkOptions,
    /// How long stopping an animation may wait for its thread.
    pub stop_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            link: LinkOptions::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Everything needed to put the surface back the way it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub leds: Vec<(ControlAddress, LedEntry)>,
    pub behaviors: Vec<(ControlAddress, BehaviorConfig)>,
    pub toggles: Vec<(ControlAddress, bool)>,
    pub selection: LedEntry,
}

/// Store and link together: the only path a write takes.
struct Surface {
    lights: Lights,
    link: DeviceLink,
    /// Serializes store update plus send, so the store always matches the
    /// last message on the wire. Reads never take it.
    writes: Mutex<()>,
}

impl Surface {
    fn write(&self, address: ControlAddress, color: Color, channel: u8) -> Result<()> {
        let address = address.validate()?;
        let entry = LedEntry::new(color, channel)?;
        self.apply(address, entry)
    }

    /// The store keeps the entry even when the device refuses it.
    fn apply(&self, address: ControlAddress, entry: LedEntry) -> Result<()> {
        let _write = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        self.lights.set(address, entry);
        self.link
            .send_message(entry.message_for(address))
            .inspect_err(|e| log::warn!("Dropped write to {address}: {e}"))
    }
}

impl LedWriter for Surface {
    fn write(&self, address: ControlAddress, color: Color, channel: u8) -> Result<()> {
        Surface::write(self, address, color, channel)
    }

    fn read(&self, address: ControlAddress) -> Option<LedEntry> {
        self.lights.read(address)
    }
}

fn default_selection() -> LedEntry {
    LedEntry {
        color: Color::White,
        channel: Channel::default(),
    }
}

pub struct Controller {
    surface: Arc<Surface>,
    behaviors: Arc<Mutex<BehaviorEngine>>,
    selection: Mutex<LedEntry>,
    animations: Scheduler,
}

impl Controller {
    /// Opens the named ports and starts listening.
    pub fn open(
        input: &str,
        output: &str,
        passthrough: Option<&str>,
        options: ControllerOptions,
    ) -> Result<Self> {
        let link = DeviceLink::open(input, output, passthrough, options.link)?;
        Ok(Self::with_link(link, options.stop_timeout))
    }

    pub fn with_link(link: DeviceLink, stop_timeout: Duration) -> Self {
        let surface = Arc::new(Surface {
            lights: Lights::new(),
            link,
            writes: Mutex::new(()),
        });
        let behaviors = Arc::new(Mutex::new(BehaviorEngine::new()));

        // Registered before any caller observer so they see the result
        let weak: Weak<Surface> = Arc::downgrade(&surface);
        let engine = Arc::clone(&behaviors);
        surface.link.on_event(move |event: &InputEvent| {
            let Some(address) = event.address else {
                return;
            };
            let reaction = engine
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .react(address, event.kind);
            if let (Reaction::Write(entry), Some(surface)) = (reaction, weak.upgrade()) {
                let _ = surface.apply(address, entry);
            }
        });

        let animations = Scheduler::new(surface.clone(), stop_timeout);
        Self {
            surface,
            behaviors,
            selection: Mutex::new(default_selection()),
            animations,
        }
    }

    pub fn write(&self, address: ControlAddress, color: Color, channel: u8) -> Result<()> {
        self.surface.write(address, color, channel)
    }

    pub fn set_pad(&self, index: u8, color: Color, channel: u8) -> Result<()> {
        self.write(ControlAddress::pad(index)?, color, channel)
    }

    pub fn set_button(&self, kind: ButtonKind, slot: u8, color: Color, channel: u8) -> Result<()> {
        self.write(ControlAddress::Button(kind, slot), color, channel)
    }

    /// Paints the grid from 8 rows of 8 colors, row 0 at the bottom. Nothing
    /// is written unless the whole pattern is well formed.
    pub fn set_pattern<R: AsRef<[Color]>>(&self, rows: &[R], channel: u8) -> Result<()> {
        let size = GRID_SIZE as usize;
        if rows.len() != size {
            return Err(Error::InvalidPattern(format!("{} rows", rows.len())));
        }
        if let Some((row, cols)) = rows
            .iter()
            .enumerate()
            .find(|(_, cols)| cols.as_ref().len() != size)
        {
            return Err(Error::InvalidPattern(format!(
                "row {row} has {} columns",
                cols.as_ref().len()
            )));
        }
        Channel::new(channel)?;

        for (row, cols) in rows.iter().enumerate() {
            for (col, color) in cols.as_ref().iter().enumerate() {
                self.write(ControlAddress::pad_at(row as u8, col as u8)?, *color, channel)?;
            }
        }
        Ok(())
    }

    /// Every pad is written even if some sends fail; the first failure is
    /// returned.
    pub fn set_all_pads(&self, color: Color, channel: u8) -> Result<()> {
        let entry = LedEntry::new(color, channel)?;
        let mut first_error = None;
        for address in ControlAddress::pads() {
            if let Err(e) = self.surface.apply(address, entry) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn read(&self, address: ControlAddress) -> Option<LedEntry> {
        self.surface.lights.read(address)
    }

    /// Turns off every pad, then every button, and forgets all toggles.
    /// Every control is written even if some sends fail; the first failure is
    /// returned.
    pub fn clear_all(&self) -> Result<()> {
        let mut first_error = None;
        for address in ControlAddress::all() {
            if let Err(e) = self.surface.apply(address, LedEntry::OFF) {
                first_error.get_or_insert(e);
            }
        }
        self.engine().reset_toggles();
        first_error.map_or(Ok(()), Err)
    }

    /// Replaces whatever animation runs. Returns once the routine is started.
    pub fn start_animation(&self, animation: Animation) -> Result<()> {
        self.animations.start(animation)
    }

    pub fn stop_animation(&self) {
        self.animations.stop();
    }

    pub fn current_animation(&self) -> Option<Animation> {
        self.animations.current()
    }

    /// Observers run on the dispatch thread after the surface has reacted
    /// to the event.
    pub fn register_input_observer<F>(&self, observer: F)
    where
        F: Fn(&InputEvent) + Send + Sync + 'static,
    {
        self.surface.link.on_event(observer);
    }

    /// Installs (or with `None` removes) the press behavior of one control.
    /// The control keeps showing what it shows now; see [`Controller::arm`].
    pub fn configure_behavior(
        &self,
        address: ControlAddress,
        config: Option<BehaviorConfig>,
    ) -> Result<Option<BehaviorConfig>> {
        let address = address.validate()?;
        Ok(self.engine().configure(address, config))
    }

    pub fn behavior(&self, address: ControlAddress) -> Option<BehaviorConfig> {
        self.engine().config(address)
    }

    pub fn is_toggled(&self, address: ControlAddress) -> bool {
        self.engine().is_toggled(address)
    }

    /// Paints the resting look of a control with an enabled behavior.
    pub fn arm(&self, address: ControlAddress) -> Result<()> {
        let resting = self.engine().resting_entry(address);
        match resting {
            Some(entry) => self.surface.apply(address.validate()?, entry),
            None => Ok(()),
        }
    }

    /// Feeds a synthetic press or release through the behavior engine.
    /// Controls without an enabled behavior take the global selection on
    /// press.
    pub fn press(&self, address: ControlAddress, kind: PressKind) -> Result<()> {
        let address = address.validate()?;
        let reaction = self.engine().react(address, kind);
        match (reaction, kind) {
            (Reaction::Write(entry), _) => self.surface.apply(address, entry),
            (Reaction::PassThrough, PressKind::Press) => {
                let selection = self.selection();
                self.surface.apply(address, selection)
            }
            (Reaction::PassThrough, PressKind::Release) | (Reaction::Ignore, _) => Ok(()),
        }
    }

    /// Press followed by release.
    pub fn click(&self, address: ControlAddress) -> Result<()> {
        self.press(address, PressKind::Press)?;
        self.press(address, PressKind::Release)
    }

    pub fn set_selection(&self, color: Color, channel: u8) -> Result<()> {
        let entry = LedEntry::new(color, channel)?;
        *self.selection.lock().unwrap_or_else(PoisonError::into_inner) = entry;
        Ok(())
    }

    pub fn selection(&self) -> LedEntry {
        *self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        let engine = self.engine();
        SurfaceSnapshot {
            leds: self.surface.lights.snapshot(),
            behaviors: engine.configs(),
            toggles: engine.toggles(),
            selection: self.selection(),
        }
    }

    /// Replaces behaviors, toggles and selection with the snapshot's, then
    /// repaints every LED in it. A snapshot naming an invalid control is rejected
    /// before anything changes.
    pub fn restore(&self, snapshot: &SurfaceSnapshot) -> Result<()> {
        let addresses = snapshot
            .leds
            .iter()
            .map(|(address, _)| address)
            .chain(snapshot.behaviors.iter().map(|(address, _)| address))
            .chain(snapshot.toggles.iter().map(|(address, _)| address));
        for address in addresses {
            address.validate()?;
        }

        {
            let mut engine = self.engine();
            engine.clear();
            for (address, config) in &snapshot.behaviors {
                engine.configure(*address, Some(*config));
            }
            for (address, toggled) in &snapshot.toggles {
                engine.set_toggled(*address, *toggled);
            }
        }
        *self.selection.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.selection;

        let mut first_error = None;
        for (address, entry) in &snapshot.leds {
            if let Err(e) = self.surface.apply(*address, *entry) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_open(&self) -> bool {
        self.surface.link.is_open()
    }

    /// Stops any animation and releases the device. Never fails.
    pub fn teardown(&self) {
        self.animations.stop();
        self.surface.link.close();
        log::info!("Controller shut down");
    }

    fn engine(&self) -> MutexGuard<'_, BehaviorEngine> {
        self.behaviors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
