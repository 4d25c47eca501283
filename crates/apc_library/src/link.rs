//! MIDI connections to the surface.
//!
//! Inbound messages arrive on the backend's reader thread. Each one is first
//! forwarded untouched to the passthrough output (if any), then queued for the
//! dispatch thread, which calls every observer in registration order. A slow
//! observer therefore delays later events but never the reader itself.

use crate::behavior::PressKind;
use crate::controls::{Channel, ControlAddress};
use crate::error::{Error, Result};
use crate::lights::NoteMessage;
use crate::worker::Worker;
use midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use midly::MidiMessage;
use midly::live::LiveEvent;
use midly::num::{u4, u7};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const DEFAULT_CLIENT_NAME: &str = "APC mini LED controller";

// How often the dispatcher checks whether the link is closing
const DISPATCH_POLL: Duration = Duration::from_millis(50);

/// Callback receiving raw inbound bytes on the backend's reader thread.
pub type RawHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Handler for decoded inbound events, called on the dispatch thread.
pub type Observer = Arc<dyn Fn(&InputEvent) + Send + Sync + 'static>;

pub trait OutputPort: Send {
    fn send(&mut self, message: &[u8]) -> std::result::Result<(), String>;

    fn close(self: Box<Self>) {}
}

pub trait InputPort: Send {
    /// Starts delivering every inbound message to `handler`.
    fn connect(&mut self, handler: RawHandler) -> Result<()>;

    /// Stops delivery and releases the port. Must be idempotent.
    fn close(&mut self);
}

/// A note-on or note-off received from the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
    pub kind: PressKind,
    /// `None` for notes outside the pad and button ranges
    pub address: Option<ControlAddress>,
    pub raw: Vec<u8>,
}

impl InputEvent {
    /// Decodes a raw message. Anything but note-on/note-off yields `None`.
    /// Note-on with velocity 0 counts as a release.
    pub fn parse(raw: &[u8]) -> std::result::Result<Option<Self>, midly::Error> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(raw)? else {
            return Ok(None);
        };
        let (key, vel, kind) = match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => (key, vel, PressKind::Press),
            MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel } => {
                (key, vel, PressKind::Release)
            }
            _ => return Ok(None),
        };
        Ok(Some(Self {
            note: key.as_int(),
            velocity: vel.as_int(),
            channel: channel.as_int(),
            kind,
            address: ControlAddress::from_note(key.as_int()),
            raw: raw.to_vec(),
        }))
    }
}

/// Encodes one note-on as wire bytes.
pub fn encode_note_on(note: u8, velocity: u8, channel: u8) -> Result<Vec<u8>> {
    let channel = Channel::new(channel)?.value();
    let key = u7::try_from(note).ok_or_else(|| Error::InvalidAddress(format!("note {note}")))?;
    let vel = u7::try_from(velocity)
        .ok_or_else(|| Error::DeviceWrite(format!("velocity {velocity} out of range")))?;
    let event = LiveEvent::Midi {
        channel: u4::from_int_lossy(channel),
        message: MidiMessage::NoteOn { key, vel },
    };
    let mut buf = Vec::with_capacity(3);
    event
        .write_std(&mut buf)
        .map_err(|e| Error::DeviceWrite(e.to_string()))?;
    Ok(buf)
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub client_name: String,
    /// Inbound events waiting for the dispatcher; more are dropped.
    pub queue_capacity: usize,
    /// Upper bound for `close()` to wait on the dispatch thread.
    pub close_timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            queue_capacity: 256,
            close_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Names of all MIDI ports the system currently offers.
pub fn list_ports(client_name: &str) -> Result<PortList> {
    let input = MidiInput::new(client_name).map_err(|e| Error::DeviceOpen(e.to_string()))?;
    let output = MidiOutput::new(client_name).map_err(|e| Error::DeviceOpen(e.to_string()))?;
    Ok(PortList {
        inputs: port_names(&input),
        outputs: port_names(&output),
    })
}

fn port_names<T: MidiIO>(io: &T) -> Vec<String> {
    io.ports()
        .iter()
        .filter_map(|port| io.port_name(port).ok())
        .collect()
}

/// Exact name match first, then the first port whose name contains `wanted`.
fn find_port<T: MidiIO>(io: &T, wanted: &str) -> Result<T::Port> {
    let ports: Vec<(T::Port, String)> = io
        .ports()
        .into_iter()
        .filter_map(|port| io.port_name(&port).ok().map(|name| (port, name)))
        .collect();
    let position = ports
        .iter()
        .position(|(_, name)| name == wanted)
        .or_else(|| ports.iter().position(|(_, name)| name.contains(wanted)))
        .ok_or_else(|| Error::DeviceOpen(format!("no MIDI port named {wanted:?}")))?;
    ports
        .into_iter()
        .nth(position)
        .map(|(port, _)| port)
        .ok_or_else(|| Error::DeviceOpen(format!("MIDI port {wanted:?} disappeared")))
}

pub struct MidirOutput {
    connection: MidiOutputConnection,
}

impl MidirOutput {
    pub fn open(client_name: &str, port_name: &str) -> Result<Self> {
        let output = MidiOutput::new(client_name).map_err(|e| Error::DeviceOpen(e.to_string()))?;
        let port = find_port(&output, port_name)?;
        let connection = output
            .connect(&port, port_name)
            .map_err(|e| Error::DeviceOpen(format!("{port_name}: {e}")))?;
        log::info!("Opened MIDI output {port_name:?}");
        Ok(Self { connection })
    }
}

impl OutputPort for MidirOutput {
    fn send(&mut self, message: &[u8]) -> std::result::Result<(), String> {
        self.connection.send(message).map_err(|e| e.to_string())
    }

    fn close(self: Box<Self>) {
        self.connection.close();
    }
}

pub struct MidirInput {
    client_name: String,
    port_name: String,
    connection: Option<MidiInputConnection<()>>,
}

impl MidirInput {
    pub fn new(client_name: &str, port_name: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
            port_name: port_name.to_string(),
            connection: None,
        }
    }
}

impl InputPort for MidirInput {
    fn connect(&mut self, mut handler: RawHandler) -> Result<()> {
        let input = MidiInput::new(&format!("{} In", self.client_name))
            .map_err(|e| Error::DeviceOpen(e.to_string()))?;
        let port = find_port(&input, &self.port_name)?;
        let connection = input
            .connect(
                &port,
                &self.port_name,
                move |_timestamp, message, _| handler(message),
                (),
            )
            .map_err(|e| Error::DeviceOpen(format!("{}: {e}", self.port_name)))?;
        log::info!("Opened MIDI input {:?}", self.port_name);
        self.connection = Some(connection);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

type SharedOutput = Arc<Mutex<Option<Box<dyn OutputPort>>>>;

pub struct DeviceLink {
    output: Mutex<Option<Box<dyn OutputPort>>>,
    passthrough: SharedOutput,
    input: Mutex<Option<Box<dyn InputPort>>>,
    observers: Arc<Mutex<Vec<Observer>>>,
    dispatcher: Mutex<Option<Worker>>,
    running: Arc<AtomicBool>,
    close_timeout: Duration,
}

impl DeviceLink {
    /// Opens the named system ports through midir.
    pub fn open(
        input: &str,
        output: &str,
        passthrough: Option<&str>,
        options: LinkOptions,
    ) -> Result<Self> {
        let out = MidirOutput::open(&options.client_name, output)?;
        let through = passthrough
            .map(|name| MidirOutput::open(&format!("{} Thru", options.client_name), name))
            .transpose()?;
        let input = MidirInput::new(&options.client_name, input);
        Self::with_ports(
            Box::new(input),
            Box::new(out),
            through.map(|p| Box::new(p) as Box<dyn OutputPort>),
            options,
        )
    }

    /// Builds a link over already opened ports and starts reading.
    pub fn with_ports(
        mut input: Box<dyn InputPort>,
        output: Box<dyn OutputPort>,
        passthrough: Option<Box<dyn OutputPort>>,
        options: LinkOptions,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::sync_channel(options.queue_capacity.max(1));
        let passthrough: SharedOutput = Arc::new(Mutex::new(passthrough));
        let observers: Arc<Mutex<Vec<Observer>>> = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        let dispatcher = Worker::spawn(
            "apc-dispatch",
            dispatch_loop(events_rx, Arc::clone(&observers), Arc::clone(&running)),
        )?;

        if let Err(e) = input.connect(reader(Arc::clone(&passthrough), events_tx)) {
            running.store(false, Ordering::SeqCst);
            dispatcher.join_within(options.close_timeout);
            input.close();
            output.close();
            if let Some(port) = passthrough.lock().unwrap_or_else(PoisonError::into_inner).take() {
                port.close();
            }
            return Err(e);
        }

        Ok(Self {
            output: Mutex::new(Some(output)),
            passthrough,
            input: Mutex::new(Some(input)),
            observers,
            dispatcher: Mutex::new(Some(dispatcher)),
            running,
            close_timeout: options.close_timeout,
        })
    }

    pub fn send(&self, note: u8, velocity: u8, channel: u8) -> Result<()> {
        let bytes = encode_note_on(note, velocity, channel)?;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let port = output
            .as_mut()
            .ok_or_else(|| Error::DeviceWrite("output is closed".to_string()))?;
        port.send(&bytes).map_err(Error::DeviceWrite)?;
        log::debug!("-> note {note} vel {velocity} ch {channel}");
        Ok(())
    }

    pub fn send_message(&self, message: NoteMessage) -> Result<()> {
        self.send(message.note, message.velocity, message.channel)
    }

    /// Registers an observer for every inbound note-on/note-off.
    ///
    /// Observers run one after another on the dispatch thread and should
    /// return quickly.
    pub fn on_event<F>(&self, observer: F)
    where
        F: Fn(&InputEvent) + Send + Sync + 'static,
    {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Releases every connection. Safe to call more than once; never fails.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(mut input) = self.input.lock().unwrap_or_else(PoisonError::into_inner).take() {
            input.close();
        }
        if let Some(dispatcher) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            dispatcher.join_within(self.close_timeout);
        }
        if let Some(output) = self.output.lock().unwrap_or_else(PoisonError::into_inner).take() {
            output.close();
        }
        if let Some(port) = self
            .passthrough
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            port.close();
        }
        log::info!("MIDI link closed");
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader(passthrough: SharedOutput, events: SyncSender<InputEvent>) -> RawHandler {
    Box::new(move |message: &[u8]| {
        if let Some(port) = passthrough
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            if let Err(e) = port.send(message) {
                log::warn!("Passthrough write failed: {e}");
            }
        }

        let event = match InputEvent::parse(message) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Skipping malformed MIDI message {message:02x?}: {e}");
                return;
            }
        };
        log::debug!("<- {:?} note {} vel {}", event.kind, event.note, event.velocity);
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!("Event queue full, dropping note {}", event.note)
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    })
}

fn dispatch_loop(
    events: Receiver<InputEvent>,
    observers: Arc<Mutex<Vec<Observer>>>,
    running: Arc<AtomicBool>,
) -> impl FnOnce() + Send + 'static {
    move || {
        while running.load(Ordering::SeqCst) {
            let event = match events.recv_timeout(DISPATCH_POLL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            // Snapshot so observers may register further observers
            let current: Vec<Observer> = observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in current {
                // An observer panic is logged and skipped
                if panic::catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                    log::error!("Input observer panicked on note {}", event.note);
                }
            }
        }
        log::debug!("Dispatcher stopped");
    }
}
