use crate::error::{Error, Result};
use crate::lights::NoteMessage;
use crate::link::{DeviceLink, InputPort, LinkOptions, OutputPort, RawHandler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Output port recording everything written to it.
#[derive(Clone, Default)]
pub(crate) struct FakeOutput {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    delay: Arc<Mutex<Duration>>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<NoteMessage> {
        self.raw()
            .iter()
            .map(|bytes| NoteMessage {
                note: bytes[1],
                velocity: bytes[2],
                channel: bytes[0] & 0x0f,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.written.lock().unwrap().clear();
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Makes every send take at least `delay`, like a slow USB link.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

impl OutputPort for FakeOutput {
    fn send(&mut self, message: &[u8]) -> std::result::Result<(), String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("device unplugged".to_string());
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.written.lock().unwrap().push(message.to_vec());
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Input port fed by the test through `inject`, which plays the reader thread.
#[derive(Clone, Default)]
pub(crate) struct FakeInput {
    handler: Arc<Mutex<Option<RawHandler>>>,
    failing: bool,
    closed: Arc<AtomicBool>,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn inject(&self, message: &[u8]) {
        if let Some(handler) = self.handler.lock().unwrap().as_mut() {
            handler(message);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl InputPort for FakeInput {
    fn connect(&mut self, handler: RawHandler) -> Result<()> {
        if self.failing {
            return Err(Error::DeviceOpen("port busy".to_string()));
        }
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn close(&mut self) {
        self.handler.lock().unwrap().take();
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakePorts {
    pub input: FakeInput,
    pub output: FakeOutput,
}

pub(crate) fn fake_link(passthrough: Option<FakeOutput>) -> (DeviceLink, FakePorts) {
    let ports = FakePorts {
        input: FakeInput::new(),
        output: FakeOutput::new(),
    };
    let link = DeviceLink::with_ports(
        Box::new(ports.input.clone()),
        Box::new(ports.output.clone()),
        passthrough.map(|p| Box::new(p) as Box<dyn OutputPort>),
        LinkOptions {
            close_timeout: Duration::from_millis(200),
            ..LinkOptions::default()
        },
    )
    .unwrap();
    (link, ports)
}

/// Polls `condition` for up to two seconds.
pub(crate) fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}
