//! Grid animations.
//!
//! One routine runs at a time on its own thread. Routines draw through a
//! [`LedWriter`], the same path as every other write, and pause between frames
//! with [`Frame::sleep`], which is also where a stop request is noticed.

mod routines;

use crate::colors::Color;
use crate::controls::{ControlAddress, GRID_SIZE, PAD_COUNT};
use crate::error::{Error, Result};
use crate::lights::LedEntry;
use crate::worker::Worker;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Animation {
    Rainbow,
    Wave,
    Rain,
    Snake,
    Ripple,
    Random,
    Spiral,
    Firework,
    Pulse,
    ColorWipe,
    EnergyField,
    Bounce,
    Sparkle,
    DnaHelix,
    Chase,
    Tetris,
    Laser,
    Galaxy,
    Piano,
    Equalizer,
}

const CATALOGUE: [(Animation, &str); 20] = [
    (Animation::Rainbow, "rainbow"),
    (Animation::Wave, "wave"),
    (Animation::Rain, "rain"),
    (Animation::Snake, "snake"),
    (Animation::Ripple, "ripple"),
    (Animation::Random, "random"),
    (Animation::Spiral, "spiral"),
    (Animation::Firework, "firework"),
    (Animation::Pulse, "pulse"),
    (Animation::ColorWipe, "color-wipe"),
    (Animation::EnergyField, "energy-field"),
    (Animation::Bounce, "bounce"),
    (Animation::Sparkle, "sparkle"),
    (Animation::DnaHelix, "dna-helix"),
    (Animation::Chase, "chase"),
    (Animation::Tetris, "tetris"),
    (Animation::Laser, "laser"),
    (Animation::Galaxy, "galaxy"),
    (Animation::Piano, "piano"),
    (Animation::Equalizer, "equalizer"),
];

impl Animation {
    pub const ALL: [Animation; 20] = {
        let mut all = [Animation::Rainbow; 20];
        let mut i = 0;
        while i < CATALOGUE.len() {
            all[i] = CATALOGUE[i].0;
            i += 1;
        }
        all
    };

    pub fn name(self) -> &'static str {
        CATALOGUE
            .iter()
            .find(|(animation, _)| *animation == self)
            .map_or("", |(_, name)| name)
    }

    fn run(self, frame: &mut Frame) -> Flow {
        match self {
            Animation::Rainbow => routines::rainbow(frame),
            Animation::Wave => routines::wave(frame),
            Animation::Rain => routines::rain(frame),
            Animation::Snake => routines::snake(frame),
            Animation::Ripple => routines::ripple(frame),
            Animation::Random => routines::random(frame),
            Animation::Spiral => routines::spiral(frame),
            Animation::Firework => routines::firework(frame),
            Animation::Pulse => routines::pulse(frame),
            Animation::ColorWipe => routines::color_wipe(frame),
            Animation::EnergyField => routines::energy_field(frame),
            Animation::Bounce => routines::bounce(frame),
            Animation::Sparkle => routines::sparkle(frame),
            Animation::DnaHelix => routines::dna_helix(frame),
            Animation::Chase => routines::chase(frame),
            Animation::Tetris => routines::tetris(frame),
            Animation::Laser => routines::laser(frame),
            Animation::Galaxy => routines::galaxy(frame),
            Animation::Piano => routines::piano(frame),
            Animation::Equalizer => routines::equalizer(frame),
        }
    }
}

impl FromStr for Animation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        CATALOGUE
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(animation, _)| *animation)
            .ok_or_else(|| Error::UnknownAnimation(s.to_string()))
    }
}

impl fmt::Display for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where routines draw. Implemented by the controller so that animation
/// writes land in the LED store exactly like any other write.
pub trait LedWriter: Send + Sync {
    fn write(&self, address: ControlAddress, color: Color, channel: u8) -> Result<()>;

    fn read(&self, address: ControlAddress) -> Option<LedEntry>;
}

/// Cooperative stop signal that also wakes a sleeping routine.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` unless cancelled first. Returns whether the
    /// token is cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = wake
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Returned by a routine that was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Halt;

pub(crate) type Flow = std::result::Result<(), Halt>;

/// Drawing context handed to a routine for its whole run.
pub(crate) struct Frame<'a> {
    writer: &'a dyn LedWriter,
    cancel: &'a CancelToken,
    rng: StdRng,
    failing: bool,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(writer: &'a dyn LedWriter, cancel: &'a CancelToken, rng: StdRng) -> Self {
        Self {
            writer,
            cancel,
            rng,
            failing: false,
        }
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Lights pad `note`. Notes past the grid are clipped.
    pub(crate) fn set_note(&mut self, note: usize, color: Color, channel: u8) -> Flow {
        if self.cancel.is_cancelled() {
            return Err(Halt);
        }
        if note >= PAD_COUNT as usize {
            return Ok(());
        }
        // Write failures drop the single write; the routine keeps going
        match self.writer.write(ControlAddress::Pad(note as u8), color, channel) {
            Ok(()) => self.failing = false,
            Err(e) if !self.failing => {
                log::warn!("Animation write failed: {e}");
                self.failing = true;
            }
            Err(_) => {}
        }
        Ok(())
    }

    /// Lights the pad at `(row, col)`, row 0 at the bottom. Cells outside the
    /// grid are clipped.
    pub(crate) fn set(&mut self, row: usize, col: usize, color: Color, channel: u8) -> Flow {
        if row >= GRID_SIZE as usize || col >= GRID_SIZE as usize {
            return Ok(());
        }
        self.set_note(row * GRID_SIZE as usize + col, color, channel)
    }

    pub(crate) fn off(&mut self, row: usize, col: usize) -> Flow {
        self.set(row, col, Color::Off, 0)
    }

    pub(crate) fn off_note(&mut self, note: usize) -> Flow {
        self.set_note(note, Color::Off, 0)
    }

    pub(crate) fn is_lit(&self, row: usize, col: usize) -> bool {
        if row >= GRID_SIZE as usize || col >= GRID_SIZE as usize {
            return false;
        }
        let address = ControlAddress::Pad((row * GRID_SIZE as usize + col) as u8);
        self.writer
            .read(address)
            .is_some_and(|entry| !entry.color.is_off())
    }

    /// Turns off every lit pad. Buttons are left alone.
    pub(crate) fn blank(&mut self) -> Flow {
        for note in 0..PAD_COUNT as usize {
            let lit = self
                .writer
                .read(ControlAddress::Pad(note as u8))
                .is_some_and(|entry| !entry.color.is_off());
            if lit {
                self.off_note(note)?;
            }
        }
        Ok(())
    }

    /// Frame delay; the point where a stop request ends the routine.
    pub(crate) fn sleep(&self, millis: u64) -> Flow {
        if self.cancel.sleep(Duration::from_millis(millis)) {
            Err(Halt)
        } else {
            Ok(())
        }
    }
}

struct Running {
    animation: Animation,
    cancel: CancelToken,
    worker: Worker,
}

/// Runs at most one animation at a time. Start and stop are serialized by a
/// single lock, so a new routine never overlaps the one it replaces (unless
/// the old one ignores cancellation past the stop timeout, in which case it is
/// abandoned and can no longer write).
pub struct Scheduler {
    writer: Arc<dyn LedWriter>,
    running: Mutex<Option<Running>>,
    stop_timeout: Duration,
}

impl Scheduler {
    pub fn new(writer: Arc<dyn LedWriter>, stop_timeout: Duration) -> Self {
        Self {
            writer,
            running: Mutex::new(None),
            stop_timeout,
        }
    }

    /// Stops whatever runs and starts `animation`. Returns once the new
    /// routine's thread is spawned.
    pub fn start(&self, animation: Animation) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = running.take() {
            self.halt(previous);
        }

        let cancel = CancelToken::new();
        let writer = Arc::clone(&self.writer);
        let token = cancel.clone();
        let worker = Worker::spawn("apc-animation", move || {
            let mut frame = Frame::new(writer.as_ref(), &token, StdRng::from_entropy());
            let _ = frame.blank().and_then(|()| animation.run(&mut frame));
            log::debug!("Animation {animation} finished");
        })?;
        log::info!("Started animation {animation}");
        *running = Some(Running {
            animation,
            cancel,
            worker,
        });
        Ok(())
    }

    pub fn stop(&self) {
        // Held across halt, as in start
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = running.take() {
            self.halt(previous);
        }
    }

    /// The animation currently running, if any.
    pub fn current(&self) -> Option<Animation> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|running| !running.worker.is_finished())
            .map(|running| running.animation)
    }

    fn halt(&self, running: Running) {
        running.cancel.cancel();
        if running.worker.join_within(self.stop_timeout) {
            log::info!("Stopped animation {}", running.animation);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::Lights;
    use crate::test_utils::wait_until;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::{self, ThreadId};
    use std::time::Instant;

    /// Records every write into a light store, counting them and noting
    /// which thread made each one.
    #[derive(Default)]
    struct Canvas {
        lights: Lights,
        writes: AtomicUsize,
        writers: Mutex<Vec<ThreadId>>,
    }

    impl LedWriter for Canvas {
        fn write(&self, address: ControlAddress, color: Color, channel: u8) -> Result<()> {
            self.lights.write(address, color, channel)?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.writers.lock().unwrap().push(thread::current().id());
            Ok(())
        }

        fn read(&self, address: ControlAddress) -> Option<LedEntry> {
            self.lights.read(address)
        }
    }

    fn scheduler() -> (Arc<Canvas>, Scheduler) {
        let canvas = Arc::new(Canvas::default());
        let scheduler = Scheduler::new(canvas.clone(), DEFAULT_STOP_TIMEOUT);
        (canvas, scheduler)
    }

    #[test]
    fn names_parse_in_any_spelling() {
        assert_eq!("color-wipe".parse::<Animation>(), Ok(Animation::ColorWipe));
        assert_eq!("Energy_Field".parse::<Animation>(), Ok(Animation::EnergyField));
        assert_eq!("DNA helix".parse::<Animation>(), Ok(Animation::DnaHelix));
        assert_eq!(
            "disco".parse::<Animation>(),
            Err(Error::UnknownAnimation("disco".to_string()))
        );
        for animation in Animation::ALL {
            assert_eq!(animation.to_string().parse::<Animation>(), Ok(animation));
        }
    }

    #[test]
    fn cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(token.sleep(Duration::from_secs(5)));
    }

    #[test]
    fn frame_clips_and_stops_after_cancel() {
        let canvas = Canvas::default();
        let token = CancelToken::new();
        let mut frame = Frame::new(&canvas, &token, StdRng::seed_from_u64(1));
        assert_eq!(frame.set(8, 0, Color::Red, 6), Ok(()));
        assert_eq!(frame.set(0, 8, Color::Red, 6), Ok(()));
        assert_eq!(frame.set(1, 2, Color::Red, 6), Ok(()));
        assert!(frame.is_lit(1, 2));
        assert_eq!(canvas.writes.load(Ordering::SeqCst), 1);

        token.cancel();
        assert_eq!(frame.set(0, 0, Color::Red, 6), Err(Halt));
        assert_eq!(frame.sleep(1), Err(Halt));
        assert_eq!(canvas.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blank_only_touches_lit_pads() {
        let canvas = Canvas::default();
        let token = CancelToken::new();
        let mut frame = Frame::new(&canvas, &token, StdRng::seed_from_u64(1));
        frame.set_note(3, Color::Red, 6).unwrap();
        frame.set_note(9, Color::Off, 0).unwrap();
        frame.blank().unwrap();
        assert_eq!(canvas.writes.load(Ordering::SeqCst), 3);
        assert!(!frame.is_lit(0, 3));
    }

    #[test]
    fn every_animation_draws_and_stops() {
        for animation in Animation::ALL {
            let (canvas, scheduler) = scheduler();
            scheduler.start(animation).unwrap();
            assert_eq!(scheduler.current(), Some(animation));
            wait_until(|| canvas.writes.load(Ordering::SeqCst) > 0);

            let started = Instant::now();
            scheduler.stop();
            assert!(started.elapsed() < DEFAULT_STOP_TIMEOUT, "{animation} ignored stop");
            assert_eq!(scheduler.current(), None);

            let after_stop = canvas.writes.load(Ordering::SeqCst);
            thread::sleep(Duration::from_millis(120));
            assert_eq!(canvas.writes.load(Ordering::SeqCst), after_stop, "{animation}");
        }
    }

    #[test]
    fn starting_replaces_running_animation() {
        let (canvas, scheduler) = scheduler();
        scheduler.start(Animation::Pulse).unwrap();
        wait_until(|| canvas.writes.load(Ordering::SeqCst) > 0);
        scheduler.start(Animation::Chase).unwrap();
        assert_eq!(scheduler.current(), Some(Animation::Chase));

        // Chase keeps at most five pads lit; a leftover pulse would light all
        thread::sleep(Duration::from_millis(200));
        let lit = canvas
            .lights
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| !entry.color.is_off())
            .count();
        assert!(lit <= 5, "{lit} pads lit");
        scheduler.stop();
    }

    #[test]
    fn racing_stop_and_start_never_overlap() {
        for _ in 0..30 {
            let (canvas, scheduler) = scheduler();
            let scheduler = Arc::new(scheduler);
            scheduler.start(Animation::Pulse).unwrap();
            wait_until(|| canvas.writes.load(Ordering::SeqCst) > 0);

            let stopper = Arc::clone(&scheduler);
            let handle = thread::spawn(move || stopper.stop());
            scheduler.start(Animation::Rainbow).unwrap();
            handle.join().unwrap();
            thread::sleep(Duration::from_millis(20));
            scheduler.stop();

            // Once a routine's thread has written, no earlier one may write again
            let writers = canvas.writers.lock().unwrap().clone();
            let mut finished: Vec<ThreadId> = Vec::new();
            let mut current = writers[0];
            for writer in writers {
                if writer != current {
                    assert!(!finished.contains(&writer), "two routines interleaved");
                    finished.push(current);
                    current = writer;
                }
            }
        }
    }

    #[test]
    fn stop_when_idle_is_harmless() {
        let (_, scheduler) = scheduler();
        scheduler.stop();
        assert_eq!(scheduler.current(), None);
    }
}
