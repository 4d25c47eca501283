use crate::error::{Error, Result};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A named background thread that can be joined with a deadline.
pub(crate) struct Worker {
    name: String,
    handle: JoinHandle<()>,
    // Disconnects once the thread body has returned
    done: Receiver<()>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                body();
            })
            .map_err(|e| spawn_error(name, e))?;
        Ok(Self {
            name: name.to_string(),
            handle,
            done,
        })
    }

    /// Waits up to `timeout` for the thread to finish. A thread that is still
    /// running afterwards is detached and `false` is returned.
    pub(crate) fn join_within(self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    log::error!("{} thread panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} thread still busy after {:?}, leaving it behind",
                    self.name,
                    timeout
                );
                false
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn spawn_error(name: &str, e: io::Error) -> Error {
    Error::Thread(format!("{name}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn joins_finished_thread() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let worker = Worker::spawn("test", move || flag.store(true, Ordering::SeqCst)).unwrap();
        assert!(worker.join_within(Duration::from_secs(1)));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn gives_up_on_stuck_thread() {
        let worker = Worker::spawn("stuck", || thread::sleep(Duration::from_millis(300))).unwrap();
        assert!(!worker.join_within(Duration::from_millis(20)));
    }

    #[test]
    fn spawn_failure_names_the_thread() {
        let err = spawn_error("animation", io::Error::other("out of threads"));
        assert_eq!(err, Error::Thread("animation: out of threads".to_string()));
        assert_eq!(err.to_string(), "couldn't start thread: animation: out of threads");
    }
}
