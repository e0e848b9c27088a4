use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Flags {
    paused: bool,
    stopped: bool,
}

/// What an interruptible wait reacts to besides its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeOn {
    Stop,
    StopOrPause,
}

/// Why an interruptible wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Elapsed,
    Paused,
    Stopped,
}

/// Cloneable handle for pausing, resuming and stopping a running job.
///
/// Every clone controls the same job. Requests wake the engine immediately
/// when it is waiting between rows, backing off, or paused; an in-flight
/// provider call is never aborted, so a stop issued during a call takes
/// effect once that call returns.
///
/// # Examples
///
/// ```
/// use dtag::engine::JobControl;
///
/// let control = JobControl::new();
/// let remote = control.clone();
///
/// remote.request_pause();
/// assert!(control.is_paused());
///
/// remote.request_stop();
/// assert!(control.is_stop_requested());
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    inner: Arc<(Mutex<Flags>, Condvar)>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        self.update(|flags| flags.paused = true);
    }

    pub fn request_resume(&self) {
        self.update(|flags| flags.paused = false);
    }

    /// Asks the job to stop at its next row boundary. Irreversible.
    pub fn request_stop(&self) {
        self.update(|flags| flags.stopped = true);
    }

    /// Flips between paused and running; returns `true` if now paused.
    pub fn toggle_pause(&self) -> bool {
        let mut paused = false;
        self.update(|flags| {
            flags.paused = !flags.paused;
            paused = flags.paused;
        });
        paused
    }

    pub fn is_paused(&self) -> bool {
        self.flags().paused
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flags().stopped
    }

    /// Blocks while paused. Returns `true` if a stop was requested.
    pub(crate) fn wait_while_paused(&self) -> bool {
        let (_, condvar) = &*self.inner;
        let mut flags = self.flags();
        while flags.paused && !flags.stopped {
            flags = condvar.wait(flags).unwrap_or_else(PoisonError::into_inner);
        }
        flags.stopped
    }

    /// Sleeps for `duration` unless woken by a request matching `wake_on`.
    pub(crate) fn sleep(&self, duration: Duration, wake_on: WakeOn) -> Wake {
        let (_, condvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut flags = self.flags();

        loop {
            if flags.stopped {
                return Wake::Stopped;
            }
            if wake_on == WakeOn::StopOrPause && flags.paused {
                return Wake::Paused;
            }

            let now = Instant::now();
            if now >= deadline {
                return Wake::Elapsed;
            }
            let (guard, _) = condvar
                .wait_timeout(flags, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            flags = guard;
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, change: impl FnOnce(&mut Flags)) {
        change(&mut self.flags());
        self.inner.1.notify_all();
    }
}
