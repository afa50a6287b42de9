//! Client-side state for one connection: cooperative cancellation and the
//! thread count for parallel loads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Session {
    interrupted: Arc<AtomicBool>,
    num_threads: usize,
}

impl Session {
    pub fn new() -> Session {
        Session {
            interrupted: Arc::new(AtomicBool::new(false)),
            num_threads: num_cpus::get(),
        }
    }

    /// Requests cancellation of the running operation. The CSV parser checks
    /// the flag at buffer refills and row boundaries and aborts with an
    /// interruption error that bypasses the lenient error handler.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    pub fn reset_interrupt(&self) {
        self.interrupted.store(false, Ordering::Relaxed);
    }

    /// Shared flag handed to readers; cloning keeps `interrupt` effective
    /// from another thread while a copy runs.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads.max(1);
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interrupt_is_visible_through_the_shared_flag() {
        let session = Session::new();
        let flag = session.interrupt_flag();
        assert!(!flag.load(Ordering::Relaxed));
        session.interrupt();
        assert!(flag.load(Ordering::Relaxed));
        session.reset_interrupt();
        assert!(!session.is_interrupted());
    }
}
