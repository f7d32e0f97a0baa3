use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Resettable latch shared between a waiting caller and component
/// callback threads
#[derive(Debug, Clone)]
pub struct Signal {
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    raised: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub fn new() -> Signal {
        Signal {
            shared: Arc::new(SharedState {
                raised: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.shared.raised.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn raise(&self) {
        *self.lock() = true;
        self.shared.condvar.notify_all();
    }

    pub fn reset(&self) {
        *self.lock() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Blocks until raised or `timeout` elapses; returns whether it was
    /// raised. The latch stays raised until [`Signal::reset`].
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock();
        while !*guard {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.shared.condvar.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_times_out_when_not_raised() {
        let signal = Signal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_raise_from_other_thread() {
        let signal = Signal::new();
        let remote = signal.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            remote.raise();
        });
        assert!(signal.wait_timeout(Duration::from_secs(2)));
        t.join().unwrap();

        assert!(signal.is_raised());
        signal.reset();
        assert!(!signal.is_raised());
    }
}
