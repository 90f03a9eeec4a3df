use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

/// Cooperative stop request for a running [`crate::Pinger`].
///
/// Cloned handles share the same flag; hand one to a signal handler and call
/// [`StopHandle::stop`] from there.
#[derive(Clone, Debug)]
pub struct StopHandle {
    condition: Arc<(Mutex<bool>, Condvar)>,
}

impl StopHandle {
    pub(crate) fn new() -> Self {
        Self { condition: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn stop(&self) {
        let (lock, cvar) = &*self.condition;
        let mut should_stop = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *should_stop = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.condition;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `deadline` or a stop request, whichever comes first.
    /// Returns `true` if a stop was requested.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let (lock, cvar) = &*self.condition;
        let timeout = deadline.saturating_duration_since(Instant::now());
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (should_stop, _) = cvar
            .wait_timeout_while(guard, timeout, |should_stop| !*should_stop)
            .unwrap_or_else(PoisonError::into_inner);
        *should_stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use more_asserts as ma;
    use std::time::Duration;

    #[test]
    fn wait_until_times_out_without_stop() {
        let stop_handle = StopHandle::new();
        let start = Instant::now();

        assert!(!stop_handle.wait_until(start + Duration::from_millis(20)));
        ma::assert_ge!(start.elapsed(), Duration::from_millis(20));
        assert!(!stop_handle.is_stopped());
    }

    #[test]
    fn stop_wakes_waiter() {
        let stop_handle = StopHandle::new();
        let remote = stop_handle.clone();
        let start = Instant::now();

        let waiter = std::thread::spawn(move || stop_handle.wait_until(Instant::now() + Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(10));
        remote.stop();

        assert!(waiter.join().unwrap());
        ma::assert_lt!(start.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn stop_before_wait_returns_immediately() {
        let stop_handle = StopHandle::new();
        stop_handle.stop();

        assert!(stop_handle.wait_until(Instant::now() + Duration::from_secs(10)));
        assert!(stop_handle.is_stopped());
    }
}
