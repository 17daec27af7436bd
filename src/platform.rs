//! Time and scheduling services the core borrows from its environment.

// Copyright (C) 2026 mil1553-core contributors
//
// MIT License

use core::time::Duration;

/// Platform services.
///
/// The core never sleeps on its own; every wait is a deadline loop over
/// [`Platform::now()`] that calls [`Platform::relax()`] between checks.  A
/// kernel port would schedule in `relax()`, a bare metal port may simply spin.
pub trait Platform: Send + Sync {
    /// Monotonic time since an arbitrary epoch.
    fn now(&self) -> Duration;

    /// Short busy delay, used between hardware polls.
    fn delay(&self, duration: Duration);

    /// Give up the CPU inside a wait loop.
    fn relax(&self) {
        core::hint::spin_loop();
    }

    /// True if the calling context has a signal pending.  Interruptible waits
    /// abort with [`crate::Error::Interrupted`] when this returns true.
    fn signal_pending(&self) -> bool {
        false
    }
}

impl<P: Platform + ?Sized> Platform for &P {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn delay(&self, duration: Duration) {
        (**self).delay(duration)
    }

    fn relax(&self) {
        (**self).relax()
    }

    fn signal_pending(&self) -> bool {
        (**self).signal_pending()
    }
}

#[cfg(feature = "std")]
pub use std_platform::StdPlatform;

#[cfg(feature = "std")]
mod std_platform {
    use super::Platform;
    use core::time::Duration;
    use std::time::Instant;

    /// [`Platform`] backed by the standard library, for user space drivers
    /// and host side testing.
    #[derive(Debug, Clone, Copy)]
    pub struct StdPlatform {
        epoch: Instant,
    }

    impl StdPlatform {
        pub fn new() -> Self {
            Self {
                epoch: Instant::now(),
            }
        }
    }

    impl Default for StdPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Platform for StdPlatform {
        fn now(&self) -> Duration {
            self.epoch.elapsed()
        }

        fn delay(&self, duration: Duration) {
            let until = Instant::now() + duration;
            while Instant::now() < until {
                core::hint::spin_loop();
            }
        }

        fn relax(&self) {
            std::thread::yield_now();
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn std_platform_time_moves() {
        let platform = StdPlatform::new();
        let start = platform.now();
        platform.delay(Duration::from_millis(2));
        assert!(platform.now() - start >= Duration::from_millis(2));
        assert!(!platform.signal_pending());
    }

    #[test]
    fn reference_forwards() {
        let platform = StdPlatform::new();
        let by_ref: &dyn Platform = &platform;
        let start = (&by_ref).now();
        (&by_ref).delay(Duration::from_millis(1));
        assert!(by_ref.now() > start);
    }
}
