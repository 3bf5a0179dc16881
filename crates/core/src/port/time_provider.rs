// Time Provider Port (for testability)

/// Clock interface; injected everywhere an instant is stamped so tests
/// can run on a frozen clock.
pub trait TimeProvider: Send + Sync {
    /// Current UTC time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System clock (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::TimeProvider;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Frozen clock that tests advance by hand.
    pub struct FixedTimeProvider {
        now: AtomicI64,
    }

    impl FixedTimeProvider {
        pub fn new(now_millis: i64) -> Self {
            Self {
                now: AtomicI64::new(now_millis),
            }
        }

        pub fn advance(&self, delta_millis: i64) {
            self.now.fetch_add(delta_millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }
}
