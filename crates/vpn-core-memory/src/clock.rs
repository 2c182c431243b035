//! A steppable clock for tests that need to fast-forward past TTLs and
//! session durations without a real wall-clock wait (e.g. scenario (f)'s
//! one-hour session).

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use vpn_core::ports::Clock;

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().expect("fake clock lock poisoned");
        *now += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("fake clock lock poisoned")
    }
}
