//! Performance measurement tools.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// A timer that records how long an operation takes, per call and on average.
///
/// Used by the evaluation loop to report the detect/post-process split per image.
pub struct Timer {
    name: &'static str,
    last: Duration,
    total: Duration,
    count: u32,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            last: Duration::ZERO,
            total: Duration::ZERO,
            count: 0,
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&mut self, timee: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = timee();
        self.last = start.elapsed();
        self.total += self.last;
        self.count += 1;
        result
    }

    /// The duration of the most recent timed call.
    pub fn last(&self) -> Duration {
        self.last
    }
}

/// Displays the average recorded time.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "{}: -", self.name)
        } else {
            let avg_ms = self.total.as_secs_f32() * 1000.0 / self.count as f32;
            write!(f, "{}: {:.01}ms", self.name, avg_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_records_calls() {
        let mut timer = Timer::new("test");
        assert_eq!(format!("{}", timer), "test: -");
        let value = timer.time(|| 7);
        assert_eq!(value, 7);
        assert!(timer.last() >= Duration::ZERO);
        assert!(format!("{}", timer).starts_with("test: "));
    }
}
