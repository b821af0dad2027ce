use std::time::{Duration, Instant};

/// Fixed-interval frame pacing: sleep off whatever is left of the interval.
/// Frames that overrun are not made up for.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    interval: Duration,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.interval
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }

    /// Blocks until `interval` has passed since `started`.
    pub fn pace(&self, started: Instant) {
        if let Some(left) = self.remaining(started.elapsed()) {
            std::thread::sleep(left);
        }
    }
}
