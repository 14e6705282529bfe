use std::time::{Duration, Instant};

/// Frame clock of the render loop.
pub struct Time {
    delta: Duration,
    started: Instant,
    last_update: Instant,
    frame: u64,
}

impl Time {
    pub fn new() -> Time {
        let now = Instant::now();
        Time {
            delta: Duration::ZERO,
            started: now,
            last_update: now,
            frame: 0,
        }
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed(&self) -> Duration {
        self.last_update - self.started
    }

    /// Frames completed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.last_update = now;
        self.frame += 1;
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_counts_frames() {
        let mut time = Time::new();
        assert_eq!(time.delta(), Duration::ZERO);

        time.update();
        time.update();

        assert_eq!(time.frame(), 2);
        assert!(time.elapsed() >= time.delta());
    }
}
