use std::time::{Duration, Instant};

pub struct Interval {
    last_tick: Instant,
    period: Duration,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self {
            last_tick: Instant::now(),
            period,
        }
    }

    /// Time left until the current period is over, zero if it already is.
    pub fn until_next(&self) -> Duration {
        self.period.saturating_sub(self.last_tick.elapsed())
    }

    /// Sleeps out the rest of the current period and starts the next one.
    pub fn tick(&mut self) {
        let current_tick = Instant::now();
        let last_tick_duration = current_tick - self.last_tick;

        if last_tick_duration < self.period {
            std::thread::sleep(self.period - last_tick_duration);
        }
        self.last_tick = Instant::now();
    }
}
