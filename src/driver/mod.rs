use std::time::Duration;

pub mod ufire;

/// Blocking delay that parks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl embedded_hal::blocking::delay::DelayMs<u16> for ThreadDelay {
    fn delay_ms(&mut self, ms: u16) {
        std::thread::sleep(Duration::from_millis(ms as u64))
    }
}
