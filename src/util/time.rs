//! Time utilities for the match simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // physics ticks per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;
pub const SNAPSHOT_INTERVAL_MICROS: u64 = 33_000; // ~30 Hz fan-out
pub const INPUT_INTERVAL_MS: u64 = 33; // client input send rate
pub const RENDER_INTERVAL_MS: u64 = 16; // client draw rate

/// Fixed physics timestep (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Interval between room ticks
pub fn tick_interval() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}

/// Measures wall-clock time between consecutive ticks
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Return elapsed microseconds and restart the timer
    pub fn lap_micros(&mut self) -> u64 {
        let elapsed = self.elapsed_micros();
        self.start = Instant::now();
        elapsed
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_go_out_every_other_tick() {
        assert!(TICK_DURATION_MICROS < SNAPSHOT_INTERVAL_MICROS);
        assert!(2 * TICK_DURATION_MICROS >= SNAPSHOT_INTERVAL_MICROS);
    }

    #[test]
    fn lap_restarts_the_timer() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.lap_micros() >= 5_000);
        assert!(timer.elapsed_micros() < 5_000);
    }
}
