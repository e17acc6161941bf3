use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::trace;

use crate::error::Result;
use crate::manager::PlaybackManager;

/// Host tick source: drives [`PlaybackManager::tick`] at a fixed period.
#[derive(Debug, Clone, Copy)]
pub struct TickDriver {
    period: Duration,
}

impl TickDriver {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Ticks per second, e.g. 60 for a frame-locked host.
    pub fn from_rate(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / f64::from(hz.max(1))))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// A fresh interval for hosts that run their own `select!` loop.
    /// Late ticks are skipped rather than bunched.
    pub fn interval(&self) -> Interval {
        let mut ticks = interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticks
    }

    /// Tick until no voice is active. `on_tick` sees the manager and the
    /// number of voices reclaimed on that tick. Returns the tick count.
    pub async fn tick_until_idle<F>(&self, manager: &mut PlaybackManager, mut on_tick: F) -> Result<u64>
    where
        F: FnMut(&PlaybackManager, usize),
    {
        let mut ticks = self.interval();
        let mut count = 0u64;

        while manager.active_count() > 0 {
            ticks.tick().await;
            let finished = manager.tick()?;
            count += 1;
            trace!(tick = count, finished, active = manager.active_count(), "driver tick");
            on_tick(manager, finished);
        }

        Ok(count)
    }
}

impl Default for TickDriver {
    fn default() -> Self {
        Self::from_rate(60)
    }
}
