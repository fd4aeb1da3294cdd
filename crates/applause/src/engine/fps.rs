//! The per-frame clock and FPS statistics.

use crate::bus::{Bus, CommandFlags, CommandMsg, Message};
use applause_utils::Timespec64;
use std::time::Duration;

/// Fine FPS comes from the most recent frame delta, coarse FPS from counting
/// frames across one wall-clock second. Crossing a second boundary publishes
/// one `status` command carrying the numbers; the networked log shipper and
/// the exit-after-N-seconds countdown both feed off it.
#[derive(Debug, Default)]
pub struct FpsCounter {
    prev: Option<Duration>,
    pub delta: Duration,
    pub fine: u64,
    pub coarse: u64,
    seconds: u64,
    count: u64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock to `now` (monotonic). Emits the once-per-second
    /// status command on the bus.
    pub fn tick(&mut self, now: Duration, bus: &Bus) {
        match self.prev {
            // Seed with a reasonable ~60 FPS delta instead of the display
            // refresh rate.
            None => self.delta = Duration::from_millis(16),
            Some(prev) => self.delta = now.saturating_sub(prev),
        }
        self.prev = Some(now);

        let mut status = false;
        if self.seconds != now.as_secs() {
            self.coarse = self.count;
            self.count = 0;
            self.seconds = now.as_secs();
            status = true;
        }
        self.count += 1;

        // More stable than averaging: a whole-second delta pins fine FPS
        // at 1.
        self.fine = if self.delta.as_secs() > 0 {
            1
        } else {
            1_000_000_000 / u64::from(self.delta.subsec_nanos().max(1))
        };

        if status {
            bus.send(Message::command(CommandMsg {
                flags: CommandFlags::STATUS,
                fps: self.fine as u32,
                sys_seconds: self.seconds as u32,
                time: Timespec64::now(),
                ..CommandMsg::default()
            }));
        }
    }

    pub fn fine_f64(&self) -> f64 {
        self.fine as f64
    }
}
