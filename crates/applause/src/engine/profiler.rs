//! Per-phase frame timing.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Measures the time it takes to execute given function.
pub fn measure_time<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// Durations of the interesting frame phases, in orchestration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimes {
    pub characters: Duration,
    pub physics: Duration,
    pub net: Duration,
    pub updates: Duration,
    pub callback: Duration,
    pub render: Duration,
}

impl PhaseTimes {
    pub fn total(&self) -> Duration {
        self.characters + self.physics + self.net + self.updates + self.callback + self.render
    }
}

pub struct FrameProfiler {
    pub max_frames: usize,
    pub frames: VecDeque<PhaseTimes>,

    pub max_time: Duration,
    pub min_time: Duration,
    running_sum: Duration,
    running_frames: u32,
    pub avg_time: Duration,
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self {
            max_frames: 1500,
            frames: VecDeque::new(),
            max_time: Duration::ZERO,
            min_time: Duration::MAX,
            running_sum: Duration::ZERO,
            running_frames: 0,
            avg_time: Duration::ZERO,
        }
    }
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, times: PhaseTimes) {
        let total = times.total();
        self.max_time = self.max_time.max(total);
        self.min_time = self.min_time.min(total);

        self.running_sum += total;
        self.running_frames += 1;
        self.avg_time = self.running_sum / self.running_frames;

        if self.frames.len() == self.max_frames {
            self.frames.pop_back();
        }
        self.frames.push_front(times);
    }

    pub fn last(&self) -> Option<&PhaseTimes> {
        self.frames.front()
    }

    /// Clears all tracked values to their default values
    pub fn reset(&mut self) {
        self.frames.clear();
        self.max_time = Duration::ZERO;
        self.min_time = Duration::MAX;
        self.avg_time = Duration::ZERO;
        self.running_sum = Duration::ZERO;
        self.running_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_track_totals() {
        let mut profiler = FrameProfiler::new();
        profiler.push_frame(PhaseTimes {
            physics: Duration::from_millis(4),
            render: Duration::from_millis(6),
            ..PhaseTimes::default()
        });
        profiler.push_frame(PhaseTimes {
            updates: Duration::from_millis(20),
            ..PhaseTimes::default()
        });

        assert_eq!(profiler.min_time, Duration::from_millis(10));
        assert_eq!(profiler.max_time, Duration::from_millis(20));
        assert_eq!(profiler.avg_time, Duration::from_millis(15));
        assert_eq!(profiler.frames.len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let mut profiler = FrameProfiler::new();
        profiler.max_frames = 4;
        for _ in 0..10 {
            profiler.push_frame(PhaseTimes::default());
        }
        assert_eq!(profiler.frames.len(), 4);
    }
}
