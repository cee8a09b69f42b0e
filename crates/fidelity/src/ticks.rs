use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Schedules the next frame of a self-rescheduling animation loop.
pub trait TickSource {
    /// Blocks until the next frame is due and returns its timestamp in
    /// milliseconds, or `None` once the loop should stop.
    fn next_tick(&mut self) -> Option<f64>;

    /// Informs the source of the current frame-rate cap; `None` = uncapped.
    fn set_frame_cap(&mut self, _fps: Option<u32>) {}
}

/// Replays a fixed list of timestamps.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTicks {
    stamps: VecDeque<f64>,
}

impl ScriptedTicks {
    pub fn new(stamps: impl IntoIterator<Item = f64>) -> Self {
        Self {
            stamps: stamps.into_iter().collect(),
        }
    }

    /// `frames` evenly spaced timestamps at `fps`, starting at `start_ms`.
    pub fn steady(fps: f64, frames: usize, start_ms: f64) -> Self {
        let interval = 1000.0 / fps;
        Self::new((0..frames).map(move |frame| start_ms + frame as f64 * interval))
    }

    /// Appends frames at `fps` after the last scripted timestamp.
    pub fn then(mut self, fps: f64, frames: usize) -> Self {
        let interval = 1000.0 / fps;
        let start = self.stamps.back().copied().unwrap_or(0.0);
        self.stamps
            .extend((1..=frames).map(|frame| start + frame as f64 * interval));
        self
    }

    pub fn remaining(&self) -> usize {
        self.stamps.len()
    }
}

impl TickSource for ScriptedTicks {
    fn next_tick(&mut self) -> Option<f64> {
        self.stamps.pop_front()
    }
}

/// Real-time ticks paced to the frame-rate cap.
#[derive(Debug)]
pub struct PacedTicks {
    origin: Instant,
    target_interval: Option<Duration>,
    last_tick: Option<Instant>,
    remaining: Option<u64>,
}

impl PacedTicks {
    /// Stops after `frames` ticks when given, otherwise runs indefinitely.
    pub fn new(target_fps: Option<u32>, frames: Option<u64>) -> Self {
        Self {
            origin: Instant::now(),
            target_interval: interval_for(target_fps),
            last_tick: None,
            remaining: frames,
        }
    }
}

fn interval_for(fps: Option<u32>) -> Option<Duration> {
    fps.filter(|fps| *fps > 0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

impl TickSource for PacedTicks {
    fn next_tick(&mut self) -> Option<f64> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        if let (Some(interval), Some(last)) = (self.target_interval, self.last_tick) {
            let due = last + interval;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }

        let now = Instant::now();
        self.last_tick = Some(now);
        let stamp = now.saturating_duration_since(self.origin).as_secs_f64() * 1000.0;
        trace!(stamp, "paced tick");
        Some(stamp)
    }

    fn set_frame_cap(&mut self, fps: Option<u32>) {
        self.target_interval = interval_for(fps);
    }
}
