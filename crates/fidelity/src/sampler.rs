//! Frame-cadence observer for a running animation loop.
//!
//! The host calls [`FrameTimingSampler::record_frame`] once per rendered
//! frame. Every `sample_every` frames the sampler derives an fps reading from
//! the frames and time elapsed since the previous reading, pushes it into a
//! fixed-capacity FIFO window, and notifies listeners with the refreshed
//! [`FrameMetrics`]. The sampler is single-threaded by contract; wrap it in
//! your own synchronisation if two loops must share one.
use std::collections::VecDeque;

use serde::Serialize;
use tracing::trace;
use tuning::SamplerTuning;

/// Smoothed frame-timing readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMetrics {
    pub instant_fps: f64,
    /// Mean of the readings currently in the window.
    pub rolling_average_fps: f64,
    /// Most recent frame-to-frame interval, updated on every frame.
    pub frame_duration_ms: f64,
    pub is_low_performance: bool,
    pub memory_usage_mb: Option<f64>,
    /// Number of readings in the window.
    pub samples: usize,
}

impl FrameMetrics {
    /// Metrics before any frame has been observed: a nominal 60 fps.
    pub fn nominal() -> Self {
        Self {
            instant_fps: 60.0,
            rolling_average_fps: 60.0,
            frame_duration_ms: 1000.0 / 60.0,
            is_low_performance: false,
            memory_usage_mb: None,
            samples: 0,
        }
    }
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self::nominal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Sampling,
}

/// Token returned by [`FrameTimingSampler::on_performance_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type Listener = Box<dyn FnMut(&FrameMetrics)>;
type MemorySource = Box<dyn Fn() -> Option<f64>>;

pub struct FrameTimingSampler {
    tuning: SamplerTuning,
    state: SamplerState,
    frame_count: u64,
    last_frame_ms: Option<f64>,
    /// Timestamp and frame count of the previous fps reading.
    anchor: Option<(f64, u64)>,
    window: VecDeque<f64>,
    metrics: FrameMetrics,
    listeners: Vec<(ListenerHandle, Listener)>,
    next_listener: u64,
    memory: Option<MemorySource>,
}

impl std::fmt::Debug for FrameTimingSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTimingSampler")
            .field("state", &self.state)
            .field("frame_count", &self.frame_count)
            .field("metrics", &self.metrics)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for FrameTimingSampler {
    fn default() -> Self {
        Self::new(SamplerTuning::default())
    }
}

impl FrameTimingSampler {
    pub fn new(tuning: SamplerTuning) -> Self {
        let window = VecDeque::with_capacity(tuning.window.max(1));
        Self {
            tuning,
            state: SamplerState::Idle,
            frame_count: 0,
            last_frame_ms: None,
            anchor: None,
            window,
            metrics: FrameMetrics::nominal(),
            listeners: Vec::new(),
            next_listener: 0,
            memory: None,
        }
    }

    /// Installs a hook reporting current memory usage in megabytes.
    pub fn set_memory_source(&mut self, source: impl Fn() -> Option<f64> + 'static) {
        self.memory = Some(Box::new(source));
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.metrics
    }

    /// Begins a fresh sampling session, discarding earlier readings.
    pub fn start(&mut self) {
        self.frame_count = 0;
        self.last_frame_ms = None;
        self.anchor = None;
        self.window.clear();
        self.metrics = FrameMetrics::nominal();
        self.state = SamplerState::Sampling;
    }

    pub fn stop(&mut self) {
        self.state = SamplerState::Idle;
    }

    /// Records one rendered frame at `now_ms` (monotonic milliseconds).
    pub fn record_frame(&mut self, now_ms: f64) {
        if self.state != SamplerState::Sampling {
            trace!(now_ms, "frame recorded while idle; ignoring");
            return;
        }

        if let Some(last) = self.last_frame_ms {
            self.metrics.frame_duration_ms = (now_ms - last).max(0.0);
        }
        self.last_frame_ms = Some(now_ms);
        self.frame_count += 1;

        let Some((anchor_ms, anchor_frame)) = self.anchor else {
            self.anchor = Some((now_ms, self.frame_count));
            return;
        };

        if self.frame_count % self.tuning.sample_every.max(1) != 0 {
            return;
        }

        let elapsed = now_ms - anchor_ms;
        let frames = (self.frame_count - anchor_frame) as f64;
        self.anchor = Some((now_ms, self.frame_count));
        if elapsed <= 0.0 {
            trace!(now_ms, "non-increasing frame timestamps; skipping reading");
            return;
        }
        self.record_sample(frames * 1000.0 / elapsed);
    }

    /// Pushes one instantaneous fps reading into the window and notifies listeners.
    pub fn record_sample(&mut self, instant_fps: f64) {
        let capacity = self.tuning.window.max(1);
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(instant_fps);

        let average = self.window.iter().sum::<f64>() / self.window.len() as f64;
        self.metrics.instant_fps = instant_fps;
        self.metrics.rolling_average_fps = average;
        self.metrics.is_low_performance = average < self.tuning.low_fps_threshold;
        self.metrics.samples = self.window.len();
        self.metrics.memory_usage_mb = self.memory.as_ref().and_then(|source| source());
        trace!(
            instant_fps,
            average,
            samples = self.metrics.samples,
            "frame metrics updated"
        );

        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.metrics);
        }
    }

    /// Registers a callback invoked each time the window is updated.
    pub fn on_performance_change(
        &mut self,
        listener: impl FnMut(&FrameMetrics) + 'static,
    ) -> ListenerHandle {
        let handle = ListenerHandle(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((handle, Box::new(listener)));
        handle
    }

    /// Removes a listener; returns false if it was already gone.
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != handle);
        self.listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sampling() -> FrameTimingSampler {
        let mut sampler = FrameTimingSampler::default();
        sampler.start();
        sampler
    }

    fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn rolling_average_over_partial_window() {
        let mut sampler = sampling();
        let readings = [60.0, 30.0, 45.0, 12.0, 58.5];
        for reading in readings {
            sampler.record_sample(reading);
        }
        let metrics = sampler.metrics();
        assert!((metrics.rolling_average_fps - mean(&readings)).abs() < 1e-9);
        assert_eq!(metrics.samples, readings.len());
        assert_eq!(metrics.instant_fps, 58.5);
    }

    #[test]
    fn rolling_average_keeps_most_recent_window() {
        let mut sampler = sampling();
        let readings: Vec<f64> = (0..150).map(|index| index as f64).collect();
        for reading in &readings {
            sampler.record_sample(*reading);
        }
        let metrics = sampler.metrics();
        assert_eq!(metrics.samples, 60);
        assert!((metrics.rolling_average_fps - mean(&readings[90..])).abs() < 1e-9);
    }

    #[test]
    fn low_performance_below_thirty() {
        let mut sampler = sampling();
        sampler.record_sample(29.9);
        assert!(sampler.metrics().is_low_performance);
        sampler.record_sample(30.1);
        assert!(!sampler.metrics().is_low_performance);
    }

    #[test]
    fn steady_frames_yield_matching_fps() {
        let mut sampler = sampling();
        for frame in 0..=40 {
            sampler.record_frame(frame as f64 * 20.0);
        }
        let metrics = sampler.metrics();
        assert_eq!(metrics.samples, 4);
        assert!((metrics.rolling_average_fps - 50.0).abs() < 1e-9);
        assert!((metrics.frame_duration_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn readings_only_every_tenth_frame() {
        let mut sampler = sampling();
        let notified = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&notified);
        sampler.on_performance_change(move |_| *counter.borrow_mut() += 1);

        for frame in 0..9 {
            sampler.record_frame(frame as f64 * 16.0);
        }
        assert_eq!(*notified.borrow(), 0);
        assert_eq!(sampler.metrics().frame_duration_ms, 16.0);
        sampler.record_frame(9.0 * 16.0);
        assert_eq!(*notified.borrow(), 1);
        for frame in 10..30 {
            sampler.record_frame(frame as f64 * 16.0);
        }
        assert_eq!(*notified.borrow(), 3);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let mut sampler = sampling();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let handle = sampler.on_performance_change(move |metrics| {
            sink.borrow_mut().push(metrics.instant_fps);
        });
        sampler.record_sample(42.0);
        assert!(sampler.unsubscribe(handle));
        assert!(!sampler.unsubscribe(handle));
        sampler.record_sample(24.0);
        assert_eq!(*seen.borrow(), vec![42.0]);
    }

    #[test]
    fn idle_sampler_ignores_frames() {
        let mut sampler = FrameTimingSampler::default();
        for frame in 0..20 {
            sampler.record_frame(frame as f64 * 10.0);
        }
        assert_eq!(sampler.state(), SamplerState::Idle);
        assert_eq!(sampler.metrics(), FrameMetrics::nominal());

        sampler.start();
        sampler.record_sample(10.0);
        sampler.stop();
        sampler.record_frame(1_000.0);
        assert_eq!(sampler.metrics().samples, 1);

        sampler.start();
        assert_eq!(sampler.metrics().samples, 0);
    }

    #[test]
    fn memory_source_is_reported() {
        let mut sampler = sampling();
        sampler.set_memory_source(|| Some(64.0));
        sampler.record_sample(60.0);
        assert_eq!(sampler.metrics().memory_usage_mb, Some(64.0));
    }

    #[test]
    fn duplicate_timestamps_do_not_produce_infinite_fps() {
        let mut sampler = sampling();
        for _ in 0..20 {
            sampler.record_frame(500.0);
        }
        assert_eq!(sampler.metrics().samples, 0);
        assert!(sampler.metrics().rolling_average_fps.is_finite());
    }
}
