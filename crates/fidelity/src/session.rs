//! Wires the sampler and selector around a running frame loop.
//!
//! ```text
//!   TickSource ──now──▶ FrameTimingSampler ──FrameMetrics──▶ QualityTierSelector::adapt
//!        ▲                                                        │
//!        └──────────── frame cap ◀── SettingsChange ◀─────────────┘
//! ```
use serde::Serialize;
use tracing::{debug, info};

use crate::capability::CapabilitySnapshot;
use crate::sampler::{FrameMetrics, FrameTimingSampler};
use crate::selector::{QualitySettings, QualityTierSelector, SelectionError};
use crate::ticks::TickSource;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingsChange {
    pub at_ms: f64,
    pub from: QualitySettings,
    pub to: QualitySettings,
    pub metrics: FrameMetrics,
}

#[derive(Debug)]
pub struct AdaptiveSession {
    selector: QualityTierSelector,
    sampler: FrameTimingSampler,
    settings: QualitySettings,
    interval_ms: f64,
    last_adapt_ms: Option<f64>,
}

impl AdaptiveSession {
    /// Selects the initial settings for `capability` and prepares a sampler.
    pub fn new(
        selector: QualityTierSelector,
        capability: &CapabilitySnapshot,
    ) -> Result<Self, SelectionError> {
        let settings = selector.select_initial(capability)?;
        let sampler = FrameTimingSampler::new(selector.tuning().sampler.clone());
        let interval_ms = selector.tuning().adapt.interval.as_secs_f64() * 1000.0;
        Ok(Self {
            selector,
            sampler,
            settings,
            interval_ms,
            last_adapt_ms: None,
        })
    }

    pub fn settings(&self) -> QualitySettings {
        self.settings
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.sampler.metrics()
    }

    pub fn sampler_mut(&mut self) -> &mut FrameTimingSampler {
        &mut self.sampler
    }

    pub fn selector(&self) -> &QualityTierSelector {
        &self.selector
    }

    pub fn start(&mut self) {
        self.sampler.start();
        self.last_adapt_ms = None;
    }

    pub fn stop(&mut self) {
        self.sampler.stop();
    }

    /// Records one frame and, once per adapt interval, re-evaluates settings.
    pub fn on_frame(&mut self, now_ms: f64) -> Option<SettingsChange> {
        self.sampler.record_frame(now_ms);

        let last = *self.last_adapt_ms.get_or_insert(now_ms);
        if now_ms - last < self.interval_ms {
            return None;
        }
        self.last_adapt_ms = Some(now_ms);

        let metrics = self.sampler.metrics();
        if metrics.samples == 0 {
            debug!(now_ms, "no frame readings yet; skipping adaptation");
            return None;
        }

        let next = self.selector.adapt(&self.settings, &metrics);
        if next == self.settings {
            return None;
        }
        let change = SettingsChange {
            at_ms: now_ms,
            from: self.settings,
            to: next,
            metrics,
        };
        self.settings = next;
        Some(change)
    }

    /// Drives the loop until `ticks` is exhausted, returning every change.
    pub fn run(&mut self, ticks: &mut dyn TickSource) -> Vec<SettingsChange> {
        self.start();
        ticks.set_frame_cap(Some(self.settings.max_frame_rate));
        let mut changes = Vec::new();
        while let Some(now_ms) = ticks.next_tick() {
            if let Some(change) = self.on_frame(now_ms) {
                info!(
                    at_ms = change.at_ms,
                    fps = change.metrics.rolling_average_fps,
                    tier = %self.selector.nearest_tier(&change.to),
                    particles = change.to.particle_count,
                    "quality settings changed"
                );
                ticks.set_frame_cap(Some(change.to.max_frame_rate));
                changes.push(change);
            }
        }
        self.stop();
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::NetworkQuality;
    use crate::ticks::ScriptedTicks;

    fn capability(cores: u32, density: f64, width: u32) -> CapabilitySnapshot {
        CapabilitySnapshot {
            supports_accelerated_graphics: true,
            logical_processor_count: cores,
            pixel_density: density,
            viewport_width: width,
            viewport_height: 800,
            network_quality: NetworkQuality::Unknown,
        }
    }

    #[test]
    fn refuses_to_start_without_graphics() {
        let mut snapshot = capability(8, 1.0, 1920);
        snapshot.supports_accelerated_graphics = false;
        let result = AdaptiveSession::new(QualityTierSelector::default(), &snapshot);
        assert!(matches!(result, Err(SelectionError::CapabilityUnavailable)));
    }

    #[test]
    fn fast_frames_raise_quality_once_per_interval() {
        let mut session =
            AdaptiveSession::new(QualityTierSelector::default(), &capability(2, 2.0, 375)).unwrap();
        let mut ticks = ScriptedTicks::steady(60.0, 60 * 5, 0.0);
        let changes = session.run(&mut ticks);
        assert!(!changes.is_empty());
        assert!(changes.len() <= 5);
        for pair in changes.windows(2) {
            assert!(pair[1].at_ms - pair[0].at_ms >= 1000.0);
            assert!(pair[1].to.particle_count > pair[0].to.particle_count);
        }
        assert!(session.settings().particle_count > 500);
    }

    #[test]
    fn slow_frames_lower_quality() {
        let mut session =
            AdaptiveSession::new(QualityTierSelector::default(), &capability(8, 2.0, 1920)).unwrap();
        let mut ticks = ScriptedTicks::steady(15.0, 15 * 4, 0.0);
        let changes = session.run(&mut ticks);
        assert!(!changes.is_empty());
        let settings = session.settings();
        assert!(settings.particle_count < 1500);
        assert!(!settings.lighting_enabled);
        assert!(!settings.post_processing_enabled);
        assert_eq!(settings.max_frame_rate, 30);
    }

    #[test]
    fn steady_mid_band_never_changes() {
        let mut session =
            AdaptiveSession::new(QualityTierSelector::default(), &capability(8, 1.0, 1920)).unwrap();
        let initial = session.settings();
        let mut ticks = ScriptedTicks::steady(40.0, 40 * 10, 0.0);
        assert!(session.run(&mut ticks).is_empty());
        assert_eq!(session.settings(), initial);
    }
}
