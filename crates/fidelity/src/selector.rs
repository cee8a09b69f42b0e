//! Maps device capability and measured frame timing onto rendering budgets.
//!
//! Initial selection is a first-match decision table:
//!
//! ```text
//!   no accelerated graphics            -> CapabilityUnavailable (caller shows a static fallback)
//!   narrow viewport | few/unknown cores -> low
//!   high-DPI                           -> high
//!   otherwise                          -> medium
//! ```
//!
//! `adapt` then nudges a running configuration: up when the rolling average
//! sits above the upper bound, down when it falls below the lower bound or is
//! flagged low, and leaves it untouched inside the band.
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};
use tuning::{TierSpec, TuningConfig, MIN_PARTICLES, MIN_PIXEL_RATIO, MIN_SHAPES};

use crate::capability::CapabilitySnapshot;
use crate::sampler::FrameMetrics;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no accelerated graphics context is available; use a non-rendering fallback")]
    CapabilityUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Minimal,
    Low,
    Medium,
    High,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Minimal => f.write_str("minimal"),
            Tier::Low => f.write_str("low"),
            Tier::Medium => f.write_str("medium"),
            Tier::High => f.write_str("high"),
        }
    }
}

/// Rendering budget handed to the animation host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualitySettings {
    pub particle_count: u32,
    pub shape_count: u32,
    pub lighting_enabled: bool,
    pub post_processing_enabled: bool,
    pub max_frame_rate: u32,
    pub pixel_ratio_cap: f64,
    pub shadow_map_size: u32,
}

impl QualitySettings {
    fn from_tier(spec: &TierSpec, pixel_density: f64) -> Self {
        Self {
            particle_count: spec.particle_count,
            shape_count: spec.shape_count,
            lighting_enabled: spec.lighting,
            post_processing_enabled: spec.post_processing,
            max_frame_rate: spec.max_frame_rate,
            pixel_ratio_cap: pixel_density.min(spec.pixel_ratio_cap),
            shadow_map_size: spec.shadow_map_size,
        }
        .clamped()
    }

    /// Raises every numeric field to its floor so nothing renders at zero fidelity.
    pub fn clamped(mut self) -> Self {
        self.particle_count = self.particle_count.max(MIN_PARTICLES);
        self.shape_count = self.shape_count.max(MIN_SHAPES);
        self.max_frame_rate = self.max_frame_rate.max(1);
        if self.pixel_ratio_cap.is_nan() || self.pixel_ratio_cap < MIN_PIXEL_RATIO {
            self.pixel_ratio_cap = MIN_PIXEL_RATIO;
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityTierSelector {
    tuning: TuningConfig,
}

impl QualityTierSelector {
    pub fn new(tuning: TuningConfig) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> &TuningConfig {
        &self.tuning
    }

    fn spec(&self, tier: Tier) -> &TierSpec {
        match tier {
            Tier::Minimal => &self.tuning.tiers.minimal,
            Tier::Low => &self.tuning.tiers.low,
            Tier::Medium => &self.tuning.tiers.medium,
            Tier::High => &self.tuning.tiers.high,
        }
    }

    fn is_constrained(&self, capability: &CapabilitySnapshot) -> bool {
        let gates = &self.tuning.gates;
        capability.viewport_width < gates.mobile_viewport_width
            || capability.logical_processor_count < gates.low_end_cores
            || capability.pixel_density <= 0.0
    }

    /// Picks the tier for a device, optionally refined by live metrics.
    pub fn classify(
        &self,
        capability: &CapabilitySnapshot,
        metrics: Option<&FrameMetrics>,
    ) -> Result<Tier, SelectionError> {
        if !capability.supports_accelerated_graphics {
            return Err(SelectionError::CapabilityUnavailable);
        }

        let gates = &self.tuning.gates;
        if let Some(metrics) = metrics {
            if metrics.is_low_performance
                && metrics.rolling_average_fps < gates.minimal_tier_below_fps
            {
                return Ok(Tier::Minimal);
            }
            if metrics.is_low_performance {
                return Ok(Tier::Low);
            }
        }

        if self.is_constrained(capability) {
            return Ok(Tier::Low);
        }

        if capability.pixel_density > gates.high_dpi {
            let struggling = metrics
                .is_some_and(|metrics| metrics.rolling_average_fps < gates.high_tier_min_fps);
            if !struggling {
                return Ok(Tier::High);
            }
        }

        Ok(Tier::Medium)
    }

    /// Initial selection from capability alone.
    pub fn select_initial(
        &self,
        capability: &CapabilitySnapshot,
    ) -> Result<QualitySettings, SelectionError> {
        self.select(capability, None)
    }

    pub fn select(
        &self,
        capability: &CapabilitySnapshot,
        metrics: Option<&FrameMetrics>,
    ) -> Result<QualitySettings, SelectionError> {
        let tier = self.classify(capability, metrics)?;
        let settings = QualitySettings::from_tier(self.spec(tier), capability.pixel_density);
        debug!(%tier, ?settings, "selected quality tier");
        Ok(settings)
    }

    /// Nudges `current` according to sustained measured performance.
    pub fn adapt(&self, current: &QualitySettings, metrics: &FrameMetrics) -> QualitySettings {
        let adapt = &self.tuning.adapt;
        let fps = metrics.rolling_average_fps;

        if fps > adapt.upscale_above_fps && !metrics.is_low_performance {
            let grown = scale(current.particle_count, 1.0 + adapt.particle_growth);
            let next = QualitySettings {
                particle_count: grown.min(self.tuning.particle_ceiling()),
                shape_count: current
                    .shape_count
                    .saturating_add(1)
                    .min(self.tuning.shape_ceiling()),
                ..*current
            }
            .clamped();
            if next != *current {
                info!(fps, particles = next.particle_count, shapes = next.shape_count, "raising quality");
            }
            return next;
        }

        if fps < adapt.downscale_below_fps || metrics.is_low_performance {
            let next = QualitySettings {
                particle_count: scale(current.particle_count, 1.0 - adapt.particle_decay),
                shape_count: current.shape_count.saturating_sub(1),
                lighting_enabled: false,
                post_processing_enabled: false,
                max_frame_rate: current.max_frame_rate.min(adapt.frame_cap_when_degraded),
                ..*current
            }
            .clamped();
            if next != *current {
                info!(fps, particles = next.particle_count, shapes = next.shape_count, "lowering quality");
            }
            return next;
        }

        *current
    }

    /// Named tier whose particle budget is closest to `settings`.
    pub fn nearest_tier(&self, settings: &QualitySettings) -> Tier {
        [Tier::Minimal, Tier::Low, Tier::Medium, Tier::High]
            .into_iter()
            .min_by_key(|tier| {
                (self.spec(*tier).particle_count as i64 - settings.particle_count as i64).abs()
            })
            .unwrap_or(Tier::Low)
    }
}

fn scale(count: u32, factor: f64) -> u32 {
    (count as f64 * factor).round().clamp(0.0, u32::MAX as f64) as u32
}
