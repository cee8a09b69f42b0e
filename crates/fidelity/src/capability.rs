use std::fmt;

use serde::Serialize;
use tracing::debug;

/// Coarse connection quality derived from an effective-type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    #[default]
    Unknown,
    Slow,
    Medium,
    Fast,
}

impl NetworkQuality {
    /// Maps hints such as `2g`, `3g`, `4g`, `wifi` onto the four buckets.
    pub fn from_effective_type(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "slow-2g" | "2g" => Self::Slow,
            "3g" => Self::Medium,
            "4g" | "5g" | "wifi" | "ethernet" => Self::Fast,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Slow => f.write_str("slow"),
            Self::Medium => f.write_str("medium"),
            Self::Fast => f.write_str("fast"),
        }
    }
}

/// Immutable description of the rendering environment, captured once.
///
/// Unknown numeric signals are reported as zero; downstream selection treats
/// zero as the most constrained case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapabilitySnapshot {
    pub supports_accelerated_graphics: bool,
    pub logical_processor_count: u32,
    pub pixel_density: f64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub network_quality: NetworkQuality,
}

/// Raw environment readings consumed by [`probe`].
///
/// Every method is best-effort: `None` means the host exposes no such signal.
pub trait EnvironmentSignals {
    /// Attempts to create (and immediately discard) an accelerated drawing context.
    fn accelerated_graphics(&self) -> bool;
    fn logical_processors(&self) -> Option<u32>;
    fn pixel_density(&self) -> Option<f64>;
    fn viewport(&self) -> Option<(u32, u32)>;
    fn network_hint(&self) -> Option<String>;
}

/// Fixed signal values, used by tests and by hosts that already know them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticSignals {
    pub accelerated_graphics: bool,
    pub logical_processors: Option<u32>,
    pub pixel_density: Option<f64>,
    pub viewport: Option<(u32, u32)>,
    pub network_hint: Option<String>,
}

impl EnvironmentSignals for StaticSignals {
    fn accelerated_graphics(&self) -> bool {
        self.accelerated_graphics
    }

    fn logical_processors(&self) -> Option<u32> {
        self.logical_processors
    }

    fn pixel_density(&self) -> Option<f64> {
        self.pixel_density
    }

    fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    fn network_hint(&self) -> Option<String> {
        self.network_hint.clone()
    }
}

/// Reads every signal once and folds it into a [`CapabilitySnapshot`].
pub fn probe(signals: &dyn EnvironmentSignals) -> CapabilitySnapshot {
    let supports_accelerated_graphics = signals.accelerated_graphics();
    let logical_processor_count = signals.logical_processors().unwrap_or(0);
    let pixel_density = signals
        .pixel_density()
        .filter(|density| density.is_finite() && *density > 0.0)
        .unwrap_or(0.0);
    let (viewport_width, viewport_height) = signals.viewport().unwrap_or((0, 0));
    let network_quality = signals
        .network_hint()
        .map(|hint| NetworkQuality::from_effective_type(&hint))
        .unwrap_or_default();

    let snapshot = CapabilitySnapshot {
        supports_accelerated_graphics,
        logical_processor_count,
        pixel_density,
        viewport_width,
        viewport_height,
        network_quality,
    };
    debug!(?snapshot, "probed device capabilities");
    snapshot
}
