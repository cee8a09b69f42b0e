use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use tuning::GateTuning;

use crate::capability::{CapabilitySnapshot, NetworkQuality};
use crate::sampler::FrameMetrics;

const DENSE_DISPLAY: f64 = 2.0;
const HEAVY_MEMORY_MB: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DiagnosticIssue {
    NoAcceleratedGraphics,
    MobileViewport { width: u32 },
    LowEndProcessor { cores: u32 },
    DenseDisplay { density: f64 },
    SlowNetwork,
    HighMemoryUsage { megabytes: f64 },
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAcceleratedGraphics => {
                f.write_str("accelerated graphics unavailable; background uses static fallback")
            }
            Self::MobileViewport { width } => {
                write!(f, "mobile viewport ({width}px wide); using reduced settings")
            }
            Self::LowEndProcessor { cores: 0 } => {
                f.write_str("processor count unknown; reducing animation complexity")
            }
            Self::LowEndProcessor { cores } => {
                write!(f, "low-end device ({cores} cores); reducing animation complexity")
            }
            Self::DenseDisplay { density } => {
                write!(f, "pixel density {density:.2} may affect performance")
            }
            Self::SlowNetwork => f.write_str("slow network connection detected"),
            Self::HighMemoryUsage { megabytes } => {
                write!(f, "high memory usage detected ({megabytes:.0} MB)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub capability: CapabilitySnapshot,
    pub metrics: Option<FrameMetrics>,
    pub issues: Vec<DiagnosticIssue>,
}

impl DiagnosticReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Dumps the report at INFO, with one WARN line per issue.
    pub fn log(&self) {
        let capability = &self.capability;
        info!("=== Backdrop Diagnostics ===");
        info!(
            "  viewport: {}x{}",
            capability.viewport_width, capability.viewport_height
        );
        info!("  cores: {}", capability.logical_processor_count);
        info!("  pixel-ratio: {}", capability.pixel_density);
        info!(
            "  accelerated-graphics: {}",
            capability.supports_accelerated_graphics
        );
        info!("  network: {}", capability.network_quality);
        if let Some(metrics) = &self.metrics {
            info!("  fps: {:.1}", metrics.rolling_average_fps);
            match metrics.memory_usage_mb {
                Some(megabytes) => info!("  memory: {megabytes:.0}MB"),
                None => info!("  memory: n/a"),
            }
        }
        if self.is_clean() {
            info!("  no issues detected");
        }
        for issue in &self.issues {
            warn!("  - {issue}");
        }
        info!("=== End Diagnostics ===");
    }
}

/// Lists the constraints a device shows, using the same gates as tier selection.
pub fn diagnose(
    capability: &CapabilitySnapshot,
    metrics: Option<&FrameMetrics>,
    gates: &GateTuning,
) -> DiagnosticReport {
    let mut issues = Vec::new();

    if !capability.supports_accelerated_graphics {
        issues.push(DiagnosticIssue::NoAcceleratedGraphics);
    }
    if capability.viewport_width < gates.mobile_viewport_width {
        issues.push(DiagnosticIssue::MobileViewport {
            width: capability.viewport_width,
        });
    }
    if capability.logical_processor_count < gates.low_end_cores {
        issues.push(DiagnosticIssue::LowEndProcessor {
            cores: capability.logical_processor_count,
        });
    }
    if capability.pixel_density > DENSE_DISPLAY {
        issues.push(DiagnosticIssue::DenseDisplay {
            density: capability.pixel_density,
        });
    }
    if capability.network_quality == NetworkQuality::Slow {
        issues.push(DiagnosticIssue::SlowNetwork);
    }
    if let Some(megabytes) = metrics.and_then(|metrics| metrics.memory_usage_mb) {
        if megabytes > HEAVY_MEMORY_MB {
            issues.push(DiagnosticIssue::HighMemoryUsage { megabytes });
        }
    }

    DiagnosticReport {
        capability: *capability,
        metrics: metrics.copied(),
        issues,
    }
}
