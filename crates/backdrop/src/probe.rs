use anyhow::{Context, Result};
use fidelity::{
    diagnose, CapabilitySnapshot, DiagnosticIssue, QualitySettings, QualityTierSelector,
    SelectionError, Tier,
};
use serde::Serialize;
use tuning::TuningConfig;

use crate::cli::ProbeArgs;
use crate::run::probe_host;

#[derive(Debug, Serialize)]
struct ProbeOutput {
    capability: CapabilitySnapshot,
    issues: Vec<DiagnosticIssue>,
    tier: Option<Tier>,
    settings: Option<QualitySettings>,
}

pub fn run(args: ProbeArgs, tuning: TuningConfig) -> Result<()> {
    let capability = probe_host(&args.signals);
    let report = diagnose(&capability, None, &tuning.gates);
    report.log();

    let selector = QualityTierSelector::new(tuning);
    let (tier, settings) = match selector.classify(&capability, None) {
        Ok(tier) => (Some(tier), selector.select_initial(&capability).ok()),
        Err(SelectionError::CapabilityUnavailable) => {
            tracing::warn!("accelerated graphics unavailable; host should render a static background");
            (None, None)
        }
    };

    if args.json {
        let output = ProbeOutput {
            capability,
            issues: report.issues,
            tier,
            settings,
        };
        let rendered =
            serde_json::to_string_pretty(&output).context("failed to serialize probe output")?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Capability:");
    println!(
        "  accelerated graphics: {}",
        capability.supports_accelerated_graphics
    );
    println!("  processors:           {}", capability.logical_processor_count);
    println!("  pixel density:        {}", capability.pixel_density);
    println!(
        "  viewport:             {}x{}",
        capability.viewport_width, capability.viewport_height
    );
    println!("  network:              {}", capability.network_quality);

    match (tier, settings) {
        (Some(tier), Some(settings)) => {
            println!("Selected tier: {tier}");
            print_settings(&settings);
        }
        _ => println!("No rendering path: use the static fallback background."),
    }
    Ok(())
}

pub fn print_settings(settings: &QualitySettings) {
    println!("  particles:        {}", settings.particle_count);
    println!("  shapes:           {}", settings.shape_count);
    println!("  lighting:         {}", settings.lighting_enabled);
    println!("  post-processing:  {}", settings.post_processing_enabled);
    println!("  max frame rate:   {}", settings.max_frame_rate);
    println!("  pixel ratio cap:  {}", settings.pixel_ratio_cap);
    println!("  shadow map size:  {}", settings.shadow_map_size);
}
