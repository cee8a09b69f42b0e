use anyhow::{bail, Context, Result};
use fidelity::{
    AdaptiveSession, FrameMetrics, PacedTicks, QualitySettings, QualityTierSelector,
    ScriptedTicks, SelectionError, SettingsChange, TickSource,
};
use rand::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tuning::TuningConfig;

use crate::cli::SimulateArgs;
use crate::probe::print_settings;
use crate::run::probe_host;

/// Shortest synthetic frame interval, so jitter never reverses time.
const MIN_INTERVAL_MS: f64 = 0.1;

#[derive(Debug, Serialize)]
struct SimulationOutput {
    initial: QualitySettings,
    changes: Vec<SettingsChange>,
    #[serde(rename = "final")]
    final_settings: QualitySettings,
    metrics: FrameMetrics,
}

pub fn run(args: SimulateArgs, tuning: TuningConfig) -> Result<()> {
    // clap guarantees exactly one of --fps and --realtime.
    if let Some(fps) = args.fps {
        if !fps.is_finite() || fps <= 0.0 {
            bail!("--fps must be a positive number, got {fps}");
        }
    }
    if !args.jitter.is_finite() || args.jitter < 0.0 {
        bail!("--jitter must be non-negative");
    }

    let capability = probe_host(&args.signals);
    let selector = QualityTierSelector::new(tuning);
    let mut session = match AdaptiveSession::new(selector, &capability) {
        Ok(session) => session,
        Err(SelectionError::CapabilityUnavailable) => {
            warn!("accelerated graphics unavailable; nothing to simulate");
            println!("No rendering path: use the static fallback background.");
            return Ok(());
        }
    };
    let initial = session.settings();

    let mut ticks: Box<dyn TickSource> = if args.realtime {
        info!(frames = args.frames, "pacing frames in real time");
        Box::new(PacedTicks::new(
            Some(initial.max_frame_rate),
            Some(args.frames as u64),
        ))
    } else {
        let Some(fps) = args.fps else {
            bail!("--fps is required unless --realtime is given");
        };
        Box::new(synthetic_ticks(fps, args.frames, args.jitter, args.seed))
    };
    let changes = session.run(ticks.as_mut());
    let final_settings = session.settings();

    if args.json {
        let output = SimulationOutput {
            initial,
            changes,
            final_settings,
            metrics: session.metrics(),
        };
        let rendered = serde_json::to_string_pretty(&output)
            .context("failed to serialize simulation output")?;
        println!("{rendered}");
        return Ok(());
    }

    let selector = session.selector();
    println!("Initial tier: {}", selector.nearest_tier(&initial));
    print_settings(&initial);
    if changes.is_empty() {
        println!("No adjustments.");
    }
    for change in &changes {
        println!(
            "t={:>8.0}ms avg={:>5.1}fps particles {:>4} -> {:<4} shapes {} -> {} lighting={} post={} cap={}",
            change.at_ms,
            change.metrics.rolling_average_fps,
            change.from.particle_count,
            change.to.particle_count,
            change.from.shape_count,
            change.to.shape_count,
            change.to.lighting_enabled,
            change.to.post_processing_enabled,
            change.to.max_frame_rate,
        );
    }
    println!("Final tier: {}", selector.nearest_tier(&final_settings));
    print_settings(&final_settings);
    Ok(())
}

fn synthetic_ticks(fps: f64, frames: usize, jitter: f64, seed: u64) -> ScriptedTicks {
    let mut rng = StdRng::seed_from_u64(seed);
    let interval = 1000.0 / fps;
    let mut now = 0.0;
    let stamps: Vec<f64> = (0..frames)
        .map(|_| {
            let stamp = now;
            let offset = if jitter > 0.0 {
                rng.gen_range(-jitter..=jitter)
            } else {
                0.0
            };
            now += (interval + offset).max(MIN_INTERVAL_MS);
            stamp
        })
        .collect();
    ScriptedTicks::new(stamps)
}
