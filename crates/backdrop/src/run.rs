use anyhow::Result;
use fidelity::{CapabilitySnapshot, HostSignals, SignalOverrides};
use tracing_subscriber::EnvFilter;

use crate::cli::SignalArgs;
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Probes the host, letting command-line values override detection.
pub fn probe_host(args: &SignalArgs) -> CapabilitySnapshot {
    let signals = HostSignals::new(SignalOverrides {
        accelerated_graphics: args.accelerated,
        logical_processors: args.cores,
        pixel_density: args.density,
        viewport: args.viewport,
        network_hint: args.network.clone(),
    });
    fidelity::probe(&signals)
}

pub fn print_paths(paths: &AppPaths) -> Result<()> {
    println!("Backdrop directories:");
    println!("  config:  {}", paths.config_dir().display());
    println!("  data:    {}", paths.data_dir().display());
    println!("  cache:   {}", paths.cache_dir().display());
    println!("  tuning:  {}", paths.config_file().display());
    println!("  store:   {}", paths.store_dir().display());
    Ok(())
}
