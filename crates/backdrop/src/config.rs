use std::fs;

use anyhow::{Context, Result};
use tracing::debug;
use tuning::TuningConfig;

use crate::paths::AppPaths;

/// Loads `backdrop.toml` from the config directory, or the built-in defaults.
pub fn load_tuning(paths: &AppPaths) -> Result<TuningConfig> {
    let path = paths.config_file();
    if !path.exists() {
        debug!(path = %path.display(), "no tuning file present; using defaults");
        return Ok(TuningConfig::default());
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read tuning file at {}", path.display()))?;
    let config = TuningConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to load tuning file at {}", path.display()))?;
    debug!(path = %path.display(), "loaded tuning file");
    Ok(config)
}
