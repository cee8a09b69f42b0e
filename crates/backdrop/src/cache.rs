use std::sync::Arc;

use anyhow::{bail, Context, Result};
use expcache::{
    CacheOptions, ExpiringCache, FileStore, MemoryStore, PersistenceMode, PersistentStore,
    SystemClock,
};
use serde_json::Value;
use tracing::{debug, info};
use tuning::TuningConfig;

use crate::cli::{CacheAction, CacheArgs, CachePresetName};
use crate::paths::AppPaths;

pub fn run(args: CacheArgs, paths: &AppPaths, tuning: &TuningConfig) -> Result<()> {
    let mut cache = open(args.preset, paths, tuning)?;

    match args.action {
        CacheAction::Set { key, value, ttl } => {
            cache.set(&key, parse_value(&value), ttl);
            info!(cache = args.preset.as_str(), %key, "stored entry");
        }
        CacheAction::Get { key } => match cache.get(&key) {
            Some(Value::String(text)) => println!("{text}"),
            Some(value) => println!("{value}"),
            None => bail!("no live entry for '{key}' in the {} cache", args.preset.as_str()),
        },
        CacheAction::Delete { key } => {
            if cache.delete(&key) {
                println!("removed {key}");
            } else {
                println!("{key} was not present");
            }
        }
        CacheAction::Clear => {
            cache.clear();
            println!("cleared the {} cache", args.preset.as_str());
        }
        CacheAction::Cleanup => {
            let removed = cache.cleanup();
            println!("removed {removed} expired entries");
        }
        CacheAction::List => {
            cache.cleanup();
            for key in cache.keys() {
                println!("{key}");
            }
        }
    }
    Ok(())
}

fn open(
    preset: CachePresetName,
    paths: &AppPaths,
    tuning: &TuningConfig,
) -> Result<ExpiringCache<Value>> {
    let preset_config = match preset {
        CachePresetName::Image => &tuning.cache.image,
        CachePresetName::Api => &tuning.cache.api,
    };
    let options = CacheOptions::from_preset(preset.as_str(), preset_config);

    let store: Option<Box<dyn PersistentStore>> = match options.persistence {
        PersistenceMode::Durable => {
            let root = paths.store_dir();
            debug!(path = %root.display(), "using durable cache store");
            Some(Box::new(FileStore::new(root)))
        }
        PersistenceMode::Session => {
            // One CLI invocation is one session.
            debug!("session cache lives only for this process");
            Some(Box::new(MemoryStore::new()))
        }
        PersistenceMode::None => None,
    };

    ExpiringCache::with_parts(options, Arc::new(SystemClock), store)
        .with_context(|| format!("failed to open the {} cache", preset.as_str()))
}

/// JSON when the text parses as JSON, otherwise the raw string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
