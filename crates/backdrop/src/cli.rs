use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "backdrop",
    author,
    version,
    about = "Adaptive quality controller for decorative animated backgrounds"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe the device and print the initial quality settings.
    Probe(ProbeArgs),
    /// Feed a synthetic frame stream through the adaptive controller.
    Simulate(SimulateArgs),
    /// Operate one of the preset expiring caches.
    Cache(CacheArgs),
    /// Print resolved config, data, and cache directories.
    Where,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SignalArgs {
    /// Viewport size in CSS pixels (e.g. `1920x1080`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_viewport, env = "BACKDROP_VIEWPORT")]
    pub viewport: Option<(u32, u32)>,

    /// Device pixel ratio.
    #[arg(long, value_name = "RATIO", env = "BACKDROP_PIXEL_DENSITY")]
    pub density: Option<f64>,

    /// Override the detected logical processor count.
    #[arg(long, value_name = "COUNT")]
    pub cores: Option<u32>,

    /// Connection effective type (`slow-2g`, `2g`, `3g`, `4g`, ...).
    #[arg(long, value_name = "HINT", env = "BACKDROP_NETWORK")]
    pub network: Option<String>,

    /// Skip the GPU adapter probe and report this result instead.
    #[arg(long, value_name = "BOOL")]
    pub accelerated: Option<bool>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub signals: SignalArgs,

    /// Emit machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub signals: SignalArgs,

    /// Frame rate the synthetic loop achieves.
    #[arg(
        long,
        value_name = "FPS",
        required_unless_present = "realtime",
        conflicts_with = "realtime"
    )]
    pub fps: Option<f64>,

    /// Number of frames to simulate.
    #[arg(long, value_name = "COUNT", default_value_t = 600)]
    pub frames: usize,

    /// Maximum random deviation per frame interval, in milliseconds.
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 0.0)]
    pub jitter: f64,

    /// Seed for the jitter generator.
    #[arg(long, value_name = "SEED", default_value_t = 1)]
    pub seed: u64,

    /// Pace frames in real time instead of replaying them instantly.
    #[arg(long)]
    pub realtime: bool,

    /// Emit machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CachePresetName {
    Image,
    Api,
}

impl CachePresetName {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePresetName::Image => "image",
            CachePresetName::Api => "api",
        }
    }
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Which preset cache to operate on.
    #[arg(value_enum)]
    pub preset: CachePresetName,

    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Store a value (JSON if it parses, otherwise a string).
    Set {
        key: String,
        value: String,
        /// Entry lifetime (e.g. `90s`, `5m`); defaults to the preset TTL.
        #[arg(long, value_parser = parse_duration)]
        ttl: Option<Duration>,
    },
    /// Print a live value; exits non-zero when absent.
    Get { key: String },
    /// Remove one entry.
    Delete { key: String },
    /// Remove every entry.
    Clear,
    /// Sweep expired entries.
    Cleanup,
    /// List live keys in insertion order.
    List,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_viewport(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid viewport '{value}'; expected WIDTHxHEIGHT"))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid viewport width '{width}'"))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid viewport height '{height}'"))?;
    Ok((width, height))
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}
