use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Smallest particle budget any tier may request.
pub const MIN_PARTICLES: u32 = 100;
/// Smallest shape budget any tier may request.
pub const MIN_SHAPES: u32 = 1;
/// Smallest pixel-ratio ceiling any tier may request.
pub const MIN_PIXEL_RATIO: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    #[default]
    None,
    Session,
    Durable,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub sampler: SamplerTuning,
    #[serde(default)]
    pub adapt: AdaptTuning,
    #[serde(default)]
    pub gates: GateTuning,
    #[serde(default)]
    pub tiers: TierTable,
    #[serde(default)]
    pub cache: CachePresets,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerTuning {
    /// Number of fps readings kept in the rolling window.
    pub window: usize,
    /// Recompute the fps reading every N recorded frames.
    pub sample_every: u64,
    pub low_fps_threshold: f64,
}

impl Default for SamplerTuning {
    fn default() -> Self {
        Self {
            window: 60,
            sample_every: 10,
            low_fps_threshold: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptTuning {
    pub upscale_above_fps: f64,
    pub downscale_below_fps: f64,
    pub particle_growth: f64,
    pub particle_decay: f64,
    pub frame_cap_when_degraded: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

impl Default for AdaptTuning {
    fn default() -> Self {
        Self {
            upscale_above_fps: 55.0,
            downscale_below_fps: 25.0,
            particle_growth: 0.10,
            particle_decay: 0.20,
            frame_cap_when_degraded: 30,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GateTuning {
    /// Viewports narrower than this are treated as mobile.
    pub mobile_viewport_width: u32,
    /// Known processor counts below this are treated as low-end.
    pub low_end_cores: u32,
    /// Pixel densities above this are treated as high-DPI.
    pub high_dpi: f64,
    /// Measured fps below which a high-DPI device drops to the medium tier.
    pub high_tier_min_fps: f64,
    /// Measured fps below which a struggling device drops to the minimal tier.
    pub minimal_tier_below_fps: f64,
}

impl Default for GateTuning {
    fn default() -> Self {
        Self {
            mobile_viewport_width: 768,
            low_end_cores: 4,
            high_dpi: 1.5,
            high_tier_min_fps: 45.0,
            minimal_tier_below_fps: 20.0,
        }
    }
}

/// Rendering budget for one named tier.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TierSpec {
    pub particle_count: u32,
    pub shape_count: u32,
    pub lighting: bool,
    pub post_processing: bool,
    pub max_frame_rate: u32,
    /// Upper bound applied to the device pixel density.
    pub pixel_ratio_cap: f64,
    pub shadow_map_size: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TierTable {
    #[serde(default = "TierTable::default_minimal")]
    pub minimal: TierSpec,
    #[serde(default = "TierTable::default_low")]
    pub low: TierSpec,
    #[serde(default = "TierTable::default_medium")]
    pub medium: TierSpec,
    #[serde(default = "TierTable::default_high")]
    pub high: TierSpec,
}

impl TierTable {
    fn default_minimal() -> TierSpec {
        TierSpec {
            particle_count: 200,
            shape_count: 1,
            lighting: false,
            post_processing: false,
            max_frame_rate: 20,
            pixel_ratio_cap: 1.0,
            shadow_map_size: 256,
        }
    }

    fn default_low() -> TierSpec {
        TierSpec {
            particle_count: 500,
            shape_count: 3,
            lighting: false,
            post_processing: false,
            max_frame_rate: 30,
            pixel_ratio_cap: 1.5,
            shadow_map_size: 512,
        }
    }

    fn default_medium() -> TierSpec {
        TierSpec {
            particle_count: 1000,
            shape_count: 5,
            lighting: true,
            post_processing: false,
            max_frame_rate: 60,
            pixel_ratio_cap: 2.0,
            shadow_map_size: 1024,
        }
    }

    fn default_high() -> TierSpec {
        TierSpec {
            particle_count: 1500,
            shape_count: 8,
            lighting: true,
            post_processing: true,
            max_frame_rate: 60,
            pixel_ratio_cap: 2.0,
            shadow_map_size: 2048,
        }
    }

    fn entries(&self) -> [(&'static str, &TierSpec); 4] {
        [
            ("minimal", &self.minimal),
            ("low", &self.low),
            ("medium", &self.medium),
            ("high", &self.high),
        ]
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            minimal: Self::default_minimal(),
            low: Self::default_low(),
            medium: Self::default_medium(),
            high: Self::default_high(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CachePreset {
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    pub capacity: u32,
    #[serde(default)]
    pub persistence: PersistenceMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CachePresets {
    #[serde(default = "CachePresets::default_image")]
    pub image: CachePreset,
    #[serde(default = "CachePresets::default_api")]
    pub api: CachePreset,
}

impl CachePresets {
    fn default_image() -> CachePreset {
        CachePreset {
            ttl: Duration::from_secs(30 * 60),
            capacity: 50,
            persistence: PersistenceMode::Durable,
        }
    }

    fn default_api() -> CachePreset {
        CachePreset {
            ttl: Duration::from_secs(10 * 60),
            capacity: 20,
            persistence: PersistenceMode::Session,
        }
    }
}

impl Default for CachePresets {
    fn default() -> Self {
        Self {
            image: Self::default_image(),
            api: Self::default_api(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(v)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl TuningConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: TuningConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler.window == 0 {
            return Err(ConfigError::Invalid(
                "sampler.window must be greater than zero".into(),
            ));
        }

        if self.sampler.sample_every == 0 {
            return Err(ConfigError::Invalid(
                "sampler.sample_every must be greater than zero".into(),
            ));
        }

        let gates = &self.gates;
        let floats = [
            ("sampler.low_fps_threshold", self.sampler.low_fps_threshold),
            ("adapt.upscale_above_fps", self.adapt.upscale_above_fps),
            ("adapt.downscale_below_fps", self.adapt.downscale_below_fps),
            ("adapt.particle_growth", self.adapt.particle_growth),
            ("adapt.particle_decay", self.adapt.particle_decay),
            ("gates.high_dpi", gates.high_dpi),
            ("gates.high_tier_min_fps", gates.high_tier_min_fps),
            ("gates.minimal_tier_below_fps", gates.minimal_tier_below_fps),
        ];
        for (name, value) in floats {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
        }

        if self.sampler.low_fps_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "sampler.low_fps_threshold must be > 0".into(),
            ));
        }

        let adapt = &self.adapt;
        if adapt.downscale_below_fps >= adapt.upscale_above_fps {
            return Err(ConfigError::Invalid(format!(
                "adapt.downscale_below_fps ({}) must be below adapt.upscale_above_fps ({})",
                adapt.downscale_below_fps, adapt.upscale_above_fps
            )));
        }

        if adapt.particle_growth <= 0.0 {
            return Err(ConfigError::Invalid(
                "adapt.particle_growth must be > 0".into(),
            ));
        }

        if adapt.particle_decay <= 0.0 || adapt.particle_decay >= 1.0 {
            return Err(ConfigError::Invalid(
                "adapt.particle_decay must lie strictly between 0 and 1".into(),
            ));
        }

        if adapt.frame_cap_when_degraded == 0 {
            return Err(ConfigError::Invalid(
                "adapt.frame_cap_when_degraded must be > 0".into(),
            ));
        }

        if adapt.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "adapt.interval must be greater than zero".into(),
            ));
        }

        for (name, tier) in self.tiers.entries() {
            if tier.particle_count < MIN_PARTICLES {
                return Err(ConfigError::Invalid(format!(
                    "tier '{name}' particle_count must be >= {MIN_PARTICLES}"
                )));
            }
            if tier.shape_count < MIN_SHAPES {
                return Err(ConfigError::Invalid(format!(
                    "tier '{name}' shape_count must be >= {MIN_SHAPES}"
                )));
            }
            if !tier.pixel_ratio_cap.is_finite() || tier.pixel_ratio_cap < MIN_PIXEL_RATIO {
                return Err(ConfigError::Invalid(format!(
                    "tier '{name}' pixel_ratio_cap must be a finite number >= {MIN_PIXEL_RATIO}"
                )));
            }
            if tier.max_frame_rate == 0 {
                return Err(ConfigError::Invalid(format!(
                    "tier '{name}' max_frame_rate must be > 0"
                )));
            }
        }

        for (name, preset) in [("image", &self.cache.image), ("api", &self.cache.api)] {
            if preset.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "cache.{name} capacity must be greater than zero"
                )));
            }
            if preset.ttl.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "cache.{name} ttl must be greater than zero"
                )));
            }
        }

        Ok(())
    }

    /// Highest particle budget reachable by any tier.
    pub fn particle_ceiling(&self) -> u32 {
        self.tiers
            .entries()
            .iter()
            .map(|(_, tier)| tier.particle_count)
            .max()
            .unwrap_or(MIN_PARTICLES)
    }

    /// Highest shape budget reachable by any tier.
    pub fn shape_ceiling(&self) -> u32 {
        self.tiers
            .entries()
            .iter()
            .map(|(_, tier)| tier.shape_count)
            .max()
            .unwrap_or(MIN_SHAPES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[sampler]
window = 30
sample_every = 5

[adapt]
upscale_above_fps = 50
downscale_below_fps = 20.0
interval = "500ms"

[tiers.high]
particle_count = 2000
shape_count = 10
lighting = true
post_processing = true
max_frame_rate = 120
pixel_ratio_cap = 3.0
shadow_map_size = 4096

[cache.image]
ttl = "1h"
capacity = 10
persistence = "durable"
"#;

    #[test]
    fn parses_sample_config() {
        let config = TuningConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.sampler.window, 30);
        assert_eq!(config.sampler.sample_every, 5);
        assert_eq!(config.sampler.low_fps_threshold, 30.0);
        assert_eq!(config.adapt.upscale_above_fps, 50.0);
        assert_eq!(config.adapt.interval, Duration::from_millis(500));
        assert_eq!(config.tiers.high.particle_count, 2000);
        assert_eq!(config.tiers.low, TierTable::default().low);
        assert_eq!(config.cache.image.ttl, Duration::from_secs(3600));
        assert_eq!(config.cache.api, CachePresets::default().api);
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = TuningConfig::from_toml_str("").expect("parse empty");
        assert_eq!(config, TuningConfig::default());
        assert_eq!(config.particle_ceiling(), 1500);
        assert_eq!(config.shape_ceiling(), 8);
    }

    #[test]
    fn rejects_empty_hysteresis_band() {
        let err = TuningConfig::from_toml_str(
            r#"
[adapt]
upscale_above_fps = 30
downscale_below_fps = 30
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_fidelity_tier() {
        let err = TuningConfig::from_toml_str(
            r#"
[tiers.low]
particle_count = 0
shape_count = 3
lighting = false
post_processing = false
max_frame_rate = 30
pixel_ratio_cap = 1.5
shadow_map_size = 512
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_capacity_cache() {
        let err = TuningConfig::from_toml_str(
            r#"
[cache.api]
ttl = 60
capacity = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_finite_thresholds() {
        for document in [
            "[adapt]\nparticle_growth = nan\n",
            "[adapt]\nupscale_above_fps = nan\n",
            "[adapt]\nparticle_decay = nan\n",
            "[sampler]\nlow_fps_threshold = nan\n",
            "[gates]\nhigh_dpi = inf\n",
            "[gates]\nminimal_tier_below_fps = -inf\n",
        ] {
            let err = TuningConfig::from_toml_str(document).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid(_)),
                "{document:?} gave {err:?}"
            );
        }

        let err = TuningConfig::from_toml_str(
            r#"
[tiers.high]
particle_count = 1500
shape_count = 8
lighting = true
post_processing = true
max_frame_rate = 60
pixel_ratio_cap = inf
shadow_map_size = 2048
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_float_durations_are_errors() {
        for document in [
            "[adapt]\ninterval = inf\n",
            "[adapt]\ninterval = 1e30\n",
            "[adapt]\ninterval = nan\n",
            "[adapt]\ninterval = -0.5\n",
        ] {
            let err = TuningConfig::from_toml_str(document).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{document:?} gave {err:?}");
        }

        let config = TuningConfig::from_toml_str("[adapt]\ninterval = 0.25\n").unwrap();
        assert_eq!(config.adapt.interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = TuningConfig::from_toml_str(
            r#"
[adapt]
interval = "soon"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
