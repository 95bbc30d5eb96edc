//! Configuration for the pulse windower.

use crate::core::{
    ChannelRole, FillRule, GapPolicy, RoleAliases, TaperShape, WindowerSettings,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw channel code (or trailing component letter) to role.
    pub channel_role_aliases: RoleAliases,

    /// Output sample rate of every window, in Hz.
    pub sample_rate: f64,

    /// Samples per window.
    pub sample_count: usize,

    /// Samples shared by consecutive windows.
    pub overlap_samples: usize,

    /// Overrides the advance derived from `sample_count - overlap_samples`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advance_seconds: Option<f64>,

    pub vertical_completeness_threshold: f64,
    pub horizontal_completeness_threshold: f64,

    /// One of `zeros`, `clone-vertical`, `clone-horizontal`.
    pub fill_rule: String,

    /// Value written into masked gaps inside a window.
    pub fill_value: f64,

    pub edge_taper_seconds: f64,

    /// One of `cosine`, `step`.
    pub taper_shape: String,

    pub padding_seconds: f64,

    pub channel_order: Vec<ChannelRole>,

    pub buffer_max_span_seconds: f64,
    pub max_staleness_pulses: u32,
    pub max_sweeps_per_pulse: u32,
    pub gap_policy: GapPolicy,
    pub diagnostic_mode: bool,

    /// Pause between pulses.
    #[serde(with = "duration_ms_serde", rename = "pulse_interval_ms")]
    pub pulse_interval: Duration,

    /// Records drained from the source before each pulse.
    pub max_records_per_pulse: usize,

    /// Windows per inference batch.
    pub batch_size: usize,

    /// Path for exported windows and predictions
    pub export_path: PathBuf,

    /// Path for the persisted ledger
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse-windower");

        Self {
            channel_role_aliases: RoleAliases::default(),
            sample_rate: 100.0,
            sample_count: 6000,
            overlap_samples: 1800,
            advance_seconds: None,
            vertical_completeness_threshold: 0.95,
            horizontal_completeness_threshold: 0.8,
            fill_rule: FillRule::Zeros.to_string(),
            fill_value: 0.0,
            edge_taper_seconds: 5.0,
            taper_shape: TaperShape::Cosine.to_string(),
            padding_seconds: 0.0,
            channel_order: ChannelRole::ALL.to_vec(),
            buffer_max_span_seconds: 150.0,
            max_staleness_pulses: 20,
            max_sweeps_per_pulse: 20,
            gap_policy: GapPolicy::DiscardAndJump,
            diagnostic_mode: false,
            pulse_interval: Duration::from_millis(100),
            max_records_per_pulse: 1000,
            batch_size: 32,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulse-windower")
            .join("config.json")
    }

    /// Path of the persisted pulse ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_path.join("ledger.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Seconds between consecutive window starts.
    pub fn advance_seconds(&self) -> f64 {
        self.advance_seconds.unwrap_or_else(|| {
            self.sample_count.saturating_sub(self.overlap_samples) as f64 / self.sample_rate
        })
    }

    /// Check every option and convert to typed core settings.
    pub fn validate(&self) -> Result<WindowerSettings, ConfigError> {
        let fill_rule = FillRule::from_name(&self.fill_rule)
            .ok_or_else(|| ConfigError::UnsupportedFillRule(self.fill_rule.clone()))?;
        let taper_shape = TaperShape::from_name(&self.taper_shape)
            .ok_or_else(|| ConfigError::UnsupportedTaperShape(self.taper_shape.clone()))?;

        if !self.channel_role_aliases.covers(ChannelRole::Vertical) {
            return Err(invalid("channel_role_aliases must map at least one code to vertical"));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(invalid("sample_rate must be positive"));
        }
        if self.sample_count == 0 {
            return Err(invalid("sample_count must be positive"));
        }
        if self.overlap_samples >= self.sample_count {
            return Err(invalid("overlap_samples must be smaller than sample_count"));
        }

        let advance_seconds = self.advance_seconds();
        if !(advance_seconds.is_finite() && advance_seconds > 0.0) {
            return Err(invalid("advance_seconds must be positive"));
        }

        for (name, value) in [
            ("vertical_completeness_threshold", self.vertical_completeness_threshold),
            ("horizontal_completeness_threshold", self.horizontal_completeness_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }

        let window_seconds = self.sample_count as f64 / self.sample_rate;
        if !(self.edge_taper_seconds >= 0.0 && self.edge_taper_seconds <= window_seconds / 2.0) {
            return Err(invalid("edge_taper_seconds must be within [0, window/2]"));
        }
        if !(self.padding_seconds.is_finite() && self.padding_seconds >= 0.0) {
            return Err(invalid("padding_seconds must not be negative"));
        }

        let unique: HashSet<ChannelRole> = self.channel_order.iter().copied().collect();
        if unique.len() != self.channel_order.len() {
            return Err(invalid("channel_order lists a role twice"));
        }
        if !unique.contains(&ChannelRole::Vertical) {
            return Err(invalid("channel_order must include vertical"));
        }

        if self.buffer_max_span_seconds < window_seconds {
            return Err(invalid("buffer_max_span_seconds must cover at least one window"));
        }
        if self.max_staleness_pulses == 0 {
            return Err(invalid("max_staleness_pulses must be at least 1"));
        }
        if self.max_sweeps_per_pulse == 0 {
            return Err(invalid("max_sweeps_per_pulse must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }

        Ok(WindowerSettings {
            aliases: self.channel_role_aliases.clone(),
            sample_rate: self.sample_rate,
            sample_count: self.sample_count,
            advance_seconds,
            vertical_threshold: self.vertical_completeness_threshold,
            horizontal_threshold: self.horizontal_completeness_threshold,
            fill_rule,
            fill_value: self.fill_value,
            edge_taper_seconds: self.edge_taper_seconds,
            taper_shape,
            padding_seconds: self.padding_seconds,
            channel_order: self.channel_order.clone(),
            max_span_seconds: self.buffer_max_span_seconds,
            max_staleness_pulses: self.max_staleness_pulses,
            max_sweeps_per_pulse: self.max_sweeps_per_pulse,
            gap_policy: self.gap_policy,
            diagnostic_mode: self.diagnostic_mode,
        })
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid(reason.to_string())
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    UnsupportedFillRule(String),
    UnsupportedTaperShape(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::UnsupportedFillRule(name) => write!(
                f,
                "Unsupported fill rule '{name}' (expected zeros, clone-vertical or clone-horizontal)"
            ),
            ConfigError::UnsupportedTaperShape(name) => {
                write!(f, "Unsupported taper shape '{name}' (expected cosine or step)")
            }
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        let settings = config.validate().unwrap();
        assert_eq!(settings.sample_count, 6000);
        assert!((settings.advance_seconds - 42.0).abs() < 1e-12);
        assert_eq!(settings.fill_rule, FillRule::Zeros);
        assert_eq!(settings.taper_shape, TaperShape::Cosine);
        assert_eq!(config.pulse_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_unknown_fill_rule_is_fatal() {
        let config = Config {
            fill_rule: "interpolate".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedFillRule(name)) if name == "interpolate"
        ));
    }

    #[test]
    fn test_legacy_names_accepted() {
        let config = Config {
            fill_rule: "clonehz".to_string(),
            taper_shape: "h".to_string(),
            ..Config::default()
        };
        let settings = config.validate().unwrap();
        assert_eq!(settings.fill_rule, FillRule::CloneHorizontal);
        assert_eq!(settings.taper_shape, TaperShape::Step);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            Config {
                vertical_completeness_threshold: 1.5,
                ..Config::default()
            },
            Config {
                overlap_samples: 6000,
                ..Config::default()
            },
            Config {
                edge_taper_seconds: 40.0,
                ..Config::default()
            },
            Config {
                buffer_max_span_seconds: 30.0,
                ..Config::default()
            },
            Config {
                channel_order: vec![ChannelRole::Horizontal1],
                ..Config::default()
            },
            Config {
                sample_rate: 0.0,
                ..Config::default()
            },
            Config {
                taper_shape: "hann".to_string(),
                ..Config::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "accepted {config:?}");
        }
    }

    #[test]
    fn test_advance_override() {
        let config = Config {
            advance_seconds: Some(30.0),
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap().advance_seconds, 30.0);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"fill_rule":"clone-vertical","pulse_interval_ms":250}"#)
                .unwrap();
        assert_eq!(config.fill_rule, "clone-vertical");
        assert_eq!(config.pulse_interval, Duration::from_millis(250));
        assert_eq!(config.sample_count, 6000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("pulse-windower-config-{}", std::process::id()))
            .join("config.json");
        let config = Config {
            gap_policy: GapPolicy::Reseed,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.gap_policy, GapPolicy::Reseed);
        assert_eq!(loaded.channel_role_aliases, RoleAliases::default());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
