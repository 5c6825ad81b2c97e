use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// Process-wide defaults for live sessions. Individual sessions may
/// override the pacing and scoring knobs at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveConfig {
    /// Speed-bonus floor applied at the time limit.
    pub speed_floor: f64,
    /// Fraction of a battle-royale round eliminated each reveal.
    pub elimination_fraction: f64,
    /// Questions each tournament match is decided over.
    pub questions_per_match: usize,
    /// How long a question is shown before answers open.
    pub presenting_ms: u64,
    /// How long reveal results stay up before the next question.
    pub reveal_hold_ms: u64,
    /// Per-session fan-out ring capacity; slower subscribers resync.
    pub catchup_capacity: usize,
    /// How long finished sessions stay queryable before eviction.
    pub retention_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            speed_floor: 0.5,
            elimination_fraction: 0.5,
            questions_per_match: 1,
            presenting_ms: 3_000,
            reveal_hold_ms: 5_000,
            catchup_capacity: 256,
            retention_secs: 300,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    speed_floor: Option<f64>,
    elimination_fraction: Option<f64>,
    questions_per_match: Option<usize>,
    presenting_ms: Option<u64>,
    reveal_hold_ms: Option<u64>,
    catchup_capacity: Option<usize>,
    retention_secs: Option<u64>,
}

/// Load configuration: defaults, then the TOML file named by `QF_CONFIG`
/// (if set), then `QF_*` environment overrides, then validation.
pub fn load() -> Result<LiveConfig, ConfigError> {
    let mut cfg = LiveConfig::default();
    if let Ok(path) = std::env::var("QF_CONFIG") {
        let s = fs::read_to_string(path)?;
        let f: FileConfig = toml::from_str(&s)?;
        if let Some(v) = f.speed_floor {
            cfg.speed_floor = v;
        }
        if let Some(v) = f.elimination_fraction {
            cfg.elimination_fraction = v;
        }
        if let Some(v) = f.questions_per_match {
            cfg.questions_per_match = v;
        }
        if let Some(v) = f.presenting_ms {
            cfg.presenting_ms = v;
        }
        if let Some(v) = f.reveal_hold_ms {
            cfg.reveal_hold_ms = v;
        }
        if let Some(v) = f.catchup_capacity {
            cfg.catchup_capacity = v;
        }
        if let Some(v) = f.retention_secs {
            cfg.retention_secs = v;
        }
    }

    if let Ok(v) = std::env::var("QF_SPEED_FLOOR") {
        if !v.is_empty() {
            cfg.speed_floor = v
                .parse()
                .map_err(|_| ConfigError::Invalid("Invalid speed floor".into()))?;
        }
    }
    if let Ok(v) = std::env::var("QF_ELIMINATION_FRACTION") {
        if !v.is_empty() {
            cfg.elimination_fraction = v
                .parse()
                .map_err(|_| ConfigError::Invalid("Invalid elimination fraction".into()))?;
        }
    }
    if let Ok(v) = std::env::var("QF_QUESTIONS_PER_MATCH") {
        if !v.is_empty() {
            cfg.questions_per_match = v
                .parse()
                .map_err(|_| ConfigError::Invalid("Invalid questions per match".into()))?;
        }
    }
    if let Ok(v) = std::env::var("QF_CATCHUP_CAPACITY") {
        if !v.is_empty() {
            cfg.catchup_capacity = v
                .parse()
                .map_err(|_| ConfigError::Invalid("Invalid catch-up capacity".into()))?;
        }
    }
    if let Ok(v) = std::env::var("QF_RETENTION_SECS") {
        if !v.is_empty() {
            cfg.retention_secs = v
                .parse()
                .map_err(|_| ConfigError::Invalid("Invalid retention".into()))?;
        }
    }

    validate(&cfg)?;
    Ok(cfg)
}

pub fn validate(cfg: &LiveConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&cfg.speed_floor) {
        return Err(ConfigError::Invalid(format!(
            "speed floor {} outside 0.0-1.0",
            cfg.speed_floor
        )));
    }
    if cfg.elimination_fraction <= 0.0 || cfg.elimination_fraction >= 1.0 {
        return Err(ConfigError::Invalid(format!(
            "elimination fraction {} outside (0.0, 1.0)",
            cfg.elimination_fraction
        )));
    }
    if cfg.questions_per_match == 0 {
        return Err(ConfigError::Invalid(
            "questions per match must be at least 1".into(),
        ));
    }
    if cfg.catchup_capacity == 0 {
        return Err(ConfigError::Invalid(
            "catch-up capacity must be at least 1".into(),
        ));
    }
    Ok(())
}
