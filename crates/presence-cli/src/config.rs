use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use presence_core::liveness::{DEFAULT_CLOSED_THRESHOLD, DEFAULT_MIN_CLOSED_FRAMES};
use presence_core::{BlinkConfig, MissPolicy, PipelineConfig};
use serde::Deserialize;
use thiserror::Error;

/// Cosine distance at or below which two embeddings are the same person
/// (Facenet512 operating point).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.30;
pub const DEFAULT_CAPTURE_PATH: &str = "live_capture.jpg";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("match threshold must be a finite, non-negative distance, got {0}")]
    MatchThreshold(f32),
}

/// Optional TOML layer. Every key may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub ear_threshold: Option<f32>,
    pub min_closed_frames: Option<u32>,
    pub miss_policy: Option<MissPolicy>,
    pub match_threshold: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub capture_path: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved configuration: defaults, then the TOML file, then `PRESENCE_*`
/// environment variables. Command-line flags are applied on top by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// EAR below which an eye counts as closed.
    pub ear_threshold: f32,
    /// Consecutive closed frames required before a reopening confirms a blink.
    pub min_closed_frames: u32,
    /// Treatment of frames without a detected face during a closure.
    pub miss_policy: MissPolicy,
    /// Maximum cosine distance for an identity match.
    pub match_threshold: f32,
    /// Live-capture wait limit. `None` (or 0 in files/env) waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Where the confirming frame is written.
    pub capture_path: PathBuf,
    /// JSON-lines audit log; disabled when unset.
    pub audit_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(ConfigFile::default(), |_| None)
    }
}

impl Config {
    /// Load from `file` (or `$PRESENCE_CONFIG`) and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PRESENCE_CONFIG").map(PathBuf::from));

        let raw = match file {
            Some(path) => {
                tracing::debug!(path = %path.display(), "reading configuration file");
                ConfigFile::read(&path)?
            }
            None => ConfigFile::default(),
        };

        Ok(Self::resolve(raw, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with an environment lookup.
    pub fn resolve(raw: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let timeout = env_parse(&env, "PRESENCE_TIMEOUT_SECS", raw.timeout_secs.unwrap_or(0));

        Self {
            ear_threshold: env_parse(
                &env,
                "PRESENCE_EAR_THRESHOLD",
                raw.ear_threshold.unwrap_or(DEFAULT_CLOSED_THRESHOLD),
            ),
            min_closed_frames: env_parse(
                &env,
                "PRESENCE_MIN_CLOSED_FRAMES",
                raw.min_closed_frames.unwrap_or(DEFAULT_MIN_CLOSED_FRAMES),
            ),
            miss_policy: env_parse(
                &env,
                "PRESENCE_MISS_POLICY",
                raw.miss_policy.unwrap_or_default(),
            ),
            match_threshold: env_parse(
                &env,
                "PRESENCE_MATCH_THRESHOLD",
                raw.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
            ),
            timeout_secs: (timeout > 0).then_some(timeout),
            capture_path: env("PRESENCE_CAPTURE_PATH")
                .map(PathBuf::from)
                .or(raw.capture_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CAPTURE_PATH)),
            audit_log: env("PRESENCE_AUDIT_LOG")
                .map(PathBuf::from)
                .or(raw.audit_log),
        }
    }

    /// Check settings the pipeline itself does not validate. Blink settings
    /// are checked when a live-capture pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(ConfigError::MatchThreshold(self.match_threshold));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            blink: BlinkConfig {
                closed_threshold: self.ear_threshold,
                min_consecutive_closed_frames: self.min_closed_frames,
                miss_policy: self.miss_policy,
            },
            max_wait: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Parse `key` from the environment, keeping `default` when unset or invalid.
fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match env(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable environment value");
            default
        }),
        None => default,
    }
}
