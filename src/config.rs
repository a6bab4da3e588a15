use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_BUSY_TIMEOUT_MS: &str = "KATROL_BUSY_TIMEOUT_MS";
pub const ENV_OPERATOR: &str = "KATROL_OPERATOR";
pub const ENV_WORKSPACE: &str = "KATROL_WORKSPACE";
pub const ENV_LOG: &str = "KATROL_LOG";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_OPERATOR: &str = "system";

/// Process settings. Curve parameters are never part of this; every request
/// carries its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub busy_timeout: Duration,
    /// `processed_by` for saves whose request names no operator.
    pub default_operator: String,
    pub workspace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            default_operator: DEFAULT_OPERATOR.to_string(),
            workspace: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_BUSY_TIMEOUT_MS} must be milliseconds, got {raw:?}"))?;
            cfg.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(op) = lookup(ENV_OPERATOR) {
            let op = op.trim();
            if !op.is_empty() {
                cfg.default_operator = op.to_string();
            }
        }
        cfg.workspace = lookup(ENV_WORKSPACE)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(cfg)
    }
}
