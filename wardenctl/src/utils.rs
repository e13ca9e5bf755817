//! Small shared helpers

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Build metadata printed by `--version`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Exponential backoff between retries
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Delay before retry number `attempt` (zero-based), capped at `max_delay`
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = options.base_delay.as_secs_f64() * options.multiplier.powi(exponent);
    if secs.is_finite() {
        Duration::from_secs_f64(secs.min(options.max_delay.as_secs_f64()))
    } else {
        options.max_delay
    }
}

/// First 12 hex digits of the SHA-256 of `data`. Identifies secrets and
/// rendered configs in logs without revealing them.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hex = format!("{:x}", Sha256::digest(data));
    hex.truncate(12);
    hex
}
