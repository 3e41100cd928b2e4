//! Engine configuration with profile support.
//!
//! Provides centralized configuration for all engine parameters, loadable
//! from named profiles (testing, production) or a TOML file, with a
//! process-global accessor initialized once at startup.

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Price tracking and publication
    #[serde(default)]
    pub price: PriceConfig,

    /// Sweep orchestration timing
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Interest accrual parameters
    #[serde(default)]
    pub interest: InterestConfig,

    /// Risk thresholds
    #[serde(default)]
    pub risk: RiskConfig,

    /// Serialization queue tuning
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Price polling and publication throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Market-data poll interval (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Publish when |price change| reaches this many basis points (inclusive)
    #[serde(default = "default_change_threshold")]
    pub change_threshold_bps: u64,

    /// Publish regardless of change once the last publication is this old (seconds)
    #[serde(default = "default_max_stale")]
    pub max_stale_secs: u64,

    /// Maximum number of tracked assets
    #[serde(default = "default_max_tracked")]
    pub max_tracked_assets: usize,

    /// Ledger batch limit for one publish operation
    #[serde(default = "default_batch_limit")]
    pub publish_batch_limit: usize,
}

fn default_poll_interval() -> u64 {
    60
}
fn default_change_threshold() -> u64 {
    200
}
fn default_max_stale() -> u64 {
    3600
}
fn default_max_tracked() -> usize {
    50
}
fn default_batch_limit() -> usize {
    4
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            change_threshold_bps: default_change_threshold(),
            max_stale_secs: default_max_stale(),
            max_tracked_assets: default_max_tracked(),
            publish_batch_limit: default_batch_limit(),
        }
    }
}

impl PriceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_stale(&self) -> Duration {
        Duration::from_secs(self.max_stale_secs)
    }
}

/// Sweep orchestration timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Full sweep interval over all tracked escrows (seconds)
    #[serde(default = "default_full_sweep_interval")]
    pub full_sweep_interval_secs: u64,
}

fn default_full_sweep_interval() -> u64 {
    120
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            full_sweep_interval_secs: default_full_sweep_interval(),
        }
    }
}

impl SweepConfig {
    pub fn full_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.full_sweep_interval_secs)
    }
}

/// Interest accrual parameters. Epoch discretization must match the
/// settlement contract or ledger-side verification of accrued interest
/// diverges from ours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestConfig {
    /// Epoch duration (seconds)
    #[serde(default = "default_epoch_duration")]
    pub epoch_duration_secs: u64,

    /// Annual borrow rate in tenths of a percent (50 = 5.0%)
    #[serde(default = "default_borrow_rate")]
    pub borrow_rate_tenths_pct: u64,
}

fn default_epoch_duration() -> u64 {
    900
}
fn default_borrow_rate() -> u64 {
    50
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            epoch_duration_secs: default_epoch_duration(),
            borrow_rate_tenths_pct: default_borrow_rate(),
        }
    }
}

/// Risk thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum loan-to-value in LTV_BASE units (75_000 = 75%)
    #[serde(default = "default_max_ltv")]
    pub max_ltv: u64,
}

fn default_max_ltv() -> u64 {
    75_000
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_ltv: default_max_ltv(),
        }
    }
}

/// Serialization queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delay after each completed ledger operation before starting the
    /// next, giving the client's storage transaction time to commit (ms)
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_settle_delay() -> u64 {
    250
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl QueueConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            price: PriceConfig::default(),
            sweep: SweepConfig::default(),
            interest: InterestConfig::default(),
            risk: RiskConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Testing profile: short timers so integration runs exercise every loop.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            price: PriceConfig {
                poll_interval_secs: 2,
                max_stale_secs: 30,
                ..PriceConfig::default()
            },
            sweep: SweepConfig {
                full_sweep_interval_secs: 5,
            },
            queue: QueueConfig { settle_delay_ms: 10 },
            ..Self::default()
        }
    }

    /// Production profile: defaults tuned for the live deployment.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from the `VIGIL_PROFILE` env var: a named profile
    /// (`testing`, `production`) or a path to a TOML file. Unset or unknown
    /// values fall back to defaults.
    pub fn from_env() -> Self {
        let config = match std::env::var("VIGIL_PROFILE") {
            Ok(profile) => match profile.as_str() {
                "testing" => Self::testing(),
                "production" => Self::production(),
                "default" => Self::default(),
                path => Self::from_file(path).unwrap_or_else(|e| {
                    info!(profile = path, error = %e, "failed to load profile, using defaults");
                    Self::default()
                }),
            },
            Err(_) => Self::default(),
        };
        config.sanitized()
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config.sanitized())
    }

    /// Clamp values a profile file could set to zero: a zero publish batch
    /// size has no meaning, a zero poll interval is a busy loop, and a zero
    /// epoch duration divides by zero in the accrual path.
    fn sanitized(mut self) -> Self {
        if self.price.publish_batch_limit == 0 {
            warn!("publish_batch_limit 0 is invalid, clamping to 1");
            self.price.publish_batch_limit = 1;
        }
        if self.price.poll_interval_secs == 0 {
            warn!("poll_interval_secs 0 is invalid, clamping to 1");
            self.price.poll_interval_secs = 1;
        }
        if self.interest.epoch_duration_secs == 0 {
            warn!("epoch_duration_secs 0 is invalid, clamping to 1");
            self.interest.epoch_duration_secs = 1;
        }
        self
    }

    /// Log the active configuration at startup.
    pub fn log_config(&self) {
        info!(
            profile = %self.profile,
            poll_interval_secs = self.price.poll_interval_secs,
            change_threshold_bps = self.price.change_threshold_bps,
            max_stale_secs = self.price.max_stale_secs,
            max_tracked_assets = self.price.max_tracked_assets,
            publish_batch_limit = self.price.publish_batch_limit,
            full_sweep_interval_secs = self.sweep.full_sweep_interval_secs,
            epoch_duration_secs = self.interest.epoch_duration_secs,
            borrow_rate_tenths_pct = self.interest.borrow_rate_tenths_pct,
            max_ltv = self.risk.max_ltv,
            settle_delay_ms = self.queue.settle_delay_ms,
            "Engine configuration loaded"
        );
    }
}

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global configuration. Must be called once at startup,
/// before any component reads it. Later calls are ignored.
pub fn init_config(config: EngineConfig) {
    let _ = CONFIG.set(config);
}

/// Get the global configuration, falling back to defaults if `init_config`
/// was never called (tests rely on this).
pub fn config() -> &'static EngineConfig {
    CONFIG.get_or_init(EngineConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.price.poll_interval_secs, 60);
        assert_eq!(cfg.price.change_threshold_bps, 200);
        assert_eq!(cfg.price.max_stale_secs, 3600);
        assert_eq!(cfg.price.max_tracked_assets, 50);
        assert_eq!(cfg.price.publish_batch_limit, 4);
        assert_eq!(cfg.interest.epoch_duration_secs, 900);
        assert_eq!(cfg.risk.max_ltv, 75_000);
    }

    #[test]
    fn toml_roundtrip_with_partial_sections() {
        let toml_str = r#"
            profile = "custom"

            [price]
            poll_interval_secs = 30
        "#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.profile, "custom");
        assert_eq!(cfg.price.poll_interval_secs, 30);
        // Unspecified fields fall back to serde defaults
        assert_eq!(cfg.price.change_threshold_bps, 200);
        assert_eq!(cfg.sweep.full_sweep_interval_secs, 120);
    }

    #[test]
    fn from_file_clamps_zero_timing_values() {
        let path = std::env::temp_dir().join("vigil-config-zero-values.toml");
        std::fs::write(
            &path,
            r#"
            [price]
            publish_batch_limit = 0
            poll_interval_secs = 0

            [interest]
            epoch_duration_secs = 0
            "#,
        )
        .unwrap();

        let cfg = EngineConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.price.publish_batch_limit, 1);
        assert_eq!(cfg.price.poll_interval_secs, 1);
        assert_eq!(cfg.interest.epoch_duration_secs, 1);
    }
}
