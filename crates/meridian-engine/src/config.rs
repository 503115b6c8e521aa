//! # Engine Configuration
//!
//! All thresholds and toggles the workflows consult are injected here at
//! construction time. Managers never read settings out of the database at
//! decision points; a config value observed when a workflow starts is the
//! value used for the whole workflow.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  1. Environment Variables (highest priority)                        │
//! │     MERIDIAN_STORE_ID=store-001                                     │
//! │     MERIDIAN_REFUND_APPROVAL_THRESHOLD_CENTS=50000                  │
//! │                                                                     │
//! │  2. TOML Config File (engine.toml)                                  │
//! │                                                                     │
//! │  3. Default Values (lowest priority)                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! id = "store-001"
//! name = "Downtown Branch"
//!
//! [refunds]
//! approval_threshold_cents = 50000
//!
//! [loyalty]
//! enabled = true
//! cents_per_point = 100
//!
//! [outbox]
//! batch_size = 100
//! poll_interval_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Store
// =============================================================================

/// The store this engine instance serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            id: "default-store".to_string(),
            name: "Default Store".to_string(),
        }
    }
}

// =============================================================================
// Refunds
// =============================================================================

/// Refund workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundConfig {
    /// Refunds strictly above this total require manager approval before
    /// inventory is restored. Default: 50000 (500.00).
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold_cents: i64,
}

fn default_approval_threshold() -> i64 {
    50_000
}

impl Default for RefundConfig {
    fn default() -> Self {
        RefundConfig {
            approval_threshold_cents: default_approval_threshold(),
        }
    }
}

// =============================================================================
// Loyalty
// =============================================================================

/// Loyalty accrual settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// One point is earned per this many cents of sale total.
    /// Default: 100 (one point per whole currency unit).
    #[serde(default = "default_cents_per_point")]
    pub cents_per_point: i64,
}

fn default_cents_per_point() -> i64 {
    100
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        LoyaltyConfig {
            enabled: true,
            cents_per_point: default_cents_per_point(),
        }
    }
}

// =============================================================================
// Outbox Worker
// =============================================================================

/// Outbox worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Entries fetched per poll cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Interval between poll cycles (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_batch_size() -> i64 {
    100
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for OutboxConfig {
    fn default() -> Self {
        OutboxConfig {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

// =============================================================================
// Materials
// =============================================================================

/// Cross-pool materials sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialsConfig {
    /// Master toggle; when off, sales never touch the operations pool.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MaterialsConfig {
    fn default() -> Self {
        MaterialsConfig { enabled: true }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub refunds: RefundConfig,

    #[serde(default)]
    pub loyalty: LoyaltyConfig,

    #[serde(default)]
    pub outbox: OutboxConfig,

    #[serde(default)]
    pub materials: MaterialsConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file and environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or falls back to defaults.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.store.id.is_empty() {
            return Err(EngineError::InvalidConfig("store.id must not be empty".into()));
        }

        if self.refunds.approval_threshold_cents < 0 {
            return Err(EngineError::InvalidConfig(
                "refunds.approval_threshold_cents must not be negative".into(),
            ));
        }

        if self.loyalty.cents_per_point <= 0 {
            return Err(EngineError::InvalidConfig(
                "loyalty.cents_per_point must be greater than 0".into(),
            ));
        }

        if self.outbox.batch_size <= 0 {
            return Err(EngineError::InvalidConfig(
                "outbox.batch_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("MERIDIAN_STORE_ID") {
            debug!(store_id = %id, "Overriding store ID from environment");
            self.store.id = id;
        }

        if let Ok(threshold) = std::env::var("MERIDIAN_REFUND_APPROVAL_THRESHOLD_CENTS") {
            if let Ok(t) = threshold.parse::<i64>() {
                self.refunds.approval_threshold_cents = t;
            }
        }

        if let Ok(enabled) = std::env::var("MERIDIAN_LOYALTY_ENABLED") {
            if let Ok(e) = enabled.parse::<bool>() {
                self.loyalty.enabled = e;
            }
        }

        if let Ok(enabled) = std::env::var("MERIDIAN_MATERIALS_ENABLED") {
            if let Ok(e) = enabled.parse::<bool>() {
                self.materials.enabled = e;
            }
        }

        if let Ok(interval) = std::env::var("MERIDIAN_OUTBOX_POLL_INTERVAL_SECS") {
            if let Ok(i) = interval.parse::<u64>() {
                self.outbox.poll_interval_secs = i;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.refunds.approval_threshold_cents, 50_000);
        assert_eq!(config.loyalty.cents_per_point, 100);
        assert_eq!(config.outbox.batch_size, 100);
        assert!(config.materials.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.store.id = String::new();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.refunds.approval_threshold_cents = -1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.loyalty.cents_per_point = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[refunds]"));

        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.refunds.approval_threshold_cents,
            config.refunds.approval_threshold_cents
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [store]
            id = "store-7"

            [refunds]
            approval_threshold_cents = 10000
            "#,
        )
        .unwrap();

        assert_eq!(parsed.store.id, "store-7");
        assert_eq!(parsed.refunds.approval_threshold_cents, 10_000);
        assert_eq!(parsed.outbox.poll_interval_secs, 5);
    }
}
