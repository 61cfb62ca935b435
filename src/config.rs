//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Policy values are validated into an immutable [`PolicyConfig`] before
//! the agent enters its polling loop. Secrets (API and wallet passwords)
//! are referenced by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::strategy::criteria::{round_half_up, CriteriaError, TakeCriteria};
use crate::types::OfferDirection;

/// Polling more often than this hammers the daemon's offer book.
pub const MIN_POLLING_INTERVAL_MS: u64 = 1000;

/// Margins at or below -100% leave no positive price to pay.
pub const MIN_PRICE_MARGIN_PCT: Decimal = dec!(-100);
/// Paying more than ten times the average is never intended.
pub const MAX_PRICE_MARGIN_PCT: Decimal = dec!(1000);

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub market: MarketConfig,
    pub policy: RawPolicyConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Simulate takes without touching the wallet or the offer book.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    pub base_url: String,
    pub api_password_env: String,
    pub wallet_password_env: String,
    #[serde(default = "default_wallet_unlock_secs")]
    pub wallet_unlock_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_wallet_unlock_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketConfig {
    pub direction: OfferDirection,
    pub currency_code: String,
    pub description: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            direction: OfferDirection::Buy,
            currency_code: "BSQ".to_string(),
            description: "Sell BSQ (Buy BTC)".to_string(),
        }
    }
}

/// Policy values as written in the config file. Decimal values are kept
/// as strings so they parse exactly; see [`PolicyConfig::from_raw`].
#[derive(Debug, Deserialize, Clone)]
pub struct RawPolicyConfig {
    pub max_price_margin_pct: String,
    pub reference_price: String,
    pub min_amount: String,
    pub max_amount: String,
    pub max_fee_rate: u64,
    #[serde(default)]
    pub max_take_count: u32,
    pub polling_interval_ms: u64,
    #[serde(default)]
    pub preferred_peers: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8686,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated policy
// ---------------------------------------------------------------------------

/// Startup configuration failures. The agent never enters its loop with
/// any of these outstanding.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: Decimal },

    #[error("reference_price must be greater than zero (got {0})")]
    NonPositiveReferencePrice(Decimal),

    #[error("max_price_margin_pct must be above -100 and at most 1000 (got {0})")]
    MarginOutOfRange(Decimal),

    #[error("reference_price cannot be priced at the configured margin: {0}")]
    TargetPrice(CriteriaError),

    #[error("min_amount ({min}) is greater than max_amount ({max})")]
    AmountBounds { min: Decimal, max: Decimal },

    #[error("polling_interval_ms must be greater than 1000 ms (got {0} ms)")]
    PollingInterval(u64),

    #[error("environment variable not set: {0}")]
    MissingSecret(String),
}

/// Immutable snapshot of the acceptance policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Signed percentage, 2 dp. Negative means "below the average price".
    pub max_price_margin_pct: Decimal,
    /// Baseline 30-day average price used when not on mainnet, 8 dp.
    pub reference_price: Decimal,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub max_fee_rate: u64,
    /// Session take limit; 0 means unlimited.
    pub max_take_count: u32,
    pub polling_interval: Duration,
    pub preferred_peers: BTreeSet<String>,
}

impl PolicyConfig {
    /// Parse and validate raw policy values.
    pub fn from_raw(raw: &RawPolicyConfig) -> Result<Self, ConfigError> {
        let margin = parse_decimal("max_price_margin_pct", &raw.max_price_margin_pct)?;
        let reference_price = parse_decimal("reference_price", &raw.reference_price)?;
        let min_amount = parse_decimal("min_amount", &raw.min_amount)?;
        let max_amount = parse_decimal("max_amount", &raw.max_amount)?;

        if reference_price <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveReferencePrice(reference_price));
        }
        if margin <= MIN_PRICE_MARGIN_PCT || margin > MAX_PRICE_MARGIN_PCT {
            return Err(ConfigError::MarginOutOfRange(margin));
        }
        if min_amount.is_sign_negative() {
            return Err(ConfigError::Negative {
                field: "min_amount",
                value: min_amount,
            });
        }
        if min_amount > max_amount {
            return Err(ConfigError::AmountBounds {
                min: min_amount,
                max: max_amount,
            });
        }

        let preferred_peers = raw
            .preferred_peers
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();

        let max_price_margin_pct = round_half_up(margin, 2);
        let reference_price = round_half_up(reference_price, 8);
        TakeCriteria::new(reference_price, max_price_margin_pct).map_err(ConfigError::TargetPrice)?;

        Ok(Self {
            max_price_margin_pct,
            reference_price,
            min_amount,
            max_amount,
            max_fee_rate: raw.max_fee_rate,
            max_take_count: raw.max_take_count,
            polling_interval: validate_polling_interval(raw.polling_interval_ms)?,
            preferred_peers,
        })
    }

    pub fn has_preferred_peers(&self) -> bool {
        !self.preferred_peers.is_empty()
    }

    /// Whether `taken` offers exhaust the session limit.
    pub fn take_limit_reached(&self, taken: u32) -> bool {
        self.max_take_count > 0 && taken >= self.max_take_count
    }
}

/// Polling interval must be strictly greater than one second.
pub fn validate_polling_interval(ms: u64) -> Result<Duration, ConfigError> {
    if ms <= MIN_POLLING_INTERVAL_MS {
        return Err(ConfigError::PollingInterval(ms));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Validated policy snapshot.
    pub fn policy(&self) -> Result<PolicyConfig, ConfigError> {
        PolicyConfig::from_raw(&self.policy)
    }

    /// Resolve an environment variable name to a secret value.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString, ConfigError> {
        std::env::var(env_name)
            .map(SecretString::new)
            .map_err(|_| ConfigError::MissingSecret(env_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [agent]
        name = "taker-001"

        [daemon]
        base_url = "http://localhost:9998"
        api_password_env = "OFFER_TAKER_API_PASSWORD"
        wallet_password_env = "OFFER_TAKER_WALLET_PASSWORD"

        [policy]
        max_price_margin_pct = "-2.005"
        reference_price = "0.000031"
        min_amount = "0.01"
        max_amount = "0.50"
        max_fee_rate = 25
        max_take_count = 3
        polling_interval_ms = 20000
        preferred_peers = ["peer1.onion:9999", " ", "peer2.onion:9999"]
    "#;

    fn raw() -> RawPolicyConfig {
        AppConfig::from_toml_str(SAMPLE).unwrap().policy
    }

    #[test]
    fn test_parse_sample_config() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.agent.name, "taker-001");
        assert!(!cfg.agent.dry_run);
        assert_eq!(cfg.daemon.wallet_unlock_secs, 600);
        assert_eq!(cfg.market.currency_code, "BSQ");
        assert_eq!(cfg.market.direction, OfferDirection::Buy);
        assert!(!cfg.dashboard.enabled);
    }

    #[test]
    fn test_policy_scaling() {
        let policy = PolicyConfig::from_raw(&raw()).unwrap();
        // 2 dp, half-up away from zero
        assert_eq!(policy.max_price_margin_pct, dec!(-2.01));
        assert_eq!(policy.reference_price.to_string(), "0.00003100");
        assert_eq!(policy.polling_interval, Duration::from_millis(20_000));
        assert_eq!(policy.preferred_peers.len(), 2);
        assert!(policy.has_preferred_peers());
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut r = raw();
        r.min_amount = "abc".into();
        assert_eq!(
            PolicyConfig::from_raw(&r),
            Err(ConfigError::InvalidNumber {
                field: "min_amount",
                value: "abc".into()
            })
        );
    }

    #[test]
    fn test_amount_bounds_rejected() {
        let mut r = raw();
        r.min_amount = "1".into();
        r.max_amount = "0.5".into();
        assert!(matches!(
            PolicyConfig::from_raw(&r),
            Err(ConfigError::AmountBounds { .. })
        ));
    }

    #[test]
    fn test_polling_interval_must_exceed_one_second() {
        assert_eq!(
            validate_polling_interval(1000),
            Err(ConfigError::PollingInterval(1000))
        );
        assert_eq!(validate_polling_interval(1001), Ok(Duration::from_millis(1001)));

        let mut r = raw();
        r.polling_interval_ms = 500;
        assert!(PolicyConfig::from_raw(&r).is_err());
    }

    #[test]
    fn test_reference_price_must_be_positive() {
        let mut r = raw();
        r.reference_price = "0".into();
        assert_eq!(
            PolicyConfig::from_raw(&r),
            Err(ConfigError::NonPositiveReferencePrice(Decimal::ZERO))
        );
    }

    #[test]
    fn test_margin_bounds() {
        for bad in ["-100", "-100.00", "-250", "1000.01", "1000000000000000000000000"] {
            let mut r = raw();
            r.max_price_margin_pct = bad.into();
            assert!(
                matches!(PolicyConfig::from_raw(&r), Err(ConfigError::MarginOutOfRange(_))),
                "margin {bad} should be rejected"
            );
        }
        for ok in ["-99.99", "0", "1000"] {
            let mut r = raw();
            r.reference_price = "1".into();
            r.max_price_margin_pct = ok.into();
            assert!(PolicyConfig::from_raw(&r).is_ok(), "margin {ok} should be accepted");
        }
    }

    #[test]
    fn test_reference_price_must_price_at_margin() {
        let mut r = raw();
        r.reference_price = "79228162514264337593543950335".into();
        r.max_price_margin_pct = "20.00".into();
        assert!(matches!(
            PolicyConfig::from_raw(&r),
            Err(ConfigError::TargetPrice(CriteriaError::Overflow { .. }))
        ));

        // 0.000031 * 0.0001 rounds to zero at 8 dp
        let mut r = raw();
        r.max_price_margin_pct = "-99.99".into();
        assert!(matches!(
            PolicyConfig::from_raw(&r),
            Err(ConfigError::TargetPrice(CriteriaError::NonPositiveTarget { .. }))
        ));
    }

    #[test]
    fn test_take_limit() {
        let mut policy = PolicyConfig::from_raw(&raw()).unwrap();
        assert!(!policy.take_limit_reached(2));
        assert!(policy.take_limit_reached(3));
        policy.max_take_count = 0;
        assert!(!policy.take_limit_reached(1_000));
    }

    #[test]
    fn test_missing_secret() {
        let err = AppConfig::resolve_secret("OFFER_TAKER_DEFINITELY_UNSET_VAR").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingSecret("OFFER_TAKER_DEFINITELY_UNSET_VAR".into())
        );
    }
}
