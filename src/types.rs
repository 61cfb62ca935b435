//! Shared types for the offer-taking agent.
//!
//! These types form the data model used across all modules. Offers and
//! payment accounts are supplied by the remote trading daemon and are
//! never mutated here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// A fixed-price offer advertised by a maker on the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub direction: OfferDirection,
    /// Fixed price, quoted in the base currency per unit of the offer currency.
    pub price: Decimal,
    /// Trade amount in the base currency.
    pub amount: Decimal,
    pub payment_method_id: String,
    /// Maker's network address (opaque peer identifier).
    pub maker_peer_id: String,
    pub currency_code: String,
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {} amount={} method={} maker={}",
            self.id,
            self.direction,
            self.currency_code,
            self.price,
            self.amount,
            self.payment_method_id,
            self.maker_peer_id,
        )
    }
}

/// Market direction of an offer, from the maker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferDirection {
    Buy,
    Sell,
}

impl fmt::Display for OfferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferDirection::Buy => write!(f, "BUY"),
            OfferDirection::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Account & network
// ---------------------------------------------------------------------------

/// The taker's own payment account used to take offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub id: String,
    pub account_name: String,
    pub payment_method_id: String,
}

impl fmt::Display for PaymentAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.account_name, self.id, self.payment_method_id)
    }
}

/// Network the remote daemon is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Only mainnet has a live 30-day average price to compare against.
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "btc_mainnet" => Ok(Network::Mainnet),
            "testnet" | "btc_testnet" => Ok(Network::Testnet),
            "regtest" | "btc_regtest" => Ok(Network::Regtest),
            _ => Err(anyhow::anyhow!("Unknown network: {s}")),
        }
    }
}

/// Available wallet balance for one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency_code: String,
    pub available: Decimal,
    pub reserved: Decimal,
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} available={} reserved={}",
            self.currency_code, self.available, self.reserved
        )
    }
}

// ---------------------------------------------------------------------------
// Take outcome
// ---------------------------------------------------------------------------

/// Receipt returned after an offer is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub trade_id: String,
    pub offer_id: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub dry_run: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for TradeReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        write!(
            f,
            "trade {} for offer {} @ {} amount={}{mode}",
            self.trade_id, self.offer_id, self.price, self.amount,
        )
    }
}

impl TradeReceipt {
    /// Create a dry-run receipt (no real execution).
    pub fn dry_run(offer: &Offer) -> Self {
        Self {
            trade_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
            offer_id: offer.id.clone(),
            price: offer.price,
            amount: offer.amount,
            dry_run: true,
            timestamp: Utc::now(),
        }
    }
}

/// Recognized transient reasons a take can fail without compromising the
/// agent's view of the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TakeFailureReason {
    OfferUnavailable,
    OfferAlreadyTaken,
    InsufficientFunds,
    PeerUnavailable,
    AmountOutOfRange,
    PriceChanged,
    TimedOut,
}

impl fmt::Display for TakeFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeFailureReason::OfferUnavailable => write!(f, "offer no longer available"),
            TakeFailureReason::OfferAlreadyTaken => write!(f, "offer already taken"),
            TakeFailureReason::InsufficientFunds => write!(f, "insufficient funds"),
            TakeFailureReason::PeerUnavailable => write!(f, "maker unreachable"),
            TakeFailureReason::AmountOutOfRange => write!(f, "amount out of range"),
            TakeFailureReason::PriceChanged => write!(f, "price changed"),
            TakeFailureReason::TimedOut => write!(f, "take timed out"),
        }
    }
}

impl TakeFailureReason {
    /// Map a remote error code onto a recognized transient reason.
    /// Unknown codes return `None` and must be treated as fatal.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "OFFER_UNAVAILABLE" | "OFFER_NOT_AVAILABLE" => Some(Self::OfferUnavailable),
            "OFFER_ALREADY_TAKEN" => Some(Self::OfferAlreadyTaken),
            "INSUFFICIENT_FUNDS" => Some(Self::InsufficientFunds),
            "PEER_UNAVAILABLE" => Some(Self::PeerUnavailable),
            "AMOUNT_OUT_OF_RANGE" => Some(Self::AmountOutOfRange),
            "PRICE_CHANGED" => Some(Self::PriceChanged),
            "TRADE_TIMEOUT" => Some(Self::TimedOut),
            _ => None,
        }
    }
}

/// Result of a remote take-offer call, returned by value.
#[derive(Debug, Clone, PartialEq)]
pub enum TakeOutcome {
    Succeeded(TradeReceipt),
    RetryableFailure(TakeFailureReason),
    FatalFailure(String),
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures that end the polling loop.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not acquire funds lease: {0}")]
    ResourceAcquisition(String),

    #[error("Fatal failure taking offer {offer_id}: {cause}")]
    TakeFailed { offer_id: String, cause: String },

    #[error("Remote service unreachable: {0}")]
    ServiceUnreachable(String),

    #[error("Remote service error: {0}")]
    Service(String),
}

impl BotError {
    /// Wrap an unexpected collaborator failure, keeping its context chain.
    pub fn service(err: anyhow::Error) -> Self {
        BotError::Service(format!("{err:#}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_offer() -> Offer {
        Offer {
            id: "offer-1".to_string(),
            direction: OfferDirection::Buy,
            price: dec!(0.00003100),
            amount: dec!(0.05),
            payment_method_id: "BSQ_SWAP".to_string(),
            maker_peer_id: "maker.onion:9999".to_string(),
            currency_code: "BSQ".to_string(),
        }
    }

    #[test]
    fn test_direction_display_matches_wire_format() {
        assert_eq!(OfferDirection::Buy.to_string(), "BUY");
        let json = serde_json::to_string(&OfferDirection::Sell).unwrap();
        assert_eq!(json, "\"SELL\"");
    }

    #[test]
    fn test_account_and_balance_display() {
        let account = PaymentAccount {
            id: "acct-1".into(),
            account_name: "BSQ swap".into(),
            payment_method_id: "BSQ_SWAP".into(),
        };
        assert_eq!(account.to_string(), "BSQ swap (acct-1, BSQ_SWAP)");

        let balance = Balance {
            currency_code: "BSQ".into(),
            available: dec!(12.5),
            reserved: dec!(0),
        };
        assert_eq!(balance.to_string(), "BSQ available=12.5 reserved=0");
    }

    #[test]
    fn test_config_error_converts_to_bot_error() {
        let err: BotError = ConfigError::PollingInterval(500).into();
        assert!(matches!(err, BotError::Config(ConfigError::PollingInterval(500))));
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_network_parse() {
        assert!("mainnet".parse::<Network>().unwrap().is_mainnet());
        assert!("BTC_MAINNET".parse::<Network>().unwrap().is_mainnet());
        assert!(!"regtest".parse::<Network>().unwrap().is_mainnet());
        assert!("signet".parse::<Network>().is_err());
    }

    #[test]
    fn test_dry_run_receipt() {
        let offer = sample_offer();
        let receipt = TradeReceipt::dry_run(&offer);
        assert!(receipt.trade_id.starts_with("dry-run-"));
        assert_eq!(receipt.offer_id, "offer-1");
        assert_eq!(receipt.price, dec!(0.00003100));
        assert!(receipt.dry_run);
    }

    #[test]
    fn test_failure_reason_from_code() {
        assert_eq!(
            TakeFailureReason::from_code("offer_unavailable"),
            Some(TakeFailureReason::OfferUnavailable)
        );
        assert_eq!(
            TakeFailureReason::from_code("INSUFFICIENT_FUNDS"),
            Some(TakeFailureReason::InsufficientFunds)
        );
        assert_eq!(TakeFailureReason::from_code("INTERNAL"), None);
        assert_eq!(TakeFailureReason::from_code(""), None);
    }

    #[test]
    fn test_offer_display() {
        let s = sample_offer().to_string();
        assert!(s.contains("offer-1"));
        assert!(s.contains("BUY"));
        assert!(s.contains("maker.onion:9999"));
    }

    #[test]
    fn test_bot_error_messages() {
        let err = BotError::TakeFailed {
            offer_id: "abc".into(),
            cause: "stream reset".into(),
        };
        assert_eq!(err.to_string(), "Fatal failure taking offer abc: stream reset");

        let err = BotError::service(anyhow::anyhow!("boom").context("fetching offers"));
        assert_eq!(err.to_string(), "Remote service error: fetching offers: boom");
    }
}
