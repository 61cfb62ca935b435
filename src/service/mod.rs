//! Remote trading service boundary.
//!
//! Defines the `OfferService` trait, the only way the decision engine talks
//! to the outside world, and the HTTP gateway client that implements it:
//! - `daemon`: JSON gateway in front of the trading daemon

pub mod daemon;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::time::Duration;

use crate::types::{Balance, Network, Offer, OfferDirection, PaymentAccount, TakeOutcome};

/// Abstraction over the remote offer/trade service.
///
/// Everything except `take_offer` and `is_reachable` reports failures as
/// errors; the engine treats those as fatal. `take_offer` classifies its
/// own failures so the caller can branch on the outcome without guessing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OfferService: Send + Sync {
    /// Open offers for a market, sorted by price ascending.
    async fn get_offers(&self, direction: OfferDirection, currency_code: &str)
        -> Result<Vec<Offer>>;

    /// Network the daemon is connected to.
    async fn get_network(&self) -> Result<Network>;

    /// Average trade price over the last `days` days.
    async fn get_average_price(&self, currency_code: &str, days: u32) -> Result<Decimal>;

    /// Whether the prevailing network fee rate is at or under `max_fee_rate`.
    async fn is_fee_rate_acceptable(&self, max_fee_rate: u64) -> Result<bool>;

    /// The taker's payment account for the given currency.
    async fn get_payment_account(&self, currency_code: &str) -> Result<PaymentAccount>;

    /// Unlock the wallet for `duration_secs`. Repeating the call while the
    /// wallet is already unlocked just resets the timeout.
    async fn unlock_wallet(&self, password: &SecretString, duration_secs: u64) -> Result<()>;

    /// Take an offer and wait for the trade to complete.
    async fn take_offer(
        &self,
        offer: &Offer,
        payment_account_id: &str,
        timeout: Duration,
    ) -> TakeOutcome;

    async fn get_balances(&self) -> Result<Vec<Balance>>;

    /// Cheap liveness probe.
    async fn is_reachable(&self) -> bool;
}
