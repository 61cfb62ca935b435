//! HTTP/JSON gateway client for the trading daemon.
//!
//! The daemon's own RPC interface sits behind a small REST gateway.
//! Every request carries the API password in a `password` header.
//!
//! Endpoints (relative to `base_url`):
//! - `GET  /api/v1/version`
//! - `GET  /api/v1/network`
//! - `GET  /api/v1/offers?direction=BUY&currency_code=BSQ`
//! - `GET  /api/v1/markets/{currency}/average-price?days=30`
//! - `GET  /api/v1/fees`
//! - `GET  /api/v1/payment-accounts`
//! - `POST /api/v1/wallet/unlock`
//! - `POST /api/v1/offers/{id}/take`
//! - `GET  /api/v1/wallet/balances`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::OfferService;
use crate::types::{
    Balance, Network, Offer, OfferDirection, PaymentAccount, TakeFailureReason, TakeOutcome,
    TradeReceipt,
};

const API_PREFIX: &str = "/api/v1";
const PASSWORD_HEADER: &str = "password";

/// Timeout for the liveness probe; much shorter than normal requests.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OfferDto {
    id: String,
    direction: OfferDirection,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    payment_method_id: String,
    owner_node_address: String,
    currency_code: String,
}

impl From<OfferDto> for Offer {
    fn from(dto: OfferDto) -> Self {
        Offer {
            id: dto.id,
            direction: dto.direction,
            price: dto.price,
            amount: dto.amount,
            payment_method_id: dto.payment_method_id,
            maker_peer_id: dto.owner_node_address,
            currency_code: dto.currency_code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NetworkDto {
    network: String,
}

#[derive(Debug, Deserialize)]
struct AveragePriceDto {
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct FeeRateDto {
    /// sats/vbyte
    fee_rate: u64,
}

#[derive(Debug, Deserialize)]
struct PaymentAccountDto {
    id: String,
    account_name: String,
    payment_method_id: String,
    #[serde(default)]
    trade_currencies: Vec<String>,
}

#[derive(Serialize)]
struct UnlockRequest<'a> {
    password: &'a str,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct TakeRequest<'a> {
    payment_account_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TradeDto {
    trade_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BalanceDto {
    currency_code: String,
    #[serde(with = "rust_decimal::serde::str")]
    available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    reserved: Decimal,
}

/// Error body returned by the gateway on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorDto {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Classify a failed take by the gateway's error code. Only recognized
/// transient codes are retryable; anything else, including a missing code,
/// is fatal.
pub fn classify_take_failure(status: StatusCode, code: Option<&str>, message: &str) -> TakeOutcome {
    match code.and_then(TakeFailureReason::from_code) {
        Some(reason) => TakeOutcome::RetryableFailure(reason),
        None => {
            let code = code.unwrap_or("NO_CODE");
            TakeOutcome::FatalFailure(format!("{status} {code}: {message}"))
        }
    }
}

/// Transport-level failure: only a local timeout is retryable.
fn classify_transport_error(err: &reqwest::Error) -> TakeOutcome {
    if err.is_timeout() {
        TakeOutcome::RetryableFailure(TakeFailureReason::TimedOut)
    } else {
        TakeOutcome::FatalFailure(format!("transport error: {err}"))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DaemonClient {
    http: Client,
    base_url: String,
    api_password: SecretString,
}

impl DaemonClient {
    pub fn new(base_url: &str, api_password: SecretString, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("offer-taker/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for trading daemon")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_password,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .header(PASSWORD_HEADER, self.api_password.expose_secret())
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(path))
            .header(PASSWORD_HEADER, self.api_password.expose_secret())
    }

    /// Send, fail on non-2xx with the gateway's error message, parse JSON.
    async fn send_json<T: serde::de::DeserializeOwned>(
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("Daemon request failed: {what}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err: ErrorDto = resp.json().await.unwrap_or_default();
            anyhow::bail!(
                "Daemon error {status} ({what}): {} {}",
                err.code.unwrap_or_default(),
                err.message
            );
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse daemon response: {what}"))
    }
}

#[async_trait]
impl OfferService for DaemonClient {
    async fn get_offers(
        &self,
        direction: OfferDirection,
        currency_code: &str,
    ) -> Result<Vec<Offer>> {
        let req = self.get("/offers").query(&[
            ("direction", direction.to_string()),
            ("currency_code", currency_code.to_string()),
        ]);
        let dtos: Vec<OfferDto> = Self::send_json(req, "get offers").await?;

        let mut offers: Vec<Offer> = dtos.into_iter().map(Offer::from).collect();
        offers.sort_by(|a, b| a.price.cmp(&b.price));

        debug!(
            direction = %direction,
            currency = currency_code,
            count = offers.len(),
            "Fetched offers"
        );
        Ok(offers)
    }

    async fn get_network(&self) -> Result<Network> {
        let dto: NetworkDto = Self::send_json(self.get("/network"), "get network").await?;
        dto.network.parse()
    }

    async fn get_average_price(&self, currency_code: &str, days: u32) -> Result<Decimal> {
        let path = format!(
            "/markets/{}/average-price",
            urlencoding::encode(currency_code)
        );
        let req = self.get(&path).query(&[("days", days)]);
        let dto: AveragePriceDto = Self::send_json(req, "get average price").await?;
        Ok(dto.price)
    }

    async fn is_fee_rate_acceptable(&self, max_fee_rate: u64) -> Result<bool> {
        let dto: FeeRateDto = Self::send_json(self.get("/fees"), "get fee rate").await?;
        debug!(fee_rate = dto.fee_rate, max_fee_rate, "Network fee rate");
        Ok(dto.fee_rate <= max_fee_rate)
    }

    async fn get_payment_account(&self, currency_code: &str) -> Result<PaymentAccount> {
        let accounts: Vec<PaymentAccountDto> =
            Self::send_json(self.get("/payment-accounts"), "get payment accounts").await?;

        let account = accounts
            .into_iter()
            .find(|a| {
                a.trade_currencies
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(currency_code))
            })
            .with_context(|| format!("No payment account for currency {currency_code}"))?;

        Ok(PaymentAccount {
            id: account.id,
            account_name: account.account_name,
            payment_method_id: account.payment_method_id,
        })
    }

    async fn unlock_wallet(&self, password: &SecretString, duration_secs: u64) -> Result<()> {
        let body = UnlockRequest {
            password: password.expose_secret(),
            timeout_secs: duration_secs,
        };
        let resp = self
            .post("/wallet/unlock")
            .json(&body)
            .send()
            .await
            .context("Wallet unlock request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err: ErrorDto = resp.json().await.unwrap_or_default();
            anyhow::bail!("Wallet unlock failed {status}: {}", err.message);
        }
        debug!(duration_secs, "Wallet unlocked");
        Ok(())
    }

    async fn take_offer(
        &self,
        offer: &Offer,
        payment_account_id: &str,
        timeout: Duration,
    ) -> TakeOutcome {
        let path = format!("/offers/{}/take", urlencoding::encode(&offer.id));
        let resp = match self
            .post(&path)
            .timeout(timeout)
            .json(&TakeRequest { payment_account_id })
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return classify_transport_error(&e),
        };

        let status = resp.status();
        if !status.is_success() {
            let err: ErrorDto = resp.json().await.unwrap_or_default();
            warn!(
                offer_id = %offer.id,
                status = %status,
                code = err.code.as_deref().unwrap_or(""),
                message = %err.message,
                "Take offer rejected by daemon"
            );
            return classify_take_failure(status, err.code.as_deref(), &err.message);
        }

        match resp.json::<TradeDto>().await {
            Ok(trade) => {
                info!(trade_id = %trade.trade_id, offer_id = %offer.id, "Trade completed");
                TakeOutcome::Succeeded(TradeReceipt {
                    trade_id: trade.trade_id,
                    offer_id: offer.id.clone(),
                    price: trade.price,
                    amount: trade.amount,
                    dry_run: false,
                    timestamp: trade.completed_at.unwrap_or_else(Utc::now),
                })
            }
            // The take went through but we cannot tell what happened to it.
            Err(e) => TakeOutcome::FatalFailure(format!("unreadable trade response: {e}")),
        }
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let dtos: Vec<BalanceDto> =
            Self::send_json(self.get("/wallet/balances"), "get balances").await?;
        Ok(dtos
            .into_iter()
            .map(|b| Balance {
                currency_code: b.currency_code,
                available: b.available,
                reserved: b.reserved,
            })
            .collect())
    }

    async fn is_reachable(&self) -> bool {
        match self.get("/version").timeout(PING_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Daemon ping failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
