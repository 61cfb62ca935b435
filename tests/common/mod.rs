//! Scripted in-memory trading service for integration tests.
//!
//! Offers, take outcomes, fee gate and liveness are all controllable from
//! test code. Offers are never removed after a take, which mimics the
//! propagation lag of the real offer book.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use offer_taker::config::{MarketConfig, PolicyConfig};
use offer_taker::engine::{PollingLoop, ShutdownSignal, TakeAttemptController};
use offer_taker::service::OfferService;
use offer_taker::types::*;

pub struct ScriptedService {
    network: Network,
    avg_price: Mutex<Decimal>,
    offers: Mutex<Vec<Offer>>,
    /// Outcomes handed out by `take_offer` in order; success once empty.
    take_script: Mutex<VecDeque<TakeOutcome>>,
    take_delay: Mutex<Option<Duration>>,
    fee_ok: Mutex<bool>,
    reachable: Mutex<bool>,
    unlock_error: Mutex<Option<String>>,
    take_attempts: Mutex<Vec<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedService {
    pub fn new(offers: Vec<Offer>) -> Arc<Self> {
        Arc::new(Self {
            network: Network::Regtest,
            avg_price: Mutex::new(dec!(1)),
            offers: Mutex::new(offers),
            take_script: Mutex::new(VecDeque::new()),
            take_delay: Mutex::new(None),
            fee_ok: Mutex::new(true),
            reachable: Mutex::new(true),
            unlock_error: Mutex::new(None),
            take_attempts: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn script_takes(&self, outcomes: Vec<TakeOutcome>) {
        self.take_script.lock().unwrap().extend(outcomes);
    }

    pub fn set_take_delay(&self, delay: Duration) {
        *self.take_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fee_ok(&self, ok: bool) {
        *self.fee_ok.lock().unwrap() = ok;
    }

    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().unwrap() = reachable;
    }

    pub fn fail_unlock(&self, msg: &str) {
        *self.unlock_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Live 30-day average reported on mainnet from now on.
    pub fn set_avg_price(&self, avg: Decimal) {
        *self.avg_price.lock().unwrap() = avg;
    }

    pub fn set_offers(&self, offers: Vec<Offer>) {
        *self.offers.lock().unwrap() = offers;
    }

    /// Offer ids submitted to `take_offer`, in order.
    pub fn take_attempts(&self) -> Vec<String> {
        self.take_attempts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

#[async_trait]
impl OfferService for ScriptedService {
    async fn get_offers(&self, _: OfferDirection, _: &str) -> Result<Vec<Offer>> {
        self.record("get_offers");
        Ok(self.offers.lock().unwrap().clone())
    }

    async fn get_network(&self) -> Result<Network> {
        self.record("get_network");
        Ok(self.network)
    }

    async fn get_average_price(&self, _: &str, _: u32) -> Result<Decimal> {
        self.record("get_average_price");
        Ok(*self.avg_price.lock().unwrap())
    }

    async fn is_fee_rate_acceptable(&self, _: u64) -> Result<bool> {
        self.record("is_fee_rate_acceptable");
        Ok(*self.fee_ok.lock().unwrap())
    }

    async fn get_payment_account(&self, _: &str) -> Result<PaymentAccount> {
        self.record("get_payment_account");
        Ok(account())
    }

    async fn unlock_wallet(&self, _: &SecretString, _: u64) -> Result<()> {
        self.record("unlock_wallet");
        match self.unlock_error.lock().unwrap().clone() {
            Some(msg) => Err(anyhow!(msg)),
            None => Ok(()),
        }
    }

    async fn take_offer(&self, offer: &Offer, _: &str, _: Duration) -> TakeOutcome {
        self.record("take_offer");
        self.take_attempts.lock().unwrap().push(offer.id.clone());

        let delay = *self.take_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.take_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            TakeOutcome::Succeeded(TradeReceipt {
                trade_id: format!("trade-{}", offer.id),
                offer_id: offer.id.clone(),
                price: offer.price,
                amount: offer.amount,
                dry_run: false,
                timestamp: Utc::now(),
            })
        })
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        self.record("get_balances");
        Ok(vec![Balance {
            currency_code: "BTC".into(),
            available: dec!(1),
            reserved: dec!(0),
        }])
    }

    async fn is_reachable(&self) -> bool {
        self.record("is_reachable");
        *self.reachable.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn offer(id: &str, price: Decimal, peer: &str) -> Offer {
    Offer {
        id: id.to_string(),
        direction: OfferDirection::Buy,
        price,
        amount: dec!(5),
        payment_method_id: "M1".into(),
        maker_peer_id: peer.to_string(),
        currency_code: "BSQ".into(),
    }
}

pub fn account() -> PaymentAccount {
    PaymentAccount {
        id: "acct-1".into(),
        account_name: "BSQ swap".into(),
        payment_method_id: "M1".into(),
    }
}

/// Zero margin against a 1.00 reference price, 5 s polling.
pub fn policy(max_take_count: u32) -> PolicyConfig {
    PolicyConfig {
        max_price_margin_pct: dec!(0),
        reference_price: dec!(1.00000000),
        min_amount: dec!(1),
        max_amount: dec!(10),
        max_fee_rate: 20,
        max_take_count,
        polling_interval: Duration::from_secs(5),
        preferred_peers: BTreeSet::new(),
    }
}

pub fn live_taker(policy: &PolicyConfig) -> TakeAttemptController {
    TakeAttemptController::new(
        SecretString::new("wallet-pw".to_string()),
        600,
        policy.polling_interval,
    )
}

pub fn make_loop(
    service: Arc<ScriptedService>,
    policy: PolicyConfig,
    taker: TakeAttemptController,
    shutdown: ShutdownSignal,
) -> PollingLoop {
    make_loop_on(Network::Regtest, service, policy, taker, shutdown)
}

pub fn make_loop_on(
    network: Network,
    service: Arc<ScriptedService>,
    policy: PolicyConfig,
    taker: TakeAttemptController,
    shutdown: ShutdownSignal,
) -> PollingLoop {
    PollingLoop::new(
        service,
        policy,
        MarketConfig::default(),
        network,
        account(),
        taker,
        shutdown,
    )
}
