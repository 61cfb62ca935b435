//! The polling loop.
//!
//! One cycle at a time: fee gate, fetch, criteria, filter, take, liveness
//! check, sleep. Runs until shutdown is requested, the take limit is hit,
//! or something fatal happens.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{MarketConfig, PolicyConfig};
use crate::dashboard::routes::AppState;
use crate::engine::session::SessionState;
use crate::engine::shutdown::ShutdownSignal;
use crate::engine::taker::{AttemptOutcome, TakeAttemptController};
use crate::service::OfferService;
use crate::strategy::criteria::TakeCriteria;
use crate::strategy::filter::{closest_candidate, FilterReport, OfferFilter};
use crate::types::{BotError, Network, Offer, PaymentAccount};

/// Window for the live reference price.
pub const AVERAGE_PRICE_DAYS: u32 = 30;

// ---------------------------------------------------------------------------
// Cycle reporting
// ---------------------------------------------------------------------------

/// What a cycle decided.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleDecision {
    /// Network fees over the ceiling; offers were not fetched.
    FeeRateTooHigh,
    NoOffers,
    /// Nothing passed the filters.
    NoMatch { closest_offer_id: Option<String> },
    Taken {
        offer_id: String,
        trade_id: String,
        offers_taken: u32,
        dry_run: bool,
    },
    RetryableFailure { offer_id: String, reason: String },
    /// Selected offer was already in the taken set.
    Skipped { offer_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub candidates: usize,
    pub avg_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub decision: CycleDecision,
    /// Filter breakdown for the selected offer or the closest candidate.
    pub filter: Option<FilterReport>,
}

impl CycleReport {
    fn new(cycle: u64, decision: CycleDecision) -> Self {
        Self {
            cycle,
            timestamp: Utc::now(),
            candidates: 0,
            avg_price: None,
            target_price: None,
            decision,
            filter: None,
        }
    }
}

/// Why `run` returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    TakeLimitReached,
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

pub struct PollingLoop {
    service: Arc<dyn OfferService>,
    policy: PolicyConfig,
    market: MarketConfig,
    network: Network,
    account: PaymentAccount,
    taker: TakeAttemptController,
    session: SessionState,
    shutdown: ShutdownSignal,
    dashboard: Option<AppState>,
}

impl PollingLoop {
    pub fn new(
        service: Arc<dyn OfferService>,
        policy: PolicyConfig,
        market: MarketConfig,
        network: Network,
        account: PaymentAccount,
        taker: TakeAttemptController,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            service,
            policy,
            market,
            network,
            account,
            taker,
            session: SessionState::new(),
            shutdown,
            dashboard: None,
        }
    }

    /// Publish every cycle to the status dashboard.
    pub fn with_dashboard(mut self, state: AppState) -> Self {
        self.dashboard = Some(state);
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run cycles until shutdown, the take limit, or a fatal error.
    pub async fn run(&mut self) -> Result<LoopExit, BotError> {
        info!(
            market = %self.market.description,
            network = %self.network,
            polling_interval_ms = self.policy.polling_interval.as_millis() as u64,
            dry_run = self.taker.is_dry_run(),
            "Polling loop started"
        );

        loop {
            if self.shutdown.is_triggered() {
                info!("Shutdown requested");
                return Ok(LoopExit::Shutdown);
            }
            if self.policy.take_limit_reached(self.session.offers_taken()) {
                return Ok(LoopExit::TakeLimitReached);
            }

            let report = match self.run_cycle().await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, cycle = self.session.cycles(), "Fatal error, stopping");
                    return Err(e);
                }
            };
            self.publish(&report).await;

            if self.policy.take_limit_reached(self.session.offers_taken()) {
                info!(
                    offers_taken = self.session.offers_taken(),
                    "Take limit reached, stopping"
                );
                return Ok(LoopExit::TakeLimitReached);
            }

            debug!(
                secs = self.policy.polling_interval.as_secs(),
                "Sleeping until next cycle"
            );
            if self.shutdown.sleep(self.policy.polling_interval).await {
                info!("Shutdown requested during sleep");
                return Ok(LoopExit::Shutdown);
            }
        }
    }

    /// One cycle, without the trailing sleep.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, BotError> {
        let cycle = self.session.start_cycle();

        // -- Fee gate ---------------------------------------------------------
        let fee_ok = self
            .service
            .is_fee_rate_acceptable(self.policy.max_fee_rate)
            .await
            .map_err(BotError::service)?;
        if !fee_ok {
            warn!(
                max_fee_rate = self.policy.max_fee_rate,
                "Network fee rate above ceiling, skipping cycle"
            );
            return Ok(CycleReport::new(cycle, CycleDecision::FeeRateTooHigh));
        }

        // -- Candidates -------------------------------------------------------
        let offers: Vec<Offer> = self
            .service
            .get_offers(self.market.direction, &self.market.currency_code)
            .await
            .map_err(BotError::service)?
            .into_iter()
            .filter(|o| !self.session.already_taken().contains(&o.id))
            .collect();

        if offers.is_empty() {
            info!(cycle, "No takeable offers found");
            return Ok(CycleReport::new(cycle, CycleDecision::NoOffers));
        }

        // -- Criteria + selection ---------------------------------------------
        let criteria = TakeCriteria::new(self.reference_price().await?, self.policy.max_price_margin_pct)
            .map_err(|e| BotError::Service(format!("no usable target price: {e}")))?;
        info!(
            avg_price = %criteria.avg_price,
            target_price = %criteria.target_price,
            "{}",
            criteria.summary(&self.market.description)
        );
        for offer in &offers {
            debug!(offer = %offer, passes = criteria.allows_price(offer.price), "Candidate");
        }

        let (selected, filter_report) = {
            let filter = OfferFilter::new(&self.policy, &self.account, self.session.already_taken());
            match filter.select_best_offer(&offers, &criteria) {
                Some(offer) => (Some(offer.clone()), Some(filter.evaluate(offer, &criteria))),
                None => (
                    None,
                    closest_candidate(&offers).map(|c| filter.evaluate(c, &criteria)),
                ),
            }
        };
        if let Some(report) = &filter_report {
            report.log();
        }

        // -- Take -------------------------------------------------------------
        let decision = match selected {
            Some(offer) => {
                let outcome = self
                    .taker
                    .attempt(
                        self.service.as_ref(),
                        &offer,
                        &self.account,
                        &mut self.session,
                        &self.policy,
                    )
                    .await?;
                match outcome {
                    AttemptOutcome::Taken {
                        receipt,
                        offers_taken,
                        ..
                    } => CycleDecision::Taken {
                        offer_id: offer.id,
                        trade_id: receipt.trade_id,
                        offers_taken,
                        dry_run: receipt.dry_run,
                    },
                    AttemptOutcome::Retryable(reason) => CycleDecision::RetryableFailure {
                        offer_id: offer.id,
                        reason: reason.to_string(),
                    },
                    AttemptOutcome::AlreadyTaken => CycleDecision::Skipped { offer_id: offer.id },
                }
            }
            None => {
                info!("No acceptable offer found, closest candidate did not pass filters");
                CycleDecision::NoMatch {
                    closest_offer_id: filter_report.as_ref().map(|r| r.offer_id.clone()),
                }
            }
        };

        if self.taker.is_dry_run() {
            let taken: Vec<&str> = self.session.already_taken().iter().collect();
            info!(
                offers_taken = self.session.offers_taken(),
                taken = ?taken,
                "[DRY RUN] Progress"
            );
        }

        // -- Liveness ---------------------------------------------------------
        if !self.service.is_reachable().await {
            return Err(BotError::ServiceUnreachable(
                "daemon did not answer ping".to_string(),
            ));
        }

        Ok(CycleReport {
            cycle,
            timestamp: Utc::now(),
            candidates: offers.len(),
            avg_price: Some(criteria.avg_price),
            target_price: Some(criteria.target_price),
            decision,
            filter: filter_report,
        })
    }

    /// Live 30-day average on mainnet, configured constant elsewhere.
    async fn reference_price(&self) -> Result<Decimal, BotError> {
        if self.network.is_mainnet() {
            self.service
                .get_average_price(&self.market.currency_code, AVERAGE_PRICE_DAYS)
                .await
                .map_err(BotError::service)
        } else {
            Ok(self.policy.reference_price)
        }
    }

    async fn publish(&self, report: &CycleReport) {
        if let Some(dashboard) = &self.dashboard {
            dashboard.record_cycle(report, &self.session).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
