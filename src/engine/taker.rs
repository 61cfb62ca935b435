//! Take-attempt controller.
//!
//! Drives one take through `Idle → ResourceAcquiring → Executing` and on to
//! exactly one of `Succeeded`, `RetryableFailure` or `FatalFailure`.
//! Retryable failures are reported back to the loop; fatal ones come back
//! as `Err` and end it. Nothing is rolled back on a fatal failure.

use secrecy::SecretString;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::PolicyConfig;
use crate::engine::session::SessionState;
use crate::service::OfferService;
use crate::types::{
    BotError, Offer, PaymentAccount, TakeFailureReason, TakeOutcome, TradeReceipt,
};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    ResourceAcquiring,
    Executing,
    Succeeded,
    RetryableFailure,
    FatalFailure,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded | AttemptState::RetryableFailure | AttemptState::FatalFailure
        )
    }

    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Idle, ResourceAcquiring)
                | (ResourceAcquiring, Executing)
                | (ResourceAcquiring, FatalFailure)
                | (Executing, Succeeded)
                | (Executing, RetryableFailure)
                | (Executing, FatalFailure)
                // dry run never touches the wallet or the remote service
                | (Idle, Succeeded)
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptState::Idle => "idle",
            AttemptState::ResourceAcquiring => "resource_acquiring",
            AttemptState::Executing => "executing",
            AttemptState::Succeeded => "succeeded",
            AttemptState::RetryableFailure => "retryable_failure",
            AttemptState::FatalFailure => "fatal_failure",
        };
        f.write_str(s)
    }
}

/// Trace of states one attempt went through.
#[derive(Debug, Clone)]
struct AttemptTrace {
    offer_id: String,
    states: Vec<AttemptState>,
}

impl AttemptTrace {
    fn new(offer_id: &str) -> Self {
        Self {
            offer_id: offer_id.to_string(),
            states: vec![AttemptState::Idle],
        }
    }

    fn current(&self) -> AttemptState {
        self.states.last().copied().unwrap_or(AttemptState::Idle)
    }

    fn advance(&mut self, next: AttemptState) {
        let from = self.current();
        debug_assert!(from.can_transition_to(next), "illegal transition {from} -> {next}");
        debug!(offer_id = %self.offer_id, from = %from, to = %next, "Take attempt state");
        self.states.push(next);
        if next.is_terminal() {
            let path: Vec<String> = self.states.iter().map(ToString::to_string).collect();
            debug!(offer_id = %self.offer_id, path = %path.join(" -> "), "Take attempt finished");
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Non-fatal end of an attempt. Fatal ends are `Err(BotError)`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Taken {
        receipt: TradeReceipt,
        offers_taken: u32,
        limit_reached: bool,
    },
    Retryable(TakeFailureReason),
    /// The offer is already in the session's taken set; nothing was sent.
    AlreadyTaken,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct TakeAttemptController {
    wallet_password: Option<SecretString>,
    unlock_secs: u64,
    take_timeout: Duration,
    dry_run: bool,
}

impl TakeAttemptController {
    /// Live controller. The wallet is unlocked for `unlock_secs` before
    /// every take; a take is abandoned locally after `take_timeout`.
    pub fn new(wallet_password: SecretString, unlock_secs: u64, take_timeout: Duration) -> Self {
        Self {
            wallet_password: Some(wallet_password),
            unlock_secs,
            take_timeout,
            dry_run: false,
        }
    }

    /// Controller that records takes without contacting the service.
    pub fn dry_run(take_timeout: Duration) -> Self {
        Self {
            wallet_password: None,
            unlock_secs: 0,
            take_timeout,
            dry_run: true,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run one attempt against `offer`. Session state is only touched on
    /// success.
    pub async fn attempt(
        &self,
        service: &dyn OfferService,
        offer: &Offer,
        account: &PaymentAccount,
        session: &mut SessionState,
        policy: &PolicyConfig,
    ) -> Result<AttemptOutcome, BotError> {
        if session.already_taken().contains(&offer.id) {
            warn!(offer_id = %offer.id, "Refusing to take an offer already taken this session");
            return Ok(AttemptOutcome::AlreadyTaken);
        }

        let mut trace = AttemptTrace::new(&offer.id);
        info!(offer_id = %offer.id, price = %offer.price, amount = %offer.amount, "Will attempt to take offer");

        if self.dry_run {
            info!(
                offer_id = %offer.id,
                price = %offer.price,
                amount = %offer.amount,
                maker = %offer.maker_peer_id,
                "[DRY RUN] Would take offer"
            );
            trace.advance(AttemptState::Succeeded);
            return Ok(Self::succeed(TradeReceipt::dry_run(offer), session, policy));
        }

        // -- Resource acquisition -------------------------------------------
        trace.advance(AttemptState::ResourceAcquiring);
        let password = match &self.wallet_password {
            Some(p) => p,
            None => {
                trace.advance(AttemptState::FatalFailure);
                return Err(BotError::ResourceAcquisition(
                    "wallet password not configured".into(),
                ));
            }
        };
        if let Err(e) = service.unlock_wallet(password, self.unlock_secs).await {
            trace.advance(AttemptState::FatalFailure);
            error!(offer_id = %offer.id, error = %e, "Wallet unlock failed");
            return Err(BotError::ResourceAcquisition(format!("{e:#}")));
        }

        log_balances(service, "Balances before take").await;

        // -- Execution ------------------------------------------------------
        trace.advance(AttemptState::Executing);
        let outcome = match tokio::time::timeout(
            self.take_timeout,
            service.take_offer(offer, &account.id, self.take_timeout),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => TakeOutcome::RetryableFailure(TakeFailureReason::TimedOut),
        };

        match outcome {
            TakeOutcome::Succeeded(receipt) => {
                trace.advance(AttemptState::Succeeded);
                info!(trade_id = %receipt.trade_id, offer_id = %offer.id, "Offer taken");
                log_balances(service, "Balances after take").await;
                Ok(Self::succeed(receipt, session, policy))
            }
            TakeOutcome::RetryableFailure(reason) => {
                trace.advance(AttemptState::RetryableFailure);
                warn!(
                    offer_id = %offer.id,
                    reason = %reason,
                    "Take failed, offer stays eligible for later cycles"
                );
                log_balances(service, "Balances after failed take").await;
                Ok(AttemptOutcome::Retryable(reason))
            }
            TakeOutcome::FatalFailure(cause) => {
                trace.advance(AttemptState::FatalFailure);
                error!(offer_id = %offer.id, cause = %cause, "Fatal error taking offer");
                Err(BotError::TakeFailed {
                    offer_id: offer.id.clone(),
                    cause,
                })
            }
        }
    }

    fn succeed(
        receipt: TradeReceipt,
        session: &mut SessionState,
        policy: &PolicyConfig,
    ) -> AttemptOutcome {
        let offers_taken = session.record_success(receipt.clone());
        let limit_reached = policy.take_limit_reached(offers_taken);
        if limit_reached {
            info!(
                offers_taken,
                max_take_count = policy.max_take_count,
                "Take limit reached, shutting down after this cycle"
            );
        }
        AttemptOutcome::Taken {
            receipt,
            offers_taken,
            limit_reached,
        }
    }
}

/// Balance reads are informational; a failure only warns.
async fn log_balances(service: &dyn OfferService, label: &str) {
    match service.get_balances().await {
        Ok(balances) => {
            for b in balances {
                info!(balance = %b, "{label}");
            }
        }
        Err(e) => warn!(error = %e, "Could not read balances"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
