//! Offer filtering and selection.
//!
//! Candidates arrive sorted by price ascending. Each offer is run through
//! an ordered list of named predicates; the first offer that passes every
//! active predicate is the one to take. Selection is pure: nothing here
//! touches the already-taken set or session counters.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::config::PolicyConfig;
use crate::engine::session::AlreadyTakenSet;
use crate::strategy::criteria::TakeCriteria;
use crate::types::{Offer, PaymentAccount};

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

type PredicateFn = fn(&Offer, &TakeCriteria, &OfferFilter<'_>) -> bool;

/// A single named acceptance test.
pub struct OfferPredicate {
    pub name: &'static str,
    /// Whether the predicate participates at all for this filter.
    applies: fn(&OfferFilter<'_>) -> bool,
    test: PredicateFn,
}

impl OfferPredicate {
    pub fn is_active(&self, filter: &OfferFilter<'_>) -> bool {
        (self.applies)(filter)
    }

    pub fn test(&self, offer: &Offer, criteria: &TakeCriteria, filter: &OfferFilter<'_>) -> bool {
        (self.test)(offer, criteria, filter)
    }
}

impl fmt::Debug for OfferPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfferPredicate").field("name", &self.name).finish()
    }
}

fn always(_: &OfferFilter<'_>) -> bool {
    true
}

pub const NOT_ALREADY_TAKEN: OfferPredicate = OfferPredicate {
    name: "not_already_taken",
    applies: always,
    test: |offer, _, filter| !filter.already_taken.contains(&offer.id),
};

pub const SAME_PAYMENT_METHOD: OfferPredicate = OfferPredicate {
    name: "same_payment_method",
    applies: always,
    test: |offer, _, filter| offer.payment_method_id == filter.account.payment_method_id,
};

pub const PREFERRED_PEER: OfferPredicate = OfferPredicate {
    name: "preferred_peer",
    applies: |filter| filter.policy.has_preferred_peers(),
    test: |offer, _, filter| filter.policy.preferred_peers.contains(&offer.maker_peer_id),
};

pub const PRICE_WITHIN_MARGIN: OfferPredicate = OfferPredicate {
    name: "price_within_margin",
    applies: always,
    test: |offer, criteria, _| criteria.allows_price(offer.price),
};

pub const AMOUNT_WITHIN_BOUNDS: OfferPredicate = OfferPredicate {
    name: "amount_within_bounds",
    applies: always,
    test: |offer, _, filter| {
        offer.amount >= filter.policy.min_amount && offer.amount <= filter.policy.max_amount
    },
};

/// Fixed evaluation order.
pub const PREDICATES: [&OfferPredicate; 5] = [
    &NOT_ALREADY_TAKEN,
    &SAME_PAYMENT_METHOD,
    &PREFERRED_PEER,
    &PRICE_WITHIN_MARGIN,
    &AMOUNT_WITHIN_BOUNDS,
];

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Everything the predicates need besides the offer and the criteria.
#[derive(Debug, Clone, Copy)]
pub struct OfferFilter<'a> {
    pub policy: &'a PolicyConfig,
    pub account: &'a PaymentAccount,
    pub already_taken: &'a AlreadyTakenSet,
}

impl<'a> OfferFilter<'a> {
    pub fn new(
        policy: &'a PolicyConfig,
        account: &'a PaymentAccount,
        already_taken: &'a AlreadyTakenSet,
    ) -> Self {
        Self {
            policy,
            account,
            already_taken,
        }
    }

    /// Predicates in evaluation order, skipping the ones that do not apply.
    pub fn active_predicates(&self) -> impl Iterator<Item = &'static OfferPredicate> + '_ {
        PREDICATES.into_iter().filter(move |p| p.is_active(self))
    }

    /// Short-circuiting check of every active predicate.
    pub fn accepts(&self, offer: &Offer, criteria: &TakeCriteria) -> bool {
        self.active_predicates()
            .all(|p| p.test(offer, criteria, self))
    }

    /// The cheapest candidate that passes every active predicate.
    pub fn select_best_offer<'o>(
        &self,
        candidates: &'o [Offer],
        criteria: &TakeCriteria,
    ) -> Option<&'o Offer> {
        if candidates.is_empty() {
            return None;
        }
        candidates.iter().find(|o| self.accepts(o, criteria))
    }

    /// Full per-predicate breakdown for one offer (no short-circuit), for
    /// audit logs.
    pub fn evaluate(&self, offer: &Offer, criteria: &TakeCriteria) -> FilterReport {
        let results = PREDICATES
            .iter()
            .map(|p| PredicateResult {
                name: p.name,
                verdict: if !p.is_active(self) {
                    Verdict::NotApplicable
                } else if p.test(offer, criteria, self) {
                    Verdict::Pass
                } else {
                    Verdict::Fail
                },
            })
            .collect();

        FilterReport {
            offer_id: offer.id.clone(),
            offer_price: offer.price,
            offer_amount: offer.amount,
            avg_price: criteria.avg_price,
            target_price: criteria.target_price,
            results,
        }
    }
}

/// Cheapest candidate before any filtering (input is price-ascending).
pub fn closest_candidate(candidates: &[Offer]) -> Option<&Offer> {
    candidates.first()
}

// ---------------------------------------------------------------------------
// Audit report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    NotApplicable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "YES"),
            Verdict::Fail => write!(f, "NO"),
            Verdict::NotApplicable => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredicateResult {
    pub name: &'static str,
    pub verdict: Verdict,
}

/// Pass/fail of every predicate for one offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterReport {
    pub offer_id: String,
    pub offer_price: Decimal,
    pub offer_amount: Decimal,
    pub avg_price: Decimal,
    pub target_price: Decimal,
    pub results: Vec<PredicateResult>,
}

impl FilterReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.verdict != Verdict::Fail)
    }

    pub fn verdict(&self, name: &str) -> Option<Verdict> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.verdict)
    }

    /// Names of the predicates the offer failed, in evaluation order.
    pub fn failures(&self) -> Vec<&'static str> {
        self.results
            .iter()
            .filter(|r| r.verdict == Verdict::Fail)
            .map(|r| r.name)
            .collect()
    }

    pub fn log(&self) {
        let line = self
            .results
            .iter()
            .map(|r| format!("{}={}", r.name, r.verdict))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            offer_id = %self.offer_id,
            avg_price = %self.avg_price,
            target_price = %self.target_price,
            offer_price = %self.offer_price,
            offer_amount = %self.offer_amount,
            passed = self.passed(),
            "Filter results: {line}"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
