//! Per-cycle take criteria.
//!
//! Converts the configured signed price margin and the current 30-day
//! average price into the maximum fixed price the agent will pay. Built
//! fresh every polling cycle so the target follows the reference price.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Price scale used for averages and targets.
pub const PRICE_SCALE: u32 = 8;

/// Round half-up (away from zero) and fix the scale to `dp` places.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// `avg_price * (1 + margin_pct / 100)`, at 8 dp. `None` on overflow.
pub fn calc_target_price(margin_pct: Decimal, avg_price: Decimal) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_add(margin_pct.checked_div(dec!(100))?)?;
    let target = avg_price.checked_mul(factor)?;
    Some(round_half_up(target, PRICE_SCALE))
}

/// Reasons no usable target price exists for a cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CriteriaError {
    #[error("average price must be greater than zero (got {0})")]
    NonPositiveAverage(Decimal),

    #[error("target price overflows for average {avg_price} and margin {margin_pct}%")]
    Overflow { avg_price: Decimal, margin_pct: Decimal },

    #[error("target price {target_price} is not positive (average {avg_price}, margin {margin_pct}%)")]
    NonPositiveTarget {
        avg_price: Decimal,
        margin_pct: Decimal,
        target_price: Decimal,
    },
}

/// Price criteria for one polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeCriteria {
    pub avg_price: Decimal,
    pub margin_pct: Decimal,
    pub target_price: Decimal,
}

impl TakeCriteria {
    pub fn new(avg_price: Decimal, margin_pct: Decimal) -> Result<Self, CriteriaError> {
        let avg_price = round_half_up(avg_price, PRICE_SCALE);
        if avg_price <= Decimal::ZERO {
            return Err(CriteriaError::NonPositiveAverage(avg_price));
        }
        let target_price = calc_target_price(margin_pct, avg_price).ok_or(CriteriaError::Overflow {
            avg_price,
            margin_pct,
        })?;
        if target_price <= Decimal::ZERO {
            return Err(CriteriaError::NonPositiveTarget {
                avg_price,
                margin_pct,
                target_price,
            });
        }
        Ok(Self {
            avg_price,
            margin_pct,
            target_price,
        })
    }

    /// Offer price at or below the target.
    pub fn allows_price(&self, price: Decimal) -> bool {
        price <= self.target_price
    }

    /// Human-readable description of what the agent is looking for.
    pub fn summary(&self, market_description: &str) -> String {
        if self.margin_pct.is_zero() {
            format!(
                "Looking for offers to {market_description}, with a fixed-price at or lower than \
                 the 30-day average price of {}.",
                self.avg_price
            )
        } else {
            let relation = if self.margin_pct.is_sign_negative() {
                "below"
            } else {
                "above"
            };
            format!(
                "Looking for offers to {market_description}, with a fixed-price at or lower than \
                 {}% {relation} the 30-day average price of {}.",
                self.margin_pct.abs(),
                self.avg_price
            )
        }
    }
}
