//! Strategy: per-cycle price criteria and offer selection.

pub mod criteria;
pub mod filter;

pub use criteria::{CriteriaError, TakeCriteria};
pub use filter::{FilterReport, OfferFilter};
