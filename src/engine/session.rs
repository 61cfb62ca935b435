//! Session state owned by the polling loop.
//!
//! Offers acted upon and the take counter live here rather than in free
//! globals. Both only ever grow; the only mutator is
//! [`SessionState::record_success`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::TradeReceipt;

/// Offer ids taken during this process lifetime. Entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AlreadyTakenSet(BTreeSet<String>);

impl AlreadyTakenSet {
    pub fn contains(&self, offer_id: &str) -> bool {
        self.0.contains(offer_id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, offer_id: &str) -> bool {
        self.0.insert(offer_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Confirmed successful takes (dry-run takes included).
    pub offers_taken: u32,
}

/// Everything the loop remembers between cycles.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    already_taken: AlreadyTakenSet,
    counters: SessionCounters,
    receipts: Vec<TradeReceipt>,
    cycles: u64,
    started_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            already_taken: AlreadyTakenSet::default(),
            counters: SessionCounters::default(),
            receipts: Vec::new(),
            cycles: 0,
            started_at: Utc::now(),
        }
    }

    pub fn already_taken(&self) -> &AlreadyTakenSet {
        &self.already_taken
    }

    pub fn offers_taken(&self) -> u32 {
        self.counters.offers_taken
    }

    pub fn receipts(&self) -> &[TradeReceipt] {
        &self.receipts
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn start_cycle(&mut self) -> u64 {
        self.cycles += 1;
        self.cycles
    }

    /// Record a confirmed take. Returns the new take count.
    pub fn record_success(&mut self, receipt: TradeReceipt) -> u32 {
        if self.already_taken.insert(&receipt.offer_id) {
            self.counters.offers_taken += 1;
        }
        self.receipts.push(receipt);
        self.counters.offers_taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn receipt(offer_id: &str) -> TradeReceipt {
        TradeReceipt {
            trade_id: format!("t-{offer_id}"),
            offer_id: offer_id.to_string(),
            price: dec!(0.98),
            amount: dec!(5),
            dry_run: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_new_session_is_empty() {
        let s = SessionState::new();
        assert_eq!(s.offers_taken(), 0);
        assert!(s.already_taken().is_empty());
        assert_eq!(s.cycles(), 0);
    }

    #[test]
    fn test_record_success_updates_set_and_counter() {
        let mut s = SessionState::new();
        assert_eq!(s.record_success(receipt("A")), 1);
        assert_eq!(s.record_success(receipt("B")), 2);
        assert!(s.already_taken().contains("A"));
        assert!(s.already_taken().contains("B"));
        assert_eq!(s.receipts().len(), 2);
    }

    #[test]
    fn test_duplicate_offer_not_double_counted() {
        let mut s = SessionState::new();
        s.record_success(receipt("A"));
        assert_eq!(s.record_success(receipt("A")), 1);
        assert_eq!(s.already_taken().len(), 1);
    }

    #[test]
    fn test_cycle_counter() {
        let mut s = SessionState::new();
        assert_eq!(s.start_cycle(), 1);
        assert_eq!(s.start_cycle(), 2);
        assert_eq!(s.cycles(), 2);
    }

    #[test]
    fn test_taken_set_serializes_as_list() {
        let mut set = AlreadyTakenSet::default();
        set.insert("b");
        set.insert("a");
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["a","b"]"#);
    }
}
