//! Status API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>` and
//! written by the polling loop once per cycle.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::poller::{CycleDecision, CycleReport};
use crate::engine::session::SessionState;

/// Cycles kept in memory for `/api/cycles`.
const MAX_CYCLE_LOG: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub agent_name: String,
    pub dry_run: bool,
    pub max_take_count: u32,
    pub started_at: DateTime<Utc>,
    pub session: RwLock<SessionSnapshot>,
    pub cycle_log: RwLock<Vec<CycleReport>>,
}

/// Copy of the loop's session taken after each cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub cycles: u64,
    pub offers_taken: u32,
    pub taken_offer_ids: Vec<String>,
    pub last_decision: Option<CycleDecision>,
}

impl DashboardState {
    pub fn new(agent_name: &str, dry_run: bool, max_take_count: u32) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            dry_run,
            max_take_count,
            started_at: Utc::now(),
            session: RwLock::new(SessionSnapshot::default()),
            cycle_log: RwLock::new(Vec::new()),
        }
    }

    pub async fn record_cycle(&self, report: &CycleReport, session: &SessionState) {
        {
            let mut snapshot = self.session.write().await;
            snapshot.cycles = session.cycles();
            snapshot.offers_taken = session.offers_taken();
            snapshot.taken_offer_ids = session.already_taken().iter().map(String::from).collect();
            snapshot.last_decision = Some(report.decision.clone());
        }

        let mut log = self.cycle_log.write().await;
        log.push(report.clone());
        if log.len() > MAX_CYCLE_LOG {
            let excess = log.len() - MAX_CYCLE_LOG;
            log.drain(..excess);
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub dry_run: bool,
    pub cycles: u64,
    pub offers_taken: u32,
    /// 0 means unlimited.
    pub max_take_count: u32,
    pub last_decision: Option<CycleDecision>,
    pub uptime_secs: i64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = state.session.read().await;
    Json(StatusResponse {
        agent: state.agent_name.clone(),
        dry_run: state.dry_run,
        cycles: session.cycles,
        offers_taken: session.offers_taken,
        max_take_count: state.max_take_count,
        last_decision: session.last_decision.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleReport>> {
    Json(state.cycle_log.read().await.clone())
}

/// GET /api/taken
pub async fn get_taken(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.session.read().await.taken_offer_ids.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeReceipt;
    use rust_decimal_macros::dec;

    fn report(cycle: u64, decision: CycleDecision) -> CycleReport {
        CycleReport {
            cycle,
            timestamp: Utc::now(),
            candidates: 2,
            avg_price: Some(dec!(1)),
            target_price: Some(dec!(0.98)),
            decision,
            filter: None,
        }
    }

    #[tokio::test]
    async fn test_get_status_initial() {
        let state = Arc::new(DashboardState::new("taker-001", true, 3));
        let Json(resp) = get_status(State(state)).await;
        assert_eq!(resp.agent, "taker-001");
        assert!(resp.dry_run);
        assert_eq!(resp.offers_taken, 0);
        assert!(resp.last_decision.is_none());
    }

    #[tokio::test]
    async fn test_record_cycle_updates_snapshot() {
        let state = Arc::new(DashboardState::new("t", false, 0));
        let mut session = SessionState::new();
        session.start_cycle();
        session.record_success(TradeReceipt {
            trade_id: "t1".into(),
            offer_id: "A".into(),
            price: dec!(0.97),
            amount: dec!(5),
            dry_run: false,
            timestamp: Utc::now(),
        });
        let decision = CycleDecision::Taken {
            offer_id: "A".into(),
            trade_id: "t1".into(),
            offers_taken: 1,
            dry_run: false,
        };
        state.record_cycle(&report(1, decision.clone()), &session).await;

        let Json(status) = get_status(State(state.clone())).await;
        assert_eq!(status.cycles, 1);
        assert_eq!(status.offers_taken, 1);
        assert_eq!(status.last_decision, Some(decision));

        let Json(taken) = get_taken(State(state)).await;
        assert_eq!(taken, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_cycle_log_is_bounded() {
        let state = Arc::new(DashboardState::new("t", false, 0));
        let session = SessionState::new();
        for i in 0..(MAX_CYCLE_LOG as u64 + 5) {
            state.record_cycle(&report(i, CycleDecision::NoOffers), &session).await;
        }
        let Json(cycles) = get_cycles(State(state)).await;
        assert_eq!(cycles.len(), MAX_CYCLE_LOG);
        assert_eq!(cycles[0].cycle, 5);
    }
}
