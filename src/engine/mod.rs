//! Core engine: the fetch → filter → take → sleep loop.

pub mod poller;
pub mod session;
pub mod shutdown;
pub mod startup;
pub mod taker;

pub use poller::{CycleDecision, CycleReport, LoopExit, PollingLoop};
pub use session::{AlreadyTakenSet, SessionCounters, SessionState};
pub use shutdown::ShutdownSignal;
pub use startup::{run_startup_checks, StartupContext};
pub use taker::{AttemptOutcome, AttemptState, TakeAttemptController};
