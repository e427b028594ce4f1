//! Application layer containing the payment orchestration logic.
//!
//! `PaymentOrchestrator` owns the session state machine. Its progress is
//! driven by a single background task per session (see `polling`), and it can
//! be re-attached to an interrupted flow through `resume`.

pub mod orchestrator;
mod polling;
pub mod recovery;
