//! Domain layer: value objects, the session state machine and the ports the
//! orchestrator drives.

pub mod credits;
pub mod event;
pub mod handle;
pub mod ports;
pub mod session;
pub mod status;
