//! Output adapters for surfacing orchestrator activity to callers.

pub mod json;
