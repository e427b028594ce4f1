//! Adapters implementing the domain ports.

pub mod clock;
pub mod file_handle;
pub mod in_memory;
pub mod simulated;
