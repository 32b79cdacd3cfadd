//! I/O helpers: settings and durable run state.

pub mod config;
pub mod run_state;
