//! Resumable plan execution.
//!
//! A plan producer turns a task into a structured understanding and an ordered
//! plan of tool-backed steps. The engine executes the plan step by step,
//! persisting every outcome, and a re-run of the same run id skips the steps
//! that already succeeded.
//!
//! - **[`core`]**: Pure data model and rules (validation, checkpoint, step
//!   state machine, run context). No I/O.
//! - **[`io`]**: Settings and the file-backed run store.
//! - **[`tools`]**: The `Tool` trait, registry and built-in tools.
//!
//! [`engine`] and [`planner`] tie these together for the CLI and HTTP surfaces.

pub mod core;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
