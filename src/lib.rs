//! # Meltr Library
//!
//! Internal library for the meltr binary: a daemon that decides, once per
//! interval, whether each configured relay group (heated outdoor mats and
//! similar unattended equipment) should be energized, combining clock/solar
//! schedules, weather-conditional gating, runtime safety tracking, and
//! override layers — and keeps deciding correctly while the weather source
//! is degraded or gone.
//!
//! ## Architecture
//!
//! - **Entry Point**: the `Meltr` builder wires resources together and runs
//!   the daemon lifecycle
//! - **Decision Loop**: `engine` evaluates every group per cycle and owns
//!   all device I/O, including commands submitted from other contexts
//! - **Weather**: `weather` wraps the provider port with caching, backoff,
//!   and the ONLINE/DEGRADED/OFFLINE resilience state machine
//! - **Schedules**: `schedule` models triggers, priorities, and weather
//!   gates; `geo` resolves solar-relative triggers for the fixed location
//! - **State**: `state` persists runtime bookkeeping and override layers as
//!   atomic JSON documents
//! - **Ports**: `device`, `notify`, and `weather::provider` define the seams
//!   for the out-of-scope protocol, notification, and HTTP clients
//! - **Infrastructure**: lock file, signal handling, logging, time source

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod common;

// Public API modules
pub mod args;
pub mod config;
pub mod device;
pub mod engine;
pub mod geo;
pub mod io;
pub mod notify;
pub mod schedule;
pub mod state;
pub mod time_source;
pub mod weather;

// Internal modules
mod meltr;

// Re-export for binary and embedders
pub use engine::commands::{ControlCommand, ControlHandle, ControlResponse};
pub use meltr::{Meltr, run_preview, run_stop};
