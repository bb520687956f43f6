//! `roverlink-runtime` – the mission bridge itself.
//!
//! Accepts mission commands from the ground station over TCP and turns each
//! one into a goal on the rover's action server.
//!
//! # Modules
//!
//! - [`listener`] – [`Bridge`][listener::Bridge]: owns the listening socket
//!   and the action client, and serves connections strictly one at a time.
//! - [`translator`] – [`Translator`][translator::Translator]: decodes and
//!   validates a payload, builds the [`GoalRequest`][roverlink_types::GoalRequest]
//!   and blocks on the action server until the goal resolves.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod listener;
pub mod telemetry;
pub mod translator;

#[cfg(test)]
mod test_log;

pub use listener::{Bridge, BridgeConfig, DEFAULT_PORT};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
pub use translator::{
    ConnectionOutcome, DispatchTimeouts, Translator, build_goal, decode_mission, validate_mission,
};
