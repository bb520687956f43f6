//! `roverlink-middleware` – protocol plumbing between the ground station and
//! the rover.
//!
//! Moves bytes and goals around without caring what the mission means.
//!
//! # Modules
//!
//! - [`framing`] – named framing strategies ([`Framing::EndOfStream`],
//!   [`Framing::Newline`]) and the chunked payload reader used by the mission
//!   listener.
//! - [`action`] – the [`ActionClient`] trait: wait for the action server,
//!   submit a goal, await its result.
//! - [`rosbridge_action`] – [`RosbridgeActionClient`], an [`ActionClient`]
//!   that drives a ROS 2 action server through a `rosbridge_server`
//!   WebSocket.
//! - [`sim_action`] – [`SimActionClient`], an in-process action server for
//!   bench runs without a rover.

pub mod action;
pub mod framing;
pub mod rosbridge_action;
pub mod sim_action;

#[cfg(test)]
mod test_log;

pub use action::ActionClient;
pub use framing::{Frame, FrameEnd, Framing, read_frame};
pub use rosbridge_action::RosbridgeActionClient;
pub use sim_action::{SimActionClient, SubmissionLog};
