//! The action-client seam.
//!
//! The bridge never talks to a rover directly. It hands every goal to an
//! [`ActionClient`], which speaks whatever protocol the action server needs.
//!
//! - [`RosbridgeActionClient`][crate::rosbridge_action::RosbridgeActionClient]
//!   – a ROS 2 action server reached through `rosbridge_server`.
//! - [`SimActionClient`][crate::sim_action::SimActionClient] – an in-process
//!   stand-in that accepts and completes goals.

use async_trait::async_trait;
use roverlink_types::{DispatchError, GoalHandle, GoalOutcome, GoalRequest};

/// Client side of an asynchronous goal protocol.
///
/// # Contract
///
/// * `wait_until_ready` – resolves once the remote action server is
///   reachable. Implementations may wait forever; callers bound the wait.
///
/// * `submit` – sends the goal and returns a handle without waiting for
///   acceptance.
///
/// * `await_result` – resolves when the goal is rejected, or when an accepted
///   goal reaches a terminal state.
///
/// Methods take `&mut self`: a client is owned by the single bridge worker
/// and never shared.
#[async_trait]
pub trait ActionClient: Send {
    /// Name of the action this client targets (for logging).
    fn action_name(&self) -> &str;

    /// Block until the action server is reachable.
    async fn wait_until_ready(&mut self) -> Result<(), DispatchError>;

    /// Submit `goal` and return a handle for the pending goal.
    async fn submit(&mut self, goal: GoalRequest) -> Result<GoalHandle, DispatchError>;

    /// Wait for acceptance and completion of the goal behind `handle`.
    async fn await_result(&mut self, handle: GoalHandle) -> Result<GoalOutcome, DispatchError>;
}

#[async_trait]
impl<T: ActionClient + ?Sized> ActionClient for Box<T> {
    fn action_name(&self) -> &str {
        (**self).action_name()
    }

    async fn wait_until_ready(&mut self) -> Result<(), DispatchError> {
        (**self).wait_until_ready().await
    }

    async fn submit(&mut self, goal: GoalRequest) -> Result<GoalHandle, DispatchError> {
        (**self).submit(goal).await
    }

    async fn await_result(&mut self, handle: GoalHandle) -> Result<GoalOutcome, DispatchError> {
        (**self).await_result(handle).await
    }
}
