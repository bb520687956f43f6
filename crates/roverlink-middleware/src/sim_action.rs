//! In-process simulated action server.
//!
//! [`SimActionClient`] lets the bridge run on a bench without a rover or a
//! rosbridge server. It is always ready, records every submitted goal in a
//! shared [`SubmissionLog`] and completes goals with
//! [`GoalStatus::Succeeded`].
//!
//! Two knobs shape its behaviour:
//!
//! * [`SimActionClient::rejecting`] – every goal is refused.
//! * [`SimActionClient::with_completion_gate`] – each result waits for one
//!   permit on a [`Semaphore`], so a caller can hold goals "in flight".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use roverlink_types::{DispatchError, GoalHandle, GoalOutcome, GoalRequest, GoalStatus};
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::info;
use uuid::Uuid;

use crate::action::ActionClient;

/// Shared, append-only record of goals submitted to a [`SimActionClient`].
///
/// Clone it cheaply – all clones see the same goals.
#[derive(Debug, Clone, Default)]
pub struct SubmissionLog(Arc<Mutex<Vec<GoalRequest>>>);

impl SubmissionLog {
    /// Snapshot of all goals submitted so far, in submission order.
    pub fn goals(&self) -> Vec<GoalRequest> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, goal: GoalRequest) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(goal);
    }
}

/// [`ActionClient`] that simulates a cooperative action server.
pub struct SimActionClient {
    action_name: String,
    reject_goals: bool,
    completion_gate: Option<Arc<Semaphore>>,
    log: SubmissionLog,
    pending: HashMap<Uuid, usize>,
}

impl SimActionClient {
    /// Create a simulated server for `action_name` that accepts every goal.
    pub fn new(action_name: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            reject_goals: false,
            completion_gate: None,
            log: SubmissionLog::default(),
            pending: HashMap::new(),
        }
    }

    /// Refuse every goal (builder-style).
    pub fn rejecting(mut self) -> Self {
        self.reject_goals = true;
        self
    }

    /// Hold each result until a permit is available on `gate`
    /// (builder-style).
    pub fn with_completion_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.completion_gate = Some(gate);
        self
    }

    /// Handle on the record of submitted goals.
    pub fn submissions(&self) -> SubmissionLog {
        self.log.clone()
    }
}

#[async_trait]
impl ActionClient for SimActionClient {
    fn action_name(&self) -> &str {
        &self.action_name
    }

    async fn wait_until_ready(&mut self) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn submit(&mut self, goal: GoalRequest) -> Result<GoalHandle, DispatchError> {
        let handle = GoalHandle::new();
        info!(
            goal_id = %handle.goal_id,
            waypoints = goal.nav_waypoints().len(),
            "[sim] goal received"
        );
        self.pending.insert(handle.goal_id, goal.nav_waypoints().len());
        self.log.push(goal);
        Ok(handle)
    }

    async fn await_result(&mut self, handle: GoalHandle) -> Result<GoalOutcome, DispatchError> {
        let waypoints = self.pending.remove(&handle.goal_id).ok_or_else(|| {
            DispatchError::Protocol(format!("unknown goal {}", handle.goal_id))
        })?;

        if self.reject_goals {
            return Err(DispatchError::Rejected {
                goal_id: handle.goal_id,
                reason: "simulated rejection".to_string(),
            });
        }

        info!(goal_id = %handle.goal_id, "goal accepted");

        if let Some(gate) = &self.completion_gate {
            gate.acquire()
                .await
                .map_err(|_| DispatchError::Disconnected("completion gate closed".to_string()))?
                .forget();
        }

        Ok(GoalOutcome::completed(
            &handle,
            GoalStatus::Succeeded,
            json!({ "success": true, "waypoints_visited": waypoints }),
        ))
    }
}
