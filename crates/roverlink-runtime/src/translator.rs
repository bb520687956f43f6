//! [`Translator`] – mission decoding and goal dispatch.
//!
//! Turns one connection's bytes into at most one goal on the action server:
//!
//! 1. **Decode** – UTF-8, then a JSON object, then a [`MissionRequest`].
//! 2. **Validate** – a mission without waypoints is dropped with a warning.
//! 3. **Build** – a [`GoalRequest`] with one [`NavWaypoint`] per wire
//!    waypoint, in wire order.
//! 4. **Dispatch** – wait for the action server, submit, then wait for
//!    acceptance and completion. Both waits are unbounded unless
//!    [`DispatchTimeouts`] says otherwise.
//!
//! Nothing here fails the caller: every path ends in a logged
//! [`ConnectionOutcome`].

use std::future::Future;
use std::time::Duration;

use roverlink_middleware::ActionClient;
use roverlink_types::{
    BridgeError, DispatchError, GoalOutcome, GoalRequest, MissionRequest, NavWaypoint,
};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Optional bounds on the two open-ended waits of a dispatch.
///
/// `None` waits forever, which is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTimeouts {
    /// Limit on waiting for the action server to become reachable.
    pub server_wait: Option<Duration>,
    /// Limit on waiting for acceptance plus completion of a goal.
    pub result: Option<Duration>,
}

/// Terminal state of one handled connection.
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// The payload could not be framed (e.g. it was too large).
    FramingFailed(String),
    /// The payload was not UTF-8 JSON describing a mission.
    DecodeFailed(String),
    /// The mission carried no waypoints and was not forwarded.
    NoWaypoints,
    /// The goal was accepted and reached a terminal state.
    Completed(GoalOutcome),
    /// The action server refused the goal.
    Rejected { goal_id: Uuid, reason: String },
    /// The goal could not be handed over or its result never arrived.
    DispatchFailed(DispatchError),
}

impl ConnectionOutcome {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionOutcome::FramingFailed(_) => "framing_failed",
            ConnectionOutcome::DecodeFailed(_) => "decode_failed",
            ConnectionOutcome::NoWaypoints => "no_waypoints",
            ConnectionOutcome::Completed(_) => "completed",
            ConnectionOutcome::Rejected { .. } => "rejected",
            ConnectionOutcome::DispatchFailed(_) => "dispatch_failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Decode / validate / build
// ---------------------------------------------------------------------------

/// Decode raw connection bytes into a [`MissionRequest`].
///
/// # Errors
///
/// Returns [`BridgeError::Decode`] if the bytes are not UTF-8, not JSON, not
/// a JSON object, or carry a field of the wrong type.
pub fn decode_mission(bytes: &[u8]) -> Result<MissionRequest, BridgeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| BridgeError::Decode(format!("payload is not UTF-8: {e}")))?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BridgeError::Decode(format!("payload is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(BridgeError::Decode(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))
}

/// Reject missions that would send the rover nowhere.
pub fn validate_mission(mission: &MissionRequest) -> Result<(), BridgeError> {
    if mission.nav_waypoints.is_empty() {
        return Err(BridgeError::NoWaypoints);
    }
    Ok(())
}

/// Build the action goal for `mission`, preserving waypoint order.
pub fn build_goal(mission: &MissionRequest) -> GoalRequest {
    let waypoints = mission
        .nav_waypoints
        .iter()
        .map(|wp| NavWaypoint {
            latitude: wp.latitude,
            longitude: wp.longitude,
        })
        .collect();
    GoalRequest::new(mission.search_object, mission.search_pattern, waypoints)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

/// Mission translator and dispatcher. Owns the bridge's [`ActionClient`].
pub struct Translator<C> {
    client: C,
    timeouts: DispatchTimeouts,
}

impl<C: ActionClient> Translator<C> {
    pub fn new(client: C, timeouts: DispatchTimeouts) -> Self {
        Self { client, timeouts }
    }

    /// Translate one connection's payload and dispatch the resulting goal.
    pub async fn handle(&mut self, bytes: &[u8]) -> ConnectionOutcome {
        let mission = match decode_mission(bytes) {
            Ok(mission) => mission,
            Err(e) => {
                error!(
                    error = %e,
                    raw = %String::from_utf8_lossy(bytes),
                    "failed to parse mission"
                );
                return ConnectionOutcome::DecodeFailed(e.to_string());
            }
        };
        info!(
            search_object = mission.search_object,
            search_pattern = mission.search_pattern,
            waypoints = mission.nav_waypoints.len(),
            "received mission"
        );

        if validate_mission(&mission).is_err() {
            warn!("received mission with no waypoints; not sending to rover");
            return ConnectionOutcome::NoWaypoints;
        }

        let goal = build_goal(&mission);
        info!(action = %self.client.action_name(), "sending mission goal to rover");

        match self.dispatch(goal).await {
            Ok(outcome) => {
                info!(
                    goal_id = %outcome.goal_id,
                    status = %outcome.status,
                    result = %outcome.result,
                    latency_ms = outcome.latency().num_milliseconds(),
                    "mission goal finished"
                );
                ConnectionOutcome::Completed(outcome)
            }
            Err(DispatchError::Rejected { goal_id, reason }) => {
                info!(goal_id = %goal_id, reason = %reason, "mission goal rejected");
                ConnectionOutcome::Rejected { goal_id, reason }
            }
            Err(e) => {
                error!(error = %e, "mission dispatch failed");
                ConnectionOutcome::DispatchFailed(e)
            }
        }
    }

    /// Wait for the action server, submit `goal`, and wait for its outcome.
    pub async fn dispatch(&mut self, goal: GoalRequest) -> Result<GoalOutcome, DispatchError> {
        let DispatchTimeouts { server_wait, result } = self.timeouts;

        bounded(
            server_wait,
            self.client.wait_until_ready(),
            DispatchError::ServerWaitTimedOut,
        )
        .await?;

        let handle = self.client.submit(goal).await?;
        info!(goal_id = %handle.goal_id, "mission goal submitted");

        bounded(
            result,
            self.client.await_result(handle),
            DispatchError::ResultTimedOut,
        )
        .await
    }
}

async fn bounded<T, F>(
    limit: Option<Duration>,
    fut: F,
    on_timeout: fn(Duration) -> DispatchError,
) -> Result<T, DispatchError>
where
    F: Future<Output = Result<T, DispatchError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| on_timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log::LogCapture;
    use async_trait::async_trait;
    use roverlink_middleware::SimActionClient;
    use roverlink_types::{GoalHandle, GoalStatus};
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    /// Action server that never comes up.
    struct UnreachableClient;

    #[async_trait]
    impl ActionClient for UnreachableClient {
        fn action_name(&self) -> &str {
            "/mission"
        }

        async fn wait_until_ready(&mut self) -> Result<(), DispatchError> {
            std::future::pending().await
        }

        async fn submit(&mut self, _goal: GoalRequest) -> Result<GoalHandle, DispatchError> {
            panic!("submit must not be called before the server is ready");
        }

        async fn await_result(&mut self, _handle: GoalHandle) -> Result<GoalOutcome, DispatchError> {
            panic!("await_result must not be called before the server is ready");
        }
    }

    fn sim_translator() -> (Translator<SimActionClient>, roverlink_middleware::SubmissionLog) {
        let client = SimActionClient::new("/mission");
        let log = client.submissions();
        (Translator::new(client, DispatchTimeouts::default()), log)
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let result = decode_mission(&[0xff, 0xfe, b'{']);
        assert!(matches!(result, Err(BridgeError::Decode(ref m)) if m.contains("UTF-8")));
    }

    #[test]
    fn decode_rejects_non_object_json() {
        let result = decode_mission(b"[1, 2, 3]");
        assert!(matches!(result, Err(BridgeError::Decode(ref m)) if m.contains("an array")));
    }

    #[test]
    fn decode_rejects_wrong_field_types() {
        let result = decode_mission(br#"{"nav_waypoints":[{"latitude":"north"}]}"#);
        assert!(matches!(result, Err(BridgeError::Decode(_))));
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let mission = decode_mission(br#"{"operator":"gs-1","nav_waypoints":[{}]}"#).unwrap();
        assert_eq!(mission.nav_waypoints.len(), 1);
    }

    #[test]
    fn build_goal_defaults_missing_fields() {
        let mission =
            decode_mission(br#"{"nav_waypoints":[{"latitude":5.5},{"longitude":-7.25},{}]}"#)
                .unwrap();
        let goal = build_goal(&mission);
        assert_eq!(goal.search_object(), 0);
        assert_eq!(goal.search_pattern(), 0);
        assert_eq!(
            goal.nav_waypoints(),
            &[
                NavWaypoint { latitude: 5.5, longitude: 0.0 },
                NavWaypoint { latitude: 0.0, longitude: -7.25 },
                NavWaypoint { latitude: 0.0, longitude: 0.0 },
            ]
        );
    }

    #[test]
    fn build_goal_preserves_waypoint_order_and_count() {
        let mission = decode_mission(
            br#"{"search_object":4,"search_pattern":2,"nav_waypoints":[
                {"latitude":3.0,"longitude":30.0},
                {"latitude":1.0,"longitude":10.0},
                {"latitude":2.0,"longitude":20.0}]}"#,
        )
        .unwrap();
        let goal = build_goal(&mission);
        assert_eq!(goal.search_object(), 4);
        assert_eq!(goal.search_pattern(), 2);
        let lats: Vec<f64> = goal.nav_waypoints().iter().map(|w| w.latitude).collect();
        assert_eq!(lats, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn validate_rejects_empty_waypoints() {
        let mission = decode_mission(br#"{"search_object":1}"#).unwrap();
        assert!(matches!(validate_mission(&mission), Err(BridgeError::NoWaypoints)));
    }

    #[tokio::test]
    async fn single_waypoint_mission_is_dispatched() {
        let (mut translator, log) = sim_translator();
        let outcome = translator
            .handle(br#"{"nav_waypoints":[{"latitude":1.0,"longitude":2.0}]}"#)
            .await;

        assert!(matches!(outcome, ConnectionOutcome::Completed(ref o) if o.status == GoalStatus::Succeeded));
        let goals = log.goals();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].search_object(), 0);
        assert_eq!(goals[0].search_pattern(), 0);
        assert_eq!(
            goals[0].nav_waypoints(),
            &[NavWaypoint { latitude: 1.0, longitude: 2.0 }]
        );
    }

    #[tokio::test]
    async fn empty_waypoints_are_not_dispatched() {
        let (mut translator, log) = sim_translator();
        let outcome = translator.handle(br#"{"nav_waypoints":[]}"#).await;
        assert!(matches!(outcome, ConnectionOutcome::NoWaypoints));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn empty_waypoints_log_a_warning() {
        let (logs, _guard) = LogCapture::install();
        let (mut translator, _log) = sim_translator();
        translator.handle(br#"{"search_object":1,"nav_waypoints":[]}"#).await;

        assert_eq!(logs.lines("WARN", "no waypoints").len(), 1);
        assert!(logs.lines("INFO", "sending mission goal").is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_not_dispatched() {
        let (mut translator, log) = sim_translator();
        let outcome = translator.handle(b"not-json").await;
        assert!(matches!(outcome, ConnectionOutcome::DecodeFailed(_)));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn decode_failure_logs_error_with_raw_payload() {
        let (logs, _guard) = LogCapture::install();
        let (mut translator, _log) = sim_translator();
        translator.handle(b"{\"nav_waypoints\": oops").await;

        let errors = logs.lines("ERROR", "failed to parse mission");
        assert_eq!(errors.len(), 1, "logs: {errors:?}");
        assert!(errors[0].contains("oops"), "raw payload missing: {}", errors[0]);
    }

    #[tokio::test]
    async fn finished_goal_logs_outcome_and_latency() {
        let (logs, _guard) = LogCapture::install();
        let (mut translator, _log) = sim_translator();
        let outcome = translator.handle(br#"{"nav_waypoints":[{}]}"#).await;

        let ConnectionOutcome::Completed(done) = outcome else {
            panic!("expected Completed, got: {outcome:?}");
        };
        assert!(done.latency().num_milliseconds() >= 0);
        let finished = logs.lines("INFO", "mission goal finished");
        assert_eq!(finished.len(), 1, "logs: {finished:?}");
        assert!(finished[0].contains(&done.goal_id.to_string()));
        assert!(finished[0].contains("latency_ms="));
    }

    #[tokio::test]
    async fn rejected_goal_is_reported() {
        let client = SimActionClient::new("/mission").rejecting();
        let mut translator = Translator::new(client, DispatchTimeouts::default());
        let outcome = translator.handle(br#"{"nav_waypoints":[{}]}"#).await;
        assert!(matches!(outcome, ConnectionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn bounded_server_wait_times_out() {
        let timeouts = DispatchTimeouts {
            server_wait: Some(Duration::from_millis(20)),
            result: None,
        };
        let mut translator = Translator::new(UnreachableClient, timeouts);
        let outcome = translator.handle(br#"{"nav_waypoints":[{}]}"#).await;
        assert!(
            matches!(
                outcome,
                ConnectionOutcome::DispatchFailed(DispatchError::ServerWaitTimedOut(_))
            ),
            "expected ServerWaitTimedOut, got: {outcome:?}"
        );
    }

    #[tokio::test]
    async fn unbounded_server_wait_keeps_waiting() {
        let mut translator = Translator::new(UnreachableClient, DispatchTimeouts::default());
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            translator.handle(br#"{"nav_waypoints":[{}]}"#),
        )
        .await;
        assert!(waited.is_err(), "dispatch must block while the server is unreachable");
    }

    #[tokio::test]
    async fn bounded_result_wait_times_out() {
        let gate = Arc::new(Semaphore::new(0));
        let client = SimActionClient::new("/mission").with_completion_gate(gate);
        let log = client.submissions();
        let timeouts = DispatchTimeouts {
            server_wait: None,
            result: Some(Duration::from_millis(20)),
        };
        let mut translator = Translator::new(client, timeouts);
        let outcome = translator.handle(br#"{"nav_waypoints":[{}]}"#).await;

        assert!(matches!(
            outcome,
            ConnectionOutcome::DispatchFailed(DispatchError::ResultTimedOut(_))
        ));
        assert_eq!(log.len(), 1, "the goal was submitted before the wait expired");
    }
}
