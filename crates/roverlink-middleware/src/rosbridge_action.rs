//! ROS 2 action client over a `rosbridge_server` WebSocket.
//!
//! [`RosbridgeActionClient`] drives the rover's `Mission` action server using
//! the rosbridge v2 JSON protocol:
//!
//! * **Readiness** – calls the rosapi service `/rosapi/action_servers` until
//!   the target action is advertised, retrying on a fixed poll interval.
//!   The rover's rosapi node must provide that service; a rosbridge_suite
//!   without it never reports ready. Failed probes are logged at `warn`
//!   (first failure, then every [`PROBE_WARN_EVERY`] in a row).
//!
//! * **Submission** – sends a `send_action_goal` frame whose `id` is the goal
//!   UUID and whose `args` is the serialised [`GoalRequest`].
//!
//! * **Result** – reads frames until the matching `action_result` arrives.
//!   The first `action_feedback` frame marks the goal accepted; a server
//!   that sends no feedback has its acceptance logged when the result
//!   arrives. A `status` frame at level `error` means the server refused it.
//!
//! The WebSocket is opened lazily and dropped on any transport error; the
//! next readiness wait reconnects.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use roverlink_types::{DispatchError, GoalHandle, GoalOutcome, GoalRequest, GoalStatus};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::ActionClient;

/// rosapi service listing the currently advertised action servers.
pub const ACTION_SERVERS_SERVICE: &str = "/rosapi/action_servers";

/// Default delay between readiness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive failed probes between two `warn` lines.
pub const PROBE_WARN_EVERY: u32 = 30;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`ActionClient`] backed by a `rosbridge_server` WebSocket.
pub struct RosbridgeActionClient {
    /// `ws://host:port` of the rover's rosbridge endpoint.
    url: String,
    /// Fully qualified action name, e.g. `/mission`.
    action_name: String,
    /// ROS interface type, e.g. `nav_autonomy_interface/action/Mission`.
    action_type: String,
    poll_interval: Duration,
    socket: Option<WsStream>,
}

impl RosbridgeActionClient {
    /// Create a client for `action_name` of type `action_type` reachable
    /// through the rosbridge server at `url`.
    pub fn new(
        url: impl Into<String>,
        action_name: impl Into<String>,
        action_type: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            action_name: action_name.into(),
            action_type: action_type.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            socket: None,
        }
    }

    /// Override the readiness poll interval (builder-style).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn connect(&mut self) -> Result<&mut WsStream, DispatchError> {
        let ws = match self.socket.take() {
            Some(ws) => ws,
            None => {
                let (ws, _) = connect_async(self.url.as_str()).await.map_err(|e| {
                    DispatchError::ServerUnavailable(format!("rosbridge at {}: {e}", self.url))
                })?;
                info!(url = %self.url, "connected to rosbridge");
                ws
            }
        };
        Ok(self.socket.insert(ws))
    }

    async fn send_frame(&mut self, frame: Value) -> Result<(), DispatchError> {
        let ws = self.connect().await?;
        let sent = ws.send(Message::Text(frame.to_string().into())).await;
        if let Err(e) = sent {
            self.socket = None;
            return Err(DispatchError::Disconnected(e.to_string()));
        }
        Ok(())
    }

    /// Read the next JSON text frame, skipping control and non-JSON frames.
    async fn next_frame(&mut self) -> Result<Value, DispatchError> {
        loop {
            let msg = match self.socket.as_mut() {
                Some(ws) => ws.next().await,
                None => {
                    return Err(DispatchError::Disconnected(
                        "no rosbridge connection".to_string(),
                    ));
                }
            };
            match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(text.as_str()) {
                    Ok(frame) => return Ok(frame),
                    Err(e) => debug!(error = %e, "skipping non-JSON rosbridge frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.socket = None;
                    return Err(DispatchError::Disconnected(
                        "rosbridge closed the connection".to_string(),
                    ));
                }
                Some(Err(e)) => {
                    self.socket = None;
                    return Err(DispatchError::Disconnected(e.to_string()));
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn query_action_servers(&mut self) -> Result<Vec<String>, DispatchError> {
        let id = format!("roverlink_action_servers_{}", Uuid::new_v4());
        self.send_frame(build_action_servers_call(&id)).await?;
        loop {
            let frame = self.next_frame().await?;
            if frame_op(&frame) != Some("service_response") || frame_id(&frame) != Some(id.as_str()) {
                debug!(op = ?frame_op(&frame), "ignoring rosbridge frame while probing");
                continue;
            }
            if frame.get("result").and_then(Value::as_bool) == Some(false) {
                return Err(DispatchError::ServerUnavailable(format!(
                    "{ACTION_SERVERS_SERVICE} call failed: {}",
                    frame.get("values").unwrap_or(&Value::Null)
                )));
            }
            return Ok(parse_action_servers(&frame));
        }
    }
}

#[async_trait]
impl ActionClient for RosbridgeActionClient {
    fn action_name(&self) -> &str {
        &self.action_name
    }

    async fn wait_until_ready(&mut self) -> Result<(), DispatchError> {
        info!(action = %self.action_name, url = %self.url, "waiting for action server");
        let mut failures = 0u32;
        loop {
            match self.query_action_servers().await {
                Ok(servers) if servers.iter().any(|s| same_action(s, &self.action_name)) => {
                    info!(action = %self.action_name, "action server available");
                    return Ok(());
                }
                Ok(_) => {
                    failures = 0;
                    debug!(action = %self.action_name, "action server not advertised yet");
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if probe_failure_is_reported(failures) {
                        warn!(error = %e, failures, "action server probe failed; retrying");
                    } else {
                        debug!(error = %e, failures, "action server probe failed; retrying");
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn submit(&mut self, goal: GoalRequest) -> Result<GoalHandle, DispatchError> {
        let handle = GoalHandle::new();
        let frame = build_send_goal(
            &handle.goal_id.to_string(),
            &self.action_name,
            &self.action_type,
            &goal,
        )?;
        self.send_frame(frame).await?;
        debug!(goal_id = %handle.goal_id, "send_action_goal sent");
        Ok(handle)
    }

    async fn await_result(&mut self, handle: GoalHandle) -> Result<GoalOutcome, DispatchError> {
        let id = handle.goal_id.to_string();
        let mut accepted = false;
        loop {
            let frame = self.next_frame().await?;
            if frame_id(&frame) != Some(id.as_str()) {
                continue;
            }
            match frame_op(&frame) {
                Some("action_feedback") if !accepted => {
                    accepted = true;
                    info!(goal_id = %handle.goal_id, "goal accepted");
                }
                Some("action_result") => {
                    let outcome = parse_action_result(&handle, &frame)?;
                    if !accepted {
                        info!(goal_id = %handle.goal_id, "goal accepted");
                    }
                    return Ok(outcome);
                }
                Some("status") if frame.get("level").and_then(Value::as_str) == Some("error") => {
                    return Err(DispatchError::Rejected {
                        goal_id: handle.goal_id,
                        reason: frame
                            .get("msg")
                            .and_then(Value::as_str)
                            .unwrap_or("no reason given")
                            .to_string(),
                    });
                }
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// rosbridge v2 frames
// ---------------------------------------------------------------------------

pub(crate) fn build_action_servers_call(id: &str) -> Value {
    json!({
        "op": "call_service",
        "id": id,
        "service": ACTION_SERVERS_SERVICE,
        "args": {}
    })
}

pub(crate) fn build_send_goal(
    id: &str,
    action_name: &str,
    action_type: &str,
    goal: &GoalRequest,
) -> Result<Value, DispatchError> {
    let args = serde_json::to_value(goal).map_err(|e| DispatchError::Submission(e.to_string()))?;
    Ok(json!({
        "op": "send_action_goal",
        "id": id,
        "action": action_name,
        "action_type": action_type,
        "args": args,
        "feedback": true
    }))
}

pub(crate) fn parse_action_servers(frame: &Value) -> Vec<String> {
    frame
        .get("values")
        .and_then(|v| v.get("action_servers"))
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_action_result(
    handle: &GoalHandle,
    frame: &Value,
) -> Result<GoalOutcome, DispatchError> {
    let values = frame.get("values").cloned().unwrap_or(Value::Null);
    let succeeded = frame.get("result").and_then(Value::as_bool).unwrap_or(true);
    let status = frame.get("status").and_then(Value::as_i64).map(GoalStatus::from_code);

    match (succeeded, status) {
        (false, None) => Err(DispatchError::Rejected {
            goal_id: handle.goal_id,
            reason: values.to_string(),
        }),
        (_, status) => Ok(GoalOutcome::completed(
            handle,
            status.unwrap_or(GoalStatus::Succeeded),
            values,
        )),
    }
}

fn frame_op(frame: &Value) -> Option<&str> {
    frame.get("op").and_then(Value::as_str)
}

fn frame_id(frame: &Value) -> Option<&str> {
    frame.get("id").and_then(Value::as_str)
}

fn probe_failure_is_reported(failures: u32) -> bool {
    failures == 1 || failures % PROBE_WARN_EVERY == 0
}

fn same_action(advertised: &str, wanted: &str) -> bool {
    advertised.trim_start_matches('/') == wanted.trim_start_matches('/')
}
