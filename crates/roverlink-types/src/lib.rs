use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Mission command sent by the ground station over the TCP link.
///
/// Every field is optional on the wire; missing fields take their default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct MissionRequest {
    /// Search target class code.
    #[serde(default)]
    pub search_object: i32,
    /// Search sweep pattern code.
    #[serde(default)]
    pub search_pattern: i32,
    /// Ordered navigation targets. `null` is treated as an empty list.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nav_waypoints: Vec<Waypoint>,
}

/// A single wire waypoint in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Waypoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Waypoint>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Waypoint>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Goal sent to the rover's `Mission` action server.
///
/// Mirrors [`MissionRequest`] field for field in the action's native layout.
/// Fields are private so a goal cannot be altered once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRequest {
    search_object: i32,
    search_pattern: i32,
    nav_waypoints: Vec<NavWaypoint>,
}

impl GoalRequest {
    pub fn new(search_object: i32, search_pattern: i32, nav_waypoints: Vec<NavWaypoint>) -> Self {
        Self {
            search_object,
            search_pattern,
            nav_waypoints,
        }
    }

    pub fn search_object(&self) -> i32 {
        self.search_object
    }

    pub fn search_pattern(&self) -> i32 {
        self.search_pattern
    }

    pub fn nav_waypoints(&self) -> &[NavWaypoint] {
        &self.nav_waypoints
    }
}

/// `Mission.Goal.NavWaypoints` entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavWaypoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Handle for a goal that has been submitted but not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalHandle {
    pub goal_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

impl GoalHandle {
    pub fn new() -> Self {
        Self {
            goal_id: Uuid::new_v4(),
            submitted_at: Utc::now(),
        }
    }
}

impl Default for GoalHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal status reported by the action server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Succeeded,
    Canceled,
    Aborted,
    Unknown(i64),
}

impl GoalStatus {
    /// Map an `action_msgs/msg/GoalStatus` code onto a terminal status.
    pub fn from_code(code: i64) -> Self {
        match code {
            4 => GoalStatus::Succeeded,
            5 => GoalStatus::Canceled,
            6 => GoalStatus::Aborted,
            other => GoalStatus::Unknown(other),
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalStatus::Succeeded => write!(f, "succeeded"),
            GoalStatus::Canceled => write!(f, "canceled"),
            GoalStatus::Aborted => write!(f, "aborted"),
            GoalStatus::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Final result of an accepted goal. The bridge logs `result` verbatim and
/// never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalOutcome {
    pub goal_id: Uuid,
    pub status: GoalStatus,
    pub result: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl GoalOutcome {
    /// Outcome of the goal behind `handle`, completed now.
    pub fn completed(handle: &GoalHandle, status: GoalStatus, result: serde_json::Value) -> Self {
        Self {
            goal_id: handle.goal_id,
            status,
            result,
            submitted_at: handle.submitted_at,
            completed_at: Utc::now(),
        }
    }

    /// Time from submission to the terminal state.
    pub fn latency(&self) -> chrono::TimeDelta {
        self.completed_at - self.submitted_at
    }
}

/// Failures while handing a goal to the action server.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("action server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("timed out after {0:?} waiting for the action server")]
    ServerWaitTimedOut(Duration),

    #[error("goal {goal_id} rejected: {reason}")]
    Rejected { goal_id: Uuid, reason: String },

    #[error("goal submission failed: {0}")]
    Submission(String),

    #[error("timed out after {0:?} waiting for the goal result")]
    ResultTimedOut(Duration),

    #[error("disconnected from the action server: {0}")]
    Disconnected(String),

    #[error("action protocol error: {0}")]
    Protocol(String),
}

/// Bridge-wide error taxonomy. Only [`BridgeError::Bind`] is fatal.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("cannot bind mission listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mission decode error: {0}")]
    Decode(String),

    #[error("mission has no waypoints")]
    NoWaypoints,

    #[error("framing error: {0}")]
    Framing(String),

    #[error("config error: {0}")]
    Config(String),
}
