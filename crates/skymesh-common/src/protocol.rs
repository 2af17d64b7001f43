//! Southbound protocol messages between the controller and node agents.
//!
//! These are the message shapes the external gRPC layer mirrors; the
//! simulation core consumes them directly as in-process values. All messages
//! are JSON-encodable with a tagged envelope form (dotted namespace) so a
//! wire adapter can frame them without translation.
//!
//! Controller → agent: `schedule.create_entry`, `schedule.delete_entry`,
//! `schedule.finalize`, `schedule.reset`.
//! Agent → controller: `agent.hello`, `agent.response`, `agent.telemetry`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{InterfaceMetrics, ResponseStatus};

// ── Controller → Agent ──────────────────────────────────────────────

/// All schedule-manipulation messages an agent accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ScheduleRequest {
    /// Persist a future action and schedule its execution.
    #[serde(rename = "schedule.create_entry")]
    CreateEntry(CreateEntry),

    /// Remove a pending action before it executes.
    #[serde(rename = "schedule.delete_entry")]
    DeleteEntry(DeleteEntry),

    /// Prune every pending action at or before a cutoff time.
    #[serde(rename = "schedule.finalize")]
    Finalize(Finalize),

    /// Clear token, sequence cursor, pending table, and SR policy state.
    #[serde(rename = "schedule.reset")]
    Reset,
}

impl ScheduleRequest {
    /// The `(token, seq_no)` discipline fields, when the variant carries them.
    pub fn credentials(&self) -> Option<(&str, u64)> {
        match self {
            ScheduleRequest::CreateEntry(c) => Some((&c.token, c.seq_no)),
            ScheduleRequest::DeleteEntry(d) => Some((&d.token, d.seq_no)),
            ScheduleRequest::Finalize(f) => Some((&f.token, f.seq_no)),
            ScheduleRequest::Reset => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntry {
    pub request_id: String,
    pub token: String,
    pub seq_no: u64,
    pub entry_id: String,
    /// Simulated time at which the action executes.
    pub when: DateTime<Utc>,
    pub kind: ActionKind,
    pub payload: ActionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEntry {
    pub token: String,
    pub seq_no: u64,
    pub entry_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finalize {
    pub token: String,
    pub seq_no: u64,
    /// Pending entries with `when <= up_to` are pruned.
    pub up_to: DateTime<Utc>,
}

// ── Action payloads ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    UpdateBeam,
    DeleteBeam,
    SetRoute,
    DeleteRoute,
    SetSrPolicy,
    DeleteSrPolicy,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::UpdateBeam => write!(f, "update_beam"),
            ActionKind::DeleteBeam => write!(f, "delete_beam"),
            ActionKind::SetRoute => write!(f, "set_route"),
            ActionKind::DeleteRoute => write!(f, "delete_route"),
            ActionKind::SetSrPolicy => write!(f, "set_sr_policy"),
            ActionKind::DeleteSrPolicy => write!(f, "delete_sr_policy"),
        }
    }
}

/// Exactly one of these accompanies a [`CreateEntry`], matching its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ActionPayload {
    Beam(BeamTask),
    Route(RouteTask),
    SrPolicy(SrPolicyTask),
}

/// Beam pointing task — identifies the interface to steer or release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamTask {
    pub interface_id: String,
    /// Peer node the beam is pointed at, when known to the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_id: Option<String>,
}

/// Route installation/removal task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTask {
    pub destination_cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_node_id: Option<String>,
    pub out_interface_id: String,
    /// Explicit node path, when the planner computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default)]
    pub cost: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Segment-routing policy task — agent-local, no forwarding effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrPolicyTask {
    pub policy_id: String,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub preference: u32,
}

// ── Agent → Controller ──────────────────────────────────────────────

/// All message types an agent emits toward the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AgentEvent {
    /// Sent once when the agent's message loop starts.
    #[serde(rename = "agent.hello")]
    Hello(Hello),

    /// Outcome of an executed scheduled action.
    #[serde(rename = "agent.response")]
    Response(ActionResponse),

    /// Periodic per-interface telemetry push.
    #[serde(rename = "agent.telemetry")]
    Telemetry(TelemetryPush),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub node_id: String,
    pub request_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Telemetry export toward the controller's metrics sink.
///
/// `node_id` travels as `x-node-id` out-of-band metadata on the wire; it is
/// duplicated here so in-process consumers need no side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPush {
    pub node_id: String,
    pub metrics: Vec<InterfaceMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_create() -> ScheduleRequest {
        ScheduleRequest::CreateEntry(CreateEntry {
            request_id: "req_1".into(),
            token: "tok-a".into(),
            seq_no: 7,
            entry_id: "entry-1".into(),
            when: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            kind: ActionKind::SetRoute,
            payload: ActionPayload::Route(RouteTask {
                destination_cidr: "10.0.0.0/24".into(),
                next_hop_node_id: Some("node-2".into()),
                out_interface_id: "if-1".into(),
                path: None,
                cost: 10,
                valid_until: None,
            }),
        })
    }

    #[test]
    fn create_entry_tagged_serialization() {
        let json = serde_json::to_string(&sample_create()).unwrap();
        assert!(json.contains("schedule.create_entry"));
        assert!(json.contains("set_route"));

        let back: ScheduleRequest = serde_json::from_str(&json).unwrap();
        match back {
            ScheduleRequest::CreateEntry(c) => {
                assert_eq!(c.entry_id, "entry-1");
                assert_eq!(c.seq_no, 7);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn credentials_per_variant() {
        let sample = sample_create();
        let (token, seq) = sample.credentials().unwrap();
        assert_eq!(token, "tok-a");
        assert_eq!(seq, 7);
        assert!(ScheduleRequest::Reset.credentials().is_none());
    }

    #[test]
    fn agent_event_tagged_serialization() {
        let event = AgentEvent::Response(ActionResponse {
            node_id: "node-1".into(),
            request_id: "req_9".into(),
            status: ResponseStatus::Ok,
            detail: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("agent.response"));
        assert!(json.contains("\"ok\""));

        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        match back {
            AgentEvent::Response(r) => assert_eq!(r.request_id, "req_9"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn payload_variant_wire_tags() {
        let beam = ActionPayload::Beam(BeamTask {
            interface_id: "if-1".into(),
            target_node_id: None,
        });
        let json = serde_json::to_string(&beam).unwrap();
        assert!(json.contains("\"task\":\"beam\""));

        let policy = ActionPayload::SrPolicy(SrPolicyTask {
            policy_id: "pol-1".into(),
            segments: vec!["node-2".into(), "node-3".into()],
            preference: 100,
        });
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"task\":\"sr_policy\""));
    }
}
