//! Scheduled-action records.
//!
//! A [`ScheduledAction`] is the agent-internal form of a controller
//! `CreateEntry`: tagged by kind, due at a simulated instant, carrying the
//! controller metadata needed to answer back. Validation rejects malformed
//! actions before they reach the pending table.

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use thiserror::Error;

use skymesh_common::protocol::{ActionKind, ActionPayload, CreateEntry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("empty entry id")]
    EmptyEntryId,

    #[error("zero execution time")]
    ZeroTimestamp,

    #[error("kind {kind} does not match payload {payload}")]
    KindMismatch {
        kind: &'static str,
        payload: &'static str,
    },

    #[error("invalid destination prefix: {0}")]
    InvalidCidr(String),
}

#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub entry_id: String,
    pub agent_id: String,
    pub kind: ActionKind,
    pub when: DateTime<Utc>,
    pub request_id: String,
    pub seq_no: u64,
    pub token: String,
    pub payload: ActionPayload,
}

impl ScheduledAction {
    /// Translate a controller `CreateEntry` into the internal record.
    pub fn from_create(agent_id: &str, msg: CreateEntry) -> Self {
        ScheduledAction {
            entry_id: msg.entry_id,
            agent_id: agent_id.to_string(),
            kind: msg.kind,
            when: msg.when,
            request_id: msg.request_id,
            seq_no: msg.seq_no,
            token: msg.token,
            payload: msg.payload,
        }
    }

    /// Structural validation: identity, timing, kind/payload agreement, and
    /// parseable route prefixes.
    pub fn validate(&self) -> Result<(), ActionError> {
        if self.entry_id.is_empty() {
            return Err(ActionError::EmptyEntryId);
        }
        if self.when == DateTime::<Utc>::UNIX_EPOCH {
            return Err(ActionError::ZeroTimestamp);
        }

        let payload_name = match &self.payload {
            ActionPayload::Beam(_) => "beam",
            ActionPayload::Route(_) => "route",
            ActionPayload::SrPolicy(_) => "sr_policy",
        };
        let expected = match self.kind {
            ActionKind::UpdateBeam | ActionKind::DeleteBeam => "beam",
            ActionKind::SetRoute | ActionKind::DeleteRoute => "route",
            ActionKind::SetSrPolicy | ActionKind::DeleteSrPolicy => "sr_policy",
        };
        if payload_name != expected {
            return Err(ActionError::KindMismatch {
                kind: expected,
                payload: payload_name,
            });
        }

        if let ActionPayload::Route(route) = &self.payload {
            route
                .destination_cidr
                .parse::<IpNet>()
                .map_err(|_| ActionError::InvalidCidr(route.destination_cidr.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skymesh_common::protocol::{BeamTask, RouteTask, SrPolicyTask};

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 5).unwrap()
    }

    fn route_action() -> ScheduledAction {
        ScheduledAction {
            entry_id: "entry-1".into(),
            agent_id: "node-1".into(),
            kind: ActionKind::SetRoute,
            when: when(),
            request_id: "req_1".into(),
            seq_no: 1,
            token: "tok".into(),
            payload: ActionPayload::Route(RouteTask {
                destination_cidr: "10.0.0.0/24".into(),
                next_hop_node_id: Some("node-2".into()),
                out_interface_id: "if-1".into(),
                path: None,
                cost: 1,
                valid_until: None,
            }),
        }
    }

    #[test]
    fn valid_route_action_passes() {
        route_action().validate().unwrap();
    }

    #[test]
    fn empty_entry_id_rejected() {
        let mut action = route_action();
        action.entry_id.clear();
        assert_eq!(action.validate(), Err(ActionError::EmptyEntryId));
    }

    #[test]
    fn zero_timestamp_rejected() {
        let mut action = route_action();
        action.when = DateTime::<Utc>::UNIX_EPOCH;
        assert_eq!(action.validate(), Err(ActionError::ZeroTimestamp));
    }

    #[test]
    fn kind_payload_mismatch_rejected() {
        let mut action = route_action();
        action.kind = ActionKind::UpdateBeam;
        assert!(matches!(
            action.validate(),
            Err(ActionError::KindMismatch { .. })
        ));
    }

    #[test]
    fn bad_cidr_rejected() {
        let mut action = route_action();
        if let ActionPayload::Route(route) = &mut action.payload {
            route.destination_cidr = "not-a-prefix".into();
        }
        assert!(matches!(action.validate(), Err(ActionError::InvalidCidr(_))));
    }

    #[test]
    fn ipv6_prefix_accepted() {
        let mut action = route_action();
        if let ActionPayload::Route(route) = &mut action.payload {
            route.destination_cidr = "fd00::/64".into();
        }
        action.validate().unwrap();
    }

    #[test]
    fn beam_and_policy_kinds_validate() {
        let mut action = route_action();
        action.kind = ActionKind::DeleteBeam;
        action.payload = ActionPayload::Beam(BeamTask {
            interface_id: "if-1".into(),
            target_node_id: None,
        });
        action.validate().unwrap();

        action.kind = ActionKind::SetSrPolicy;
        action.payload = ActionPayload::SrPolicy(SrPolicyTask {
            policy_id: "pol-1".into(),
            segments: vec!["node-2".into()],
            preference: 10,
        });
        action.validate().unwrap();
    }
}
