//! Data models shared between the simulation core, the node agents, and the
//! controller shim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Interface metrics ───────────────────────────────────────────────

/// Last-known telemetry sample for one `(node, interface)` pair.
///
/// Produced by the agent telemetry loop from post-evaluation link state and
/// held in the telemetry store; `bytes_tx` is cumulative across samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceMetrics {
    pub node_id: String,
    pub interface_id: String,
    pub up: bool,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    pub snr_db: f64,
    /// Modulation label derived from link SNR (e.g. "16APSK").
    pub modulation: String,
    /// Simulated-clock timestamp of the sample.
    pub sampled_at: DateTime<Utc>,
}

// ── Link counts ─────────────────────────────────────────────────────

/// Per-pass link population summary published after connectivity evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCounts {
    pub total: usize,
    pub active: usize,
    pub up: usize,
    pub impaired: usize,
    /// Engine-synthesised wireless links (`dyn-` prefixed ids).
    pub dynamic: usize,
}

// ── Response status ─────────────────────────────────────────────────

/// Outcome of a scheduled-action execution, carried back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    InvalidArgument,
    NotFound,
    Internal,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseStatus::Ok => write!(f, "ok"),
            ResponseStatus::InvalidArgument => write!(f, "invalid_argument"),
            ResponseStatus::NotFound => write!(f, "not_found"),
            ResponseStatus::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_status_wire_form() {
        let json = serde_json::to_string(&ResponseStatus::InvalidArgument).unwrap();
        assert_eq!(json, "\"invalid_argument\"");
    }

    #[test]
    fn interface_metrics_round_trip() {
        let m = InterfaceMetrics {
            node_id: "node-1".into(),
            interface_id: "if-1".into(),
            up: true,
            bytes_tx: 125_000,
            bytes_rx: 0,
            snr_db: 14.2,
            modulation: "16APSK".into(),
            sampled_at: Utc::now(),
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: InterfaceMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.interface_id, "if-1");
        assert_eq!(back.bytes_tx, 125_000);
        assert!(back.up);
    }
}
