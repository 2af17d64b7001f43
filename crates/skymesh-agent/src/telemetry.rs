//! Per-interface telemetry derivation.
//!
//! Samples are derived from the post-evaluation link set: an interface is up
//! iff any attached link is Active and physically up, and its bandwidth is
//! the best data rate among those links. The agent's telemetry loop calls
//! [`derive_sample`] once per interface per telemetry interval.

use chrono::{DateTime, Utc};

use skymesh_common::models::InterfaceMetrics;
use skymesh_core::kb::network::{LinkStatus, NetworkKb};

/// Modulation label for an SNR, mirroring the quality ladder.
pub fn modulation_for_snr(snr_db: f64) -> &'static str {
    if snr_db < 0.0 {
        "NONE"
    } else if snr_db < 5.0 {
        "BPSK"
    } else if snr_db < 10.0 {
        "QPSK"
    } else if snr_db < 20.0 {
        "16APSK"
    } else {
        "32APSK"
    }
}

/// Derived `(up, bandwidth_bps, snr_db)` for one interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceSample {
    pub up: bool,
    pub bandwidth_bps: f64,
    pub snr_db: f64,
}

/// Inspect the attached links of an interface in the NKB.
pub fn derive_sample(nkb: &NetworkKb, interface_id: &str) -> InterfaceSample {
    let mut sample = InterfaceSample {
        up: false,
        bandwidth_bps: 0.0,
        snr_db: 0.0,
    };
    for link in nkb.links_for_interface(interface_id) {
        if link.link_status != LinkStatus::Active || !link.is_up {
            continue;
        }
        sample.up = true;
        sample.bandwidth_bps = sample.bandwidth_bps.max(link.max_data_rate_mbps * 1e6);
        sample.snr_db = sample.snr_db.max(link.snr_db);
    }
    sample
}

/// Build the metrics record for a sample, integrating transmitted bytes over
/// the elapsed simulated interval. Bytes accumulate only while the interface
/// is up with positive bandwidth.
pub fn build_metrics(
    node_id: &str,
    interface_id: &str,
    sample: InterfaceSample,
    previous_bytes_tx: u64,
    delta_s: f64,
    sampled_at: DateTime<Utc>,
) -> InterfaceMetrics {
    let mut bytes_tx = previous_bytes_tx;
    if sample.up && sample.bandwidth_bps > 0.0 && delta_s > 0.0 {
        bytes_tx += (sample.bandwidth_bps * delta_s / 8.0) as u64;
    }
    InterfaceMetrics {
        node_id: node_id.to_string(),
        interface_id: interface_id.to_string(),
        up: sample.up,
        bytes_tx,
        bytes_rx: 0,
        snr_db: sample.snr_db,
        modulation: modulation_for_snr(if sample.up { sample.snr_db } else { -1.0 }).to_string(),
        sampled_at,
    }
}
