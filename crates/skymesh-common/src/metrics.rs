//! Prometheus metrics rendering for the simulator scrape endpoint.
//!
//! Renders the telemetry store contents and the latest link counts in
//! Prometheus text exposition format, suitable for scraping by Prometheus
//! or compatible collectors.

use std::fmt::Write;

use crate::models::{InterfaceMetrics, LinkCounts};

/// Render interface metrics and link counts as Prometheus text exposition.
pub fn render_prometheus(interfaces: &[InterfaceMetrics], counts: &LinkCounts) -> String {
    let mut out = String::with_capacity(2048);

    // ── Per-interface gauges ────────────────────────────────────

    writeln!(
        out,
        "# HELP skymesh_interface_up Interface has at least one active up link."
    )
    .unwrap();
    writeln!(out, "# TYPE skymesh_interface_up gauge").unwrap();
    for m in interfaces {
        writeln!(
            out,
            "skymesh_interface_up{{node=\"{}\",interface=\"{}\"}} {}",
            m.node_id,
            m.interface_id,
            if m.up { 1 } else { 0 }
        )
        .unwrap();
    }

    writeln!(
        out,
        "# HELP skymesh_interface_snr_db Best attached-link SNR in decibels."
    )
    .unwrap();
    writeln!(out, "# TYPE skymesh_interface_snr_db gauge").unwrap();
    for m in interfaces {
        writeln!(
            out,
            "skymesh_interface_snr_db{{node=\"{}\",interface=\"{}\"}} {:.3}",
            m.node_id, m.interface_id, m.snr_db
        )
        .unwrap();
    }

    writeln!(
        out,
        "# HELP skymesh_interface_bytes_tx_total Cumulative bytes transmitted."
    )
    .unwrap();
    writeln!(out, "# TYPE skymesh_interface_bytes_tx_total counter").unwrap();
    for m in interfaces {
        writeln!(
            out,
            "skymesh_interface_bytes_tx_total{{node=\"{}\",interface=\"{}\"}} {}",
            m.node_id, m.interface_id, m.bytes_tx
        )
        .unwrap();
    }

    // ── Link population ─────────────────────────────────────────

    writeln!(out, "# HELP skymesh_links_total Links known to the NKB.").unwrap();
    writeln!(out, "# TYPE skymesh_links_total gauge").unwrap();
    writeln!(out, "skymesh_links_total {}", counts.total).unwrap();

    writeln!(out, "# HELP skymesh_links_active Links with Active status.").unwrap();
    writeln!(out, "# TYPE skymesh_links_active gauge").unwrap();
    writeln!(out, "skymesh_links_active {}", counts.active).unwrap();

    writeln!(out, "# HELP skymesh_links_up Links physically viable this tick.").unwrap();
    writeln!(out, "# TYPE skymesh_links_up gauge").unwrap();
    writeln!(out, "skymesh_links_up {}", counts.up).unwrap();

    writeln!(
        out,
        "# HELP skymesh_links_impaired Links under administrative impairment."
    )
    .unwrap();
    writeln!(out, "# TYPE skymesh_links_impaired gauge").unwrap();
    writeln!(out, "skymesh_links_impaired {}", counts.impaired).unwrap();

    writeln!(
        out,
        "# HELP skymesh_links_dynamic Engine-synthesised wireless links."
    )
    .unwrap();
    writeln!(out, "# TYPE skymesh_links_dynamic gauge").unwrap();
    writeln!(out, "skymesh_links_dynamic {}", counts.dynamic).unwrap();

    out
}
