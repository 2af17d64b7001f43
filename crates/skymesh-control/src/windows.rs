//! Contact-window recompute.
//!
//! The planning front-end: project the current post-evaluation link set onto
//! contact windows over the planning horizon. The projection algorithm is an
//! input to the real planner; this front-end only ever reads NKB state.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use skymesh_common::ids;
use skymesh_core::kb::network::{LinkMedium, NetworkKb};

/// A time interval during which two nodes have a viable wireless link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactWindow {
    pub id: String,
    pub node_a: String,
    pub node_b: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Map every physically-up wireless link onto a window spanning the horizon.
/// One window per node pair regardless of how many links join the pair.
pub fn recompute_contact_windows(
    nkb: &NetworkKb,
    now: DateTime<Utc>,
    horizon: Duration,
) -> Vec<ContactWindow> {
    let end = now + TimeDelta::from_std(horizon).unwrap_or_default();

    let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
    for link in nkb.links() {
        if link.medium != LinkMedium::Wireless || !link.is_up {
            continue;
        }
        let Ok(iface_a) = nkb.interface(&link.interface_a) else {
            continue;
        };
        let Ok(iface_b) = nkb.interface(&link.interface_b) else {
            continue;
        };
        let mut pair = (
            iface_a.parent_node_id.clone(),
            iface_b.parent_node_id.clone(),
        );
        if pair.0 > pair.1 {
            std::mem::swap(&mut pair.0, &mut pair.1);
        }
        pairs.insert(pair);
    }

    let windows: Vec<ContactWindow> = pairs
        .into_iter()
        .map(|(node_a, node_b)| ContactWindow {
            id: ids::window_id(),
            node_a,
            node_b,
            start: now,
            end,
        })
        .collect();
    tracing::debug!(windows = windows.len(), horizon_s = horizon.as_secs(), "contact windows recomputed");
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skymesh_core::kb::network::{LinkStatus, NetworkInterface, NetworkLink};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn iface(id: &str, node: &str) -> NetworkInterface {
        NetworkInterface {
            id: id.into(),
            name: id.into(),
            medium: LinkMedium::Wireless,
            parent_node_id: node.into(),
            transceiver_id: "trx".into(),
            is_operational: true,
            link_ids: Vec::new(),
        }
    }

    fn up_link(id: &str, a: &str, b: &str) -> NetworkLink {
        let mut link = NetworkLink::new(id, a, b, LinkMedium::Wireless);
        link.link_status = LinkStatus::Active;
        link.is_up = true;
        link
    }

    #[test]
    fn windows_cover_up_pairs_only() {
        let nkb = Arc::new(NetworkKb::new());
        for (iface_id, node) in [("a1", "n1"), ("b1", "n2"), ("c1", "n3")] {
            nkb.add_interface(iface(iface_id, node)).unwrap();
        }
        nkb.add_link(up_link("l-up", "a1", "b1")).unwrap();
        nkb.add_link(NetworkLink::new("l-down", "a1", "c1", LinkMedium::Wireless))
            .unwrap();

        let windows = recompute_contact_windows(&nkb, now(), Duration::from_secs(600));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].node_a, "n1");
        assert_eq!(windows[0].node_b, "n2");
        assert_eq!(windows[0].start, now());
        assert_eq!(windows[0].end, now() + TimeDelta::seconds(600));
    }

    #[test]
    fn parallel_links_collapse_to_one_window() {
        let nkb = Arc::new(NetworkKb::new());
        nkb.add_interface(iface("a1", "n1")).unwrap();
        nkb.add_interface(iface("a2", "n1")).unwrap();
        nkb.add_interface(iface("b1", "n2")).unwrap();
        nkb.add_link(up_link("l1", "a1", "b1")).unwrap();
        nkb.add_link(up_link("l2", "a2", "b1")).unwrap();

        let windows = recompute_contact_windows(&nkb, now(), Duration::from_secs(60));
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn recompute_does_not_mutate_the_nkb() {
        let nkb = Arc::new(NetworkKb::new());
        nkb.add_interface(iface("a1", "n1")).unwrap();
        nkb.add_interface(iface("b1", "n2")).unwrap();
        nkb.add_link(up_link("l1", "a1", "b1")).unwrap();

        let before: Vec<_> = nkb.links();
        recompute_contact_windows(&nkb, now(), Duration::from_secs(60));
        let after: Vec<_> = nkb.links();

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].link_status, after[0].link_status);
        assert_eq!(before[0].is_up, after[0].is_up);
        nkb.verify_invariants().unwrap();
    }

    #[test]
    fn wired_links_are_ignored() {
        let nkb = Arc::new(NetworkKb::new());
        nkb.add_interface(iface("a1", "n1")).unwrap();
        nkb.add_interface(iface("b1", "n2")).unwrap();
        let mut wired = NetworkLink::new("w1", "a1", "b1", LinkMedium::Wired);
        wired.link_status = LinkStatus::Active;
        wired.is_up = true;
        nkb.add_link(wired).unwrap();

        assert!(recompute_contact_windows(&nkb, now(), Duration::from_secs(60)).is_empty());
    }
}
