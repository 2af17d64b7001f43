//! Last-known telemetry per `(node, interface)`.
//!
//! Written by agent telemetry loops, read by the metrics endpoint and any
//! northbound consumer. Encapsulates its own locking; cross-component
//! consistency comes from main-loop ordering, not from this store.

use dashmap::DashMap;

use skymesh_common::models::InterfaceMetrics;

#[derive(Default)]
pub struct TelemetryStore {
    samples: DashMap<(String, String), InterfaceMetrics>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the sample for its `(node, interface)` key.
    pub fn record(&self, metrics: InterfaceMetrics) {
        self.samples.insert(
            (metrics.node_id.clone(), metrics.interface_id.clone()),
            metrics,
        );
    }

    pub fn get(&self, node_id: &str, interface_id: &str) -> Option<InterfaceMetrics> {
        self.samples
            .get(&(node_id.to_string(), interface_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn for_node(&self, node_id: &str) -> Vec<InterfaceMetrics> {
        self.samples
            .iter()
            .filter(|entry| entry.key().0 == node_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Every sample, ordered by key for stable rendering.
    pub fn all(&self) -> Vec<InterfaceMetrics> {
        let mut out: Vec<InterfaceMetrics> = self
            .samples
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| {
            (a.node_id.as_str(), a.interface_id.as_str())
                .cmp(&(b.node_id.as_str(), b.interface_id.as_str()))
        });
        out
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(node: &str, iface: &str, bytes: u64) -> InterfaceMetrics {
        InterfaceMetrics {
            node_id: node.into(),
            interface_id: iface.into(),
            up: true,
            bytes_tx: bytes,
            bytes_rx: 0,
            snr_db: 12.0,
            modulation: "16APSK".into(),
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn record_overwrites_per_key() {
        let store = TelemetryStore::new();
        store.record(sample("n1", "if-1", 100));
        store.record(sample("n1", "if-1", 250));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("n1", "if-1").unwrap().bytes_tx, 250);
    }

    #[test]
    fn for_node_filters() {
        let store = TelemetryStore::new();
        store.record(sample("n1", "if-1", 1));
        store.record(sample("n1", "if-2", 2));
        store.record(sample("n2", "if-3", 3));
        assert_eq!(store.for_node("n1").len(), 2);
        assert_eq!(store.for_node("n2").len(), 1);
        assert!(store.for_node("ghost").is_empty());
    }

    #[test]
    fn all_is_sorted() {
        let store = TelemetryStore::new();
        store.record(sample("n2", "if-b", 1));
        store.record(sample("n1", "if-a", 2));
        store.record(sample("n1", "if-b", 3));
        let all = store.all();
        let keys: Vec<(String, String)> = all
            .into_iter()
            .map(|m| (m.node_id, m.interface_id))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("n1".to_string(), "if-a".to_string()),
                ("n1".to_string(), "if-b".to_string()),
                ("n2".to_string(), "if-b".to_string()),
            ]
        );
    }
}
