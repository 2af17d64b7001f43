//! Scenario and transceiver-catalog JSON ingestion.
//!
//! The scenario file carries interfaces, static links, and per-node positions
//! (kilometres, NKB-native). Every node mentioned gets a static platform and
//! a network node so the rest of the system never special-cases
//! scenario-born entities. The catalog file is an array of transceiver
//! models with PascalCase keys.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Vec3;
use crate::kb::network::{LinkMedium, NetworkInterface, NetworkKb, NetworkLink, TransceiverModel};
use crate::kb::physical::{MotionSource, NetworkNode, PhysicalKb, Platform};
use crate::kb::KbError;
use crate::motion::MotionModel;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Kb(#[from] KbError),
}

// ── Scenario ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    interfaces: Vec<InterfaceSpec>,
    #[serde(default)]
    links: Vec<LinkSpec>,
    #[serde(default)]
    positions: std::collections::HashMap<String, Vec3>,
}

#[derive(Debug, Deserialize)]
struct InterfaceSpec {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    medium: String,
    #[serde(default)]
    transceiver_id: String,
    parent_node_id: String,
    #[serde(default = "default_true")]
    is_operational: bool,
}

#[derive(Debug, Deserialize)]
struct LinkSpec {
    id: String,
    #[serde(default)]
    interface_a: String,
    #[serde(default)]
    interface_b: String,
    #[serde(default)]
    medium: String,
}

fn default_true() -> bool {
    true
}

/// What a scenario load produced, for startup logging.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScenarioSummary {
    pub nodes: usize,
    pub interfaces: usize,
    pub links: usize,
}

/// Ingest a scenario document into the knowledge bases and motion model.
pub fn load_scenario(
    json: &str,
    pkb: &Arc<PhysicalKb>,
    nkb: &Arc<NetworkKb>,
    motion: &Arc<MotionModel>,
) -> Result<ScenarioSummary, LoadError> {
    let file: ScenarioFile = serde_json::from_str(json)?;
    let mut summary = ScenarioSummary::default();

    // Every node named by an interface or a position entry becomes a static
    // platform + node pair. BTreeSet for deterministic creation order.
    let mut node_ids: BTreeSet<String> = BTreeSet::new();
    for spec in &file.interfaces {
        if spec.parent_node_id.is_empty() {
            return Err(KbError::ConstraintViolation(format!(
                "interface {} has no parent node",
                spec.id
            ))
            .into());
        }
        node_ids.insert(spec.parent_node_id.clone());
    }
    node_ids.extend(file.positions.keys().cloned());

    for node_id in &node_ids {
        let position_km = file.positions.get(node_id).copied().unwrap_or(Vec3::ZERO);
        let platform = Platform {
            id: node_id.clone(),
            name: node_id.clone(),
            kind: "scenario".into(),
            motion: MotionSource::Static,
            orbit: None,
            position_m: position_km.scale(1000.0),
        };
        pkb.add_platform(platform.clone())?;
        if let Err(err) = motion.register(&platform) {
            tracing::warn!(node_id = %node_id, error = %err, "motion registration failed");
        }
        pkb.add_node(NetworkNode {
            id: node_id.clone(),
            name: node_id.clone(),
            platform_id: node_id.clone(),
            routes: Vec::new(),
        })?;
        nkb.set_node_position(node_id, position_km);
        summary.nodes += 1;
    }

    for spec in file.interfaces {
        if spec.id.is_empty() {
            return Err(KbError::ConstraintViolation("interface with empty id".into()).into());
        }
        let name = if spec.name.is_empty() {
            spec.id.clone()
        } else {
            spec.name
        };
        nkb.add_interface(NetworkInterface {
            id: spec.id,
            name,
            medium: LinkMedium::from_alias(&spec.medium),
            parent_node_id: spec.parent_node_id,
            transceiver_id: spec.transceiver_id,
            is_operational: spec.is_operational,
            link_ids: Vec::new(),
        })?;
        summary.interfaces += 1;
    }

    for spec in file.links {
        if spec.id.is_empty() {
            return Err(KbError::ConstraintViolation("link with empty id".into()).into());
        }
        nkb.add_link(NetworkLink::new(
            spec.id,
            spec.interface_a,
            spec.interface_b,
            LinkMedium::from_alias(&spec.medium),
        ))?;
        summary.links += 1;
    }

    tracing::info!(
        nodes = summary.nodes,
        interfaces = summary.interfaces,
        links = summary.links,
        "scenario loaded"
    );
    Ok(summary)
}

pub fn load_scenario_file(
    path: &Path,
    pkb: &Arc<PhysicalKb>,
    nkb: &Arc<NetworkKb>,
    motion: &Arc<MotionModel>,
) -> Result<ScenarioSummary, LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_scenario(&json, pkb, nkb, motion)
}

// ── Transceiver catalog ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Band")]
    band: BandSpec,
    #[serde(rename = "MaxRangeKm", default)]
    max_range_km: Option<f64>,
    #[serde(rename = "TxPowerDBw", default)]
    tx_power_dbw: Option<f64>,
    #[serde(rename = "GainTxDBi", default)]
    gain_tx_dbi: Option<f64>,
    #[serde(rename = "GainRxDBi", default)]
    gain_rx_dbi: Option<f64>,
    #[serde(rename = "SystemNoiseFigureDB", default)]
    system_noise_figure_db: Option<f64>,
    #[serde(rename = "MaxBeams", default)]
    max_beams: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BandSpec {
    #[serde(rename = "MinGHz")]
    min_ghz: f64,
    #[serde(rename = "MaxGHz")]
    max_ghz: f64,
}

/// Ingest a transceiver catalog into the NKB.
pub fn load_catalog(json: &str, nkb: &Arc<NetworkKb>) -> Result<usize, LoadError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
    let count = entries.len();
    for entry in entries {
        if entry.id.is_empty() {
            return Err(KbError::ConstraintViolation("transceiver with empty ID".into()).into());
        }
        let name = if entry.name.is_empty() {
            entry.id.clone()
        } else {
            entry.name
        };
        nkb.add_transceiver(TransceiverModel {
            id: entry.id,
            name,
            band_min_ghz: entry.band.min_ghz,
            band_max_ghz: entry.band.max_ghz,
            max_range_km: entry.max_range_km.unwrap_or(0.0),
            tx_power_dbw: entry.tx_power_dbw,
            gain_tx_dbi: entry.gain_tx_dbi,
            gain_rx_dbi: entry.gain_rx_dbi,
            system_noise_figure_db: entry.system_noise_figure_db,
            max_beams: entry.max_beams.unwrap_or(0),
        })?;
    }
    tracing::info!(models = count, "transceiver catalog loaded");
    Ok(count)
}

pub fn load_catalog_file(path: &Path, nkb: &Arc<NetworkKb>) -> Result<usize, LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_catalog(&json, nkb)
}

// ── Scenario export ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ScenarioExport {
    interfaces: Vec<InterfaceExport>,
    links: Vec<LinkExport>,
    positions: std::collections::BTreeMap<String, Vec3>,
}

#[derive(Debug, Serialize)]
struct InterfaceExport {
    id: String,
    name: String,
    medium: LinkMedium,
    transceiver_id: String,
    parent_node_id: String,
    is_operational: bool,
}

#[derive(Debug, Serialize)]
struct LinkExport {
    id: String,
    interface_a: String,
    interface_b: String,
    medium: LinkMedium,
}

/// Serialize current NKB state back into the scenario document shape.
/// Engine-synthesised links are transient and excluded.
pub fn export_scenario(pkb: &Arc<PhysicalKb>, nkb: &Arc<NetworkKb>) -> Result<String, LoadError> {
    let mut interfaces: Vec<InterfaceExport> = nkb
        .interfaces()
        .into_iter()
        .map(|i| InterfaceExport {
            id: i.id,
            name: i.name,
            medium: i.medium,
            transceiver_id: i.transceiver_id,
            parent_node_id: i.parent_node_id,
            is_operational: i.is_operational,
        })
        .collect();
    interfaces.sort_by(|a, b| a.id.cmp(&b.id));

    let mut links: Vec<LinkExport> = nkb
        .links()
        .into_iter()
        .filter(|l| l.is_static)
        .map(|l| LinkExport {
            id: l.id,
            interface_a: l.interface_a,
            interface_b: l.interface_b,
            medium: l.medium,
        })
        .collect();
    links.sort_by(|a, b| a.id.cmp(&b.id));

    let positions = pkb
        .nodes()
        .into_iter()
        .filter_map(|node| nkb.node_position(&node.id).map(|pos| (node.id, pos)))
        .collect();

    let export = ScenarioExport {
        interfaces,
        links,
        positions,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> (Arc<PhysicalKb>, Arc<NetworkKb>, Arc<MotionModel>) {
        (
            Arc::new(PhysicalKb::new()),
            Arc::new(NetworkKb::new()),
            Arc::new(MotionModel::new()),
        )
    }

    const SCENARIO: &str = r#"{
        "interfaces": [
            {"id": "gs-if", "name": "ground ku", "medium": "Ku", "transceiver_id": "trx-ku", "parent_node_id": "gs-1"},
            {"id": "sat-if", "medium": "wireless", "transceiver_id": "trx-ku", "parent_node_id": "sat-1"},
            {"id": "fiber-if", "medium": "FIBER", "parent_node_id": "gs-1", "is_operational": false}
        ],
        "links": [
            {"id": "backhaul", "interface_a": "fiber-if", "interface_b": "", "medium": "ethernet"}
        ],
        "positions": {
            "gs-1": {"x": 6371.0, "y": 0.0, "z": 0.0},
            "sat-1": {"x": 6871.0, "y": 0.0, "z": 0.0}
        }
    }"#;

    #[test]
    fn scenario_load_populates_stores() {
        let (pkb, nkb, motion) = stores();
        let summary = load_scenario(SCENARIO, &pkb, &nkb, &motion).unwrap();
        assert_eq!(
            summary,
            ScenarioSummary {
                nodes: 2,
                interfaces: 3,
                links: 1
            }
        );

        // Node positions are NKB-native kilometres; platforms hold metres
        assert_eq!(
            nkb.node_position("gs-1"),
            Some(Vec3::new(6371.0, 0.0, 0.0))
        );
        assert_eq!(pkb.platform("sat-1").unwrap().position_m.x, 6_871_000.0);
        assert_eq!(pkb.node("gs-1").unwrap().platform_id, "gs-1");

        // Medium aliases resolved, operability flag honoured
        assert_eq!(nkb.interface("gs-if").unwrap().medium, LinkMedium::Wireless);
        let fiber = nkb.interface("fiber-if").unwrap();
        assert_eq!(fiber.medium, LinkMedium::Wired);
        assert!(!fiber.is_operational);
        assert_eq!(nkb.link("backhaul").unwrap().medium, LinkMedium::Wired);
    }

    #[test]
    fn unknown_medium_falls_back_to_wireless() {
        let (pkb, nkb, motion) = stores();
        let json = r#"{
            "interfaces": [{"id": "x", "medium": "laser", "parent_node_id": "n1"}],
            "links": [], "positions": {}
        }"#;
        load_scenario(json, &pkb, &nkb, &motion).unwrap();
        assert_eq!(nkb.interface("x").unwrap().medium, LinkMedium::Wireless);
    }

    #[test]
    fn empty_interface_id_is_rejected() {
        let (pkb, nkb, motion) = stores();
        let json = r#"{
            "interfaces": [{"id": "", "parent_node_id": "n1"}],
            "links": [], "positions": {}
        }"#;
        assert!(matches!(
            load_scenario(json, &pkb, &nkb, &motion),
            Err(LoadError::Kb(KbError::ConstraintViolation(_)))
        ));
    }

    #[test]
    fn empty_link_id_is_rejected() {
        let (pkb, nkb, motion) = stores();
        let json = r#"{
            "interfaces": [], "links": [{"id": ""}], "positions": {}
        }"#;
        assert!(matches!(
            load_scenario(json, &pkb, &nkb, &motion),
            Err(LoadError::Kb(KbError::ConstraintViolation(_)))
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let (pkb, nkb, motion) = stores();
        assert!(matches!(
            load_scenario("{not json", &pkb, &nkb, &motion),
            Err(LoadError::Json(_))
        ));
    }

    const CATALOG: &str = r#"[
        {"ID": "trx-ku", "Name": "Ku band", "Band": {"MinGHz": 10.0, "MaxGHz": 12.0},
         "MaxRangeKm": 2000.0, "TxPowerDBw": 40.0, "GainTxDBi": 30.0, "GainRxDBi": 30.0,
         "SystemNoiseFigureDB": 0.0, "MaxBeams": 2},
        {"ID": "trx-ka", "Band": {"MinGHz": 27.0, "MaxGHz": 30.0}}
    ]"#;

    #[test]
    fn catalog_load_keeps_unset_distinguishable() {
        let (_pkb, nkb, _motion) = stores();
        assert_eq!(load_catalog(CATALOG, &nkb).unwrap(), 2);

        let ku = nkb.transceiver("trx-ku").unwrap();
        // An explicit 0 dB noise figure is a perfect receiver, not "unset"
        assert_eq!(ku.system_noise_figure_db, Some(0.0));
        assert_eq!(ku.max_range_km, 2000.0);
        assert_eq!(ku.max_beams, 2);

        let ka = nkb.transceiver("trx-ka").unwrap();
        assert_eq!(ka.system_noise_figure_db, None);
        assert_eq!(ka.max_range_km, 0.0);
        assert_eq!(ka.tx_power_dbw, None);
        assert_eq!(ka.name, "trx-ka");
    }

    #[test]
    fn export_round_trips_static_state() {
        let (pkb, nkb, motion) = stores();
        load_scenario(SCENARIO, &pkb, &nkb, &motion).unwrap();

        let exported = export_scenario(&pkb, &nkb).unwrap();
        let (pkb2, nkb2, motion2) = stores();
        let summary = load_scenario(&exported, &pkb2, &nkb2, &motion2).unwrap();

        assert_eq!(
            summary,
            ScenarioSummary {
                nodes: 2,
                interfaces: 3,
                links: 1
            }
        );
        assert_eq!(
            nkb2.node_position("gs-1"),
            Some(Vec3::new(6371.0, 0.0, 0.0))
        );
        let fiber = nkb2.interface("fiber-if").unwrap();
        assert_eq!(fiber.medium, LinkMedium::Wired);
        assert!(!fiber.is_operational);
    }

    #[test]
    fn export_excludes_dynamic_links() {
        let (pkb, nkb, motion) = stores();
        load_scenario(SCENARIO, &pkb, &nkb, &motion).unwrap();
        let mut dynamic = NetworkLink::new("dyn-gs-if-sat-if", "gs-if", "sat-if", LinkMedium::Wireless);
        dynamic.is_static = false;
        nkb.add_link(dynamic).unwrap();

        let exported = export_scenario(&pkb, &nkb).unwrap();
        assert!(!exported.contains("dyn-gs-if-sat-if"));
        assert!(exported.contains("backhaul"));
    }

    #[test]
    fn catalog_empty_id_is_rejected() {
        let (_pkb, nkb, _motion) = stores();
        let json = r#"[{"ID": "", "Band": {"MinGHz": 1.0, "MaxGHz": 2.0}}]"#;
        assert!(matches!(
            load_catalog(json, &nkb),
            Err(LoadError::Kb(KbError::ConstraintViolation(_)))
        ));
    }
}
