//! Network knowledge base — interfaces, transceivers, links, node positions.
//!
//! All coordinates here are kilometres. A single read/write lock guards the
//! store; public methods are the locking boundary, and the adjacency-index
//! helpers on [`NkbInner`] require the write lock to already be held (the
//! connectivity engine runs its whole rebuild inside one write guard).

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::KbError;
use crate::geometry::Vec3;

/// Prefix of engine-synthesised wireless links.
pub const DYNAMIC_LINK_PREFIX: &str = "dyn-";

// ── Enums ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMedium {
    Wired,
    Wireless,
}

impl LinkMedium {
    /// Case-insensitive alias mapping used by the scenario loader. Unknown
    /// media fall back to wireless.
    pub fn from_alias(raw: &str) -> LinkMedium {
        match raw.to_ascii_lowercase().as_str() {
            "wired" | "fiber" | "optical" | "ethernet" => LinkMedium::Wired,
            "wireless" | "radio" | "rf" | "ku" | "ka" | "" => LinkMedium::Wireless,
            other => {
                tracing::debug!(medium = %other, "unknown medium, assuming wireless");
                LinkMedium::Wireless
            }
        }
    }
}

/// Control-plane intent for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Unknown,
    Potential,
    Active,
    Impaired,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Unknown => write!(f, "unknown"),
            LinkStatus::Potential => write!(f, "potential"),
            LinkStatus::Active => write!(f, "active"),
            LinkStatus::Impaired => write!(f, "impaired"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkQuality {
    Down,
    Poor,
    Fair,
    Good,
    Excellent,
}

// ── Entities ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub name: String,
    pub medium: LinkMedium,
    pub parent_node_id: String,
    /// Wireless only; wired interfaces ignore this field.
    #[serde(default)]
    pub transceiver_id: String,
    pub is_operational: bool,
    /// Adjacency list, maintained by the link mutators.
    #[serde(default)]
    pub link_ids: Vec<String>,
}

/// Catalog entry describing an RF front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransceiverModel {
    pub id: String,
    pub name: String,
    pub band_min_ghz: f64,
    pub band_max_ghz: f64,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_range_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_power_dbw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_tx_dbi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_rx_dbi: Option<f64>,
    /// Distinguishable-unset: `Some(0.0)` is a perfect receiver, `None`
    /// means "not specified".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_noise_figure_db: Option<f64>,
    /// Descriptive only; concurrency is not enforced.
    #[serde(default)]
    pub max_beams: u32,
}

impl TransceiverModel {
    /// Band-overlap predicate: two transceivers can talk iff their frequency
    /// bands intersect.
    pub fn is_compatible(a: &TransceiverModel, b: &TransceiverModel) -> bool {
        !(a.band_max_ghz < b.band_min_ghz || a.band_min_ghz > b.band_max_ghz)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLink {
    pub id: String,
    /// Either endpoint may be the empty string (unattached); a non-empty
    /// endpoint must resolve to an existing interface.
    pub interface_a: String,
    pub interface_b: String,
    pub medium: LinkMedium,

    /// Control-plane status word.
    pub link_status: LinkStatus,
    /// Physical viability, derived each evaluation pass.
    pub is_up: bool,
    /// Administrative override.
    pub is_impaired: bool,
    /// Latched when a controller moves Active→Potential; cleared only when
    /// the evaluator itself auto-activates.
    pub was_explicitly_deactivated: bool,
    /// Captured on the non-impaired→impaired edge, consumed on the reverse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_before_impairment: Option<LinkStatus>,
    /// Scenario-declared rather than engine-synthesised.
    pub is_static: bool,

    pub latency_ms: f64,
    pub max_data_rate_mbps: f64,
    pub quality: LinkQuality,
    pub snr_db: f64,
}

impl NetworkLink {
    pub fn new(
        id: impl Into<String>,
        interface_a: impl Into<String>,
        interface_b: impl Into<String>,
        medium: LinkMedium,
    ) -> Self {
        NetworkLink {
            id: id.into(),
            interface_a: interface_a.into(),
            interface_b: interface_b.into(),
            medium,
            link_status: LinkStatus::Unknown,
            is_up: false,
            is_impaired: false,
            was_explicitly_deactivated: false,
            status_before_impairment: None,
            is_static: true,
            latency_ms: 0.0,
            max_data_rate_mbps: 0.0,
            quality: LinkQuality::Down,
            snr_db: 0.0,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.id.starts_with(DYNAMIC_LINK_PREFIX)
    }

    /// Endpoints as an array, empty strings filtered by callers when needed.
    pub fn endpoints(&self) -> [&str; 2] {
        [&self.interface_a, &self.interface_b]
    }
}

/// Deterministic symmetric id for an engine-synthesised wireless link. The
/// pair order does not matter; this equality is what lets link state persist
/// across rebuilds of the dynamic link set.
pub fn dynamic_link_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{DYNAMIC_LINK_PREFIX}{lo}-{hi}")
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct NkbInner {
    pub(crate) interfaces: HashMap<String, NetworkInterface>,
    pub(crate) links: HashMap<String, NetworkLink>,
    /// interface id → ids of links with that interface as an endpoint.
    pub(crate) links_by_interface: HashMap<String, HashSet<String>>,
    pub(crate) transceivers: HashMap<String, TransceiverModel>,
    /// node id → ECEF position in kilometres.
    pub(crate) node_positions: HashMap<String, Vec3>,
}

impl NkbInner {
    /// Caller holds the write lock. Registers a link in both indices.
    pub(crate) fn index_link(&mut self, link: &NetworkLink) {
        for endpoint in link.endpoints() {
            if endpoint.is_empty() {
                continue;
            }
            self.links_by_interface
                .entry(endpoint.to_string())
                .or_default()
                .insert(link.id.clone());
            if let Some(iface) = self.interfaces.get_mut(endpoint) {
                if !iface.link_ids.contains(&link.id) {
                    iface.link_ids.push(link.id.clone());
                }
            }
        }
    }

    /// Caller holds the write lock. Prunes a link from both indices.
    pub(crate) fn unindex_link(&mut self, link: &NetworkLink) {
        for endpoint in link.endpoints() {
            if endpoint.is_empty() {
                continue;
            }
            if let Some(set) = self.links_by_interface.get_mut(endpoint) {
                set.remove(&link.id);
                if set.is_empty() {
                    self.links_by_interface.remove(endpoint);
                }
            }
            if let Some(iface) = self.interfaces.get_mut(endpoint) {
                iface.link_ids.retain(|id| id != &link.id);
            }
        }
    }

    /// Caller holds the write lock. Validates endpoints, then stores and
    /// indexes. Rejects duplicate ids.
    pub(crate) fn add_link(&mut self, link: NetworkLink) -> Result<(), KbError> {
        if link.id.is_empty() {
            return Err(KbError::InvalidInput("empty link id".into()));
        }
        if self.links.contains_key(&link.id) {
            return Err(KbError::DuplicateId(link.id));
        }
        for endpoint in link.endpoints() {
            if !endpoint.is_empty() && !self.interfaces.contains_key(endpoint) {
                return Err(KbError::not_found("interface", endpoint));
            }
        }
        self.index_link(&link);
        self.links.insert(link.id.clone(), link);
        Ok(())
    }

    /// Caller holds the write lock.
    pub(crate) fn remove_link(&mut self, id: &str) -> Result<NetworkLink, KbError> {
        let link = self
            .links
            .remove(id)
            .ok_or_else(|| KbError::not_found("link", id))?;
        self.unindex_link(&link);
        Ok(link)
    }
}

/// Network knowledge base. One read/write lock; public methods are the
/// locking boundary.
#[derive(Default)]
pub struct NetworkKb {
    inner: RwLock<NkbInner>,
}

impl NetworkKb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-store write access for the connectivity engine's single logical
    /// critical section. Crate-private: external callers go through the
    /// public operations.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, NkbInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Interfaces ──────────────────────────────────────────────

    pub fn add_interface(&self, mut iface: NetworkInterface) -> Result<(), KbError> {
        if iface.id.is_empty() {
            return Err(KbError::InvalidInput("empty interface id".into()));
        }
        let mut inner = self.write();
        if inner.interfaces.contains_key(&iface.id) {
            return Err(KbError::DuplicateId(iface.id));
        }
        iface.link_ids.clear();
        inner.interfaces.insert(iface.id.clone(), iface);
        Ok(())
    }

    /// Replace an existing interface in place, keeping its adjacency list.
    /// The replacement must stay on the same parent node.
    pub fn replace_interface(&self, iface: NetworkInterface) -> Result<(), KbError> {
        let mut inner = self.write();
        let existing = inner
            .interfaces
            .get(&iface.id)
            .ok_or_else(|| KbError::not_found("interface", &iface.id))?;
        if existing.parent_node_id != iface.parent_node_id {
            return Err(KbError::ConstraintViolation(format!(
                "interface {} cannot move from node {} to node {}",
                iface.id, existing.parent_node_id, iface.parent_node_id
            )));
        }
        let link_ids = existing.link_ids.clone();
        let mut iface = iface;
        iface.link_ids = link_ids;
        inner.interfaces.insert(iface.id.clone(), iface);
        Ok(())
    }

    pub fn interface(&self, id: &str) -> Result<NetworkInterface, KbError> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .interfaces
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::not_found("interface", id))
    }

    pub fn interfaces(&self) -> Vec<NetworkInterface> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .interfaces
            .values()
            .cloned()
            .collect()
    }

    pub fn interfaces_of_node(&self, node_id: &str) -> Vec<NetworkInterface> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .interfaces
            .values()
            .filter(|i| i.parent_node_id == node_id)
            .cloned()
            .collect()
    }

    /// Delete an interface and every link that references it.
    pub fn remove_interface(&self, id: &str) -> Result<NetworkInterface, KbError> {
        let mut inner = self.write();
        if !inner.interfaces.contains_key(id) {
            return Err(KbError::not_found("interface", id));
        }
        let referencing: Vec<String> = inner
            .links_by_interface
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for link_id in referencing {
            let _ = inner.remove_link(&link_id);
        }
        let iface = inner
            .interfaces
            .remove(id)
            .ok_or_else(|| KbError::not_found("interface", id))?;
        inner.links_by_interface.remove(id);
        Ok(iface)
    }

    pub fn set_interface_operational(&self, id: &str, operational: bool) -> Result<(), KbError> {
        let mut inner = self.write();
        let iface = inner
            .interfaces
            .get_mut(id)
            .ok_or_else(|| KbError::not_found("interface", id))?;
        iface.is_operational = operational;
        Ok(())
    }

    // ── Transceivers ────────────────────────────────────────────

    pub fn add_transceiver(&self, model: TransceiverModel) -> Result<(), KbError> {
        if model.id.is_empty() {
            return Err(KbError::InvalidInput("empty transceiver id".into()));
        }
        let mut inner = self.write();
        if inner.transceivers.contains_key(&model.id) {
            return Err(KbError::DuplicateId(model.id));
        }
        inner.transceivers.insert(model.id.clone(), model);
        Ok(())
    }

    pub fn transceiver(&self, id: &str) -> Result<TransceiverModel, KbError> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .transceivers
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::not_found("transceiver", id))
    }

    pub fn transceivers(&self) -> Vec<TransceiverModel> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .transceivers
            .values()
            .cloned()
            .collect()
    }

    // ── Node positions ──────────────────────────────────────────

    pub fn set_node_position(&self, node_id: &str, position_km: Vec3) {
        self.write()
            .node_positions
            .insert(node_id.to_string(), position_km);
    }

    pub fn node_position(&self, node_id: &str) -> Option<Vec3> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .node_positions
            .get(node_id)
            .copied()
    }

    // ── Links ───────────────────────────────────────────────────

    pub fn add_link(&self, link: NetworkLink) -> Result<(), KbError> {
        self.write().add_link(link)
    }

    pub fn link(&self, id: &str) -> Result<NetworkLink, KbError> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .links
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::not_found("link", id))
    }

    pub fn links(&self) -> Vec<NetworkLink> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .links
            .values()
            .cloned()
            .collect()
    }

    pub fn remove_link(&self, id: &str) -> Result<NetworkLink, KbError> {
        self.write().remove_link(id)
    }

    pub fn links_for_interface(&self, interface_id: &str) -> Vec<NetworkLink> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .links_by_interface
            .get(interface_id)
            .map(|set| {
                set.iter()
                    .filter_map(|id| inner.links.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set or clear the administrative impairment override. The status
    /// transition itself happens on the next evaluation pass.
    pub fn set_impaired(&self, link_id: &str, impaired: bool) -> Result<(), KbError> {
        let mut inner = self.write();
        let link = inner
            .links
            .get_mut(link_id)
            .ok_or_else(|| KbError::not_found("link", link_id))?;
        link.is_impaired = impaired;
        Ok(())
    }

    /// Controller-initiated deactivation: Active→Potential with the
    /// explicit-deactivation latch, which outlives geometry and impairment
    /// cycles until the evaluator itself auto-activates.
    pub fn deactivate_link(&self, link_id: &str) -> Result<(), KbError> {
        let mut inner = self.write();
        let link = inner
            .links
            .get_mut(link_id)
            .ok_or_else(|| KbError::not_found("link", link_id))?;
        link.link_status = LinkStatus::Potential;
        link.is_up = false;
        link.was_explicitly_deactivated = true;
        Ok(())
    }

    /// Controller-initiated activation. Does not touch the
    /// explicit-deactivation latch: the evaluator owns its clear point.
    pub fn activate_link(&self, link_id: &str) -> Result<(), KbError> {
        let mut inner = self.write();
        let link = inner
            .links
            .get_mut(link_id)
            .ok_or_else(|| KbError::not_found("link", link_id))?;
        link.link_status = LinkStatus::Active;
        Ok(())
    }

    /// Structural self-check used by tests: id uniqueness is a given with
    /// map storage, so this verifies the two adjacency indices against the
    /// link table and each other.
    pub fn verify_invariants(&self) -> Result<(), String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        for (link_id, link) in &inner.links {
            for endpoint in link.endpoints() {
                if endpoint.is_empty() {
                    continue;
                }
                let iface = inner
                    .interfaces
                    .get(endpoint)
                    .ok_or_else(|| format!("link {link_id} references missing interface {endpoint}"))?;
                if !iface.link_ids.contains(link_id) {
                    return Err(format!(
                        "interface {endpoint} adjacency list missing link {link_id}"
                    ));
                }
                if !inner
                    .links_by_interface
                    .get(endpoint)
                    .is_some_and(|set| set.contains(link_id))
                {
                    return Err(format!(
                        "links_by_interface[{endpoint}] missing link {link_id}"
                    ));
                }
            }
        }
        for (iface_id, set) in &inner.links_by_interface {
            for link_id in set {
                let link = inner
                    .links
                    .get(link_id)
                    .ok_or_else(|| format!("index references missing link {link_id}"))?;
                if !link.endpoints().contains(&iface_id.as_str()) {
                    return Err(format!(
                        "links_by_interface[{iface_id}] holds non-endpoint link {link_id}"
                    ));
                }
            }
        }
        for (iface_id, iface) in &inner.interfaces {
            for link_id in &iface.link_ids {
                if !inner.links.contains_key(link_id) {
                    return Err(format!(
                        "interface {iface_id} adjacency references missing link {link_id}"
                    ));
                }
            }
        }
        Ok(())
    }
}
