//! Physical knowledge base — platforms and network nodes.
//!
//! Platform coordinates are metres (ECEF). Positions are mutated only through
//! [`PhysicalKb::update_positions`], the motion model's batch entry point;
//! subscribers receive a copy of each changed platform outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::KbError;
use crate::geometry::Vec3;
use crate::motion::OrbitalElements;

/// Where a platform's motion comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionSource {
    Static,
    Orbital,
}

/// A physical carrier of network nodes: ground station, satellite, aircraft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub motion: MotionSource,
    /// Present for orbital platforms; ignored for static ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orbit: Option<OrbitalElements>,
    /// Current ECEF coordinates in metres.
    pub position_m: Vec3,
}

/// Per-node routing table entry, installed by scheduled route actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination_cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_node_id: Option<String>,
    pub out_interface_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default)]
    pub cost: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// A logical network element riding on a platform. Position belongs to the
/// platform; the node only carries identity and its routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: String,
    pub name: String,
    pub platform_id: String,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

type PlatformSubscriber = Arc<dyn Fn(&Platform) + Send + Sync>;

#[derive(Default)]
struct PkbInner {
    platforms: HashMap<String, Platform>,
    nodes: HashMap<String, NetworkNode>,
}

/// Physical knowledge base. One read/write lock; public methods are the
/// locking boundary.
#[derive(Default)]
pub struct PhysicalKb {
    inner: RwLock<PkbInner>,
    subscribers: Mutex<Vec<PlatformSubscriber>>,
}

impl PhysicalKb {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Platforms ───────────────────────────────────────────────

    pub fn add_platform(&self, platform: Platform) -> Result<(), KbError> {
        if platform.id.is_empty() {
            return Err(KbError::InvalidInput("empty platform id".into()));
        }
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.platforms.contains_key(&platform.id) {
            return Err(KbError::DuplicateId(platform.id));
        }
        inner.platforms.insert(platform.id.clone(), platform);
        Ok(())
    }

    pub fn platform(&self, id: &str) -> Result<Platform, KbError> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .platforms
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::not_found("platform", id))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .platforms
            .values()
            .cloned()
            .collect()
    }

    pub fn remove_platform(&self, id: &str) -> Result<Platform, KbError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .platforms
            .remove(id)
            .ok_or_else(|| KbError::not_found("platform", id))
    }

    /// Batch position update from the motion model. The only position
    /// mutator. Subscribers are notified with copies after the lock drops.
    pub fn update_positions(&self, updates: Vec<(String, Vec3)>) {
        let mut changed = Vec::new();
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            for (id, position_m) in updates {
                if let Some(platform) = inner.platforms.get_mut(&id) {
                    platform.position_m = position_m;
                    changed.push(platform.clone());
                } else {
                    tracing::warn!(platform_id = %id, "position update for unknown platform");
                }
            }
        }
        if changed.is_empty() {
            return;
        }
        let subscribers: Vec<PlatformSubscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for platform in &changed {
            for subscriber in &subscribers {
                subscriber(platform);
            }
        }
    }

    /// Register a callback invoked with a copy of each platform whose
    /// position changed.
    pub fn subscribe(&self, f: impl Fn(&Platform) + Send + Sync + 'static) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(f));
    }

    // ── Nodes ───────────────────────────────────────────────────

    pub fn add_node(&self, node: NetworkNode) -> Result<(), KbError> {
        if node.id.is_empty() {
            return Err(KbError::InvalidInput("empty node id".into()));
        }
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.nodes.contains_key(&node.id) {
            return Err(KbError::DuplicateId(node.id));
        }
        inner.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Result<NetworkNode, KbError> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::not_found("node", id))
    }

    pub fn nodes(&self) -> Vec<NetworkNode> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .nodes
            .values()
            .cloned()
            .collect()
    }

    pub fn remove_node(&self, id: &str) -> Result<NetworkNode, KbError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .nodes
            .remove(id)
            .ok_or_else(|| KbError::not_found("node", id))
    }

    // ── Routing table ───────────────────────────────────────────

    /// Install or replace a route on a node, keyed by destination prefix.
    pub fn install_route(&self, node_id: &str, entry: RouteEntry) -> Result<(), KbError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| KbError::not_found("node", node_id))?;
        if let Some(existing) = node
            .routes
            .iter_mut()
            .find(|r| r.destination_cidr == entry.destination_cidr)
        {
            *existing = entry;
        } else {
            node.routes.push(entry);
        }
        Ok(())
    }

    pub fn remove_route(&self, node_id: &str, destination_cidr: &str) -> Result<(), KbError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| KbError::not_found("node", node_id))?;
        let before = node.routes.len();
        node.routes.retain(|r| r.destination_cidr != destination_cidr);
        if node.routes.len() == before {
            return Err(KbError::not_found("route", destination_cidr));
        }
        Ok(())
    }
}
