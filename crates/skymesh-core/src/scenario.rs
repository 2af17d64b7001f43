//! Scenario state — façade over the knowledge bases.
//!
//! Owns the service-request table and orchestrates per-tick side effects in
//! the required order: motion update → metre→kilometre position bridge →
//! connectivity pass → count publication. Stage failures are caught at the
//! tick boundary and logged; the tick continues.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skymesh_common::models::LinkCounts;

use crate::connectivity::{ConnectivityEngine, EngineConfig};
use crate::kb::network::NetworkKb;
use crate::kb::physical::{PhysicalKb, RouteEntry};
use crate::kb::KbError;
use crate::motion::MotionModel;

// ── Service requests ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRequirement {
    pub bandwidth_mbps: f64,
    pub max_latency_ms: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionInterval {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// An operator request for connectivity between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: String,
    pub src_node_id: String,
    pub dst_node_id: String,
    pub flows: Vec<FlowRequirement>,
    pub priority: u32,
    /// Currently provisioned by the scheduler.
    #[serde(default)]
    pub provisioned: bool,
    /// Ordered provisioning history.
    #[serde(default)]
    pub history: Vec<ProvisionInterval>,
}

// ── Scenario state ──────────────────────────────────────────────────

pub struct ScenarioState {
    pkb: Arc<PhysicalKb>,
    nkb: Arc<NetworkKb>,
    motion: Arc<MotionModel>,
    engine: ConnectivityEngine,
    requests: Mutex<HashMap<String, ServiceRequest>>,
    last_counts: Mutex<LinkCounts>,
}

impl ScenarioState {
    pub fn new(
        pkb: Arc<PhysicalKb>,
        nkb: Arc<NetworkKb>,
        motion: Arc<MotionModel>,
        engine_config: EngineConfig,
    ) -> Self {
        let engine = ConnectivityEngine::new(nkb.clone(), engine_config);
        ScenarioState {
            pkb,
            nkb,
            motion,
            engine,
            requests: Mutex::new(HashMap::new()),
            last_counts: Mutex::new(LinkCounts::default()),
        }
    }

    pub fn pkb(&self) -> &Arc<PhysicalKb> {
        &self.pkb
    }

    pub fn nkb(&self) -> &Arc<NetworkKb> {
        &self.nkb
    }

    /// One simulation tick: advance platforms, bridge coordinates, rebuild
    /// and evaluate connectivity, publish counts.
    pub fn tick(&self, now: DateTime<Utc>) -> LinkCounts {
        if catch_unwind(AssertUnwindSafe(|| {
            self.motion.update_positions(&self.pkb, now);
        }))
        .is_err()
        {
            tracing::error!("motion update panicked; continuing tick");
        }

        self.sync_positions();

        let counts = match catch_unwind(AssertUnwindSafe(|| self.engine.update_connectivity())) {
            Ok(counts) => counts,
            Err(_) => {
                tracing::error!("connectivity pass panicked; keeping previous counts");
                *self.last_counts.lock().unwrap_or_else(|e| e.into_inner())
            }
        };

        *self.last_counts.lock().unwrap_or_else(|e| e.into_inner()) = counts;
        tracing::debug!(
            sim_time = %now,
            links = counts.total,
            active = counts.active,
            "tick complete"
        );
        counts
    }

    /// Mirror PKB platform coordinates (metres) into NKB node positions
    /// (kilometres). The single place where the unit conversion happens.
    pub fn sync_positions(&self) {
        for node in self.pkb.nodes() {
            match self.pkb.platform(&node.platform_id) {
                Ok(platform) => {
                    self.nkb
                        .set_node_position(&node.id, platform.position_m.scale(1e-3));
                }
                Err(_) => {
                    tracing::warn!(
                        node_id = %node.id,
                        platform_id = %node.platform_id,
                        "node references missing platform"
                    );
                }
            }
        }
    }

    pub fn last_counts(&self) -> LinkCounts {
        *self.last_counts.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Service requests ────────────────────────────────────────

    pub fn add_service_request(&self, request: ServiceRequest) -> Result<(), KbError> {
        if request.id.is_empty() {
            return Err(KbError::InvalidInput("empty service request id".into()));
        }
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        if requests.contains_key(&request.id) {
            return Err(KbError::DuplicateId(request.id));
        }
        requests.insert(request.id.clone(), request);
        Ok(())
    }

    pub fn service_request(&self, id: &str) -> Result<ServiceRequest, KbError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| KbError::not_found("service request", id))
    }

    pub fn service_requests(&self) -> Vec<ServiceRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn remove_service_request(&self, id: &str) -> Result<ServiceRequest, KbError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .ok_or_else(|| KbError::not_found("service request", id))
    }

    /// Record a successful provisioning interval and flag the request.
    pub fn mark_provisioned(&self, id: &str, interval: ProvisionInterval) -> Result<(), KbError> {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let request = requests
            .get_mut(id)
            .ok_or_else(|| KbError::not_found("service request", id))?;
        request.provisioned = true;
        request.history.push(interval);
        Ok(())
    }

    // ── Mutators used by agent actions ──────────────────────────

    pub fn install_route(&self, node_id: &str, entry: RouteEntry) -> Result<(), KbError> {
        self.pkb.install_route(node_id, entry)
    }

    pub fn remove_route(&self, node_id: &str, destination_cidr: &str) -> Result<(), KbError> {
        self.pkb.remove_route(node_id, destination_cidr)
    }

    pub fn set_interface_operational(&self, interface_id: &str, operational: bool) -> Result<(), KbError> {
        self.nkb.set_interface_operational(interface_id, operational)
    }
}
