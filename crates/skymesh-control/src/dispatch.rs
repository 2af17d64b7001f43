//! Service-request dispatch.
//!
//! Turns outstanding service requests into southbound `CreateEntry` streams
//! toward the source node's agent. Route selection itself is supplied by the
//! caller through [`RoutePlanner`]; the dispatcher owns only token/seqno
//! bookkeeping and provisioning state. Failures are logged and never abort
//! the replanning loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use skymesh_common::ids;
use skymesh_common::models::ResponseStatus;
use skymesh_common::protocol::{ActionKind, ActionPayload, ActionResponse, CreateEntry, RouteTask, ScheduleRequest};
use skymesh_core::kb::network::NetworkKb;
use skymesh_core::scenario::{ProvisionInterval, ScenarioState, ServiceRequest};
use skymesh_agent::SimAgent;

/// Supplies the route a service request should install. Path computation is
/// external input; implementations read NKB state and answer with a
/// fully-formed task (including the destination prefix) or nothing.
pub trait RoutePlanner: Send + Sync {
    fn route_for(&self, nkb: &NetworkKb, src_node: &str, dst_node: &str) -> Option<RouteTask>;
}

/// Built-in planner: pick any physically-up link joining the two nodes and
/// route out of the source-side interface. Destination prefixes come from a
/// per-node registry handed in at construction.
pub struct DirectLinkPlanner {
    prefixes: HashMap<String, String>,
}

impl DirectLinkPlanner {
    pub fn new(prefixes: HashMap<String, String>) -> Self {
        DirectLinkPlanner { prefixes }
    }
}

impl RoutePlanner for DirectLinkPlanner {
    fn route_for(&self, nkb: &NetworkKb, src_node: &str, dst_node: &str) -> Option<RouteTask> {
        let destination_cidr = self.prefixes.get(dst_node)?.clone();
        for link in nkb.links() {
            if !link.is_up {
                continue;
            }
            let Ok(iface_a) = nkb.interface(&link.interface_a) else {
                continue;
            };
            let Ok(iface_b) = nkb.interface(&link.interface_b) else {
                continue;
            };
            let out_interface = if iface_a.parent_node_id == src_node
                && iface_b.parent_node_id == dst_node
            {
                iface_a.id
            } else if iface_b.parent_node_id == src_node && iface_a.parent_node_id == dst_node {
                iface_b.id
            } else {
                continue;
            };
            return Some(RouteTask {
                destination_cidr,
                next_hop_node_id: Some(dst_node.to_string()),
                out_interface_id: out_interface,
                path: Some(vec![src_node.to_string(), dst_node.to_string()]),
                cost: 1,
                valid_until: None,
            });
        }
        None
    }
}

struct Inflight {
    service_request_id: String,
    valid_until: DateTime<Utc>,
}

/// Replanning-loop hook that walks outstanding service requests and streams
/// route installations to agents.
pub struct ServiceRequestDispatcher {
    scenario: Arc<ScenarioState>,
    agents: HashMap<String, Arc<SimAgent>>,
    planner: Arc<dyn RoutePlanner>,
    token: String,
    seq_no: AtomicU64,
    inflight: Mutex<HashMap<String, Inflight>>,
}

impl ServiceRequestDispatcher {
    pub fn new(
        scenario: Arc<ScenarioState>,
        agents: HashMap<String, Arc<SimAgent>>,
        planner: Arc<dyn RoutePlanner>,
    ) -> Self {
        ServiceRequestDispatcher {
            scenario,
            agents,
            planner,
            token: ids::schedule_token(),
            seq_no: AtomicU64::new(0),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch every unprovisioned request whose validity window covers
    /// `now`. Returns how many entries were streamed.
    pub fn schedule_service_requests(&self, now: DateTime<Utc>) -> usize {
        let mut dispatched = 0;
        for request in self.scenario.service_requests() {
            if request.provisioned {
                continue;
            }
            let Some(flow) = current_flow(&request, now) else {
                continue;
            };
            let Some(route) = self.planner.route_for(
                self.scenario.nkb(),
                &request.src_node_id,
                &request.dst_node_id,
            ) else {
                tracing::warn!(
                    service_request = %request.id,
                    src = %request.src_node_id,
                    dst = %request.dst_node_id,
                    "no route available, skipping"
                );
                continue;
            };
            let Some(agent) = self.agents.get(&request.src_node_id) else {
                tracing::warn!(
                    service_request = %request.id,
                    node_id = %request.src_node_id,
                    "no agent for source node"
                );
                continue;
            };

            let request_id = ids::request_id();
            let mut route = route;
            route.valid_until = Some(flow.valid_until);
            let create = CreateEntry {
                request_id: request_id.clone(),
                token: self.token.clone(),
                seq_no: self.seq_no.fetch_add(1, Ordering::Relaxed) + 1,
                entry_id: format!("sr-{}", request.id),
                when: now,
                kind: ActionKind::SetRoute,
                payload: ActionPayload::Route(route),
            };
            agent.handle_request(ScheduleRequest::CreateEntry(create));
            self.inflight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(
                    request_id,
                    Inflight {
                        service_request_id: request.id.clone(),
                        valid_until: flow.valid_until,
                    },
                );
            dispatched += 1;
        }
        if dispatched > 0 {
            tracing::info!(dispatched, "service requests dispatched");
        }
        dispatched
    }

    /// Feed an agent response back; a successful installation marks the
    /// service request provisioned with a history interval.
    pub fn handle_response(&self, response: &ActionResponse, now: DateTime<Utc>) {
        let inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&response.request_id);
        let Some(inflight) = inflight else {
            return;
        };
        if response.status != ResponseStatus::Ok {
            tracing::warn!(
                service_request = %inflight.service_request_id,
                status = %response.status,
                "provisioning failed"
            );
            return;
        }
        if let Err(err) = self.scenario.mark_provisioned(
            &inflight.service_request_id,
            ProvisionInterval {
                from: now,
                until: inflight.valid_until,
            },
        ) {
            tracing::warn!(
                service_request = %inflight.service_request_id,
                error = %err,
                "could not record provisioning"
            );
        }
    }
}

fn current_flow(request: &ServiceRequest, now: DateTime<Utc>) -> Option<&skymesh_core::scenario::FlowRequirement> {
    request
        .flows
        .iter()
        .find(|flow| flow.valid_from <= now && now < flow.valid_until)
}
