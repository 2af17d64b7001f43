//! Per-node simulated agent.
//!
//! Consumes the controller's schedule-manipulation stream, enforces token and
//! sequence discipline, persists future actions, executes them at simulated
//! time, answers with `Response` events, and runs the telemetry loop as a
//! self-rescheduling scheduler event.
//!
//! All message handling and pending-table mutation is serialised on one
//! per-agent mutex. Action side effects run with that mutex released so the
//! knowledge bases never see it held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use skymesh_common::models::ResponseStatus;
use skymesh_common::protocol::{
    ActionKind, ActionPayload, ActionResponse, AgentEvent, CreateEntry, DeleteEntry, Finalize,
    Hello, ScheduleRequest, SrPolicyTask, TelemetryPush,
};
use skymesh_core::clock::SimClock;
use skymesh_core::events::{EventId, EventScheduler};
use skymesh_core::kb::physical::RouteEntry;
use skymesh_core::kb::KbError;
use skymesh_core::scenario::ScenarioState;

use crate::action::ScheduledAction;
use crate::store::TelemetryStore;
use crate::telemetry;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Simulated seconds between telemetry samples. Zero disables the loop.
    pub telemetry_interval: Duration,
    pub telemetry_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            telemetry_interval: Duration::from_secs(1),
            telemetry_enabled: true,
        }
    }
}

/// Monotonic counters exposed for the metrics surface.
#[derive(Default)]
pub struct AgentCounters {
    pub token_mismatches: AtomicU64,
    pub seq_out_of_order: AtomicU64,
    pub actions_executed: AtomicU64,
    pub actions_failed: AtomicU64,
    pub telemetry_samples: AtomicU64,
}

#[derive(Default)]
struct AgentInner {
    /// Latched from the first schedule message; mismatches are dropped.
    token: String,
    last_seq_no: u64,
    pending: HashMap<String, ScheduledAction>,
    /// entry id → scheduler event, so deletes cancel the right event.
    scheduled_events: HashMap<String, EventId>,
    sr_policies: HashMap<String, SrPolicyTask>,
    telemetry_event: Option<EventId>,
    last_telemetry_at: Option<DateTime<Utc>>,
    stopped: bool,
}

pub struct SimAgent {
    node_id: String,
    scenario: Arc<ScenarioState>,
    clock: Arc<SimClock>,
    scheduler: Arc<EventScheduler>,
    store: Arc<TelemetryStore>,
    events_tx: crossbeam_channel::Sender<AgentEvent>,
    config: AgentConfig,
    pub counters: AgentCounters,
    inner: Mutex<AgentInner>,
}

impl SimAgent {
    pub fn new(
        node_id: impl Into<String>,
        scenario: Arc<ScenarioState>,
        clock: Arc<SimClock>,
        scheduler: Arc<EventScheduler>,
        store: Arc<TelemetryStore>,
        events_tx: crossbeam_channel::Sender<AgentEvent>,
        config: AgentConfig,
    ) -> Arc<Self> {
        Arc::new(SimAgent {
            node_id: node_id.into(),
            scenario,
            clock,
            scheduler,
            store,
            events_tx,
            config,
            counters: AgentCounters::default(),
            inner: Mutex::new(AgentInner::default()),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Announce the agent and kick off the telemetry loop.
    pub fn start(self: &Arc<Self>) {
        self.emit(AgentEvent::Hello(Hello {
            node_id: self.node_id.clone(),
        }));
        if self.config.telemetry_enabled && !self.config.telemetry_interval.is_zero() {
            self.schedule_telemetry();
        }
        tracing::info!(node_id = %self.node_id, "agent started");
    }

    /// Stop executing and cancel the telemetry reschedule. Pending scheduler
    /// events die with the scheduler on shutdown.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stopped = true;
        if let Some(event_id) = inner.telemetry_event.take() {
            self.scheduler.cancel(&event_id);
        }
        tracing::info!(node_id = %self.node_id, "agent stopped");
    }

    // ── Message handling ────────────────────────────────────────

    /// Single entry point for the controller stream. Serialised per agent.
    pub fn handle_request(self: &Arc<Self>, request: ScheduleRequest) {
        match request {
            ScheduleRequest::Reset => self.reset(),
            ScheduleRequest::CreateEntry(msg) => self.handle_create(msg),
            ScheduleRequest::DeleteEntry(msg) => self.handle_delete(msg),
            ScheduleRequest::Finalize(msg) => self.handle_finalize(msg),
        }
    }

    /// Token latch + sequence discipline. Returns false when the message
    /// must be silently dropped.
    fn admit(&self, inner: &mut AgentInner, token: &str, seq_no: u64) -> bool {
        if inner.token.is_empty() {
            inner.token = token.to_string();
            tracing::info!(node_id = %self.node_id, "schedule manipulation token latched");
        } else if inner.token != token {
            self.counters.token_mismatches.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                node_id = %self.node_id,
                seq_no,
                "dropping message with mismatched token"
            );
            return false;
        }
        if seq_no < inner.last_seq_no {
            self.counters.seq_out_of_order.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                node_id = %self.node_id,
                received = seq_no,
                last_seen = inner.last_seq_no,
                "out-of-order sequence number"
            );
        }
        inner.last_seq_no = seq_no;
        true
    }

    fn handle_create(self: &Arc<Self>, msg: CreateEntry) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !self.admit(&mut inner, &msg.token, msg.seq_no) {
            return;
        }

        let request_id = msg.request_id.clone();
        let action = ScheduledAction::from_create(&self.node_id, msg);
        if let Err(err) = action.validate() {
            drop(inner);
            tracing::warn!(node_id = %self.node_id, error = %err, "rejecting invalid entry");
            self.respond(&request_id, ResponseStatus::InvalidArgument, Some(err.to_string()));
            return;
        }

        // Duplicate entry ids overwrite: the superseded event must not fire.
        if let Some(stale) = inner.scheduled_events.remove(&action.entry_id) {
            self.scheduler.cancel(&stale);
        }

        let entry_id = action.entry_id.clone();
        let when = action.when;
        inner.pending.insert(entry_id.clone(), action);

        let agent = self.clone();
        let callback_entry = entry_id.clone();
        let event_id = self
            .scheduler
            .schedule(when, move || agent.execute_entry(&callback_entry));
        inner.scheduled_events.insert(entry_id.clone(), event_id);
        tracing::debug!(node_id = %self.node_id, entry_id = %entry_id, when = %when, "entry scheduled");
    }

    fn handle_delete(&self, msg: DeleteEntry) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !self.admit(&mut inner, &msg.token, msg.seq_no) {
            return;
        }
        if inner.pending.remove(&msg.entry_id).is_none() {
            tracing::debug!(node_id = %self.node_id, entry_id = %msg.entry_id, "delete for unknown entry");
        }
        // Best-effort cancel; execution re-checks the pending table anyway.
        if let Some(event_id) = inner.scheduled_events.remove(&msg.entry_id) {
            self.scheduler.cancel(&event_id);
        }
    }

    fn handle_finalize(&self, msg: Finalize) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !self.admit(&mut inner, &msg.token, msg.seq_no) {
            return;
        }
        let pruned: Vec<String> = inner
            .pending
            .iter()
            .filter(|(_, action)| action.when <= msg.up_to)
            .map(|(entry_id, _)| entry_id.clone())
            .collect();
        for entry_id in &pruned {
            inner.pending.remove(entry_id);
            if let Some(event_id) = inner.scheduled_events.remove(entry_id) {
                self.scheduler.cancel(&event_id);
            }
        }
        tracing::info!(
            node_id = %self.node_id,
            up_to = %msg.up_to,
            pruned = pruned.len(),
            "finalized schedule"
        );
    }

    /// Clear token, sequence cursor, pending table, and SR policy state.
    fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.token.clear();
        inner.last_seq_no = 0;
        for (_, event_id) in inner.scheduled_events.drain() {
            self.scheduler.cancel(&event_id);
        }
        inner.pending.clear();
        inner.sr_policies.clear();
        tracing::info!(node_id = %self.node_id, "agent schedule state reset");
    }

    // ── Action execution ────────────────────────────────────────

    /// Scheduler callback for a due entry. Pops the action under the agent
    /// lock; an entry deleted in the meantime is gone from the table and is
    /// never executed. Side effects run after the lock is released.
    fn execute_entry(self: &Arc<Self>, entry_id: &str) {
        let action = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.stopped {
                return;
            }
            inner.scheduled_events.remove(entry_id);
            match inner.pending.remove(entry_id) {
                Some(action) => action,
                None => return,
            }
        };

        let result = self.dispatch(&action);
        let (status, detail) = match result {
            Ok(()) => {
                self.counters.actions_executed.fetch_add(1, Ordering::Relaxed);
                (ResponseStatus::Ok, None)
            }
            Err((status, detail)) => {
                self.counters.actions_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    node_id = %self.node_id,
                    entry_id = %action.entry_id,
                    kind = %action.kind,
                    error = %detail,
                    "action execution failed"
                );
                (status, Some(detail))
            }
        };
        self.respond(&action.request_id, status, detail);
    }

    fn dispatch(&self, action: &ScheduledAction) -> Result<(), (ResponseStatus, String)> {
        match (&action.kind, &action.payload) {
            (ActionKind::SetRoute, ActionPayload::Route(route)) => {
                let entry = RouteEntry {
                    destination_cidr: route.destination_cidr.clone(),
                    next_hop_node_id: route.next_hop_node_id.clone(),
                    out_interface_id: route.out_interface_id.clone(),
                    path: route.path.clone(),
                    cost: route.cost,
                    valid_until: route.valid_until,
                };
                self.scenario
                    .install_route(&self.node_id, entry)
                    .map_err(kb_failure)
            }
            (ActionKind::DeleteRoute, ActionPayload::Route(route)) => self
                .scenario
                .remove_route(&self.node_id, &route.destination_cidr)
                .map_err(kb_failure),
            (ActionKind::UpdateBeam, ActionPayload::Beam(beam)) => self
                .scenario
                .set_interface_operational(&beam.interface_id, true)
                .map_err(kb_failure),
            (ActionKind::DeleteBeam, ActionPayload::Beam(beam)) => self
                .scenario
                .set_interface_operational(&beam.interface_id, false)
                .map_err(kb_failure),
            (ActionKind::SetSrPolicy, ActionPayload::SrPolicy(policy)) => {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner
                    .sr_policies
                    .insert(policy.policy_id.clone(), policy.clone());
                Ok(())
            }
            (ActionKind::DeleteSrPolicy, ActionPayload::SrPolicy(policy)) => {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                match inner.sr_policies.remove(&policy.policy_id) {
                    Some(_) => Ok(()),
                    None => Err((
                        ResponseStatus::NotFound,
                        format!("sr policy {} not found", policy.policy_id),
                    )),
                }
            }
            // Validation guarantees kind/payload agreement; anything else is
            // a programming error surfaced as an internal failure.
            (kind, _) => Err((
                ResponseStatus::Internal,
                format!("kind {kind} reached dispatch with mismatched payload"),
            )),
        }
    }

    pub fn sr_policy(&self, policy_id: &str) -> Option<SrPolicyTask> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sr_policies
            .get(policy_id)
            .cloned()
    }

    pub fn pending_entry_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .keys()
            .cloned()
            .collect()
    }

    // ── Telemetry loop ──────────────────────────────────────────

    fn schedule_telemetry(self: &Arc<Self>) {
        let next = self.clock.after(self.config.telemetry_interval);
        let agent = self.clone();
        let event_id = self.scheduler.schedule(next, move || agent.telemetry_tick());
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.telemetry_event = Some(event_id);
    }

    fn telemetry_tick(self: &Arc<Self>) {
        let now = self.clock.now();
        let metrics = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.stopped {
                return;
            }
            let delta_s = match inner.last_telemetry_at.replace(now) {
                Some(last) => ((now - last).num_milliseconds() as f64 / 1000.0).max(0.0),
                None => self.config.telemetry_interval.as_secs_f64(),
            };

            let nkb = self.scenario.nkb();
            let mut metrics = Vec::new();
            for iface in nkb.interfaces_of_node(&self.node_id) {
                let sample = telemetry::derive_sample(nkb, &iface.id);
                let previous = self
                    .store
                    .get(&self.node_id, &iface.id)
                    .map(|m| m.bytes_tx)
                    .unwrap_or(0);
                let record = telemetry::build_metrics(
                    &self.node_id,
                    &iface.id,
                    sample,
                    previous,
                    delta_s,
                    now,
                );
                self.store.record(record.clone());
                metrics.push(record);
            }
            metrics
        };

        self.counters
            .telemetry_samples
            .fetch_add(metrics.len() as u64, Ordering::Relaxed);

        // Push toward the controller. An unavailable sink is not fatal; the
        // samples are already recorded locally.
        if !metrics.is_empty() {
            self.emit(AgentEvent::Telemetry(TelemetryPush {
                node_id: self.node_id.clone(),
                metrics,
            }));
        }

        self.schedule_telemetry();
    }

    // ── Outbound events ─────────────────────────────────────────

    fn respond(&self, request_id: &str, status: ResponseStatus, detail: Option<String>) {
        self.emit(AgentEvent::Response(ActionResponse {
            node_id: self.node_id.clone(),
            request_id: request_id.to_string(),
            status,
            detail,
        }));
    }

    fn emit(&self, event: AgentEvent) {
        if let Err(err) = self.events_tx.try_send(event) {
            tracing::debug!(node_id = %self.node_id, error = %err, "controller event sink unavailable");
        }
    }
}

fn kb_failure(err: KbError) -> (ResponseStatus, String) {
    let status = match err {
        KbError::NotFound { .. } => ResponseStatus::NotFound,
        KbError::InvalidInput(_) | KbError::DuplicateId(_) | KbError::ConstraintViolation(_) => {
            ResponseStatus::InvalidArgument
        }
    };
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use skymesh_core::clock::ClockMode;
    use skymesh_core::connectivity::EngineConfig;
    use skymesh_core::geometry::{Vec3, EARTH_RADIUS_KM};
    use skymesh_core::kb::network::{
        LinkMedium, NetworkInterface, NetworkKb, TransceiverModel,
    };
    use skymesh_core::kb::physical::{MotionSource, NetworkNode, PhysicalKb, Platform};
    use skymesh_core::motion::MotionModel;
    use skymesh_common::protocol::{BeamTask, RouteTask};

    struct Harness {
        clock: Arc<SimClock>,
        scheduler: Arc<EventScheduler>,
        scenario: Arc<ScenarioState>,
        store: Arc<TelemetryStore>,
        agent: Arc<SimAgent>,
        events_rx: crossbeam_channel::Receiver<AgentEvent>,
    }

    fn t0() -> DateTime<Utc> {
        // Sim epoch at t=1000s, matching the scheduled-route scenario
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 16, 40).unwrap()
    }

    fn harness_with_config(config: AgentConfig) -> Harness {
        let clock = Arc::new(SimClock::new(t0(), ClockMode::Accelerated));
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));
        let pkb = Arc::new(PhysicalKb::new());
        let nkb = Arc::new(NetworkKb::new());
        let motion = Arc::new(MotionModel::new());

        nkb.add_transceiver(TransceiverModel {
            id: "trx-ku".into(),
            name: "Ku".into(),
            band_min_ghz: 10.0,
            band_max_ghz: 12.0,
            max_range_km: 0.0,
            tx_power_dbw: None,
            gain_tx_dbi: None,
            gain_rx_dbi: None,
            system_noise_figure_db: None,
            max_beams: 1,
        })
        .unwrap();

        for (node_id, y_km) in [("node-1", 0.0), ("node-2", 300.0)] {
            let platform = Platform {
                id: node_id.to_string(),
                name: node_id.to_string(),
                kind: "satellite".into(),
                motion: MotionSource::Static,
                orbit: None,
                position_m: Vec3::new((EARTH_RADIUS_KM + 550.0) * 1000.0, y_km * 1000.0, 0.0),
            };
            pkb.add_platform(platform.clone()).unwrap();
            motion.register(&platform).unwrap();
            pkb.add_node(NetworkNode {
                id: node_id.to_string(),
                name: node_id.to_string(),
                platform_id: node_id.to_string(),
                routes: Vec::new(),
            })
            .unwrap();
            nkb.add_interface(NetworkInterface {
                id: format!("{node_id}-ku"),
                name: format!("{node_id}-ku"),
                medium: LinkMedium::Wireless,
                parent_node_id: node_id.to_string(),
                transceiver_id: "trx-ku".into(),
                is_operational: true,
                link_ids: Vec::new(),
            })
            .unwrap();
        }

        let scenario = Arc::new(ScenarioState::new(pkb, nkb, motion, EngineConfig::default()));
        scenario.tick(clock.now());

        let store = Arc::new(TelemetryStore::new());
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let agent = SimAgent::new(
            "node-1",
            scenario.clone(),
            clock.clone(),
            scheduler.clone(),
            store.clone(),
            events_tx,
            config,
        );
        Harness {
            clock,
            scheduler,
            scenario,
            store,
            agent,
            events_rx,
        }
    }

    fn harness() -> Harness {
        harness_with_config(AgentConfig {
            telemetry_enabled: false,
            ..AgentConfig::default()
        })
    }

    fn create_route(
        request_id: &str,
        token: &str,
        seq_no: u64,
        entry_id: &str,
        when: DateTime<Utc>,
    ) -> ScheduleRequest {
        ScheduleRequest::CreateEntry(CreateEntry {
            request_id: request_id.into(),
            token: token.into(),
            seq_no,
            entry_id: entry_id.into(),
            when,
            kind: ActionKind::SetRoute,
            payload: ActionPayload::Route(RouteTask {
                destination_cidr: "10.0.0.0/24".into(),
                next_hop_node_id: Some("node-2".into()),
                out_interface_id: "node-1-ku".into(),
                path: None,
                cost: 1,
                valid_until: None,
            }),
        })
    }

    fn drain_responses(rx: &crossbeam_channel::Receiver<AgentEvent>) -> Vec<ActionResponse> {
        rx.try_iter()
            .filter_map(|event| match event {
                AgentEvent::Response(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scheduled_route_executes_at_sim_time() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(5));
        h.agent
            .handle_request(create_route("req_1", "tok-a", 1, "e1", when));

        // Nothing before the due time
        h.clock.advance(Duration::from_secs(4));
        h.scheduler.run_due();
        assert!(h.scenario.pkb().node("node-1").unwrap().routes.is_empty());
        assert!(drain_responses(&h.events_rx).is_empty());

        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();

        let routes = h.scenario.pkb().node("node-1").unwrap().routes;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination_cidr, "10.0.0.0/24");
        assert_eq!(routes[0].next_hop_node_id.as_deref(), Some("node-2"));

        let responses = drain_responses(&h.events_rx);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, "req_1");
        assert_eq!(responses[0].status, ResponseStatus::Ok);
        assert!(h.agent.pending_entry_ids().is_empty());
    }

    #[test]
    fn token_latches_then_mismatches_drop_silently() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(5));
        h.agent
            .handle_request(create_route("req_1", "tok-a", 1, "e1", when));
        // Different token: dropped, counted, never answered
        h.agent
            .handle_request(create_route("req_2", "tok-b", 2, "e2", when));

        assert_eq!(h.agent.counters.token_mismatches.load(Ordering::Relaxed), 1);
        assert_eq!(h.agent.pending_entry_ids(), vec!["e1".to_string()]);
        assert!(drain_responses(&h.events_rx).is_empty());
    }

    #[test]
    fn out_of_order_seqno_is_accepted_with_warning() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(5));
        h.agent
            .handle_request(create_route("req_1", "tok-a", 10, "e1", when));
        h.agent
            .handle_request(create_route("req_2", "tok-a", 3, "e2", when));

        assert_eq!(h.agent.counters.seq_out_of_order.load(Ordering::Relaxed), 1);
        // Both entries stored; cursor follows the received value
        let mut pending = h.agent.pending_entry_ids();
        pending.sort();
        assert_eq!(pending, vec!["e1".to_string(), "e2".to_string()]);

        // A later seqno relative to the rewound cursor is in order again
        h.agent
            .handle_request(create_route("req_3", "tok-a", 4, "e3", when));
        assert_eq!(h.agent.counters.seq_out_of_order.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn invalid_entry_answers_invalid_argument() {
        let h = harness();
        let mut msg = match create_route("req_1", "tok-a", 1, "e1", h.clock.now()) {
            ScheduleRequest::CreateEntry(c) => c,
            _ => unreachable!(),
        };
        msg.kind = ActionKind::UpdateBeam; // payload stays Route
        h.agent.handle_request(ScheduleRequest::CreateEntry(msg));

        let responses = drain_responses(&h.events_rx);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, ResponseStatus::InvalidArgument);
        assert!(h.agent.pending_entry_ids().is_empty());
    }

    #[test]
    fn deleted_entry_never_executes() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(5));
        h.agent
            .handle_request(create_route("req_1", "tok-a", 1, "e1", when));
        h.agent
            .handle_request(ScheduleRequest::DeleteEntry(DeleteEntry {
                token: "tok-a".into(),
                seq_no: 2,
                entry_id: "e1".into(),
            }));
        assert!(h.agent.pending_entry_ids().is_empty());

        h.clock.advance(Duration::from_secs(10));
        h.scheduler.run_due();
        assert!(h.scenario.pkb().node("node-1").unwrap().routes.is_empty());
        assert!(drain_responses(&h.events_rx).is_empty());
    }

    #[test]
    fn finalize_prunes_exactly_up_to_cutoff() {
        let h = harness();
        let base = h.clock.now();
        for (i, secs) in [10i64, 20, 30, 40].iter().enumerate() {
            let when = base + chrono::TimeDelta::seconds(*secs);
            h.agent.handle_request(create_route(
                &format!("req_{i}"),
                "tok-a",
                i as u64 + 1,
                &format!("e{secs}"),
                when,
            ));
        }
        h.agent.handle_request(ScheduleRequest::Finalize(Finalize {
            token: "tok-a".into(),
            seq_no: 5,
            up_to: base + TimeDelta::seconds(20),
        }));

        let mut pending = h.agent.pending_entry_ids();
        pending.sort();
        // Entries at +10 and +20 pruned (when <= up_to); +30/+40 survive
        assert_eq!(pending, vec!["e30".to_string(), "e40".to_string()]);

        // The pruned entries' events were cancelled too
        h.clock.advance(Duration::from_secs(20));
        h.scheduler.run_due();
        assert!(h.scenario.pkb().node("node-1").unwrap().routes.is_empty());
    }

    #[test]
    fn duplicate_entry_id_overwrites() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(5));
        h.agent
            .handle_request(create_route("req_old", "tok-a", 1, "e1", when));

        let mut replacement = match create_route("req_new", "tok-a", 2, "e1", when) {
            ScheduleRequest::CreateEntry(c) => c,
            _ => unreachable!(),
        };
        replacement.payload = ActionPayload::Route(RouteTask {
            destination_cidr: "10.9.0.0/16".into(),
            next_hop_node_id: None,
            out_interface_id: "node-1-ku".into(),
            path: None,
            cost: 7,
            valid_until: None,
        });
        h.agent
            .handle_request(ScheduleRequest::CreateEntry(replacement));

        h.clock.advance(Duration::from_secs(5));
        h.scheduler.run_due();

        let routes = h.scenario.pkb().node("node-1").unwrap().routes;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination_cidr, "10.9.0.0/16");

        // Only the replacement answered
        let responses = drain_responses(&h.events_rx);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_id, "req_new");
    }

    #[test]
    fn reset_clears_token_and_pending() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(5));
        h.agent
            .handle_request(create_route("req_1", "tok-a", 1, "e1", when));
        h.agent.handle_request(ScheduleRequest::Reset);
        assert!(h.agent.pending_entry_ids().is_empty());

        // A new token latches after reset
        h.agent
            .handle_request(create_route("req_2", "tok-b", 1, "e2", when));
        assert_eq!(h.agent.counters.token_mismatches.load(Ordering::Relaxed), 0);
        assert_eq!(h.agent.pending_entry_ids(), vec!["e2".to_string()]);

        // The pre-reset entry's event was cancelled
        h.clock.advance(Duration::from_secs(10));
        h.scheduler.run_due();
        let routes = h.scenario.pkb().node("node-1").unwrap().routes;
        assert_eq!(routes.len(), 1, "only the post-reset entry executed");
    }

    #[test]
    fn failed_execution_answers_not_found() {
        let h = harness();
        let when = h.clock.after(Duration::from_secs(1));
        // DeleteRoute for a prefix that was never installed
        let msg = CreateEntry {
            request_id: "req_1".into(),
            token: "tok-a".into(),
            seq_no: 1,
            entry_id: "e1".into(),
            when,
            kind: ActionKind::DeleteRoute,
            payload: ActionPayload::Route(RouteTask {
                destination_cidr: "10.0.0.0/24".into(),
                next_hop_node_id: None,
                out_interface_id: "node-1-ku".into(),
                path: None,
                cost: 0,
                valid_until: None,
            }),
        };
        h.agent.handle_request(ScheduleRequest::CreateEntry(msg));

        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();

        let responses = drain_responses(&h.events_rx);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, ResponseStatus::NotFound);
        assert_eq!(h.agent.counters.actions_failed.load(Ordering::Relaxed), 1);
        // The pending entry is removed even though execution failed
        assert!(h.agent.pending_entry_ids().is_empty());
    }

    #[test]
    fn beam_actions_toggle_interface() {
        let h = harness();
        let beam = |kind, request_id: &str, seq_no, when| {
            ScheduleRequest::CreateEntry(CreateEntry {
                request_id: request_id.into(),
                token: "tok-a".into(),
                seq_no,
                entry_id: format!("e{seq_no}"),
                when,
                kind,
                payload: ActionPayload::Beam(BeamTask {
                    interface_id: "node-1-ku".into(),
                    target_node_id: Some("node-2".into()),
                }),
            })
        };

        h.agent.handle_request(beam(
            ActionKind::DeleteBeam,
            "req_1",
            1,
            h.clock.after(Duration::from_secs(1)),
        ));
        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();
        assert!(!h.scenario.nkb().interface("node-1-ku").unwrap().is_operational);

        h.agent.handle_request(beam(
            ActionKind::UpdateBeam,
            "req_2",
            2,
            h.clock.after(Duration::from_secs(1)),
        ));
        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();
        assert!(h.scenario.nkb().interface("node-1-ku").unwrap().is_operational);
    }

    #[test]
    fn sr_policies_are_agent_local() {
        let h = harness();
        let policy = SrPolicyTask {
            policy_id: "pol-1".into(),
            segments: vec!["node-2".into(), "node-3".into()],
            preference: 100,
        };
        h.agent.handle_request(ScheduleRequest::CreateEntry(CreateEntry {
            request_id: "req_1".into(),
            token: "tok-a".into(),
            seq_no: 1,
            entry_id: "e1".into(),
            when: h.clock.after(Duration::from_secs(1)),
            kind: ActionKind::SetSrPolicy,
            payload: ActionPayload::SrPolicy(policy.clone()),
        }));
        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();
        assert_eq!(h.agent.sr_policy("pol-1").unwrap().segments.len(), 2);

        h.agent.handle_request(ScheduleRequest::CreateEntry(CreateEntry {
            request_id: "req_2".into(),
            token: "tok-a".into(),
            seq_no: 2,
            entry_id: "e2".into(),
            when: h.clock.after(Duration::from_secs(1)),
            kind: ActionKind::DeleteSrPolicy,
            payload: ActionPayload::SrPolicy(policy),
        }));
        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();
        assert!(h.agent.sr_policy("pol-1").is_none());
    }

    #[test]
    fn hello_emitted_on_start() {
        let h = harness();
        h.agent.start();
        let hello = h.events_rx.try_iter().find_map(|event| match event {
            AgentEvent::Hello(hello) => Some(hello),
            _ => None,
        });
        assert_eq!(hello.unwrap().node_id, "node-1");
    }

    #[test]
    fn telemetry_integrates_bytes_and_reschedules() {
        let h = harness_with_config(AgentConfig::default());
        h.agent.start();

        // First interval: the inter-satellite link is Active/up at 1000 Mbps
        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();

        let sample = h.store.get("node-1", "node-1-ku").unwrap();
        assert!(sample.up);
        assert_eq!(sample.bytes_tx, 125_000_000); // 1000 Mbps · 1 s / 8
        assert_eq!(sample.sampled_at, h.clock.now());

        let push = h.events_rx.try_iter().find_map(|event| match event {
            AgentEvent::Telemetry(push) => Some(push),
            _ => None,
        });
        let push = push.unwrap();
        assert_eq!(push.node_id, "node-1");
        assert_eq!(push.metrics.len(), 1);

        // Second interval accumulates
        h.clock.advance(Duration::from_secs(1));
        h.scheduler.run_due();
        let sample = h.store.get("node-1", "node-1-ku").unwrap();
        assert_eq!(sample.bytes_tx, 250_000_000);
    }

    #[test]
    fn telemetry_disabled_stays_silent() {
        let h = harness_with_config(AgentConfig {
            telemetry_enabled: false,
            ..AgentConfig::default()
        });
        h.agent.start();
        h.clock.advance(Duration::from_secs(5));
        h.scheduler.run_due();
        assert!(h.store.is_empty());
    }

    #[test]
    fn shutdown_cancels_telemetry() {
        let h = harness_with_config(AgentConfig::default());
        h.agent.start();
        h.agent.shutdown();
        h.clock.advance(Duration::from_secs(5));
        h.scheduler.run_due();
        assert!(h.store.is_empty());
        assert_eq!(h.agent.counters.telemetry_samples.load(Ordering::Relaxed), 0);
    }
}
