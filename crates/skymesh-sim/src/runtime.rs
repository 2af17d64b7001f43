//! Runtime assembly and main loop.
//!
//! Builds every component from the resolved configuration, starts the
//! agents, and drives the tick loop in the required order: clock advance →
//! scenario tick (motion, position bridge, connectivity) → due events →
//! replanning hooks → agent event drain. Panics inside a tick stage are
//! caught at the tick boundary so one bad callback cannot kill the loop.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use skymesh_agent::{AgentConfig, SimAgent, TelemetryStore};
use skymesh_common::models::LinkCounts;
use skymesh_common::protocol::{ActionResponse, AgentEvent};
use skymesh_control::{recompute_contact_windows, DirectLinkPlanner, ServiceRequestDispatcher};
use skymesh_core::clock::{ClockMode, SimClock};
use skymesh_core::connectivity::EngineConfig;
use skymesh_core::events::EventScheduler;
use skymesh_core::kb::network::NetworkKb;
use skymesh_core::kb::physical::PhysicalKb;
use skymesh_core::loader;
use skymesh_core::motion::MotionModel;
use skymesh_core::scenario::ScenarioState;

use crate::config::SimConfig;

/// What one tick produced, for logging and tests.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub sim_time: DateTime<Utc>,
    pub counts: LinkCounts,
    pub responses: Vec<ActionResponse>,
}

pub struct SimRuntime {
    config: SimConfig,
    clock: Arc<SimClock>,
    scheduler: Arc<EventScheduler>,
    scenario: Arc<ScenarioState>,
    store: Arc<TelemetryStore>,
    agents: HashMap<String, Arc<SimAgent>>,
    dispatcher: ServiceRequestDispatcher,
    events_rx: crossbeam_channel::Receiver<AgentEvent>,
    next_replan: Mutex<DateTime<Utc>>,
}

impl SimRuntime {
    /// Build the full runtime: load catalog and scenario, wire the stores,
    /// and create one agent per network node.
    pub fn build(config: SimConfig, start: DateTime<Utc>) -> anyhow::Result<Self> {
        let mode = if config.accelerated {
            ClockMode::Accelerated
        } else {
            ClockMode::RealTime
        };
        let clock = Arc::new(SimClock::new(start, mode));
        let scheduler = Arc::new(EventScheduler::new(clock.clone()));

        let pkb = Arc::new(PhysicalKb::new());
        let nkb = Arc::new(NetworkKb::new());
        let motion = Arc::new(MotionModel::new());

        if let Some(path) = &config.catalog_path {
            let models = loader::load_catalog_file(path, &nkb)?;
            tracing::info!(path = %path.display(), models, "transceiver catalog loaded");
        }
        if let Some(path) = &config.scenario_path {
            let summary = loader::load_scenario_file(path, &pkb, &nkb, &motion)?;
            tracing::info!(
                path = %path.display(),
                nodes = summary.nodes,
                interfaces = summary.interfaces,
                links = summary.links,
                "scenario loaded"
            );
        }

        let scenario = Arc::new(ScenarioState::new(
            pkb,
            nkb,
            motion,
            EngineConfig {
                min_elevation_deg: config.min_elevation_deg,
                ..EngineConfig::default()
            },
        ));

        let store = Arc::new(TelemetryStore::new());
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let agent_config = AgentConfig {
            telemetry_interval: config.telemetry_interval,
            telemetry_enabled: config.telemetry_enabled,
        };
        let mut agents = HashMap::new();
        for node in scenario.pkb().nodes() {
            let agent = SimAgent::new(
                node.id.clone(),
                scenario.clone(),
                clock.clone(),
                scheduler.clone(),
                store.clone(),
                events_tx.clone(),
                agent_config.clone(),
            );
            agents.insert(node.id, agent);
        }

        let planner = Arc::new(DirectLinkPlanner::new(config.route_prefixes.clone()));
        let dispatcher = ServiceRequestDispatcher::new(scenario.clone(), agents.clone(), planner);

        let next_replan = start;
        Ok(SimRuntime {
            config,
            clock,
            scheduler,
            scenario,
            store,
            agents,
            dispatcher,
            events_rx,
            next_replan: Mutex::new(next_replan),
        })
    }

    pub fn clock(&self) -> &Arc<SimClock> {
        &self.clock
    }

    pub fn scenario(&self) -> &Arc<ScenarioState> {
        &self.scenario
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn agent(&self, node_id: &str) -> Option<&Arc<SimAgent>> {
        self.agents.get(node_id)
    }

    /// Announce every agent and start their telemetry loops.
    pub fn start_agents(&self) {
        for agent in self.agents.values() {
            agent.start();
        }
        tracing::info!(agents = self.agents.len(), "agents started");
    }

    /// One full simulation tick.
    pub fn tick(&self) -> TickReport {
        let now = self.clock.advance(self.config.tick_interval);

        // Connectivity must settle before any due event fires so actions see
        // post-evaluation link state.
        let counts = self.scenario.tick(now);

        if catch_unwind(AssertUnwindSafe(|| self.scheduler.run_due())).is_err() {
            tracing::error!("scheduler callback panicked; continuing tick");
        }

        let replan_due = {
            let mut next = self.next_replan.lock().unwrap_or_else(|e| e.into_inner());
            if now >= *next {
                *next = now
                    + chrono::TimeDelta::from_std(self.config.replan_interval).unwrap_or_default();
                true
            } else {
                false
            }
        };
        if replan_due {
            let windows =
                recompute_contact_windows(self.scenario.nkb(), now, self.config.replan_interval);
            tracing::debug!(windows = windows.len(), "replanning pass");
            if catch_unwind(AssertUnwindSafe(|| {
                self.dispatcher.schedule_service_requests(now)
            }))
            .is_err()
            {
                tracing::error!("service request scheduling panicked; continuing");
            }
        }

        let mut responses = Vec::new();
        for event in self.events_rx.try_iter() {
            match event {
                AgentEvent::Hello(hello) => {
                    tracing::info!(node_id = %hello.node_id, "agent hello");
                }
                AgentEvent::Response(response) => {
                    self.dispatcher.handle_response(&response, now);
                    responses.push(response);
                }
                AgentEvent::Telemetry(push) => {
                    tracing::trace!(
                        node_id = %push.node_id,
                        interfaces = push.metrics.len(),
                        "telemetry push"
                    );
                }
            }
        }

        TickReport {
            sim_time: now,
            counts,
            responses,
        }
    }

    /// Drive the loop until the shutdown signal flips. Real-time mode paces
    /// on the wall clock; accelerated mode only yields between ticks.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        tracing::info!(
            mode = ?self.clock.mode(),
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "simulation loop starting"
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.clock.mode() {
                ClockMode::RealTime => {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = ticker.tick() => {
                            self.tick();
                        }
                    }
                }
                ClockMode::Accelerated => {
                    self.tick();
                    tokio::task::yield_now().await;
                }
            }
        }
        self.shutdown();
    }

    /// Stop agents, discard remaining events.
    pub fn shutdown(&self) {
        for agent in self.agents.values() {
            agent.shutdown();
        }
        self.scheduler.clear();
        tracing::info!("simulation loop stopped");
    }

    /// Prometheus text for the scrape endpoint.
    pub fn render_metrics(&self) -> String {
        skymesh_common::metrics::render_prometheus(&self.store.all(), &self.scenario.last_counts())
    }
}
