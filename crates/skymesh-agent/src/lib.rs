//! Skymesh southbound runtime.
//!
//! One simulated agent per network node:
//! - **Action model** — validated scheduled-action records
//! - **Agent** — token/seqno discipline, pending table, action execution
//! - **Telemetry** — per-interface sample derivation and the self-rescheduling
//!   telemetry loop
//! - **Store** — last-known metrics per `(node, interface)`

pub mod action;
pub mod agent;
pub mod store;
pub mod telemetry;

pub use agent::{AgentConfig, SimAgent};
pub use store::TelemetryStore;
