//! Skymesh simulator runtime assembly.
//!
//! Wires the simulation core, agents, and controller shim into one process:
//! configuration resolution, the per-tick main loop, and the Prometheus
//! scrape endpoint.

pub mod config;
pub mod metrics;
pub mod runtime;

pub use config::{Cli, SimConfig};
pub use runtime::{SimRuntime, TickReport};
