//! Skymesh simulation core.
//!
//! The tick-driven heart of the constellation simulator:
//! - **Geometry** — ECEF vector math, Earth-occlusion line-of-sight, elevation
//! - **Knowledge bases** — physical (platforms, nodes; metres) and network
//!   (interfaces, transceivers, links, node positions; kilometres)
//! - **Motion model** — per-platform propagator selection and batch updates
//! - **Connectivity engine** — per-tick dynamic-link rebuild and evaluation
//! - **Clock & events** — simulated wall-clock and time-ordered callback queue
//! - **Scenario state** — façade over the knowledge bases orchestrating tick
//!   side effects and holding service requests
//! - **Loaders** — scenario and transceiver-catalog JSON ingestion

pub mod clock;
pub mod connectivity;
pub mod events;
pub mod geometry;
pub mod kb;
pub mod loader;
pub mod motion;
pub mod scenario;
