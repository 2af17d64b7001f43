//! Shared types for the Skymesh constellation simulator.
//!
//! This crate contains:
//! - **Protocol messages** — southbound message shapes between controller and node agents
//! - **Data models** — interface metrics, link counts, response statuses
//! - **ID generation** — prefixed UUIDv7 helpers (`req_`, `srq_`, `win_`)
//! - **Metrics rendering** — Prometheus text exposition for scrape endpoints

pub mod ids;
pub mod metrics;
pub mod models;
pub mod protocol;
