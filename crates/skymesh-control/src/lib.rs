//! Skymesh controller shim.
//!
//! The two replanning hooks the main loop calls on its replanning interval:
//! - **Windows** — contact-window recompute over NKB state (read-only)
//! - **Dispatch** — turning outstanding service requests into southbound
//!   `CreateEntry` streams toward the right agent

pub mod dispatch;
pub mod windows;

pub use dispatch::{DirectLinkPlanner, RoutePlanner, ServiceRequestDispatcher};
pub use windows::{recompute_contact_windows, ContactWindow};
