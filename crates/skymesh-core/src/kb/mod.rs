//! Knowledge bases.
//!
//! Two stores with a deliberate unit split:
//! - [`physical::PhysicalKb`] — platforms and network nodes, coordinates in
//!   **metres**
//! - [`network::NetworkKb`] — interfaces, transceivers, links, and per-node
//!   positions in **kilometres**
//!
//! The scenario state owns the metre→kilometre bridge; callers of either KB
//! must not assume the other's unit.

pub mod network;
pub mod physical;

use thiserror::Error;

/// Typed errors surfaced by knowledge-base mutators.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KbError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl KbError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        KbError::NotFound {
            kind,
            id: id.into(),
        }
    }
}
