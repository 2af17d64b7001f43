//! Prefixed ID generation.
//!
//! All generated IDs use a `prefix_` followed by a UUIDv7 (time-ordered).
//! This makes IDs globally unique, sortable by creation time, and instantly
//! identifiable by type when reading logs.

use uuid::Uuid;

/// Generate a prefixed ID using UUIDv7.
fn prefixed_id(prefix: &str) -> String {
    let id = Uuid::now_v7();
    format!("{}_{}", prefix, id.as_simple())
}

/// Generate a controller request ID: `req_<uuid7>`
pub fn request_id() -> String {
    prefixed_id("req")
}

/// Generate a service request ID: `srq_<uuid7>`
pub fn service_request_id() -> String {
    prefixed_id("srq")
}

/// Generate a contact window ID: `win_<uuid7>`
pub fn window_id() -> String {
    prefixed_id("win")
}

/// Generate a schedule-manipulation token: `tok_<uuid7>`
pub fn schedule_token() -> String {
    prefixed_id("tok")
}
