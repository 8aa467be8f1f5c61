//! Identifier and time helpers shared by every component that needs a
//! fresh id or a timestamp (task ids, checkpoint ids, trace entries,
//! sub-agent session ids).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a fresh, globally-unique identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a fresh identifier with a readable prefix, e.g. `task-<uuid>`.
pub fn new_prefixed_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Current wall-clock time in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
