use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod match_state;
pub mod sim;
pub mod sse;
pub mod validation;
pub mod visit;

/// Format a timestamp as RFC 3339 for wire payloads.
pub fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
