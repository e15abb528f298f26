// Task identifier generation

use uuid::Uuid;

/// Fresh task id
///
/// UUID v7: time-ordered prefix plus random bits, so ids sort roughly by
/// creation but nothing depends on that.
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Trailing characters of an id, enough to tell tasks apart on screen
pub fn short_id(id: &str) -> &str {
    let start = id.len().saturating_sub(8);
    id.get(start..).unwrap_or(id)
}
