// Calendar date normalization

use chrono::{NaiveDate, Utc};
use tracing::warn;

/// Canonical storage format
pub const ISO_FORMAT: &str = "%Y-%m-%d";

/// Format shown to and typed by users
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Current UTC calendar date, the same day `createdAt` timestamps carry
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Normalize a user-entered date
///
/// Accepts `yyyy-MM-dd` and `dd/MM/yyyy` (day and month may be unpadded).
/// Empty input means `today`; anything unparseable also falls back to `today`.
pub fn parse_input_date(input: &str, today: NaiveDate) -> NaiveDate {
    let input = input.trim();
    if input.is_empty() {
        return today;
    }

    let parsed = if input.contains('-') {
        NaiveDate::parse_from_str(input, ISO_FORMAT)
    } else {
        NaiveDate::parse_from_str(input, DISPLAY_FORMAT)
    };

    match parsed {
        Ok(date) => date,
        Err(e) => {
            warn!(input, error = %e, "Unparseable date, using today");
            today
        }
    }
}

/// Date portion of an ISO-8601 timestamp such as `2024-01-01T10:00:00.000Z`
pub fn date_of_timestamp(timestamp: &str) -> Option<NaiveDate> {
    let day = timestamp.split('T').next()?;
    NaiveDate::parse_from_str(day, ISO_FORMAT).ok()
}

pub fn format_display(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}
