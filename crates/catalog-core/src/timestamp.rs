//! The one text form timestamps take in storage and in bound filter operands.
//!
//! UTC with exactly nine fractional digits, so that lexical order in SQLite
//! matches chronological order.

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Render `value` in UTC with a fixed-width nanosecond fraction.
///
/// # Errors
/// Returns an error when the instant cannot be formatted (years outside 0..=9999).
pub fn format_timestamp(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value.to_offset(UtcOffset::UTC).format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    ))
}
