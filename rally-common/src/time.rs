// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! A module that provides common functions for timestamps.

use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Retrieves the current timestamp, at UTC.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Retrieves the current unix timestamp in seconds.
pub fn unix_now_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Produces an RFC 3339 `String` from a timestamp; UTC timestamps end with `Z`.
pub fn format_rfc3339(timestamp: &OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_else(|_| timestamp.to_string())
}

/// Parses an RFC 3339 `String` into a timestamp.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(value, &Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;

    use time::macros::datetime;

    #[test]
    fn utc_formats_with_trailing_z() {
        let formatted = format_rfc3339(&datetime!(2023-04-01 10:30:00 UTC));

        assert_eq!(formatted, "2023-04-01T10:30:00Z");
    }

    #[test]
    fn round_trip() {
        let timestamp = datetime!(2023-04-01 10:30:00 UTC);

        assert_eq!(parse_rfc3339(&format_rfc3339(&timestamp)).unwrap(), timestamp);
    }
}
