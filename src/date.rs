//! The publishing calendar. Every date the publisher writes (sitemap
//! `lastmod`, run log keys, index entries, topic seeds) is a calendar date in
//! a fixed UTC+05:30 offset, regardless of the host's timezone, so that runs on
//! different infrastructure agree on what "today" is.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// UTC+05:30 in seconds.
const OFFSET_SECONDS: i64 = 5 * 60 * 60 + 30 * 60;

/// Returns the publishing date for the instant `now`.
pub fn publishing_date(now: DateTime<Utc>) -> NaiveDate {
    (now.naive_utc() + Duration::seconds(OFFSET_SECONDS)).date()
}

/// Formats `date` as an ISO 8601 calendar date (`YYYY-MM-DD`).
pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
