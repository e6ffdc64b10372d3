//! Query-string and response shapes of the public API.
//!
//! Query values are accepted as raw strings so that malformed values fall back to their
//! defaults instead of rejecting the request.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub const DEFAULT_LIST_LIMIT: u32 = 15;
pub const DEFAULT_SIMILAR_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQueryParams {
    pub date: Option<String>,
    pub limit: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RealtimeQueryParams {
    pub limit: Option<String>,
    pub rt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct MaxIdResponse {
    pub max: u64,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: &'static str,
}

/// Parse `raw` as a limit, falling back to `default`, then clamp to `1..=MAX_LIMIT`.
pub fn resolve_limit(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
        .clamp(1, MAX_LIMIT)
}

/// RFC 3339 cursor; anything missing or unparsable means "now".
pub fn resolve_cursor(raw: Option<&str>, now: OffsetDateTime) -> OffsetDateTime {
    raw.and_then(|value| OffsetDateTime::parse(value.trim(), &Rfc3339).ok())
        .unwrap_or(now)
}

pub fn split_search_terms(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Only a case-insensitive `true` selects realtime groups; absence defaults to true.
pub fn resolve_realtime(raw: Option<&str>) -> bool {
    raw.map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn limits_default_and_clamp() {
        assert_eq!(resolve_limit(None, DEFAULT_LIST_LIMIT), 15);
        assert_eq!(resolve_limit(Some("abc"), DEFAULT_LIST_LIMIT), 15);
        assert_eq!(resolve_limit(Some("-3"), DEFAULT_SIMILAR_LIMIT), 10);
        assert_eq!(resolve_limit(Some("0"), DEFAULT_LIST_LIMIT), 1);
        assert_eq!(resolve_limit(Some("5000"), DEFAULT_LIST_LIMIT), 100);
        assert_eq!(resolve_limit(Some("42"), DEFAULT_LIST_LIMIT), 42);
    }

    #[test]
    fn cursor_falls_back_to_now() {
        let now = datetime!(2024-05-01 12:00 UTC);
        assert_eq!(resolve_cursor(None, now), now);
        assert_eq!(resolve_cursor(Some("yesterday"), now), now);
        assert_eq!(
            resolve_cursor(Some("2024-04-30T08:30:00+02:00"), now),
            datetime!(2024-04-30 06:30 UTC)
        );
    }

    #[test]
    fn search_terms_split_on_commas() {
        assert_eq!(
            split_search_terms(Some("central bank, rates ,,")),
            vec!["central bank".to_string(), "rates".to_string()]
        );
        assert!(split_search_terms(None).is_empty());
        assert!(split_search_terms(Some(" , ")).is_empty());
    }

    #[test]
    fn realtime_flag_defaults_to_true() {
        assert!(resolve_realtime(None));
        assert!(resolve_realtime(Some("TRUE")));
        assert!(!resolve_realtime(Some("false")));
        assert!(!resolve_realtime(Some("yes")));
    }
}
