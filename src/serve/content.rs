//! Conditional and range request planning.
//!
//! Both servers answer with the same rules: validators first
//! (`If-None-Match`, then `If-Modified-Since`), then a single byte range.
//! Everything here is a pure function of the request headers and the
//! file's metadata, so it can be tested without a socket.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format used by `Last-Modified` and `If-Modified-Since`.
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Request headers that influence what part of a file is sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conditions<'a> {
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub range: Option<&'a str>,
}

/// What to send for a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// 304, no body.
    NotModified,
    /// 200 with the whole file.
    Full,
    /// 206 with bytes `start..=end`.
    Partial { start: u64, end: u64 },
    /// 416 with `Content-Range: bytes */<size>`.
    Unsatisfiable,
}

pub fn plan(
    cond: &Conditions<'_>,
    etag: Option<&str>,
    modified: Option<SystemTime>,
    size: u64,
) -> Plan {
    if is_not_modified(cond, etag, modified) {
        return Plan::NotModified;
    }
    match cond.range {
        Some(range) => parse_range(range, size),
        None => Plan::Full,
    }
}

fn is_not_modified(
    cond: &Conditions<'_>,
    etag: Option<&str>,
    modified: Option<SystemTime>,
) -> bool {
    // If-None-Match takes precedence; If-Modified-Since is ignored when present
    if let Some(inm) = cond.if_none_match {
        return etag.is_some_and(|etag| etag_matches(inm, etag));
    }

    let (Some(ims), Some(modified)) = (cond.if_modified_since, modified) else {
        return false;
    };
    let Some(since) = parse_http_date(ims) else {
        return false;
    };
    // Header dates carry whole seconds only
    unix_seconds(modified) <= since.timestamp()
}

/// Weak comparison of `etag` against an `If-None-Match` list.
fn etag_matches(header: &str, etag: &str) -> bool {
    let etag = strip_weak(etag);
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || strip_weak(candidate) == etag
    })
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Parse a `Range` header. Only one `bytes=` range is honored; lists and
/// malformed values fall back to the full body.
fn parse_range(header: &str, size: u64) -> Plan {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return Plan::Full;
    };
    if spec.contains(',') {
        return Plan::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return Plan::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    // "-500" - last 500 bytes
    if first.is_empty() {
        let Ok(suffix) = last.parse::<u64>() else {
            return Plan::Full;
        };
        if suffix == 0 || size == 0 {
            return Plan::Unsatisfiable;
        }
        return Plan::Partial {
            start: size - suffix.min(size),
            end: size - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return Plan::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return Plan::Full,
        }
    };

    if start >= size {
        return Plan::Unsatisfiable;
    }
    Plan::Partial {
        start,
        end: end.map_or(size - 1, |end| end.min(size - 1)),
    }
}

/// `Last-Modified` value for `time`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE).to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, HTTP_DATE)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_secs()).unwrap_or(i64::MAX),
    }
}
