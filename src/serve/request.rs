//! The parts of an HTTP request the handlers look at.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use tiny_http::{Method, Request};

use super::content::Conditions;

/// Decoded path plus headers, detached from the connection so handlers
/// stay pure functions of it.
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    /// Percent-decoded path without the query string.
    pub path: String,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn new(url: &str) -> Self {
        Self {
            path: decode_path(url),
            headers: Vec::new(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        let mut head = Self::new(request.url());
        head.headers = request
            .headers()
            .iter()
            .map(|h| (h.field.as_str().as_str().to_string(), h.value.as_str().to_string()))
            .collect();
        head
    }

    #[cfg(test)]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn conditions(&self) -> Conditions<'_> {
        Conditions {
            if_none_match: self.header("If-None-Match"),
            if_modified_since: self.header("If-Modified-Since"),
            range: self.header("Range"),
        }
    }

    /// Whether `Accept-Encoding` lets us send the gzip companion.
    ///
    /// Any token starting with `gzip` or `*` counts, whatever its q-value.
    pub fn accepts_gzip(&self) -> bool {
        self.header("Accept-Encoding").is_some_and(|value| {
            value
                .split(',')
                .map(str::trim)
                .any(|e| e.starts_with("gzip") || e.starts_with('*'))
        })
    }
}

/// Only GET and HEAD are served.
pub fn is_allowed(method: &Method) -> bool {
    matches!(method, Method::Get | Method::Head)
}

/// Strip the query string and percent-decode the path.
fn decode_path(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    percent_decode_str(path)
        .decode_utf8()
        .map(Cow::into_owned)
        .unwrap_or_else(|_| path.to_string())
}
