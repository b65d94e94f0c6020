//! Handler replies and their conversion into tiny_http responses.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tiny_http::{Header, Request, Response, StatusCode};

use super::content::{Conditions, Plan, http_date, plan};
use crate::utils::mime::{self, types::PLAIN};

/// What a handler wants sent back.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Body,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Body {
    Empty,
    Text(String),
    /// `len` bytes of `path` starting at `start`.
    File { path: PathBuf, start: u64, len: u64 },
}

/// A file on disk together with the validators it is served with.
pub struct FileReply<'a> {
    /// File whose bytes are sent (possibly a `.gz` companion).
    pub path: &'a Path,
    /// Public name, used for the content type.
    pub name: &'a Path,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub etag: Option<String>,
}

impl Reply {
    pub fn status(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", PLAIN.to_string())],
            body: Body::Text(message.to_string()),
        }
    }

    pub fn not_found() -> Self {
        Self::status(404, "404 Not Found")
    }

    pub fn internal_error() -> Self {
        Self::status(500, "500 Internal Server Error")
    }

    pub fn method_not_allowed() -> Self {
        Self::status(405, "405 Method Not Allowed").with_header("Allow", "GET, HEAD")
    }

    /// Serve a file, honoring conditional and range headers.
    pub fn file(file: FileReply<'_>, cond: &Conditions<'_>) -> Self {
        let mut headers = vec![
            ("Content-Type", mime::for_served(file.name).to_string()),
            ("Accept-Ranges", "bytes".to_string()),
        ];
        if let Some(modified) = file.modified {
            headers.push(("Last-Modified", http_date(modified)));
        }
        if let Some(etag) = &file.etag {
            headers.push(("ETag", etag.clone()));
        }

        let whole = Body::File {
            path: file.path.to_path_buf(),
            start: 0,
            len: file.size,
        };

        match plan(cond, file.etag.as_deref(), file.modified, file.size) {
            Plan::Full => Self {
                status: 200,
                headers,
                body: whole,
            },
            Plan::Partial { start, end } => {
                headers.push(("Content-Range", format!("bytes {start}-{end}/{}", file.size)));
                Self {
                    status: 206,
                    headers,
                    body: Body::File {
                        path: file.path.to_path_buf(),
                        start,
                        len: end - start + 1,
                    },
                }
            }
            Plan::NotModified => {
                headers.retain(|(name, _)| *name != "Content-Type");
                Self {
                    status: 304,
                    headers,
                    body: Body::Empty,
                }
            }
            Plan::Unsatisfiable => {
                headers.push(("Content-Range", format!("bytes */{}", file.size)));
                Self {
                    status: 416,
                    headers,
                    body: Body::Empty,
                }
            }
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Read the body into memory.
    #[cfg(test)]
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            Body::Empty => Vec::new(),
            Body::Text(text) => text.clone().into_bytes(),
            Body::File { path, start, len } => {
                let mut out = Vec::new();
                open_at(path, *start)
                    .unwrap()
                    .take(*len)
                    .read_to_end(&mut out)
                    .unwrap();
                out
            }
        }
    }
}

/// Write `reply` to the connection. HEAD bodies are dropped by tiny_http.
pub fn send(request: Request, reply: Reply) -> Result<()> {
    let status = StatusCode(reply.status);
    let headers: Vec<Header> = reply
        .headers
        .iter()
        .filter_map(|(name, value)| Header::from_bytes(*name, value.as_bytes()).ok())
        .collect();

    match reply.body {
        Body::Empty => {
            request.respond(Response::new(status, headers, io::empty(), Some(0), None))?;
        }
        Body::Text(text) => {
            let len = text.len();
            let data = Cursor::new(text.into_bytes());
            request.respond(Response::new(status, headers, data, Some(len), None))?;
        }
        Body::File { path, start, len } => {
            // The file can vanish between the handler's stat and here
            let file = match open_at(&path, start) {
                Ok(file) => file,
                Err(e) => {
                    send(request, Reply::internal_error())?;
                    return Err(e).with_context(|| format!("Failed to open {}", path.display()));
                }
            };
            let data = file.take(len);
            request.respond(Response::new(status, headers, data, Some(len as usize), None))?;
        }
    }
    Ok(())
}

fn open_at(path: &Path, start: u64) -> io::Result<File> {
    let mut file = File::open(path)?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))?;
    }
    Ok(file)
}
