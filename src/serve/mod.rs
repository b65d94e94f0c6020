//! HTTP asset server.
//!
//! Two handlers share one request loop:
//!
//! | Handler          | Source of truth              | Caching headers              |
//! |------------------|------------------------------|------------------------------|
//! | `StaticHandler`  | manifest written by `build`  | digest ETag, manifest mtime  |
//! | `DynamicHandler` | source tree, compiled lazily | `Cache-Control: no-cache`    |
//!
//! Requests run on a small thread pool so one slow compile does not block
//! other requests. There is no lock between requests; the output tree is
//! only ever mutated by renames.

mod content;
mod dynamic;
mod lifecycle;
mod request;
mod response;
mod static_server;

pub use dynamic::DynamicHandler;
pub use static_server::StaticHandler;

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use request::RequestHead;
use response::Reply;
use tiny_http::{Request, Server};

use crate::{debug, log};

/// Worker threads answering requests.
const REQUEST_THREADS: usize = 4;

/// Turns a request into a reply without touching the connection.
pub trait Handler: Send + Sync {
    fn handle(&self, head: &RequestHead) -> Reply;
}

/// Bind `interface:port` (or the next free port) and serve until Ctrl+C.
pub fn serve(handler: Arc<dyn Handler>, interface: IpAddr, port: u16) -> Result<()> {
    let (server, addr) = lifecycle::bind_with_retry(interface, port)?;
    let server = Arc::new(server);
    crate::core::register_server(Arc::clone(&server));

    log!("serve"; "http://{}", addr);
    run_request_loop(&server, &handler)
}

fn run_request_loop(server: &Server, handler: &Arc<dyn Handler>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .thread_name(|i| format!("sluice-http-{i}"))
        .build()?;

    for request in server.incoming_requests() {
        let handler = Arc::clone(handler);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, handler.as_ref()) {
                log!("serve"; "request error: {e:#}");
            }
        });
    }
    Ok(())
}

fn handle_request(request: Request, handler: &dyn Handler) -> Result<()> {
    if crate::core::is_shutdown() {
        return response::send(request, Reply::status(503, "503 Service Unavailable"));
    }

    let head = RequestHead::from_request(&request);
    let reply = if request::is_allowed(request.method()) {
        handler.handle(&head)
    } else {
        Reply::method_not_allowed()
    };

    debug!("serve"; "{} {} -> {}", request.method(), head.path, reply.status);
    response::send(request, reply)
}
