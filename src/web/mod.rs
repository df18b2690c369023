//! HTTP surface served with `may_minihttp`.
//!
//! `GET /` renders the overview page, `GET /api/snapshot` returns the same
//! data as JSON and `GET /metrics` exposes Prometheus metrics. Form posts
//! redirect to `/` on success and re-render the page with a message when a
//! business rule rejects them.

pub mod action;
pub mod form;
pub mod render;
pub mod service;

pub use render::PageRenderer;
pub use service::{BankService, Reply};

use crate::bank::BloodBank;
use may_minihttp::HttpServer;
use std::io;
use std::sync::Arc;

/// Serve until the listener fails.
pub fn serve(bank: Arc<BloodBank>, listen_addr: &str) -> io::Result<()> {
    let renderer = PageRenderer::new()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("page template: {e}")))?;
    let server = HttpServer(BankService::new(bank, Arc::new(renderer))).start(listen_addr)?;
    log::info!("blood bank listening on {listen_addr}");
    server
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "HTTP server coroutine panicked"))
}
