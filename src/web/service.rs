use super::action::{self, Decoded};
use super::form::Form;
use super::render::PageRenderer;
use crate::bank::BloodBank;
use may_minihttp::{HttpService, Request, Response};
use std::io::{self, Read};
use std::sync::Arc;

/// What to send back, decided before touching the response.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// `303 See Other` to `/`
    Redirect,
    Html(u16, String),
    Json(Vec<u8>),
    Metrics(Vec<u8>),
    Text(u16, &'static str),
}

#[derive(Clone)]
pub struct BankService {
    bank: Arc<BloodBank>,
    renderer: Arc<PageRenderer>,
}

impl BankService {
    pub fn new(bank: Arc<BloodBank>, renderer: Arc<PageRenderer>) -> Self {
        Self { bank, renderer }
    }

    pub fn handle(&self, method: &str, path: &str, body: &str) -> Reply {
        let path = path.split('?').next().unwrap_or(path);
        match (method, path) {
            ("GET", "/") => self.page(200, None),
            ("GET", "/api/snapshot") => match self.bank.snapshot() {
                Ok(snapshot) => match serde_json::to_vec(&snapshot) {
                    Ok(json) => Reply::Json(json),
                    Err(e) => {
                        log::error!("snapshot serialization failed: {e}");
                        Reply::Text(500, "server error")
                    }
                },
                Err(_) => Reply::Text(500, "server error"),
            },
            ("GET", "/metrics") => metrics(),
            ("POST", path) if action::is_action_path(path) => self.post(path, body),
            (_, "/" | "/api/snapshot" | "/metrics") => Reply::Text(405, "method not allowed"),
            (_, path) if action::is_action_path(path) => Reply::Text(405, "method not allowed"),
            _ => Reply::Text(404, "not found"),
        }
    }

    fn post(&self, path: &str, body: &str) -> Reply {
        let form = Form::parse(body);
        match action::decode(path, &form) {
            Some(Decoded::Run(action)) => match action.apply(&self.bank) {
                Ok(()) => Reply::Redirect,
                Err(e) if e.is_business_rule() => self.page(200, Some(action.flash(&e))),
                Err(e) => {
                    log::error!("POST {path} failed: {e}");
                    self.page(500, Some(action.flash(&e)))
                }
            },
            Some(Decoded::Skip) => Reply::Redirect,
            Some(Decoded::Reject(message)) => self.page(200, Some(message)),
            None => Reply::Text(404, "not found"),
        }
    }

    fn page(&self, status: u16, message: Option<&str>) -> Reply {
        match self.bank.snapshot() {
            Ok(snapshot) => match self.renderer.page(&snapshot, message) {
                Ok(html) => Reply::Html(status, html),
                Err(e) => {
                    log::error!("page rendering failed: {e}");
                    Reply::Text(500, "server error")
                }
            },
            Err(_) => Reply::Text(500, "server error"),
        }
    }
}

#[cfg(feature = "metrics")]
fn metrics() -> Reply {
    match crate::metrics::render_prometheus() {
        Ok(body) => Reply::Metrics(body),
        Err(e) => {
            log::error!("failed to encode metrics: {e}");
            Reply::Text(500, "server error")
        }
    }
}

#[cfg(not(feature = "metrics"))]
fn metrics() -> Reply {
    Reply::Text(404, "not found")
}

impl HttpService for BankService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method = req.method().to_string();
        let path = req.path().to_string();
        let mut body = String::new();
        if method == "POST" {
            req.body().read_to_string(&mut body)?;
        }
        log::debug!("{method} {path}");
        write_reply(self.handle(&method, &path, &body), res);
        Ok(())
    }
}

fn write_reply(reply: Reply, res: &mut Response) {
    match reply {
        Reply::Redirect => {
            res.status_code(303, "See Other");
            res.header("Location: /");
        }
        Reply::Html(status, html) => {
            res.status_code(status as usize, reason(status));
            res.header("Content-Type: text/html; charset=utf-8");
            res.body_vec(html.into_bytes());
        }
        Reply::Json(json) => {
            res.header("Content-Type: application/json");
            res.body_vec(json);
        }
        Reply::Metrics(body) => {
            res.header("Content-Type: text/plain; version=0.0.4; charset=utf-8");
            res.body_vec(body);
        }
        Reply::Text(status, text) => {
            res.status_code(status as usize, reason(status));
            res.header("Content-Type: text/plain; charset=utf-8");
            res.body(text);
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        303 => "See Other",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}
