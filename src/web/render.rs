//! Server-rendered overview page.
//!
//! The page is a handlebars template over the [`Snapshot`]; values are
//! HTML-escaped by the template engine.

use crate::model::Snapshot;
use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

const PAGE: &str = "page";
const PAGE_TEMPLATE: &str = include_str!("templates/page.hbs");
const BUTTON_PARTIAL: &str = include_str!("templates/button.hbs");

#[derive(Serialize)]
struct PageContext<'a> {
    message: Option<&'a str>,
    snapshot: &'a Snapshot,
}

/// Compiled page templates, built once per server.
pub struct PageRenderer {
    handlebars: Handlebars<'static>,
}

impl PageRenderer {
    /// # Errors
    ///
    /// Returns `TemplateError` if a bundled template does not parse.
    pub fn new() -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.register_partial("button", BUTTON_PARTIAL)?;
        handlebars.register_template_string(PAGE, PAGE_TEMPLATE)?;
        Ok(Self { handlebars })
    }

    /// Render the page. `message` is shown above everything else.
    pub fn page(&self, snapshot: &Snapshot, message: Option<&str>) -> Result<String, RenderError> {
        let context = PageContext {
            message: message.filter(|m| !m.is_empty()),
            snapshot,
        };
        self.handlebars.render(PAGE, &context)
    }
}
