//! Payload rendering.
//!
//! A renderer is a pure function from a request's structured data to the
//! final [`RenderedPayload`]. One renderer exists per [`NotificationKind`],
//! and the [`RendererRegistry`] looks them up by tag:
//!
//! ```ignore
//! let registry = RendererRegistry::builtin()?;
//!
//! let payload = registry.render(
//!     &NotificationKind::budget_alert(),
//!     &json!({
//!         "userName": "Asha",
//!         "percentageUsed": 85,
//!         "budgetAmount": 400000,
//!         "totalExpenses": 340000
//!     }),
//! )?;
//! ```
//!
//! Render failures are never retried: malformed input stays malformed.

mod budget_alert;
mod format;
mod monthly_report;

use std::collections::HashMap;
use std::sync::Arc;

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

use crate::notification::{NotificationKind, RenderedPayload};

pub use budget_alert::BudgetAlertRenderer;
pub use format::format_inr;
pub use monthly_report::MonthlyReportRenderer;

/// Rendering failure. Always permanent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("No renderer registered for kind '{0}'")]
    UnknownKind(String),

    #[error("Invalid data for '{kind}': {message}")]
    InvalidData { kind: String, message: String },

    #[error("Template '{template}' failed: {message}")]
    Template { template: String, message: String },
}

impl RenderError {
    pub(crate) fn invalid_data(kind: &str, message: impl ToString) -> Self {
        Self::InvalidData {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }
}

/// Turns the data of one notification kind into a payload
pub trait Renderer: Send + Sync {
    /// Kind this renderer handles
    fn kind(&self) -> NotificationKind;

    /// Render the payload. Must be deterministic and side-effect free.
    fn render(&self, data: &serde_json::Value) -> Result<RenderedPayload, RenderError>;
}

/// Lookup of renderers keyed by notification kind
#[derive(Default, Clone)]
pub struct RendererRegistry {
    renderers: HashMap<NotificationKind, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `monthly_report` and `budget_alert` renderers
    pub fn builtin() -> Result<Self, RenderError> {
        let mut registry = Self::new();
        registry.register(Arc::new(MonthlyReportRenderer::new()?));
        registry.register(Arc::new(BudgetAlertRenderer::new()?));
        Ok(registry)
    }

    /// Register a renderer, replacing any previous one for the same kind
    pub fn register(&mut self, renderer: Arc<dyn Renderer>) -> &mut Self {
        let kind = renderer.kind();
        if self.renderers.insert(kind.clone(), renderer).is_some() {
            tracing::debug!(kind = %kind, "Replaced renderer");
        }
        self
    }

    /// Whether a renderer exists for the kind
    pub fn supports(&self, kind: &NotificationKind) -> bool {
        self.renderers.contains_key(kind)
    }

    /// Registered kinds, sorted by tag
    pub fn kinds(&self) -> Vec<NotificationKind> {
        let mut kinds: Vec<_> = self.renderers.keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }

    /// Render data with the renderer registered for `kind`
    pub fn render(
        &self,
        kind: &NotificationKind,
        data: &serde_json::Value,
    ) -> Result<RenderedPayload, RenderError> {
        let renderer = self
            .renderers
            .get(kind)
            .ok_or_else(|| RenderError::UnknownKind(kind.to_string()))?;

        renderer.render(data)
    }
}

/// An HTML template and its plain-text sibling, registered under one name.
///
/// HTML output is escaped; the text output is not.
pub(crate) struct TemplateSet {
    name: &'static str,
    html: Handlebars<'static>,
    text: Handlebars<'static>,
}

impl TemplateSet {
    pub(crate) fn new(
        name: &'static str,
        html_source: &str,
        text_source: &str,
    ) -> Result<Self, RenderError> {
        let mut html = Handlebars::new();
        html.set_strict_mode(true);
        html.register_template_string(name, html_source)
            .map_err(|e| RenderError::Template {
                template: format!("{}.html", name),
                message: e.to_string(),
            })?;

        let mut text = Handlebars::new();
        text.set_strict_mode(true);
        text.register_escape_fn(handlebars::no_escape);
        text.register_template_string(name, text_source)
            .map_err(|e| RenderError::Template {
                template: format!("{}.txt", name),
                message: e.to_string(),
            })?;

        Ok(Self { name, html, text })
    }

    /// Render both bodies with the same context
    pub(crate) fn render<T: Serialize>(
        &self,
        context: &T,
    ) -> Result<(String, String), RenderError> {
        let html = self
            .html
            .render(self.name, context)
            .map_err(|e| RenderError::Template {
                template: format!("{}.html", self.name),
                message: e.to_string(),
            })?;

        let text = self
            .text
            .render(self.name, context)
            .map_err(|e| RenderError::Template {
                template: format!("{}.txt", self.name),
                message: e.to_string(),
            })?;

        Ok((html, text))
    }
}
