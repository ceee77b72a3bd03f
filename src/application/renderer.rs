//! The opaque component-renderer seam.
//!
//! The engine never interprets components; the configured renderer turns one
//! into markup plus root-element attributes, and is allowed to fail.

use thiserror::Error;

use crate::domain::page::PageComponent;

use super::engine::context::RenderContext;

#[derive(Debug, Error)]
#[error("component render failed: {message}")]
pub struct RenderError {
    message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Markup produced for a single component.
#[derive(Debug, Clone, Default)]
pub struct RenderedHtml {
    pub html: String,
    /// Attributes hoisted onto the component's root container.
    pub attrs: Vec<(String, String)>,
}

/// Component → markup. A failure here is not fatal to the response: the
/// buffer substitutes an empty render for the failing unit and moves on.
pub trait ComponentRenderer: Send + Sync {
    fn render(
        &self,
        component: &dyn PageComponent,
        ctx: &RenderContext,
    ) -> Result<RenderedHtml, RenderError>;
}
