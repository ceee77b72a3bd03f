//! The resolved-page contract consumed by the streaming engine.

use std::any::Any;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::future::BoxFuture;

use super::{
    element::ElementSpec,
    tags::{BaseTag, DebugComment, LinkTag, MetaTag, OneOrMany, ScriptSpec, StylesheetSpec},
};

/// A head tag whose value resolves asynchronously; may yield one tag or a
/// batch.
pub type TagFuture<T> = BoxFuture<'static, OneOrMany<T>>;

/// Which lifecycle variant a page selects. Evaluated once, before any stage
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Full HTML document with head, body, and late-arrival streaming.
    Document,
    /// Body markup only: no document wrapper, no bootstrap, no arrival
    /// notifications.
    Fragment,
    /// Opaque payload written as-is.
    Raw,
}

/// Marker trait for renderable components. The engine never inspects
/// components itself; the configured [`ComponentRenderer`] downcasts via
/// [`as_any`](PageComponent::as_any).
///
/// [`ComponentRenderer`]: crate::application::renderer::ComponentRenderer
pub trait PageComponent: Send + Sync {
    fn display_name(&self) -> &str {
        "component"
    }

    fn as_any(&self) -> &dyn Any;
}

/// A resolved page: everything the engine needs to stream a response.
///
/// Defaults are deliberately permissive so page implementations only state
/// what they have; an empty page streams a valid, empty document.
#[async_trait]
pub trait Page: Send + Sync {
    fn status(&self) -> StatusCode {
        StatusCode::OK
    }

    fn content_type(&self) -> String {
        "text/html; charset=utf-8".to_string()
    }

    fn kind(&self) -> PageKind {
        PageKind::Document
    }

    async fn title(&self) -> String {
        String::new()
    }

    fn debug_comments(&self) -> Vec<DebugComment> {
        Vec::new()
    }

    fn meta_tags(&self) -> Vec<TagFuture<MetaTag>> {
        Vec::new()
    }

    fn link_tags(&self) -> Vec<TagFuture<LinkTag>> {
        Vec::new()
    }

    async fn base_tag(&self) -> Option<BaseTag> {
        None
    }

    /// Framework-supplied scripts; emitted before the page's own.
    fn system_scripts(&self) -> Vec<ScriptSpec> {
        Vec::new()
    }

    fn scripts(&self) -> Vec<ScriptSpec> {
        Vec::new()
    }

    fn head_stylesheets(&self) -> Vec<StylesheetSpec> {
        Vec::new()
    }

    async fn body_classes(&self) -> Vec<String> {
        Vec::new()
    }

    async fn body_start_content(&self) -> Vec<String> {
        Vec::new()
    }

    /// The ordered element list. Called once per response, at body-render
    /// start.
    fn elements(&self) -> Vec<ElementSpec> {
        Vec::new()
    }

    /// How many leading elements are above the fold. Clamped to at least 1
    /// by the engine.
    fn above_the_fold_count(&self) -> usize {
        0
    }

    /// Payload for [`PageKind::Raw`] responses; `None` writes nothing.
    async fn response_data(&self) -> Option<String> {
        None
    }

    /// Completion hook: invoked exactly once when the response finishes,
    /// whether it succeeded or not.
    fn handle_complete(&self) {}
}
