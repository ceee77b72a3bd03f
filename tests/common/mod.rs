//! Shared fixtures: a configurable page, a downcasting renderer, and a
//! static resolver wired through the real HTTP entry point.
#![allow(dead_code)]

use std::{
    any::Any,
    sync::{Arc, Mutex, atomic::AtomicUsize, atomic::Ordering},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;

use corrente::{
    application::{
        engine::{RenderEngine, context::RenderContext},
        fetch::{FetchCache, empty_cache},
        renderer::{ComponentRenderer, RenderError, RenderedHtml},
    },
    config::EngineSettings,
    domain::{
        element::ElementSpec,
        page::{Page, PageComponent, PageKind, TagFuture},
        tags::{BaseTag, DebugComment, LinkTag, MetaTag, ScriptSpec, StylesheetSpec},
    },
    infra::http::{
        EngineState, NavigationOutcome, NavigationRequest, PageResolver, Resolved, render_request,
    },
};

pub struct TextComponent(pub String);

impl PageComponent for TextComponent {
    fn display_name(&self) -> &str {
        "text"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A component the renderer always fails on.
pub struct BrokenComponent;

impl PageComponent for BrokenComponent {
    fn display_name(&self) -> &str {
        "broken"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct TextRenderer;

impl ComponentRenderer for TextRenderer {
    fn render(
        &self,
        component: &dyn PageComponent,
        _ctx: &RenderContext,
    ) -> Result<RenderedHtml, RenderError> {
        if component.as_any().downcast_ref::<BrokenComponent>().is_some() {
            return Err(RenderError::new("broken component"));
        }
        let text = component
            .as_any()
            .downcast_ref::<TextComponent>()
            .ok_or_else(|| RenderError::new("unknown component type"))?;
        Ok(RenderedHtml {
            html: text.0.clone(),
            attrs: Vec::new(),
        })
    }
}

/// A page assembled field by field. Elements are handed out once, matching
/// the engine's consume-exactly-once contract.
pub struct TestPage {
    pub kind: PageKind,
    pub title: String,
    pub atf_count: usize,
    pub elements: Mutex<Option<Vec<ElementSpec>>>,
    pub scripts: Vec<ScriptSpec>,
    pub system_scripts: Vec<ScriptSpec>,
    pub stylesheets: Vec<StylesheetSpec>,
    pub meta_tags: Vec<MetaTag>,
    pub link_tags: Vec<LinkTag>,
    pub base: Option<BaseTag>,
    pub debug_comments: Vec<DebugComment>,
    pub body_classes: Vec<String>,
    pub body_start: Vec<String>,
    pub raw_data: Option<String>,
    pub content_type: Option<String>,
    pub completions: Arc<AtomicUsize>,
}

impl Default for TestPage {
    fn default() -> Self {
        Self {
            kind: PageKind::Document,
            title: "test page".to_string(),
            atf_count: 0,
            elements: Mutex::new(Some(Vec::new())),
            scripts: Vec::new(),
            system_scripts: Vec::new(),
            stylesheets: Vec::new(),
            meta_tags: Vec::new(),
            link_tags: Vec::new(),
            base: None,
            debug_comments: Vec::new(),
            body_classes: Vec::new(),
            body_start: Vec::new(),
            raw_data: None,
            content_type: None,
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl TestPage {
    pub fn with_elements(elements: Vec<ElementSpec>, atf_count: usize) -> Self {
        Self {
            elements: Mutex::new(Some(elements)),
            atf_count,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Page for TestPage {
    fn kind(&self) -> PageKind {
        self.kind
    }

    fn content_type(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| "text/html; charset=utf-8".to_string())
    }

    async fn title(&self) -> String {
        self.title.clone()
    }

    fn debug_comments(&self) -> Vec<DebugComment> {
        self.debug_comments.clone()
    }

    fn meta_tags(&self) -> Vec<TagFuture<MetaTag>> {
        use futures::FutureExt;
        self.meta_tags
            .iter()
            .cloned()
            .map(|tag| async move { tag.into() }.boxed())
            .collect()
    }

    fn link_tags(&self) -> Vec<TagFuture<LinkTag>> {
        use futures::FutureExt;
        self.link_tags
            .iter()
            .cloned()
            .map(|tag| async move { tag.into() }.boxed())
            .collect()
    }

    async fn base_tag(&self) -> Option<BaseTag> {
        self.base.clone()
    }

    fn system_scripts(&self) -> Vec<ScriptSpec> {
        self.system_scripts.clone()
    }

    fn scripts(&self) -> Vec<ScriptSpec> {
        self.scripts.clone()
    }

    fn head_stylesheets(&self) -> Vec<StylesheetSpec> {
        self.stylesheets.clone()
    }

    async fn body_classes(&self) -> Vec<String> {
        self.body_classes.clone()
    }

    async fn body_start_content(&self) -> Vec<String> {
        self.body_start.clone()
    }

    fn elements(&self) -> Vec<ElementSpec> {
        self.elements
            .lock()
            .expect("elements lock")
            .take()
            .expect("elements consumed exactly once")
    }

    fn above_the_fold_count(&self) -> usize {
        self.atf_count
    }

    async fn response_data(&self) -> Option<String> {
        self.raw_data.clone()
    }

    fn handle_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct StaticResolver {
    pub page: Arc<dyn Page>,
    pub cache: Arc<dyn FetchCache>,
    pub route_name: String,
}

#[async_trait]
impl PageResolver for StaticResolver {
    async fn resolve(&self, _request: &NavigationRequest) -> NavigationOutcome {
        NavigationOutcome::page(Resolved {
            page: self.page.clone(),
            route_name: self.route_name.clone(),
            cache: self.cache.clone(),
        })
    }
}

pub fn engine_state_for(page: Arc<dyn Page>) -> EngineState {
    engine_state_with(page, empty_cache(), EngineSettings::default())
}

pub fn engine_state_with(
    page: Arc<dyn Page>,
    cache: Arc<dyn FetchCache>,
    settings: EngineSettings,
) -> EngineState {
    EngineState {
        engine: Arc::new(RenderEngine::new(Arc::new(TextRenderer), settings)),
        resolver: Arc::new(StaticResolver {
            page,
            cache,
            route_name: "test".to_string(),
        }),
    }
}

/// Drive a request through the real entry point and collect the streamed
/// body to completion.
pub async fn get(state: &EngineState, uri: &str) -> (StatusCode, Response<Body>, String) {
    let request = Request::get(uri).body(Body::empty()).expect("request");
    let response = render_request(state, request).await;
    let status = response.status();
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.expect("body stream").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf-8 body");
    (status, Response::from_parts(parts, Body::empty()), text)
}

/// Index of `needle` in `haystack`, asserting it appears exactly once.
pub fn position_of(haystack: &str, needle: &str) -> usize {
    let first = haystack
        .find(needle)
        .unwrap_or_else(|| panic!("`{needle}` not found in output"));
    assert_eq!(
        haystack.matches(needle).count(),
        1,
        "`{needle}` should appear exactly once"
    );
    first
}
