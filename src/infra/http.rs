//! HTTP integration: navigation watchdog, active-request accounting, and the
//! streaming bridge between the engine and axum responses.

use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        Request, StatusCode,
        header::{CONTENT_TYPE, LOCATION},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        engine::{
            RenderEngine,
            context::{RenderContext, RequestStats},
        },
        fetch::FetchCache,
    },
    domain::page::Page,
    infra::sink::ResponseSink,
};

// Request concurrency per worker process.
static ACTIVE_REQUESTS: AtomicUsize = AtomicUsize::new(0);

/// Number of requests currently in flight in this process.
pub fn active_requests() -> usize {
    ACTIVE_REQUESTS.load(Ordering::Relaxed)
}

/// Everything the render entry point needs, cloned per request.
#[derive(Clone)]
pub struct EngineState {
    pub engine: Arc<RenderEngine>,
    pub resolver: Arc<dyn PageResolver>,
}

/// The request view handed to navigation. Cookie and user-agent handling
/// belong to the resolver, not the engine.
pub struct NavigationRequest {
    pub path: String,
    pub query: Option<String>,
}

/// A successfully resolved page, ready to stream.
pub struct Resolved {
    pub page: Arc<dyn Page>,
    pub route_name: String,
    pub cache: Arc<dyn FetchCache>,
}

/// A navigation error outcome. When `resolved` accompanies it on the
/// [`NavigationOutcome`], the page has elected to render a document anyway.
pub struct NavigationFailure {
    pub status: StatusCode,
    pub redirect: Option<String>,
    pub message: String,
}

pub struct NavigationOutcome {
    pub error: Option<NavigationFailure>,
    pub resolved: Option<Resolved>,
}

impl NavigationOutcome {
    pub fn page(resolved: Resolved) -> Self {
        Self {
            error: None,
            resolved: Some(resolved),
        }
    }

    pub fn failure(failure: NavigationFailure) -> Self {
        Self {
            error: Some(failure),
            resolved: None,
        }
    }

    pub fn failure_with_page(failure: NavigationFailure, resolved: Resolved) -> Self {
        Self {
            error: Some(failure),
            resolved: Some(resolved),
        }
    }
}

/// Routing hand-off: maps an incoming request to a resolved page. Bounded by
/// the navigation watchdog; a resolver that never settles costs the client
/// one watchdog window and a 500, not a hung connection.
#[async_trait]
pub trait PageResolver: Send + Sync {
    async fn resolve(&self, request: &NavigationRequest) -> NavigationOutcome;
}

/// Build a router that streams every unmatched request through the engine.
pub fn build_router(state: EngineState) -> Router {
    Router::new()
        .fallback(render_handler)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn render_handler(State(state): State<EngineState>, request: Request<Body>) -> Response {
    render_request(&state, request).await
}

/// Render entry point: accounting, navigation watchdog, outcome handling,
/// then the streaming response.
pub async fn render_request(state: &EngineState, request: Request<Body>) -> Response {
    ACTIVE_REQUESTS.fetch_add(1, Ordering::Relaxed);
    metrics::gauge!("corrente_requests_active").increment(1.0);

    let started = Instant::now();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    debug!(target = "corrente::http", path = %path, "incoming request");

    let render_timeout_override = query.as_deref().and_then(debug_render_timeout);
    let nav_request = NavigationRequest {
        path: path.clone(),
        query,
    };

    let navigation_timeout = state.engine.settings().navigation_timeout();
    let outcome = match tokio::time::timeout(
        navigation_timeout,
        state.resolver.resolve(&nav_request),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            // No page object exists yet, so page-level cleanup cannot run.
            error!(
                target = "corrente::http",
                path = %path,
                timeout_ms = navigation_timeout.as_millis() as u64,
                "failed to navigate before the navigation watchdog fired"
            );
            finish_without_page(&path, started, StatusCode::INTERNAL_SERVER_ERROR);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let NavigationOutcome {
        error: failure,
        resolved,
    } = outcome;

    if let Some(failure) = &failure {
        let done = resolved.is_none();
        if done {
            warn!(
                target = "corrente::http",
                path = %path,
                status = failure.status.as_u16(),
                message = %failure.message,
                "navigation produced a non-2xx outcome"
            );
            finish_without_page(&path, started, failure.status);
            if is_redirect(failure.status)
                && let Some(location) = &failure.redirect
            {
                return redirect_response(failure.status, location);
            }
            return failure.status.into_response();
        }
        // The page elected to render a document despite the error. For
        // redirects we carry the Location header and trust the page to
        // produce a matching body.
    }

    let Some(resolved) = resolved else {
        finish_without_page(&path, started, StatusCode::INTERNAL_SERVER_ERROR);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let location = failure.as_ref().and_then(|f| f.redirect.clone());
    respond_with_page(
        state,
        resolved,
        started,
        path,
        render_timeout_override,
        location,
    )
    .await
}

async fn respond_with_page(
    state: &EngineState,
    resolved: Resolved,
    started: Instant,
    path: String,
    render_timeout_override: Option<Duration>,
    location: Option<String>,
) -> Response {
    let Resolved {
        page,
        route_name,
        cache,
    } = resolved;

    let stats = Arc::new(RequestStats::default());
    let (mut sink, head_rx, mut body_rx) = ResponseSink::new(started, stats.clone());
    sink.set_status(page.status());
    if let Some(location) = &location {
        sink.insert_header("Location", location);
    }

    let settings = state.engine.settings();
    let render_timeout = render_timeout_override.unwrap_or_else(|| settings.render_timeout());
    let mut ctx = RenderContext::new(
        started,
        route_name,
        render_timeout,
        settings.late_arrival_ceiling(),
        cache.clone(),
        stats.clone(),
    );

    let completion = Arc::new(ResponseCompletion {
        fired: AtomicBool::new(false),
        page: page.clone(),
        cache,
        stats,
        started,
        path,
    });

    let engine = state.engine.clone();
    let drive_page = page.clone();
    tokio::spawn(async move {
        engine.drive(drive_page.as_ref(), &mut sink, &mut ctx).await;
    });

    let meta = match head_rx.await {
        Ok(meta) => meta,
        Err(_) => {
            // The render task died without committing a head.
            error!(
                target = "corrente::http",
                path = %completion.path,
                "render task ended before committing a response head"
            );
            completion.fire();
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The guard fires completion accounting when the body stream finishes
    // or the client disconnects, whichever comes first.
    let guard = CompletionGuard(completion);
    let body_stream = async_stream::stream! {
        let _guard = guard;
        while let Some(chunk) = body_rx.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    };

    let mut builder = Response::builder().status(meta.status);
    if let Some(content_type) = &meta.content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    for (name, value) in &meta.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Per-response completion hook. `fire` is idempotent: the decrement must
/// happen exactly once even if both close and finish are observed.
struct ResponseCompletion {
    fired: AtomicBool,
    page: Arc<dyn Page>,
    cache: Arc<dyn FetchCache>,
    stats: Arc<RequestStats>,
    started: Instant,
    path: String,
}

impl ResponseCompletion {
    fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        ACTIVE_REQUESTS.fetch_sub(1, Ordering::Relaxed);
        metrics::gauge!("corrente_requests_active").decrement(1.0);
        log_request_stats(self);
        self.page.handle_complete();
    }
}

struct CompletionGuard(Arc<ResponseCompletion>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.fire();
    }
}

fn log_request_stats(completion: &ResponseCompletion) {
    let elapsed_ms = completion.started.elapsed().as_secs_f64() * 1e3;
    let bytes_written = completion.stats.bytes_written.load(Ordering::Relaxed);
    let render_us = completion.stats.render_time_us.load(Ordering::Relaxed);
    let status = completion.stats.status.load(Ordering::Relaxed);
    let data_requests = completion.cache.all_requests();
    let late_arrivals = completion.cache.late_requests();

    metrics::counter!("corrente_data_requests_total").increment(data_requests as u64);
    metrics::counter!("corrente_late_arrivals_total").increment(late_arrivals as u64);
    metrics::histogram!("corrente_bytes_written").record(bytes_written as f64);
    metrics::histogram!("corrente_request_duration_ms", "status" => status.to_string())
        .record(elapsed_ms);
    if render_us > 0 {
        metrics::histogram!("corrente_render_total_ms").record(render_us as f64 / 1e3);
    }

    info!(
        target = "corrente::http::accounting",
        path = %completion.path,
        status,
        elapsed_ms,
        bytes_written,
        render_ms = render_us as f64 / 1e3,
        data_requests,
        late_arrivals,
        "response complete"
    );
}

fn finish_without_page(path: &str, started: Instant, status: StatusCode) {
    ACTIVE_REQUESTS.fetch_sub(1, Ordering::Relaxed);
    metrics::gauge!("corrente_requests_active").decrement(1.0);
    let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
    metrics::histogram!("corrente_request_duration_ms", "status" => status.as_u16().to_string())
        .record(elapsed_ms);
    debug!(
        target = "corrente::http::accounting",
        path = %path,
        status = status.as_u16(),
        elapsed_ms,
        "request complete without a page"
    );
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT
    )
}

fn redirect_response(status: StatusCode, location: &str) -> Response {
    Response::builder()
        .status(status)
        .header(LOCATION, location)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Per-request render-watchdog override, for debugging slow data sources:
/// `?_debug_render_timeout={ms}`.
fn debug_render_timeout(query: &str) -> Option<Duration> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "_debug_render_timeout" {
            return None;
        }
        value.parse::<u64>().ok().map(Duration::from_millis)
    })
}

#[derive(Clone)]
pub struct HttpRequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = HttpRequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<HttpRequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        error!(
            target = "corrente::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = start.elapsed().as_millis() as u64,
            request_id = request_id,
            "request failed",
        );
    } else if status.is_client_error() {
        warn!(
            target = "corrente::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = start.elapsed().as_millis() as u64,
            request_id = request_id,
            "client request error",
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_render_timeout_parses_the_override() {
        assert_eq!(
            debug_render_timeout("_debug_render_timeout=250"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            debug_render_timeout("cursor=abc&_debug_render_timeout=1500"),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(debug_render_timeout("cursor=abc"), None);
        assert_eq!(debug_render_timeout("_debug_render_timeout=soon"), None);
    }

    #[test]
    fn redirect_statuses() {
        assert!(is_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_redirect(StatusCode::FOUND));
        assert!(is_redirect(StatusCode::TEMPORARY_REDIRECT));
        assert!(!is_redirect(StatusCode::SEE_OTHER));
        assert!(!is_redirect(StatusCode::OK));
    }
}
