use std::{any::Any, process, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::StatusCode;
use corrente::{
    application::{
        engine::{RenderEngine, context::RenderContext},
        error::AppError,
        fetch::RequestFetchCache,
        renderer::{ComponentRenderer, RenderError, RenderedHtml},
    },
    config,
    domain::{
        element::ElementSpec,
        page::{Page, PageComponent, PageKind, TagFuture},
        tags::{MetaTag, OneOrMany, ScriptSpec, StylesheetSpec},
    },
    infra::{
        error::InfraError,
        http::{
            EngineState, NavigationFailure, NavigationOutcome, NavigationRequest, PageResolver,
            Resolved, build_router,
        },
        telemetry,
    },
};
use futures::FutureExt;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let engine = Arc::new(
        RenderEngine::new(Arc::new(DemoRenderer), settings.engine.clone())
            .with_config_exposure(settings.client_config()),
    );
    let state = EngineState {
        engine,
        resolver: Arc::new(DemoResolver),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "corrente::serve",
        addr = %settings.server.public_addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

// A small self-contained page wired through the engine, so the streaming
// pipeline can be watched end to end with curl -N.

struct DemoComponent {
    name: &'static str,
    heading: String,
    body: String,
}

impl PageComponent for DemoComponent {
    fn display_name(&self) -> &str {
        self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct DemoRenderer;

impl ComponentRenderer for DemoRenderer {
    fn render(
        &self,
        component: &dyn PageComponent,
        _ctx: &RenderContext,
    ) -> Result<RenderedHtml, RenderError> {
        let demo = component
            .as_any()
            .downcast_ref::<DemoComponent>()
            .ok_or_else(|| RenderError::new("unknown component type"))?;
        Ok(RenderedHtml {
            html: format!("<section><h2>{}</h2><p>{}</p></section>", demo.heading, demo.body),
            attrs: vec![("data-demo-name".to_string(), demo.name.to_string())],
        })
    }
}

struct DemoPage;

#[async_trait]
impl Page for DemoPage {
    fn kind(&self) -> PageKind {
        PageKind::Document
    }

    async fn title(&self) -> String {
        "corrente demo".to_string()
    }

    fn meta_tags(&self) -> Vec<TagFuture<MetaTag>> {
        vec![
            async {
                OneOrMany::One(MetaTag {
                    name: Some("description".to_string()),
                    content: Some("progressive streaming demo".to_string()),
                    ..MetaTag::default()
                })
            }
            .boxed(),
        ]
    }

    fn system_scripts(&self) -> Vec<ScriptSpec> {
        // Client runtime stubs so the chain callbacks resolve in a browser.
        vec![ScriptSpec::inline(
            "function correnteBootstrap(){console.log('bootstrap',window.__correnteState)};\
             function __correnteNodeArrival(i){console.log('node',i)};\
             function __correnteDataArrival(u,d){console.log('data',u,d)};\
             function __correnteFailArrival(){console.log('render aborted')}",
        )]
    }

    fn head_stylesheets(&self) -> Vec<StylesheetSpec> {
        vec![StylesheetSpec::inline(
            "body{font-family:sans-serif;max-width:40rem;margin:2rem auto}",
        )]
    }

    async fn body_classes(&self) -> Vec<String> {
        vec!["demo".to_string()]
    }

    fn elements(&self) -> Vec<ElementSpec> {
        vec![
            ElementSpec::ContainerOpen(vec![("class".to_string(), "demo-list".to_string())]),
            ElementSpec::Ready(Box::new(DemoComponent {
                name: "hero",
                heading: "Streamed first".to_string(),
                body: "This unit was ready immediately.".to_string(),
            })),
            ElementSpec::Deferred(
                async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok(Box::new(DemoComponent {
                        name: "deferred",
                        heading: "Streamed second".to_string(),
                        body: "This unit waited 150ms for its data.".to_string(),
                    }) as Box<dyn PageComponent>)
                }
                .boxed(),
            ),
            ElementSpec::ContainerClose,
        ]
    }

    fn above_the_fold_count(&self) -> usize {
        2
    }
}

struct DemoResolver;

#[async_trait]
impl PageResolver for DemoResolver {
    async fn resolve(&self, request: &NavigationRequest) -> NavigationOutcome {
        if request.path != "/" {
            return NavigationOutcome::failure(NavigationFailure {
                status: StatusCode::NOT_FOUND,
                redirect: None,
                message: format!("no route for {}", request.path),
            });
        }

        let cache = Arc::new(RequestFetchCache::new());
        cache.track("/api/greeting", async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(serde_json::json!({ "greeting": "hello from a late arrival" }))
        });

        NavigationOutcome::page(Resolved {
            page: Arc::new(DemoPage),
            route_name: "home".to_string(),
            cache,
        })
    }
}
