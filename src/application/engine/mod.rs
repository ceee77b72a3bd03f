//! The progressive render engine: lifecycle pipeline, completion buffer,
//! script ordering chain, and late-arrival streaming.

pub mod buffer;
pub mod context;
pub mod head;
pub mod late;
pub mod lifecycle;
pub mod scripts;

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use tracing::{debug, error};

use crate::{
    application::{error::EngineError, renderer::ComponentRenderer},
    config::EngineSettings,
    domain::{
        markers::PAGE_CONTENT_NODE_ATTR,
        page::{Page, PageKind},
    },
    infra::sink::ResponseSink,
};

use context::RenderContext;
use lifecycle::Stage;

/// The response-streaming engine. One instance serves the whole process;
/// per-request state lives in [`RenderContext`].
pub struct RenderEngine {
    renderer: Arc<dyn ComponentRenderer>,
    settings: EngineSettings,
    config_exposure: serde_json::Value,
}

impl RenderEngine {
    pub fn new(renderer: Arc<dyn ComponentRenderer>, settings: EngineSettings) -> Self {
        Self {
            renderer,
            settings,
            config_exposure: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach the non-internal configuration exposed to the client at
    /// bootstrap.
    pub fn with_config_exposure(mut self, exposure: serde_json::Value) -> Self {
        self.config_exposure = exposure;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run the page's lifecycle to completion against `sink`. Stage failures
    /// are terminal: the remaining stages are skipped and the sink is failed
    /// (a 500 if the head was not yet committed, otherwise just closed).
    pub(crate) async fn drive(
        &self,
        page: &dyn Page,
        sink: &mut ResponseSink,
        ctx: &mut RenderContext,
    ) {
        let mut previous = Instant::now();
        for stage in lifecycle::stages_for(page.kind()) {
            let result = self.run_stage(*stage, page, sink, ctx).await;

            let now = Instant::now();
            let stage_ms = now.duration_since(previous).as_secs_f64() * 1e3;
            let from_start_ms = ctx.elapsed().as_secs_f64() * 1e3;
            previous = now;
            metrics::histogram!("corrente_lifecycle_stage_ms", "stage" => stage.name())
                .record(stage_ms);
            debug!(
                target = "corrente::lifecycle",
                stage = stage.name(),
                stage_ms,
                from_start_ms,
                "stage settled"
            );

            if let Err(err) = result {
                error!(
                    target = "corrente::lifecycle",
                    stage = stage.name(),
                    error = %err,
                    "lifecycle stage failed"
                );
                sink.fail(StatusCode::INTERNAL_SERVER_ERROR);
                return;
            }
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        page: &dyn Page,
        sink: &mut ResponseSink,
        ctx: &mut RenderContext,
    ) -> Result<(), EngineError> {
        match stage {
            Stage::SetContentType => {
                sink.set_content_type(&page.content_type());
                Ok(())
            }
            Stage::WriteDebugComments => {
                head::write_debug_comments(sink, page);
                Ok(())
            }
            Stage::WriteHead => head::write_head(sink, ctx, page).await,
            Stage::StartBody => {
                let mut classes = page.body_classes().await;
                classes.push(format!("route-{}", ctx.route_name()));
                sink.write(&format!("<body class='{}'>", classes.join(" ")));
                for text in page.body_start_content().await {
                    sink.write(&text);
                }
                sink.write(&format!("<div id='content' {PAGE_CONTENT_NODE_ATTR}>"));
                Ok(())
            }
            Stage::WriteBody => {
                let emit_arrivals = page.kind() == PageKind::Document;
                buffer::write_body(
                    sink,
                    ctx,
                    self.renderer.as_ref(),
                    page,
                    emit_arrivals,
                    &self.config_exposure,
                )
                .await
            }
            Stage::WriteResponseData => {
                if let Some(data) = page.response_data().await {
                    sink.write(&data);
                }
                Ok(())
            }
            Stage::LateArrivals => late::stream_late_arrivals(sink, ctx).await,
            Stage::CloseBody => {
                sink.write("</div></body></html>");
                Ok(())
            }
            Stage::Finish => {
                sink.end();
                Ok(())
            }
        }
    }
}
