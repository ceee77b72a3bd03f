//! Element completion buffer: renders units as their data arrives and writes
//! them to the sink strictly in declaration order.
//!
//! This is the heart of progressive rendering. Units resolve in any order;
//! the write cursor only ever advances past consecutive completed slots, so
//! output order always equals declaration order with no gaps and no repeats.

use std::time::Instant;

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use tracing::{debug, error, warn};

use crate::{
    application::{
        error::EngineError,
        renderer::{ComponentRenderer, RenderedHtml},
    },
    domain::{
        element::{SourceError, UnitSource, standardize_elements},
        markers::{
            BOOTSTRAP_FN, FAIL_ARRIVAL_FN, NODE_ARRIVAL_FN, PAGE_CONTAINER_NODE_ATTR,
            ROOT_NODE_ATTR, STATE_GLOBAL, TIMING_OFFSET_ATTR,
        },
        page::{Page, PageComponent},
    },
    infra::sink::ResponseSink,
    util::escape::{attr, script_json},
};

use super::{context::RenderContext, scripts};

/// Per-unit completion state. Transitions only move forward:
/// `Pending → Rendered → Written`.
enum Slot {
    Pending,
    Rendered(WriteItem),
    Written,
}

enum WriteItem {
    Content {
        html: String,
        attrs: Vec<(String, String)>,
    },
    ContainerOpen {
        attrs: Vec<(String, String)>,
    },
    ContainerClose,
}

enum Resolution {
    Component(Result<Box<dyn PageComponent>, SourceError>),
    ContainerOpen(Vec<(String, String)>),
    ContainerClose,
}

/// Render the page's element list and stream it in order. Settles when every
/// unit has been written or the render watchdog fires, whichever is first.
pub(crate) async fn write_body(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    renderer: &dyn ComponentRenderer,
    page: &dyn Page,
    emit_arrivals: bool,
    config_exposure: &serde_json::Value,
) -> Result<(), EngineError> {
    let units = standardize_elements(page.elements());
    let total = units.len();

    // No client scripts until the HTML above the fold has made it through.
    ctx.atf_count = page.above_the_fold_count().max(1);

    let mut slots: Vec<Slot> = (0..total).map(|_| Slot::Pending).collect();
    let mut cursor = 0usize;

    let mut sources: FuturesUnordered<BoxFuture<'static, (usize, Resolution)>> =
        FuturesUnordered::new();
    for unit in units {
        let index = unit.index;
        match unit.source {
            UnitSource::Component(future) => {
                sources.push(async move { (index, Resolution::Component(future.await)) }.boxed());
            }
            UnitSource::ContainerOpen(attrs) => {
                sources.push(async move { (index, Resolution::ContainerOpen(attrs)) }.boxed());
            }
            UnitSource::ContainerClose => {
                sources.push(async move { (index, Resolution::ContainerClose) }.boxed());
            }
        }
    }

    // The watchdog window is measured from request start, not body start:
    // time already spent navigating and writing the head counts against it.
    let deadline =
        tokio::time::Instant::from_std(ctx.started()) + ctx.render_timeout();
    let timeout = tokio::time::sleep_until(deadline);
    tokio::pin!(timeout);

    let mut settled = 0usize;
    while settled < total {
        tokio::select! {
            Some((index, resolution)) = sources.next() => {
                settled += 1;

                // Watchdog already wrote this slot out as empty; the unit is
                // abandoned.
                if matches!(slots[index], Slot::Written) {
                    continue;
                }

                let item = resolve_item(ctx, renderer, resolution, index);
                if matches!(slots[index], Slot::Pending) {
                    slots[index] = Slot::Rendered(item);
                }

                flush_ready(sink, ctx, &mut slots, &mut cursor, emit_arrivals, config_exposure)?;
            }
            _ = &mut timeout => {
                let states: String = slots
                    .iter()
                    .map(|slot| match slot {
                        Slot::Written => 'W',
                        Slot::Pending => 'P',
                        Slot::Rendered(_) => 'R',
                    })
                    .collect();
                warn!(
                    target = "corrente::buffer",
                    waited_ms = ctx.elapsed().as_millis() as u64,
                    slots = %states,
                    "timed out rendering; flushing empty placeholders"
                );

                for slot in slots.iter_mut() {
                    if matches!(slot, Slot::Pending) {
                        *slot = Slot::Rendered(WriteItem::Content {
                            html: String::new(),
                            attrs: Vec::new(),
                        });
                    }
                }
                flush_ready(sink, ctx, &mut slots, &mut cursor, emit_arrivals, config_exposure)?;

                // If it hasn't arrived by now, we're not going to wait for
                // it; late arrivals are off the table too.
                ctx.abandon_late = true;
                if emit_arrivals {
                    scripts::emit_inline(sink, ctx, &format!("{FAIL_ARRIVAL_FN}()"))?;
                }
                sink.flush();
                break;
            }
        }
    }

    Ok(())
}

/// Render a resolved unit. Source rejection and renderer failure both
/// degrade to an empty render: the response is already committed, so the
/// only option left is to close this unit out and move on.
fn resolve_item(
    ctx: &RenderContext,
    renderer: &dyn ComponentRenderer,
    resolution: Resolution,
    index: usize,
) -> WriteItem {
    match resolution {
        Resolution::ContainerOpen(attrs) => WriteItem::ContainerOpen { attrs },
        Resolution::ContainerClose => WriteItem::ContainerClose,
        Resolution::Component(Ok(component)) => {
            let name = component.display_name().to_string();
            let began = Instant::now();
            let rendered = renderer.render(component.as_ref(), ctx);
            let took = began.elapsed();
            ctx.add_render_time(took);
            metrics::histogram!("corrente_element_render_ms")
                .record(took.as_secs_f64() * 1e3);
            debug!(
                target = "corrente::buffer",
                element = %name,
                index,
                render_ms = took.as_secs_f64() * 1e3,
                from_start_ms = ctx.elapsed().as_secs_f64() * 1e3,
                "element rendered"
            );

            match rendered {
                Ok(RenderedHtml { html, attrs }) => WriteItem::Content { html, attrs },
                Err(err) => {
                    error!(
                        target = "corrente::buffer",
                        element = %name,
                        index,
                        error = %err,
                        "error rendering element"
                    );
                    WriteItem::Content {
                        html: String::new(),
                        attrs: Vec::new(),
                    }
                }
            }
        }
        Resolution::Component(Err(err)) => {
            error!(
                target = "corrente::buffer",
                index,
                error = %err,
                "element source failed"
            );
            WriteItem::Content {
                html: String::new(),
                attrs: Vec::new(),
            }
        }
    }
}

/// Advance the write cursor through consecutive rendered slots, writing each
/// in index order, then flush whatever was written to the wire.
fn flush_ready(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    slots: &mut [Slot],
    cursor: &mut usize,
    emit_arrivals: bool,
    config_exposure: &serde_json::Value,
) -> Result<(), EngineError> {
    let start = *cursor;

    while *cursor < slots.len() {
        let index = *cursor;
        let item = match std::mem::replace(&mut slots[index], Slot::Written) {
            Slot::Pending => {
                // Next unit isn't rendered yet; stop here.
                slots[index] = Slot::Pending;
                break;
            }
            Slot::Written => break,
            Slot::Rendered(item) => item,
        };

        write_item(sink, ctx, &item, index);
        *cursor += 1;

        if !emit_arrivals {
            continue;
        }

        if index + 1 == ctx.atf_count {
            // All of the above-the-fold HTML is out; the client can start
            // waking nodes up.
            bootstrap_client(sink, ctx, config_exposure)?;
            for arrived in 0..=index {
                scripts::emit_inline(sink, ctx, &format!("{NODE_ARRIVAL_FN}({arrived})"))?;
            }
        } else if index + 1 > ctx.atf_count {
            scripts::emit_inline(sink, ctx, &format!("{NODE_ARRIVAL_FN}({index})"))?;
        }
    }

    // It may be a while before the next unit renders; anything just written
    // should go down the wire now.
    if *cursor != start {
        sink.flush();
    }
    Ok(())
}

fn write_item(sink: &mut ResponseSink, ctx: &RenderContext, item: &WriteItem, index: usize) {
    match item {
        WriteItem::ContainerOpen { attrs } => {
            sink.write(&format!(
                "<div {PAGE_CONTAINER_NODE_ATTR}={index}{}>",
                format_attrs(attrs),
            ));
        }
        WriteItem::ContainerClose => sink.write("</div>"),
        WriteItem::Content { html, attrs } => {
            sink.write(&format!(
                "<div {ROOT_NODE_ATTR}={index} {TIMING_OFFSET_ATTR}=\"{}\"{}>{html}</div>",
                ctx.timing_offset_ms(),
                format_attrs(attrs),
            ));
        }
    }
}

fn format_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(key, value)| format!(" {key}=\"{}\"", attr(value)))
        .collect()
}

/// Hand the client its initial state and start it up. Runs exactly once per
/// response, immediately after the above-the-fold unit is written.
fn bootstrap_client(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    config_exposure: &serde_json::Value,
) -> Result<(), EngineError> {
    let state = serde_json::json!({
        "FetchCache": ctx.cache().dehydrate(),
        "Config": config_exposure,
    });
    let payload = script_json(&state.to_string());

    // Naked `correnteBootstrap()` rather than `window.correnteBootstrap()`:
    // the browser's error message when it is missing is far more helpful
    // this way.
    scripts::emit_inline(
        sink,
        ctx,
        &format!("window.{STATE_GLOBAL}={payload};{BOOTSTRAP_FN}();"),
    )?;
    Ok(())
}
