//! Document head stage: debug comments, timing anchor, title, scripts,
//! stylesheets, and tag futures.

use std::time::Instant;

use tracing::warn;

use crate::{
    application::error::EngineError,
    domain::{markers::TIMING_START_GLOBAL, page::Page, tags::ScriptSpec},
    infra::sink::ResponseSink,
};

use super::{context::RenderContext, scripts};

/// Write the full `<head>` and flush it so secondary resource downloads can
/// start while the body is still rendering.
///
/// The async head pieces resolve concurrently; writes happen in one fixed
/// order. Scripts come before stylesheets on purpose: stylesheet downloads
/// block inline script execution.
pub(crate) async fn write_head(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    page: &dyn Page,
) -> Result<(), EngineError> {
    sink.write("<!DOCTYPE html><html><head>");

    let (title, metas, links, base) = futures::join!(
        page.title(),
        futures::future::join_all(page.meta_tags()),
        futures::future::join_all(page.link_tags()),
        page.base_tag(),
    );

    write_debug_comments(sink, page);
    write_timing_init(sink, ctx)?;
    sink.write(&format!("<title>{title}</title>"));

    let mut all_scripts = page.system_scripts();
    all_scripts.extend(page.scripts());
    scripts::emit_scripts(sink, ctx, &all_scripts)?;

    for sheet in page.head_stylesheets() {
        let markup = sheet.render()?;
        sink.write(&markup);
    }

    for batch in metas {
        for tag in batch.into_vec() {
            let markup = tag.render()?;
            sink.write(&markup);
        }
    }

    for batch in links {
        for tag in batch.into_vec() {
            let markup = tag.render()?;
            sink.write(&markup);
        }
    }

    if let Some(base) = base {
        let markup = base.render()?;
        sink.write(&markup);
    }

    sink.write("</head>");

    // Get the head out right away so the client can start fetching.
    sink.flush();
    Ok(())
}

/// Write the page's debug comments. Also runs as its own stage for fragment
/// responses.
pub(crate) fn write_debug_comments(sink: &mut ResponseSink, page: &dyn Page) {
    for comment in page.debug_comments() {
        if comment.label.is_empty() || comment.value.is_empty() {
            warn!(
                target = "corrente::head",
                label = %comment.label,
                value = %comment.value,
                "debug comment is missing either a label or a value"
            );
        }
        sink.write(&format!("<!-- {}: {} -->", comment.label, comment.value));
    }
}

/// Record the server-side timing anchor and plant the matching client-side
/// one. Script tags can't go between above-the-fold divs, so per-unit timing
/// is expressed as offsets from this shared anchor instead: the client
/// applies each offset to its own anchor as a proxy for arrival time (it is
/// really when the unit was sent).
fn write_timing_init(sink: &mut ResponseSink, ctx: &mut RenderContext) -> Result<(), EngineError> {
    ctx.timing_anchor = Some(Instant::now());
    let script = ScriptSpec::inline(format!("{TIMING_START_GLOBAL}=new Date"));
    scripts::emit_sync(sink, std::slice::from_ref(&script))?;
    Ok(())
}
