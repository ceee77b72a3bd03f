//! Late-arrival streamer: pushes data that resolved after the main body
//! finished down to the already-rendered page.

use futures::{StreamExt, stream::FuturesUnordered};
use tracing::{debug, warn};

use crate::{
    application::{error::EngineError, fetch::PendingFetch},
    domain::markers::DATA_ARRIVAL_FN,
    infra::sink::ResponseSink,
    util::escape::script_json,
};

use super::{context::RenderContext, scripts};

/// Stream every data fetch still pending at body completion as a discrete
/// client notification, settling when all of them have resolved or rejected.
/// Rejections are tolerated; this is settle-all, not succeed-all.
///
/// The optional ceiling bounds how long the stage waits, not the fetches
/// themselves: on expiry the stage stops waiting and the response closes
/// without the remaining notifications.
pub(crate) async fn stream_late_arrivals(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
) -> Result<(), EngineError> {
    // The render watchdog fired; whatever is still pending was abandoned.
    if ctx.abandon_late {
        return Ok(());
    }

    let pending = ctx.cache().pending_requests();
    ctx.cache().mark_late_requests();
    if pending.is_empty() {
        return Ok(());
    }

    debug!(
        target = "corrente::late",
        pending = pending.len(),
        "waiting for late arrivals"
    );

    let mut settles = FuturesUnordered::new();
    for PendingFetch { url, data } in pending {
        settles.push(async move { (url, data.await) });
    }

    let ceiling = ctx.late_arrival_ceiling();
    let drain = async {
        while let Some((url, outcome)) = settles.next().await {
            match outcome {
                Ok(value) => {
                    metrics::histogram!("corrente_late_arrival_ms")
                        .record(ctx.elapsed().as_secs_f64() * 1e3);
                    let url_json = serde_json::Value::String(url).to_string();
                    let payload = script_json(&value.to_string());
                    scripts::emit_inline(
                        sink,
                        ctx,
                        &format!("{DATA_ARRIVAL_FN}({url_json}, {payload});"),
                    )?;
                    sink.flush();
                }
                Err(err) => {
                    debug!(
                        target = "corrente::late",
                        url = %url,
                        error = %err,
                        "late fetch failed; nothing to stream"
                    );
                }
            }
        }
        Ok::<(), EngineError>(())
    };

    match ceiling {
        Some(limit) => match tokio::time::timeout(limit, drain).await {
            Ok(result) => result?,
            Err(_) => warn!(
                target = "corrente::late",
                ceiling_ms = limit.as_millis() as u64,
                "late-arrival ceiling reached before all fetches settled"
            ),
        },
        None => drain.await?,
    }

    Ok(())
}
