//! Script ordering chain: one total execution order across every emission.
//!
//! Emissions are spread over the whole document lifetime (head scripts,
//! bootstrap, arrival notifications, late-arrival data), and external
//! scripts finish downloading in whatever order the network decides. The
//! chain guarantees that execution order always equals emission order.

use crate::{
    domain::tags::{DEFAULT_SCRIPT_TYPE, ScriptSpec, TagError},
    infra::sink::ResponseSink,
    util::escape::attr,
};

use super::context::RenderContext;

/// The root chain installed by the runtime script.
const CHAIN_ROOT: &str = "$corrente";

/// Client global holding the tail of the chain between emissions. Each
/// emission writes `_correnteChain=_correnteChain.script(...).wait(...)`, so
/// the global always points at the latest link and the next emission extends
/// the same chain. Starting a fresh chain from the root instead would allow
/// out-of-order execution.
const CHAIN_HANDLE: &str = "_correnteChain";

/// Minimal sequential loader installed once per response. `script(s)` loads
/// an external script (string src, `{src, crossOrigin}` object, or a
/// function returning either — a falsy return skips the load); `wait(f)`
/// runs inline code. Every step waits for the previous one, so execution
/// order equals chain order regardless of download completion order.
const CHAIN_RUNTIME: &str = concat!(
    "window.$corrente=(function(){",
    "function chain(tail){return{",
    "script:function(s){return chain(tail.then(function(){return load(s)}))},",
    "wait:function(f){return chain(tail.then(function(){",
    "try{f.call(window)}catch(e){setTimeout(function(){throw(e)},1)}",
    "}))}",
    "}}",
    "function load(s){",
    "if(typeof s===\"function\"){s=s.call(window);if(!s){return}}",
    "return new Promise(function(done){",
    "var el=document.createElement(\"script\");",
    "if(typeof s===\"string\"){el.src=s}else{el.src=s.src;",
    "if(s.crossOrigin){el.crossOrigin=s.crossOrigin}}",
    "el.onload=el.onerror=function(){done()};",
    "document.head.appendChild(el)",
    "})}",
    "return chain(Promise.resolve())",
    "})();"
);

/// Emit a batch of scripts, preserving response-wide execution order.
///
/// A batch containing any non-default script type cannot ride the chain (the
/// chain only expresses executable scripts), so it drops the whole response
/// to synchronous in-document-order tags from this point on.
pub(crate) fn emit_scripts(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    scripts: &[ScriptSpec],
) -> Result<(), TagError> {
    for script in scripts {
        script.validate()?;
    }

    if scripts.iter().any(|script| !script.is_default_type()) {
        ctx.chain.sync_only = true;
    }

    if ctx.chain.sync_only {
        emit_sync(sink, scripts)
    } else {
        emit_async(sink, ctx, scripts)
    }
}

/// Emit a single inline snippet through the chain (arrival notifications,
/// bootstrap, fail notifications).
pub(crate) fn emit_inline(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    code: &str,
) -> Result<(), TagError> {
    emit_scripts(sink, ctx, &[ScriptSpec::inline(code)])
}

/// Plain `<script>` tags, in document order. Conditions cannot be expressed
/// here and are ignored, as is `strict` (the tag body runs in its own
/// sloppy-mode scope anyway).
pub(crate) fn emit_sync(sink: &mut ResponseSink, scripts: &[ScriptSpec]) -> Result<(), TagError> {
    for script in scripts {
        script.validate()?;
        let script_type = script.script_type.as_deref().unwrap_or(DEFAULT_SCRIPT_TYPE);
        if let Some(href) = &script.href {
            sink.write(&format!(
                "<script src=\"{}\" type=\"{}\"></script>",
                attr(href),
                attr(script_type),
            ));
        } else if let Some(text) = &script.text {
            sink.write(&format!(
                "<script type=\"{}\">{text}</script>",
                attr(script_type),
            ));
        }
    }
    Ok(())
}

fn emit_async(
    sink: &mut ResponseSink,
    ctx: &mut RenderContext,
    scripts: &[ScriptSpec],
) -> Result<(), TagError> {
    // Nothing to do, and no reason to install the runtime yet.
    if scripts.is_empty() {
        return Ok(());
    }

    sink.write("<script>");

    if !ctx.chain.initialized {
        sink.write(CHAIN_RUNTIME);
        sink.write(&format!("window.{CHAIN_HANDLE}={CHAIN_ROOT}"));
        ctx.chain.initialized = true;
    } else {
        sink.write(&format!("{CHAIN_HANDLE}={CHAIN_HANDLE}"));
    }

    for script in scripts {
        if let Some(href) = &script.href {
            // Shave a few bytes by passing the bare src when there are no
            // other load options.
            let payload = match &script.cross_origin {
                Some(cross_origin) => serde_json::json!({
                    "src": href,
                    "crossOrigin": cross_origin,
                })
                .to_string(),
                None => serde_json::json!(href).to_string(),
            };

            match &script.condition {
                Some(condition) => sink.write(&format!(
                    ".script(function(){{if({condition}) return {payload}}})"
                )),
                None => sink.write(&format!(".script({payload})")),
            }
        } else if let Some(text) = &script.text {
            // The try/catch dance gives exceptions their own time slice so
            // they cannot stall the chain; the bind keeps enclosed `this`
            // pointing at the window despite the strict context.
            let prelude = if script.strict { "\"use strict\";" } else { "" };
            sink.write(&format!(
                ".wait(function(){{{prelude}try{{{text}}}catch(e){{setTimeout(function(){{throw(e)}},1)}}}}.bind(this))"
            ));
        }
    }

    sink.write(";</script>");
    Ok(())
}
