//! Script-ordering-chain properties observed through full responses.

mod common;

use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use futures::FutureExt;

use corrente::{
    application::fetch::{RequestFetchCache, empty_cache},
    config::EngineSettings,
    domain::{
        element::ElementSpec,
        page::PageComponent,
        tags::ScriptSpec,
    },
};

use common::{TestPage, TextComponent, engine_state_for, engine_state_with, get, position_of};

fn ready_text(text: &str) -> ElementSpec {
    ElementSpec::Ready(Box::new(TextComponent(text.to_string())))
}

#[tokio::test]
async fn chain_execution_order_matches_emission_order() {
    let mut page = TestPage::with_elements(vec![ready_text("content")], 1);
    page.scripts = vec![
        ScriptSpec::external("/vendor.js"),
        ScriptSpec::inline("appSetup()"),
        ScriptSpec::external("/app.js"),
    ];
    let state = engine_state_for(Arc::new(page));
    let (_status, _parts, body) = get(&state, "/").await;

    // The runtime is installed exactly once, by the first emission.
    let runtime = position_of(&body, "window.$corrente=");
    position_of(&body, "window._correnteChain=$corrente");

    // Within the head batch, chain order equals emission order.
    let vendor = position_of(&body, ".script(\"/vendor.js\")");
    let inline = position_of(&body, "try{appSetup()}");
    let app = position_of(&body, ".script(\"/app.js\")");
    assert!(runtime < vendor && vendor < inline && inline < app);

    // Later emissions (bootstrap, arrival notifications) extend the stored
    // handle instead of starting a new chain.
    let extension = body
        .find("_correnteChain=_correnteChain.wait(")
        .expect("chain extended by later emissions");
    assert!(extension > app);
    assert!(body.contains("__correnteNodeArrival(0)"));
}

#[tokio::test]
async fn non_default_script_type_disables_the_chain_for_the_whole_response() {
    let mut template = ScriptSpec::inline("{\"data\":1}");
    template.script_type = Some("application/json".to_string());

    let mut page = TestPage::with_elements(vec![ready_text("content")], 1);
    page.scripts = vec![template, ScriptSpec::external("/app.js")];
    let state = engine_state_for(Arc::new(page));
    let (_status, _parts, body) = get(&state, "/").await;

    // No chain anywhere: the head batch fell back to synchronous tags, and
    // every later emission (bootstrap, arrivals) stayed synchronous.
    assert!(!body.contains("$corrente"));
    assert!(body.contains("<script type=\"application/json\">{\"data\":1}</script>"));
    assert!(body.contains("<script src=\"/app.js\" type=\"text/javascript\"></script>"));
    assert!(
        body.contains("<script type=\"text/javascript\">__correnteNodeArrival(0)</script>")
    );
}

#[tokio::test]
async fn conditional_external_scripts_defer_the_decision_to_the_client() {
    let mut polyfill = ScriptSpec::external("/polyfill.js");
    polyfill.condition = Some("!window.fetch".to_string());

    let mut page = TestPage::with_elements(vec![ready_text("content")], 1);
    page.scripts = vec![polyfill];
    let state = engine_state_for(Arc::new(page));
    let (_status, _parts, body) = get(&state, "/").await;

    position_of(
        &body,
        ".script(function(){if(!window.fetch) return \"/polyfill.js\"})",
    );
}

#[tokio::test]
async fn inline_script_with_condition_is_an_author_error() {
    let mut bad = ScriptSpec::inline("run()");
    bad.condition = Some("window.ready".to_string());

    let mut page = TestPage::with_elements(vec![ready_text("content")], 1);
    page.scripts = vec![bad];
    let completions = page.completions.clone();
    let state = engine_state_for(Arc::new(page));
    let (status, _parts, body) = get(&state, "/").await;

    // The head stage fails before the first flush, so the response is a
    // clean 500 with nothing written.
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
    // The completion hook still ran.
    assert_eq!(completions.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn late_arrivals_stream_through_the_chain_after_the_body() {
    let cache = Arc::new(RequestFetchCache::new());
    cache.track("/api/greeting", async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        Ok(serde_json::json!({ "greeting": "hi" }))
    });

    let page = TestPage::with_elements(vec![ready_text("content")], 1);
    let state = engine_state_with(Arc::new(page), cache, EngineSettings::default());
    let (_status, _parts, body) = get(&state, "/").await;

    // The fetch was pending at bootstrap time, so the dehydrated state says
    // so; the payload itself arrives later as a data notification.
    let bootstrap = position_of(&body, "correnteBootstrap();");
    assert!(body.contains("\"/api/greeting\":{\"state\":\"pending\"}"));

    let arrival = position_of(&body, "__correnteDataArrival(\"/api/greeting\", ");
    assert!(arrival > bootstrap);
    assert!(body.contains("\"greeting\":\"hi\""));
    // Late arrivals are flushed before the document closes.
    assert!(arrival < position_of(&body, "</div></body></html>"));
}

#[tokio::test]
async fn late_arrival_ceiling_bounds_the_wait() {
    let cache = Arc::new(RequestFetchCache::new());
    cache.track("/api/stuck", async {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(serde_json::Value::Null)
    });

    let settings = EngineSettings {
        late_arrival_ceiling_ms: Some(std::num::NonZeroU64::new(50).unwrap()),
        ..EngineSettings::default()
    };
    let page = TestPage::with_elements(vec![ready_text("content")], 1);
    let state = engine_state_with(Arc::new(page), cache, settings);

    let started = std::time::Instant::now();
    let (status, _parts, body) = get(&state, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(!body.contains("__correnteDataArrival"));
    assert!(body.ends_with("</div></body></html>"));
}

#[tokio::test]
async fn deferred_unit_sources_do_not_delay_earlier_script_batches() {
    // A page mixing a deferred unit with head scripts: the chain init must
    // land in the head, well before the deferred unit's arrival extension.
    let mut page = TestPage::with_elements(
        vec![ElementSpec::Deferred(
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(Box::new(TextComponent("slow".to_string())) as Box<dyn PageComponent>)
            }
            .boxed(),
        )],
        1,
    );
    page.scripts = vec![ScriptSpec::external("/head.js")];
    let state = engine_state_with(Arc::new(page), empty_cache(), EngineSettings::default());
    let (_status, _parts, body) = get(&state, "/").await;

    let head_script = position_of(&body, ".script(\"/head.js\")");
    let close_head = position_of(&body, "</head>");
    let arrival = position_of(&body, "__correnteNodeArrival(0)");
    assert!(head_script < close_head && close_head < arrival);
}
