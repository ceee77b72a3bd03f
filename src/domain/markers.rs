//! Wire-contract constants shared with the client runtime.
//!
//! Attribute markers identify engine-emitted nodes; the function names are
//! the client-side entry points invoked through the script ordering chain.
//! Changing any of these breaks deployed client bundles.

/// Marker attribute on engine-emitted stylesheet nodes.
pub const PAGE_CSS_NODE_ATTR: &str = "data-corrente-css";

/// Marker attribute on engine-emitted `<link>` tags.
pub const PAGE_LINK_NODE_ATTR: &str = "data-corrente-link";

/// Marker attribute on the content container div.
pub const PAGE_CONTENT_NODE_ATTR: &str = "data-corrente-content";

/// Index-tagged attribute on structural container-open markers.
pub const PAGE_CONTAINER_NODE_ATTR: &str = "data-corrente-container";

/// Stable per-index identifier attribute on content unit roots.
pub const ROOT_NODE_ATTR: &str = "data-corrente-root-id";

/// Milliseconds-since-anchor attribute on content unit roots.
pub const TIMING_OFFSET_ATTR: &str = "data-corrente-timing-offset";

/// Client callback invoked as each node index is flushed.
pub const NODE_ARRIVAL_FN: &str = "__correnteNodeArrival";

/// Client callback invoked when a late data fetch resolves.
pub const DATA_ARRIVAL_FN: &str = "__correnteDataArrival";

/// Client callback invoked once when the render watchdog gives up.
pub const FAIL_ARRIVAL_FN: &str = "__correnteFailArrival";

/// Client bootstrap entry point, called after above-the-fold content.
pub const BOOTSTRAP_FN: &str = "correnteBootstrap";

/// Global holding the serialized initial state for the bootstrap call.
pub const STATE_GLOBAL: &str = "__correnteState";

/// Global recording the client-side timing anchor.
pub const TIMING_START_GLOBAL: &str = "__correnteTimingStart";
