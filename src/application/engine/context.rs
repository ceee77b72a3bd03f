//! Explicit per-request state, passed by reference through every stage.
//!
//! Nothing here is ambient or thread-local: requests interleave freely on a
//! multi-threaded runtime and must never observe each other's cursor, chain,
//! or timer state.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU16, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use time::OffsetDateTime;

use crate::application::fetch::FetchCache;

/// Counters shared between the render task and the completion hook, which
/// may outlive each other.
pub struct RequestStats {
    pub bytes_written: AtomicU64,
    pub render_time_us: AtomicU64,
    pub status: AtomicU16,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self {
            bytes_written: AtomicU64::new(0),
            render_time_us: AtomicU64::new(0),
            status: AtomicU16::new(200),
        }
    }
}

/// Script-ordering-chain state for one response.
#[derive(Default)]
pub(crate) struct ChainState {
    /// The chain runtime has been written and the client handle rooted.
    pub initialized: bool,
    /// A non-default script type appeared; every emission from then on is a
    /// plain synchronous tag.
    pub sync_only: bool,
}

/// Request-scoped engine state.
pub struct RenderContext {
    start: OffsetDateTime,
    started: Instant,
    route_name: String,
    render_timeout: Duration,
    late_arrival_ceiling: Option<Duration>,
    cache: Arc<dyn FetchCache>,
    stats: Arc<RequestStats>,
    /// Server-side anchor for client timing offsets; set when the head's
    /// timing-init script is written.
    pub(crate) timing_anchor: Option<Instant>,
    pub(crate) atf_count: usize,
    pub(crate) chain: ChainState,
    /// Set when the render watchdog fires: late arrivals are no longer
    /// tracked for this response.
    pub(crate) abandon_late: bool,
}

impl RenderContext {
    pub(crate) fn new(
        started: Instant,
        route_name: String,
        render_timeout: Duration,
        late_arrival_ceiling: Option<Duration>,
        cache: Arc<dyn FetchCache>,
        stats: Arc<RequestStats>,
    ) -> Self {
        Self {
            start: OffsetDateTime::now_utc(),
            started,
            route_name,
            render_timeout,
            late_arrival_ceiling,
            cache,
            stats,
            timing_anchor: None,
            atf_count: 1,
            chain: ChainState::default(),
            abandon_late: false,
        }
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    pub fn cache(&self) -> &Arc<dyn FetchCache> {
        &self.cache
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    pub(crate) fn late_arrival_ceiling(&self) -> Option<Duration> {
        self.late_arrival_ceiling
    }

    /// Milliseconds since the timing anchor, for the per-unit timing
    /// attribute. Zero when no anchor was written (fragment responses).
    pub(crate) fn timing_offset_ms(&self) -> u128 {
        self.timing_anchor
            .map(|anchor| anchor.elapsed().as_millis())
            .unwrap_or(0)
    }

    pub(crate) fn add_render_time(&self, took: Duration) {
        self.stats
            .render_time_us
            .fetch_add(took.as_micros() as u64, Ordering::Relaxed);
    }
}
