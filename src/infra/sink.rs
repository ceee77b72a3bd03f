//! Buffered, flush-explicit output sink bridging the engine to the response
//! body stream.
//!
//! Writes append to an in-memory buffer; `flush` pushes the buffer to the
//! wire. The response head (status, content-type, extra headers) stays
//! mutable until the first flush commits it, which is what lets a stage
//! failure still turn into a clean 500. No writes ever reach a closed
//! stream: they are dropped and logged instead.

use std::{sync::Arc, sync::atomic::Ordering, time::Instant};

use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::application::engine::context::RequestStats;

/// Response head handed to the HTTP layer when the first flush commits it.
#[derive(Debug)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
}

pub struct ResponseSink {
    buf: BytesMut,
    body_tx: Option<mpsc::UnboundedSender<Bytes>>,
    head_tx: Option<oneshot::Sender<ResponseMeta>>,
    status: StatusCode,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    started: Instant,
    logged_first_flush: bool,
    stats: Arc<RequestStats>,
}

impl ResponseSink {
    pub(crate) fn new(
        started: Instant,
        stats: Arc<RequestStats>,
    ) -> (
        Self,
        oneshot::Receiver<ResponseMeta>,
        mpsc::UnboundedReceiver<Bytes>,
    ) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        (
            Self {
                buf: BytesMut::new(),
                body_tx: Some(body_tx),
                head_tx: Some(head_tx),
                status: StatusCode::OK,
                content_type: None,
                headers: Vec::new(),
                started,
                logged_first_flush: false,
                stats,
            },
            head_rx,
            body_rx,
        )
    }

    pub(crate) fn head_committed(&self) -> bool {
        self.head_tx.is_none()
    }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        if self.head_committed() {
            error!(
                target = "corrente::sink",
                status = status.as_u16(),
                "attempted status change after the head was committed"
            );
            return;
        }
        self.status = status;
    }

    pub(crate) fn set_content_type(&mut self, value: &str) {
        if self.head_committed() {
            error!(
                target = "corrente::sink",
                "attempted content-type change after the head was committed"
            );
            return;
        }
        self.content_type = Some(value.to_string());
    }

    pub(crate) fn insert_header(&mut self, name: &str, value: &str) {
        if self.head_committed() {
            error!(
                target = "corrente::sink",
                header = name,
                "attempted header change after the head was committed"
            );
            return;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Append to the output buffer. Nothing reaches the wire until `flush`.
    pub(crate) fn write(&mut self, chunk: &str) {
        if self.body_tx.is_none() {
            error!(
                target = "corrente::sink",
                dropped_bytes = chunk.len(),
                "attempted write after response finished"
            );
            return;
        }
        self.buf.extend_from_slice(chunk.as_bytes());
    }

    /// Commit the head if this is the first flush, then push any buffered
    /// output to the wire.
    pub(crate) fn flush(&mut self) {
        if self.body_tx.is_none() {
            return;
        }

        self.commit_head();

        if !self.buf.is_empty() {
            let chunk = self.buf.split().freeze();
            let sent = self
                .body_tx
                .as_ref()
                .is_some_and(|body_tx| body_tx.send(chunk.clone()).is_ok());
            if !sent {
                // The receiver is gone: client disconnected mid-stream.
                debug!(
                    target = "corrente::sink",
                    "body receiver dropped; closing sink"
                );
                self.body_tx = None;
                return;
            }
            self.stats
                .bytes_written
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }

        if !self.logged_first_flush {
            self.logged_first_flush = true;
            let first_flush_ms = self.started.elapsed().as_secs_f64() * 1e3;
            metrics::histogram!("corrente_first_flush_ms").record(first_flush_ms);
            debug!(target = "corrente::sink", first_flush_ms, "first flush");
        }
    }

    /// Flush remaining output and close the stream. Idempotent.
    pub(crate) fn end(&mut self) {
        self.flush();
        self.body_tx = None;
    }

    /// Terminal failure path. While the head is uncommitted the buffered
    /// output is discarded and the response becomes a clean `status`;
    /// afterwards all that is left to do is close the stream.
    pub(crate) fn fail(&mut self, status: StatusCode) {
        if !self.head_committed() {
            self.buf.clear();
            self.status = status;
        }
        self.end();
    }

    fn commit_head(&mut self) {
        if let Some(head_tx) = self.head_tx.take() {
            self.stats
                .status
                .store(self.status.as_u16(), Ordering::Relaxed);
            let meta = ResponseMeta {
                status: self.status,
                content_type: self.content_type.clone(),
                headers: std::mem::take(&mut self.headers),
            };
            // The receiver may already be gone if the client hung up before
            // the head committed.
            let _ = head_tx.send(meta);
        }
    }
}
