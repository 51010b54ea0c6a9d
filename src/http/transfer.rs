//! Response streaming with transfer-failure injection.
//!
//! # Responsibilities
//! - Re-chunk the upstream body into pieces of at most `CHUNK_SIZE` bytes
//! - Roll a transfer failure after every chunk handed to the client
//! - Log the request outcome exactly once, however the stream ends
//!
//! # Design Decisions
//! - A failed transfer ends the stream with an error, which makes hyper
//!   abort the client connection instead of finishing the message cleanly
//! - The rolls compound: a body of N chunks survives with
//!   probability (1 - p/100)^N
//! - hyper stops polling once a declared Content-Length has been written,
//!   so reaching that length counts as a clean end of stream

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::http::{Method, StatusCode};
use axum::BoxError;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt};

use crate::faults::FaultInjector;

/// Largest piece of body written to the client per decision point.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer failure injected after {chunks} chunks")]
    Injected { chunks: u64 },

    #[error("reading upstream body: {0}")]
    Upstream(#[source] BoxError),
}

/// Request details reported when a transfer ends.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub request_id: String,
    pub method: Method,
    pub uri: String,
    pub status: StatusCode,
    pub request_bytes: Option<u64>,
    pub response_bytes: Option<u64>,
}

impl TransferLog {
    /// Emit the outcome line.
    pub fn emit(&self, bytes_streamed: u64, chunks: u64, transfer_error: bool) {
        if self.status.is_success() && !transfer_error {
            tracing::info!(
                request_id = %self.request_id,
                code = self.status.as_u16(),
                method = %self.method,
                req_bytes = ?self.request_bytes,
                resp_bytes = ?self.response_bytes,
                bytes_streamed,
                chunks,
                transfer_error,
                "request to {} completed",
                self.uri
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                code = self.status.as_u16(),
                method = %self.method,
                req_bytes = ?self.request_bytes,
                resp_bytes = ?self.response_bytes,
                bytes_streamed,
                chunks,
                transfer_error,
                "request to {} completed",
                self.uri
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Aborting,
    Done,
}

/// Upstream body stream that may be cut short after any chunk.
pub struct FaultyTransfer {
    inner: BoxStream<'static, Result<Bytes, BoxError>>,
    pending: Bytes,
    faults: Arc<FaultInjector>,
    state: State,
    chunks: u64,
    bytes_streamed: u64,
    expected_len: Option<u64>,
    log: Option<TransferLog>,
}

impl FaultyTransfer {
    pub fn new<S, E>(inner: S, faults: Arc<FaultInjector>, log: TransferLog) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            inner: inner.map_err(|e| -> BoxError { e.into() }).boxed(),
            pending: Bytes::new(),
            faults,
            state: State::Streaming,
            chunks: 0,
            bytes_streamed: 0,
            expected_len: log.response_bytes,
            log: Some(log),
        }
    }

    /// Chunks handed to the client so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Whether every byte of a declared body has been handed out.
    fn delivered_in_full(&self) -> bool {
        self.state == State::Streaming
            && self.expected_len.is_some_and(|len| self.bytes_streamed >= len)
    }

    fn finish(&mut self, transfer_error: bool) {
        self.state = State::Done;
        if let Some(log) = self.log.take() {
            log.emit(self.bytes_streamed, self.chunks, transfer_error);
        }
    }
}

impl Stream for FaultyTransfer {
    type Item = Result<Bytes, TransferError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.state {
                State::Done => return Poll::Ready(None),
                State::Aborting => {
                    this.finish(true);
                    return Poll::Ready(Some(Err(TransferError::Injected {
                        chunks: this.chunks,
                    })));
                }
                State::Streaming => {}
            }

            if this.pending.is_empty() {
                match ready!(this.inner.poll_next_unpin(cx)) {
                    Some(Ok(data)) => {
                        this.pending = data;
                        continue;
                    }
                    Some(Err(e)) => {
                        this.finish(true);
                        return Poll::Ready(Some(Err(TransferError::Upstream(e))));
                    }
                    None => {
                        this.finish(false);
                        return Poll::Ready(None);
                    }
                }
            }

            let chunk = this.pending.split_to(this.pending.len().min(CHUNK_SIZE));
            this.chunks += 1;
            this.bytes_streamed += chunk.len() as u64;
            if this.faults.should_abort_transfer() {
                this.state = State::Aborting;
            } else if this.delivered_in_full() {
                this.finish(false);
            }
            return Poll::Ready(Some(Ok(chunk)));
        }
    }
}

impl Drop for FaultyTransfer {
    fn drop(&mut self) {
        // Dropped mid-stream: the client stopped reading.
        if self.log.is_some() {
            let transfer_error = !self.delivered_in_full();
            self.finish(transfer_error);
        }
    }
}
