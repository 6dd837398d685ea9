//! Message Dispatcher
//!
//! Turns one raw frame into at most one normalized record and hands it to
//! the record sink. Every failure is contained here: the dispatcher logs it,
//! counts it and drops the frame, so the connection that delivered the frame
//! keeps streaming.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::application::ports::RecordSink;
use crate::application::services::normalizer::{NormalizeError, Normalizer};
use crate::domain::streaming::{FeedKind, RawFrame};
use crate::infrastructure::metrics::{self, DropReason};
use crate::infrastructure::powertrade::codec::{CodecError, FrameCodec};

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A record of this kind was accepted by the sink.
    Emitted(FeedKind),
    /// Frame was not valid JSON.
    ParseError,
    /// Frame parsed but carried no (or more than one) feed kind.
    UnknownMessage,
    /// Payload was malformed or could not be normalized.
    DecodeError,
    /// Sink refused the record.
    SinkError,
}

/// Per-dispatcher counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    frames_received: AtomicU64,
    records_emitted: AtomicU64,
    parse_errors: AtomicU64,
    unknown_messages: AtomicU64,
    decode_errors: AtomicU64,
    sink_errors: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Frames handed to the dispatcher.
    pub frames_received: u64,
    /// Records accepted by the sink.
    pub records_emitted: u64,
    /// Frames that were not valid JSON.
    pub parse_errors: u64,
    /// Frames with no recognizable feed kind.
    pub unknown_messages: u64,
    /// Frames whose payload failed to decode or normalize.
    pub decode_errors: u64,
    /// Records the sink refused.
    pub sink_errors: u64,
}

impl DispatchStats {
    /// Take a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            unknown_messages: self.unknown_messages.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decodes, normalizes and forwards frames for one feed endpoint.
///
/// Callers are expected to [`preload`](crate::ConversionResolver::preload)
/// the conversion table first. Until it is loaded, frames are dropped as
/// decode errors and the resolver retries the load at most once per retry
/// interval.
pub struct Dispatcher {
    codec: FrameCodec,
    normalizer: Arc<Normalizer>,
    sink: Arc<dyn RecordSink>,
    stats: Arc<DispatchStats>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with fresh counters.
    #[must_use]
    pub fn new(normalizer: Arc<Normalizer>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            codec: FrameCodec::new(),
            normalizer,
            sink,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Shared handle to this dispatcher's counters.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Process one frame. Never fails; the outcome says what happened.
    pub async fn dispatch(&self, frame: &RawFrame) -> DispatchOutcome {
        let started = Instant::now();
        let feed = frame.endpoint.kind;

        DispatchStats::bump(&self.stats.frames_received);
        metrics::record_frame_received(feed);
        tracing::debug!(feed = %feed, payload = %frame.payload, "Frame received");

        let outcome = self.process(feed, &frame.payload).await;
        metrics::record_dispatch_duration(feed, started.elapsed());
        outcome
    }

    async fn process(&self, feed: FeedKind, payload: &str) -> DispatchOutcome {
        let message = match self.codec.decode(payload) {
            Ok(message) => message,
            Err(CodecError::Json(e)) => {
                tracing::error!(feed = %feed, error = %e, payload, "Failed to parse frame");
                return self.drop_frame(feed, DropReason::Parse);
            }
            Err(e) if e.is_unknown() => {
                tracing::warn!(feed = %feed, error = %e, payload, "Unknown message");
                return self.drop_frame(feed, DropReason::Unknown);
            }
            Err(e) => {
                tracing::error!(feed = %feed, error = %e, payload, "Failed to decode payload");
                return self.drop_frame(feed, DropReason::Decode);
            }
        };

        let id = message.tradeable_entity_id().to_string();
        let record = match self.normalizer.normalize(message).await {
            Ok(record) => record,
            Err(e @ NormalizeError::Conversion(_)) => {
                // Already logged by the resolver when the load failed
                tracing::debug!(
                    feed = %feed,
                    tradeable_entity_id = %id,
                    error = %e,
                    "Conversion table unavailable"
                );
                return self.drop_frame(feed, DropReason::Decode);
            }
            Err(e) => {
                tracing::error!(
                    feed = %feed,
                    tradeable_entity_id = %id,
                    error = %e,
                    "Failed to normalize record"
                );
                return self.drop_frame(feed, DropReason::Decode);
            }
        };

        let kind = record.kind();
        match self.sink.accept(record).await {
            Ok(()) => {
                DispatchStats::bump(&self.stats.records_emitted);
                metrics::record_record_emitted(kind);
                DispatchOutcome::Emitted(kind)
            }
            Err(e) => {
                tracing::error!(feed = %feed, kind = %kind, error = %e, "Record sink rejected record");
                self.drop_frame(feed, DropReason::Sink)
            }
        }
    }

    fn drop_frame(&self, feed: FeedKind, reason: DropReason) -> DispatchOutcome {
        metrics::record_frame_dropped(feed, reason);
        let (counter, outcome) = match reason {
            DropReason::Parse => (&self.stats.parse_errors, DispatchOutcome::ParseError),
            DropReason::Unknown => (&self.stats.unknown_messages, DispatchOutcome::UnknownMessage),
            DropReason::Decode => (&self.stats.decode_errors, DispatchOutcome::DecodeError),
            DropReason::Sink => (&self.stats.sink_errors, DispatchOutcome::SinkError),
        };
        DispatchStats::bump(counter);
        outcome
    }
}
