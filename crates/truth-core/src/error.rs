// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy shared by every component of the truth subsystem.

use crate::ident::{Hash, StreamIdentity};

/// Unified error type returned by `truth-core`'s public operations.
///
/// Every variant carries the contextual fields a caller needs to decide
/// whether to retry, surface to an operator, or treat as a programming
/// error, matching this codebase's convention of interpolated `#[error]`
/// messages instead of bare strings.
#[derive(Debug, thiserror::Error)]
pub enum TruthError {
    /// The caller's expected head did not match the stream's actual head at
    /// append time.
    #[error(
        "concurrency conflict on stream {stream}: expected head {expected:?}, actual head {actual:?}"
    )]
    ConcurrencyConflict {
        /// Stream the append was attempted against.
        stream: StreamIdentity,
        /// Head the caller believed was current.
        expected: Option<Hash>,
        /// Head actually stored.
        actual: Option<Hash>,
    },

    /// A proposed event's tick violated the stream's configured tick policy.
    #[error("tick {tick} rejected for stream {stream}: {reason}")]
    TickRejected {
        /// Stream the append was attempted against.
        stream: StreamIdentity,
        /// Offending tick value.
        tick: i64,
        /// Human-readable reason the policy rejected it.
        reason: String,
    },

    /// The event envelope's stored hash did not match the recomputed hash
    /// chain value.
    #[error("hash chain broken for stream {stream} at sequence {sequence}")]
    ChainBroken {
        /// Stream the corruption was detected in.
        stream: StreamIdentity,
        /// Sequence number of the offending envelope.
        sequence: i64,
    },

    /// No stream exists with the given identity.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamIdentity),

    /// A `StreamIdentity` failed validation (e.g. an empty `variant_id` or
    /// `branch_id`).
    #[error("invalid stream identity: {reason}")]
    InvalidStreamIdentity {
        /// Human-readable description of what was invalid.
        reason: String,
    },

    /// A requested snapshot tick has no corresponding stored snapshot.
    #[error("no snapshot at or before tick {tick} for stream {stream}")]
    SnapshotNotFound {
        /// Stream the snapshot was requested for.
        stream: StreamIdentity,
        /// Target tick the caller asked for.
        tick: i64,
    },

    /// A derived artifact's stored payload hash did not match its recomputed
    /// hash on read.
    #[error("corrupt artifact {fingerprint}: expected {expected}, computed {computed}")]
    CorruptArtifact {
        /// Fingerprint of the artifact that failed verification.
        fingerprint: String,
        /// Hash recorded in the manifest.
        expected: String,
        /// Hash recomputed from the stored payload.
        computed: String,
    },

    /// The underlying key-value storage backend is temporarily unavailable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The canonical encoding or decoding of a value failed.
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// The operation was cancelled via a `CancelToken`.
    #[error("operation cancelled")]
    Cancelled,
}
