// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Append-only, hash-chained event store.
//!
//! Each stream is a dense, monotonically increasing sequence of
//! [`EventEnvelope`]s keyed by `StreamIdentity`. Appends are guarded by a
//! per-stream critical section (a `std::sync::Mutex` keyed by
//! `StreamIdentity`, matching this codebase's preference for std
//! synchronization primitives over a lock crate for a single-process core)
//! and an optimistic-concurrency precondition on the stream's current head.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, instrument, warn};

use crate::cancel::CancelToken;
use crate::codec::{CanonicalDecode, CanonicalEncode};
use crate::error::TruthError;
use crate::event::{EventEnvelope, EventPayload};
use crate::ident::{Hash, StreamIdentity};
use crate::kv::KvStore;

/// A stream's current head: its last sequence number, the hash of the
/// envelope at that sequence, and the highest tick ever persisted to the
/// stream (tracked independently of the tail envelope's own tick, since a
/// back-in-time insert's tail may not carry the stream's highest tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    /// Sequence number of the most recently appended envelope.
    pub sequence: i64,
    /// Hash of the most recently appended envelope.
    pub hash: Hash,
    /// Highest tick ever persisted to this stream.
    pub max_tick: i64,
}

/// Optimistic-concurrency precondition checked against a stream's current
/// head before an append is accepted.
#[derive(Debug, Clone, Copy)]
pub enum ExpectedHead {
    /// Accept regardless of current head (no concurrency check).
    Any,
    /// Require the stream to currently be empty.
    Empty,
    /// Require the stream's current head to match exactly.
    Hash(Hash),
}

/// Governs whether an append's `tick` may be less than the highest tick ever
/// persisted to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TickPolicy {
    /// Reject back-in-time ticks outright.
    Strict,
    /// Allow back-in-time ticks but log a warning.
    Warn,
    /// Allow back-in-time ticks silently (materializer still handles them
    /// correctly via `last_sequence_at_capture`).
    Unconstrained,
}

/// Options governing an append call.
#[derive(Debug, Clone, Copy)]
pub struct AppendOptions {
    /// Concurrency precondition on the stream's current head.
    pub expected_head: ExpectedHead,
    /// Policy applied to the proposed events' ticks.
    pub tick_policy: TickPolicy,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            expected_head: ExpectedHead::Any,
            tick_policy: TickPolicy::Warn,
        }
    }
}

fn stream_prefix(stream: &StreamIdentity) -> Vec<u8> {
    let mut key = b"events/".to_vec();
    key.extend_from_slice(&stream.storage_path());
    key.push(b'/');
    key
}

fn envelope_key(stream: &StreamIdentity, sequence: i64) -> Vec<u8> {
    let mut key = stream_prefix(stream);
    key.extend_from_slice(&(sequence as u64).to_be_bytes());
    key
}

fn head_key(stream: &StreamIdentity) -> Vec<u8> {
    let mut key = b"heads/".to_vec();
    key.extend_from_slice(&stream.storage_path());
    key
}

/// Append-only event store over a [`KvStore`] backend.
pub struct EventStore {
    kv: Arc<dyn KvStore>,
    stream_locks: Mutex<HashMap<StreamIdentity, Arc<Mutex<()>>>>,
}

impl EventStore {
    /// Builds a store over the given key-value backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            stream_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, stream: &StreamIdentity) -> Arc<Mutex<()>> {
        let mut locks = self
            .stream_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry(stream.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns the stream's current head, or `None` if the stream is empty.
    pub fn head(&self, stream: &StreamIdentity) -> Result<Option<Head>, TruthError> {
        match self.kv.get(&head_key(stream))? {
            None => Ok(None),
            Some(bytes) => {
                let sequence = i64::decode_exact(&bytes[..8])?;
                let hash = Hash::decode_exact(&bytes[8..40])?;
                let max_tick = i64::decode_exact(&bytes[40..])?;
                Ok(Some(Head {
                    sequence,
                    hash,
                    max_tick,
                }))
            }
        }
    }

    /// Appends a single event to `stream`, enforcing `options`'s
    /// concurrency and tick preconditions, and returns the new head.
    ///
    /// Equivalent to `append_batch` with a single-element batch.
    #[instrument(skip(self, payload, cancel), fields(stream = %stream))]
    pub fn append(
        &self,
        stream: &StreamIdentity,
        tick: i64,
        payload: EventPayload,
        options: AppendOptions,
        cancel: &CancelToken,
    ) -> Result<Head, TruthError> {
        self.append_batch(stream, vec![(tick, payload)], options, cancel)
    }

    /// Appends an ordered batch of events to `stream` as a single atomic
    /// unit: the batch's concurrency precondition and every event's tick
    /// policy are validated up front, before anything is written, so a
    /// rejected event never leaves a partial prefix of the batch persisted.
    #[instrument(skip(self, events, cancel), fields(stream = %stream, batch_len = events.len()))]
    pub fn append_batch(
        &self,
        stream: &StreamIdentity,
        events: Vec<(i64, EventPayload)>,
        options: AppendOptions,
        cancel: &CancelToken,
    ) -> Result<Head, TruthError> {
        cancel.check()?;
        if events.is_empty() {
            return self
                .head(stream)?
                .ok_or_else(|| TruthError::StreamNotFound(stream.clone()));
        }

        let lock = self.lock_for(stream);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let current = self.head(stream)?;
        self.check_expected_head(stream, current, options.expected_head)?;

        let mut sequence = current.map_or(0, |head| head.sequence + 1);
        let mut prev_hash = current.map_or(crate::ident::ZERO_HASH, |head| head.hash);
        let mut running_max_tick = current.map(|head| head.max_tick);

        let mut envelopes = Vec::with_capacity(events.len());
        for (tick, payload) in events {
            self.check_tick_policy(stream, running_max_tick, tick, options.tick_policy)?;
            running_max_tick = Some(running_max_tick.map_or(tick, |max| max.max(tick)));
            let envelope = EventEnvelope::next(stream.clone(), sequence, tick, payload, prev_hash);
            prev_hash = envelope.hash;
            sequence += 1;
            envelopes.push(envelope);
        }

        for envelope in &envelopes {
            cancel.check()?;
            self.kv
                .put(&envelope_key(stream, envelope.sequence), envelope.encode_to_vec())?;
        }

        let last = envelopes
            .last()
            .expect("validated non-empty above, batch is never empty here");
        let max_tick = running_max_tick.expect("set on first iteration of a non-empty batch");

        let mut head_bytes = Vec::with_capacity(48);
        last.sequence.encode(&mut head_bytes);
        last.hash.encode(&mut head_bytes);
        max_tick.encode(&mut head_bytes);
        self.kv.put(&head_key(stream), head_bytes)?;

        info!(
            sequence = last.sequence,
            hash = %hex::encode(last.hash),
            batch_len = envelopes.len(),
            "appended event batch"
        );
        Ok(Head {
            sequence: last.sequence,
            hash: last.hash,
            max_tick,
        })
    }

    fn check_expected_head(
        &self,
        stream: &StreamIdentity,
        current: Option<Head>,
        expected: ExpectedHead,
    ) -> Result<(), TruthError> {
        match (expected, current) {
            (ExpectedHead::Any, _) => Ok(()),
            (ExpectedHead::Empty, None) => Ok(()),
            (ExpectedHead::Empty, Some(head)) => Err(TruthError::ConcurrencyConflict {
                stream: stream.clone(),
                expected: None,
                actual: Some(head.hash),
            }),
            (ExpectedHead::Hash(expected_hash), Some(head)) if head.hash == expected_hash => {
                Ok(())
            }
            (ExpectedHead::Hash(expected_hash), actual) => Err(TruthError::ConcurrencyConflict {
                stream: stream.clone(),
                expected: Some(expected_hash),
                actual: actual.map(|head| head.hash),
            }),
        }
    }

    /// Checks `tick` against `running_max_tick`, the highest tick persisted
    /// to the stream so far (including earlier events in the same batch),
    /// rather than against the tail envelope's own tick — a back-in-time
    /// insert can leave a tail whose tick is lower than ticks persisted
    /// earlier in the stream's history.
    fn check_tick_policy(
        &self,
        stream: &StreamIdentity,
        running_max_tick: Option<i64>,
        tick: i64,
        policy: TickPolicy,
    ) -> Result<(), TruthError> {
        let Some(max_tick) = running_max_tick else {
            return Ok(());
        };
        if tick >= max_tick {
            return Ok(());
        }
        match policy {
            TickPolicy::Unconstrained => Ok(()),
            TickPolicy::Warn => {
                warn!(tick, max_tick, "back-in-time tick accepted under Warn policy");
                Ok(())
            }
            TickPolicy::Strict => Err(TruthError::TickRejected {
                stream: stream.clone(),
                tick,
                reason: format!("tick {tick} precedes highest persisted tick {max_tick}"),
            }),
        }
    }

    /// Reads a single envelope by sequence number, if present.
    pub fn read_one(
        &self,
        stream: &StreamIdentity,
        sequence: i64,
    ) -> Result<Option<EventEnvelope>, TruthError> {
        match self.kv.get(&envelope_key(stream, sequence))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(EventEnvelope::decode_exact(&bytes)?)),
        }
    }

    /// Reads every envelope in `stream` with `sequence` in
    /// `[from_sequence, to_sequence)`, ascending, verifying the hash chain
    /// as it goes.
    pub fn read_range(
        &self,
        stream: &StreamIdentity,
        from_sequence: i64,
        to_sequence: Option<i64>,
    ) -> Result<Vec<EventEnvelope>, TruthError> {
        let entries = self.kv.scan_prefix(&stream_prefix(stream))?;
        let mut envelopes = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            let envelope = EventEnvelope::decode_exact(&bytes)?;
            if envelope.sequence < from_sequence {
                continue;
            }
            if let Some(to) = to_sequence {
                if envelope.sequence >= to {
                    continue;
                }
            }
            if !envelope.is_hash_valid() {
                return Err(TruthError::ChainBroken {
                    stream: stream.clone(),
                    sequence: envelope.sequence,
                });
            }
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }
}
