// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Snapshot store: periodic materialized-state checkpoints, queryable by
//! "latest snapshot at or before tick T" for incremental replay.
//!
//! Determinism contract
//! - Snapshots are stored under a secondary index keyed by
//!   `(stream, tick)` using a big-endian tick encoding, so standard
//!   lexicographic byte-order iteration over the `KvStore` already yields
//!   tick order without a custom comparator.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::codec::{CanonicalDecode, CanonicalEncode, CodecError, Cursor};
use crate::error::TruthError;
use crate::event::{Boundary, Junction, MotionSegment, Plate};
use crate::ident::{BoundaryId, JunctionId, PlateId, SegmentId, StreamIdentity};
use crate::kv::KvStore;

/// Materialized topology state as of a snapshot's tick.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TopologyState {
    /// Plates present at this tick, keyed by id.
    pub plates: BTreeMap<PlateId, Plate>,
    /// Boundaries present at this tick, keyed by id.
    pub boundaries: BTreeMap<BoundaryId, Boundary>,
    /// Junctions present at this tick, keyed by id.
    pub junctions: BTreeMap<JunctionId, Junction>,
}

impl CanonicalEncode for TopologyState {
    fn encode(&self, out: &mut Vec<u8>) {
        self.plates.values().cloned().collect::<Vec<_>>().encode(out);
        self.boundaries.values().cloned().collect::<Vec<_>>().encode(out);
        self.junctions.values().cloned().collect::<Vec<_>>().encode(out);
    }
}

impl CanonicalDecode for TopologyState {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let plates = Vec::<Plate>::decode(cursor)?;
        let boundaries = Vec::<Boundary>::decode(cursor)?;
        let junctions = Vec::<Junction>::decode(cursor)?;
        Ok(Self {
            plates: plates.into_iter().map(|p| (p.id, p)).collect(),
            boundaries: boundaries.into_iter().map(|b| (b.id, b)).collect(),
            junctions: junctions.into_iter().map(|j| (j.id, j)).collect(),
        })
    }
}

/// Materialized kinematics state as of a snapshot's tick.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct KinematicsState {
    /// Motion segments active or historical as of this tick, keyed by id.
    pub segments: BTreeMap<SegmentId, MotionSegment>,
}

impl CanonicalEncode for KinematicsState {
    fn encode(&self, out: &mut Vec<u8>) {
        self.segments.values().cloned().collect::<Vec<_>>().encode(out);
    }
}

impl CanonicalDecode for KinematicsState {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let segments = Vec::<MotionSegment>::decode(cursor)?;
        Ok(Self {
            segments: segments.into_iter().map(|s| (s.id, s)).collect(),
        })
    }
}

/// A materialized state view, tagged by which domain produced it. Must
/// match the `domain` of the `StreamIdentity` it was captured from.
#[derive(Clone, PartialEq, Debug)]
pub enum StateView {
    /// Topology-domain state.
    Topology(TopologyState),
    /// Kinematics-domain state.
    Kinematics(KinematicsState),
}

/// Tag: 0 Topology, 1 Kinematics.
impl CanonicalEncode for StateView {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            StateView::Topology(state) => {
                0u8.encode(out);
                state.encode(out);
            }
            StateView::Kinematics(state) => {
                1u8.encode(out);
                state.encode(out);
            }
        }
    }
}

impl CanonicalDecode for StateView {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match u8::decode(cursor)? {
            0 => Ok(StateView::Topology(TopologyState::decode(cursor)?)),
            1 => Ok(StateView::Kinematics(KinematicsState::decode(cursor)?)),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "StateView",
            }),
        }
    }
}

/// A checkpoint of a stream's materialized state at a given tick.
#[derive(Clone, PartialEq, Debug)]
pub struct Snapshot {
    /// Stream this snapshot was captured from.
    pub stream: StreamIdentity,
    /// Tick this snapshot reflects.
    pub tick: i64,
    /// The last event-store sequence number folded into this snapshot.
    ///
    /// Replaying from this snapshot means folding every envelope with
    /// `sequence > last_sequence_at_capture`, which correctly absorbs any
    /// back-in-time insert whose `tick <= target_tick` falls after this
    /// snapshot was taken.
    pub last_sequence_at_capture: i64,
    /// The materialized state itself.
    pub state: StateView,
}

impl CanonicalEncode for Snapshot {
    fn encode(&self, out: &mut Vec<u8>) {
        self.stream.encode(out);
        self.tick.encode(out);
        self.last_sequence_at_capture.encode(out);
        self.state.encode(out);
    }
}

impl CanonicalDecode for Snapshot {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            stream: StreamIdentity::decode(cursor)?,
            tick: i64::decode(cursor)?,
            last_sequence_at_capture: i64::decode(cursor)?,
            state: StateView::decode(cursor)?,
        })
    }
}

fn stream_prefix(stream: &StreamIdentity) -> Vec<u8> {
    let mut key = b"snapshots/".to_vec();
    key.extend_from_slice(&stream.storage_path());
    key.push(b'/');
    key
}

fn snapshot_key(stream: &StreamIdentity, tick: i64) -> Vec<u8> {
    let mut key = stream_prefix(stream);
    key.extend_from_slice(&(tick as u64).to_be_bytes());
    key
}

/// Stores and queries per-stream snapshots.
pub struct SnapshotStore {
    kv: Arc<dyn KvStore>,
}

impl SnapshotStore {
    /// Builds a store over the given key-value backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Stores `snapshot`, keyed by its `(stream, tick)`.
    pub fn put(&self, snapshot: &Snapshot) -> Result<(), TruthError> {
        self.kv.put(
            &snapshot_key(&snapshot.stream, snapshot.tick),
            snapshot.encode_to_vec(),
        )
    }

    /// Returns the latest snapshot for `stream` with `tick <= target_tick`
    /// whose `last_sequence_at_capture` does not exceed
    /// `current_head_sequence`, if any.
    ///
    /// A snapshot whose `last_sequence_at_capture` exceeds the stream's
    /// current head implies the stream was rewound (e.g. truncated and
    /// replaced with a shorter history) after the snapshot was taken: the
    /// snapshot reflects events the stream no longer contains, so it must be
    /// skipped in favor of an earlier, still-valid snapshot rather than
    /// trusted. Pass `None` for `current_head_sequence` to skip this check
    /// entirely (used when the caller already knows the stream has never
    /// been rewound).
    ///
    /// Because snapshot keys encode `tick` big-endian and the underlying
    /// `KvStore` returns prefix scans in ascending key order, the latest
    /// eligible snapshot is simply the last entry in the scan whose decoded
    /// tick does not exceed `target_tick` and whose soundness check passes.
    pub fn get_latest_before(
        &self,
        stream: &StreamIdentity,
        target_tick: i64,
        current_head_sequence: Option<i64>,
    ) -> Result<Option<Snapshot>, TruthError> {
        let entries = self.kv.scan_prefix(&stream_prefix(stream))?;
        let mut best: Option<Snapshot> = None;
        for (_, bytes) in entries {
            let snapshot = Snapshot::decode_exact(&bytes)?;
            if snapshot.tick > target_tick {
                break;
            }
            if let Some(head_sequence) = current_head_sequence {
                if snapshot.last_sequence_at_capture > head_sequence {
                    debug!(
                        stream = %stream,
                        tick = snapshot.tick,
                        last_sequence_at_capture = snapshot.last_sequence_at_capture,
                        head_sequence,
                        "skipping snapshot from a rewound stream"
                    );
                    continue;
                }
            }
            best = Some(snapshot);
        }
        debug!(
            stream = %stream,
            target_tick,
            found = best.is_some(),
            "snapshot lookup"
        );
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{make_model_id, make_plate_id, StreamDomain};
    use crate::kv::MemoryKv;

    fn stream() -> StreamIdentity {
        StreamIdentity::new("v1", "main", 0, StreamDomain::Topology, make_model_id("m1")).unwrap()
    }

    fn snapshot_at(stream: StreamIdentity, tick: i64, last_sequence: i64) -> Snapshot {
        let mut plates = BTreeMap::new();
        let id = make_plate_id("p1");
        plates.insert(
            id,
            Plate {
                id,
                name: "p1".to_string(),
            },
        );
        Snapshot {
            stream,
            tick,
            last_sequence_at_capture: last_sequence,
            state: StateView::Topology(TopologyState {
                plates,
                boundaries: BTreeMap::new(),
                junctions: BTreeMap::new(),
            }),
        }
    }

    #[test]
    fn get_latest_before_picks_the_closest_preceding_tick() {
        let store = SnapshotStore::new(Arc::new(MemoryKv::new()));
        let stream = stream();
        store.put(&snapshot_at(stream.clone(), 10, 3)).unwrap();
        store.put(&snapshot_at(stream.clone(), 20, 7)).unwrap();
        store.put(&snapshot_at(stream.clone(), 30, 11)).unwrap();

        let found = store.get_latest_before(&stream, 25, Some(11)).unwrap().unwrap();
        assert_eq!(found.tick, 20);

        let none = store.get_latest_before(&stream, 5, Some(11)).unwrap();
        assert!(none.is_none());

        let exact = store.get_latest_before(&stream, 30, Some(11)).unwrap().unwrap();
        assert_eq!(exact.tick, 30);
    }

    #[test]
    fn rewound_stream_snapshots_are_skipped_in_favor_of_an_earlier_one() {
        let store = SnapshotStore::new(Arc::new(MemoryKv::new()));
        let stream = stream();
        store.put(&snapshot_at(stream.clone(), 10, 3)).unwrap();
        store.put(&snapshot_at(stream.clone(), 30, 11)).unwrap();

        // The stream's current head is only at sequence 5: the tick-30
        // snapshot claims to have folded sequence 11, which the stream no
        // longer has — it must be skipped in favor of the tick-10 snapshot.
        let found = store.get_latest_before(&stream, 30, Some(5)).unwrap().unwrap();
        assert_eq!(found.tick, 10);
    }

    #[test]
    fn no_head_sequence_check_is_skipped_when_none() {
        let store = SnapshotStore::new(Arc::new(MemoryKv::new()));
        let stream = stream();
        store.put(&snapshot_at(stream.clone(), 30, 11)).unwrap();

        let found = store.get_latest_before(&stream, 30, None).unwrap().unwrap();
        assert_eq!(found.tick, 30);
    }

    #[test]
    fn snapshot_round_trips_through_canonical_codec() {
        let snapshot = snapshot_at(stream(), 1, 1);
        let decoded = Snapshot::decode_exact(&snapshot.encode_to_vec()).unwrap();
        assert_eq!(decoded, snapshot);
    }
}
