// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Materializer: folds an event stream, up to a target tick, into a typed
//! state view.
//!
//! Reducers are a small tagged-variant `match` inside this module, not a
//! dynamic registry, consistent with this codebase's existing rule-dispatch
//! style. Ordering for the fold is `(tick, sequence)` ascending rather than
//! raw append (`sequence`) order, so that a "back-in-time insert" — a new
//! event appended with `tick` less than or equal to a previously
//! materialized tick — is folded in its correct causal position instead of
//! at the end of the stream.

use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::TruthError;
use crate::event::{EventEnvelope, EventPayload, KinematicsEventPayload, TopologyEventPayload};
use crate::ident::StreamDomain;
use crate::snapshot::{KinematicsState, SnapshotStore, StateView, TopologyState};
use crate::store::EventStore;

/// Identifies the stream and tick a materialization call should produce
/// state for.
#[derive(Debug, Clone)]
pub struct MaterializeTarget {
    /// Stream to materialize.
    pub stream: crate::ident::StreamIdentity,
    /// Target tick, inclusive.
    pub tick: i64,
}

/// Folds `target.stream` up to `target.tick`, using the latest eligible
/// snapshot (if any) as a base to avoid replaying the entire stream.
pub fn materialize(
    store: &EventStore,
    snapshots: &SnapshotStore,
    target: MaterializeTarget,
    cancel: &CancelToken,
) -> Result<StateView, TruthError> {
    cancel.check()?;
    let current_head_sequence = store.head(&target.stream)?.map(|head| head.sequence);
    let base = snapshots.get_latest_before(&target.stream, target.tick, current_head_sequence)?;
    let (mut state, from_sequence, used_snapshot) = match base {
        Some(snapshot) => (snapshot.state, snapshot.last_sequence_at_capture + 1, true),
        None => (empty_state(target.stream.domain), 0, false),
    };

    let mut envelopes = store.read_range(&target.stream, from_sequence, None)?;
    envelopes.retain(|e| e.tick <= target.tick);
    envelopes.sort_by_key(|e| (e.tick, e.sequence));

    debug!(
        stream = %target.stream,
        target_tick = target.tick,
        replayed = envelopes.len(),
        used_snapshot,
        "materializing stream"
    );

    for envelope in &envelopes {
        cancel.check()?;
        apply(&mut state, envelope)?;
    }

    Ok(state)
}

fn empty_state(domain: StreamDomain) -> StateView {
    match domain {
        StreamDomain::Topology => StateView::Topology(TopologyState::default()),
        StreamDomain::Kinematics => StateView::Kinematics(KinematicsState::default()),
    }
}

fn apply(state: &mut StateView, envelope: &EventEnvelope) -> Result<(), TruthError> {
    match (state, &envelope.payload) {
        (StateView::Topology(state), EventPayload::Topology(payload)) => {
            apply_topology(state, payload);
            Ok(())
        }
        (StateView::Kinematics(state), EventPayload::Kinematics(payload)) => {
            apply_kinematics(state, payload);
            Ok(())
        }
        _ => Err(TruthError::ChainBroken {
            stream: envelope.stream.clone(),
            sequence: envelope.sequence,
        }),
    }
}

fn apply_topology(state: &mut TopologyState, payload: &TopologyEventPayload) {
    match payload {
        TopologyEventPayload::PlateCreated(plate) => {
            state.plates.insert(plate.id, plate.clone());
        }
        TopologyEventPayload::PlateRetired { plate_id } => {
            state.plates.remove(plate_id);
        }
        TopologyEventPayload::BoundaryCreated(boundary) => {
            state.boundaries.insert(boundary.id, boundary.clone());
        }
        TopologyEventPayload::BoundaryClassChanged {
            boundary_id,
            new_class,
        } => {
            if let Some(boundary) = state.boundaries.get_mut(boundary_id) {
                boundary.class = *new_class;
            }
        }
        TopologyEventPayload::JunctionCreated(junction) => {
            state.junctions.insert(junction.id, junction.clone());
        }
        TopologyEventPayload::JunctionMoved {
            junction_id,
            new_position,
        } => {
            if let Some(junction) = state.junctions.get_mut(junction_id) {
                junction.position = *new_position;
            }
        }
    }
}

fn apply_kinematics(state: &mut KinematicsState, payload: &KinematicsEventPayload) {
    match payload {
        KinematicsEventPayload::MotionSegmentAdded(segment) => {
            state.segments.insert(segment.id, segment.clone());
        }
        KinematicsEventPayload::MotionSegmentClosed {
            segment_id,
            closed_at_tick,
        } => {
            if let Some(segment) = state.segments.get_mut(segment_id) {
                segment.valid_to_tick = Some(*closed_at_tick);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Plate;
    use crate::ident::{make_model_id, make_plate_id, StreamDomain, StreamIdentity};
    use crate::kv::MemoryKv;
    use crate::snapshot::Snapshot;
    use crate::store::AppendOptions;
    use std::sync::Arc;

    fn setup() -> (EventStore, SnapshotStore, StreamIdentity) {
        let kv = Arc::new(MemoryKv::new());
        let store = EventStore::new(kv.clone());
        let snapshots = SnapshotStore::new(kv);
        let stream = StreamIdentity::new("v1", "main", 0, StreamDomain::Topology, make_model_id("m1")).unwrap();
        (store, snapshots, stream)
    }

    fn plate_created(label: &str) -> EventPayload {
        EventPayload::Topology(TopologyEventPayload::PlateCreated(Plate {
            id: make_plate_id(label),
            name: label.to_string(),
        }))
    }

    #[test]
    fn materializes_from_scratch_without_snapshot() {
        let (store, snapshots, stream) = setup();
        let cancel = CancelToken::new();
        store
            .append(&stream, 0, plate_created("p1"), AppendOptions::default(), &cancel)
            .unwrap();
        store
            .append(&stream, 5, plate_created("p2"), AppendOptions::default(), &cancel)
            .unwrap();

        let state = materialize(
            &store,
            &snapshots,
            MaterializeTarget { stream: stream.clone(), tick: 5 },
            &cancel,
        )
        .unwrap();
        let StateView::Topology(state) = state else {
            panic!("expected topology state");
        };
        assert_eq!(state.plates.len(), 2);
    }

    #[test]
    fn respects_target_tick_cutoff() {
        let (store, snapshots, stream) = setup();
        let cancel = CancelToken::new();
        store
            .append(&stream, 0, plate_created("p1"), AppendOptions::default(), &cancel)
            .unwrap();
        store
            .append(&stream, 10, plate_created("p2"), AppendOptions::default(), &cancel)
            .unwrap();

        let state = materialize(
            &store,
            &snapshots,
            MaterializeTarget { stream: stream.clone(), tick: 3 },
            &cancel,
        )
        .unwrap();
        let StateView::Topology(state) = state else {
            panic!("expected topology state");
        };
        assert_eq!(state.plates.len(), 1);
    }

    #[test]
    fn back_in_time_insert_after_snapshot_is_folded_correctly() {
        let (store, snapshots, stream) = setup();
        let cancel = CancelToken::new();
        let head0 = store
            .append(&stream, 0, plate_created("p1"), AppendOptions::default(), &cancel)
            .unwrap();
        store
            .append(&stream, 10, plate_created("p2"), AppendOptions::default(), &cancel)
            .unwrap();

        snapshots
            .put(&Snapshot {
                stream: stream.clone(),
                tick: 10,
                last_sequence_at_capture: head0.sequence + 1,
                state: StateView::Topology(TopologyState {
                    plates: [
                        (make_plate_id("p1"), Plate { id: make_plate_id("p1"), name: "p1".into() }),
                        (make_plate_id("p2"), Plate { id: make_plate_id("p2"), name: "p2".into() }),
                    ]
                    .into_iter()
                    .collect(),
                    boundaries: Default::default(),
                    junctions: Default::default(),
                }),
            })
            .unwrap();

        // A plate inserted later with a tick preceding the snapshot's tick.
        store
            .append(
                &stream,
                4,
                plate_created("p3"),
                AppendOptions {
                    expected_head: crate::store::ExpectedHead::Any,
                    tick_policy: crate::store::TickPolicy::Unconstrained,
                },
                &cancel,
            )
            .unwrap();

        let state = materialize(
            &store,
            &snapshots,
            MaterializeTarget { stream: stream.clone(), tick: 10 },
            &cancel,
        )
        .unwrap();
        let StateView::Topology(state) = state else {
            panic!("expected topology state");
        };
        assert_eq!(state.plates.len(), 3);
    }

    #[test]
    fn rewound_stream_snapshot_is_skipped_during_materialization() {
        let (store, snapshots, stream) = setup();
        let cancel = CancelToken::new();
        let head0 = store
            .append(&stream, 0, plate_created("p1"), AppendOptions::default(), &cancel)
            .unwrap();

        // A snapshot claiming to have folded a sequence number far beyond
        // the stream's actual (rewound) head.
        snapshots
            .put(&Snapshot {
                stream: stream.clone(),
                tick: 5,
                last_sequence_at_capture: head0.sequence + 50,
                state: StateView::Topology(TopologyState::default()),
            })
            .unwrap();

        let state = materialize(
            &store,
            &snapshots,
            MaterializeTarget { stream, tick: 5 },
            &cancel,
        )
        .unwrap();
        let StateView::Topology(state) = state else {
            panic!("expected topology state");
        };
        // The bogus snapshot must be ignored; state is rebuilt from the
        // actual event log instead.
        assert_eq!(state.plates.len(), 1);
    }
}
