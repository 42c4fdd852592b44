// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]

use std::sync::Arc;

use truth_core::cancel::CancelToken;
use truth_core::event::{EventPayload, Plate, TopologyEventPayload};
use truth_core::ident::{make_model_id, make_plate_id, StreamDomain, StreamIdentity};
use truth_core::kv::MemoryKv;
use truth_core::scheduler::{DiscreteEventScheduler, Driver, DriverContext, EventDraft};
use truth_core::snapshot::SnapshotStore;
use truth_core::store::EventStore;

struct SubductionDriver {
    stream: StreamIdentity,
    plate_label: &'static str,
    remaining_splits: u32,
}

impl Driver for SubductionDriver {
    fn on_trigger(
        &mut self,
        ctx: DriverContext<'_>,
    ) -> Result<(Vec<EventDraft>, Vec<(i64, u64)>), truth_core::error::TruthError> {
        let draft = EventDraft {
            stream: self.stream.clone(),
            tick: ctx.key.tick,
            payload: EventPayload::Topology(TopologyEventPayload::PlateCreated(Plate {
                id: make_plate_id(self.plate_label),
                name: self.plate_label.to_string(),
            })),
        };
        let _ = ctx.rng.next_int(0, 1);
        let follow_ups = if self.remaining_splits > 0 {
            self.remaining_splits -= 1;
            vec![(ctx.key.tick + 1, 0)]
        } else {
            Vec::new()
        };
        Ok((vec![draft], follow_ups))
    }
}

/// Running the same schedule of triggers twice, from independent stores,
/// must append identical hash chains: the scheduler's firing order is a
/// pure function of `(tick, sphere_id, tie_break)`, not of wall-clock
/// interleaving.
#[test]
fn identical_schedules_produce_identical_hash_chains_across_runs() {
    let stream = StreamIdentity::new("v1", "main", 0, StreamDomain::Topology, make_model_id("sched")).unwrap();

    let run = || {
        let mut scheduler = DiscreteEventScheduler::new();
        let a = scheduler.register_driver(
            0,
            stream.clone(),
            Box::new(SubductionDriver {
                stream: stream.clone(),
                plate_label: "a",
                remaining_splits: 2,
            }),
        );
        let b = scheduler.register_driver(
            1,
            stream.clone(),
            Box::new(SubductionDriver {
                stream: stream.clone(),
                plate_label: "b",
                remaining_splits: 0,
            }),
        );
        scheduler.schedule(a, 0, 0);
        scheduler.schedule(b, 0, 0);

        let kv = Arc::new(MemoryKv::new());
        let store = EventStore::new(kv.clone());
        let snapshots = SnapshotStore::new(kv);
        let cancel = CancelToken::new();
        scheduler.run(&store, &snapshots, 42, &cancel).unwrap();
        store.read_range(&stream, 0, None).unwrap()
    };

    let first = run();
    let second = run();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.tick, b.tick);
    }
}
