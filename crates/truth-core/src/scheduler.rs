// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Discrete-event scheduler.
//!
//! Ordering invariant
//! - Pending triggers execute in ascending order of `(tick, sphere_id,
//!   tie_break)`. This is the deterministic-ordering discipline already
//!   used by this codebase's rewrite scheduler — ordering pending work by a
//!   stable, explicit sort key rather than hash/pointer order — generalized
//!   from `(scope_hash, rule_id)` to `(tick, sphere_id, tie_break)`.
//! - The priority queue is a `BinaryHeap` over a `Reverse`-wrapped key so
//!   the smallest key pops first.
//! - Each fired trigger sees a freshly materialized [`StateView`] of its own
//!   stream as of the trigger's tick, and a [`DeterministicRng`] seeded from
//!   that stream via [`crate::seed::derive_stream_seed`], so a driver's
//!   output depends only on `(scenario_seed, stream, tick)`, never on wall
//!   clock or scheduling order across spheres.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::{debug, instrument};

use crate::cancel::CancelToken;
use crate::error::TruthError;
use crate::event::EventPayload;
use crate::ident::StreamIdentity;
use crate::materialize::{materialize, MaterializeTarget};
use crate::rng::DeterministicRng;
use crate::seed::derive_stream_seed;
use crate::snapshot::{SnapshotStore, StateView};
use crate::store::{AppendOptions, EventStore, Head};

/// A unit of simulated space a trigger is scheduled against (for example, a
/// single tectonic sphere/model instance in a multi-model run).
pub type SphereId = u64;

/// Deterministic ordering key for a pending trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    /// Tick the trigger fires at.
    pub tick: i64,
    /// Sphere the trigger applies to.
    pub sphere_id: SphereId,
    /// Explicit tie-break for triggers sharing `(tick, sphere_id)`, assigned
    /// by the caller in the order triggers were scheduled.
    pub tie_break: u64,
}

/// A trigger waiting to fire, paired with the driver that will handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    key: QueueKey,
    driver_index: usize,
}

/// A proposed event a driver wants appended once its trigger fires.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Stream the event should be appended to.
    pub stream: StreamIdentity,
    /// Tick the event should be recorded at.
    pub tick: i64,
    /// Event payload.
    pub payload: EventPayload,
}

/// Context passed to a driver when its trigger fires.
pub struct DriverContext<'a> {
    /// The key of the trigger that just fired.
    pub key: QueueKey,
    /// The driver's own stream, materialized as of `key.tick`.
    pub state: &'a StateView,
    /// Deterministic RNG seeded from the driver's stream and the run's
    /// scenario seed; consume it in a fixed order to keep output
    /// reproducible.
    pub rng: &'a mut DeterministicRng,
}

/// Something that reacts to a fired trigger by proposing events to append,
/// and optionally scheduling further triggers for itself.
pub trait Driver {
    /// Handles a fired trigger, returning events to append and any further
    /// triggers to schedule (as `(tick, tie_break)` pairs on the same
    /// sphere).
    fn on_trigger(
        &mut self,
        ctx: DriverContext<'_>,
    ) -> Result<(Vec<EventDraft>, Vec<(i64, u64)>), TruthError>;
}

/// Deterministic priority queue of pending triggers, paired with the
/// drivers registered to handle them.
pub struct DiscreteEventScheduler {
    queue: BinaryHeap<Reverse<QueueEntry>>,
    drivers: Vec<Box<dyn Driver>>,
    sphere_by_driver: Vec<SphereId>,
    stream_by_driver: Vec<StreamIdentity>,
}

impl Default for DiscreteEventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscreteEventScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            drivers: Vec::new(),
            sphere_by_driver: Vec::new(),
            stream_by_driver: Vec::new(),
        }
    }

    /// Registers `driver` against `sphere_id` and the stream it materializes
    /// state from and appends events to, returning a handle usable with
    /// [`DiscreteEventScheduler::schedule`].
    pub fn register_driver(
        &mut self,
        sphere_id: SphereId,
        stream: StreamIdentity,
        driver: Box<dyn Driver>,
    ) -> usize {
        self.drivers.push(driver);
        self.sphere_by_driver.push(sphere_id);
        self.stream_by_driver.push(stream);
        self.drivers.len() - 1
    }

    /// Schedules a trigger for `driver_index` to fire at `(tick,
    /// tie_break)` on its registered sphere.
    pub fn schedule(&mut self, driver_index: usize, tick: i64, tie_break: u64) {
        let sphere_id = self.sphere_by_driver[driver_index];
        self.queue.push(Reverse(QueueEntry {
            key: QueueKey {
                tick,
                sphere_id,
                tie_break,
            },
            driver_index,
        }));
    }

    /// Pops and fires every pending trigger in `(tick, sphere_id,
    /// tie_break)` order. Before firing, materializes the driver's stream as
    /// of the trigger's tick and derives its RNG from `scenario_seed`. Each
    /// driver's proposed events are grouped by destination stream and
    /// appended as a single atomic batch per stream via
    /// [`EventStore::append_batch`], so a tick rejected partway through a
    /// driver's batch leaves no partial writes. Stops early, returning
    /// `Err(TruthError::Cancelled)`, if `cancel` is triggered mid-run.
    #[instrument(skip(self, store, snapshots, cancel))]
    pub fn run(
        &mut self,
        store: &EventStore,
        snapshots: &SnapshotStore,
        scenario_seed: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<Head>, TruthError> {
        let mut heads = Vec::new();
        while let Some(Reverse(entry)) = self.queue.pop() {
            cancel.check()?;
            debug!(tick = entry.key.tick, sphere = entry.key.sphere_id, "firing trigger");

            let driver_stream = self.stream_by_driver[entry.driver_index].clone();
            let state = materialize(
                store,
                snapshots,
                MaterializeTarget {
                    stream: driver_stream.clone(),
                    tick: entry.key.tick,
                },
                cancel,
            )?;
            let audit = derive_stream_seed(scenario_seed, &driver_stream);
            let mut rng = DeterministicRng::from_seed(audit.seed0, audit.seed1);

            let driver = &mut self.drivers[entry.driver_index];
            let (drafts, follow_ups) = driver.on_trigger(DriverContext {
                key: entry.key,
                state: &state,
                rng: &mut rng,
            })?;

            let mut batches: BTreeMap<StreamIdentity, Vec<(i64, EventPayload)>> = BTreeMap::new();
            for draft in drafts {
                batches
                    .entry(draft.stream)
                    .or_default()
                    .push((draft.tick, draft.payload));
            }
            for (stream, events) in batches {
                let head = store.append_batch(&stream, events, AppendOptions::default(), cancel)?;
                heads.push(head);
            }

            for (tick, tie_break) in follow_ups {
                self.schedule(entry.driver_index, tick, tie_break);
            }
        }
        Ok(heads)
    }
}
