// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! truth-core: deterministic truth and derived-product subsystem.
//!
//! This crate is the source of record for a simulation's history: an
//! append-only, hash-chained event store (`store`) per model per domain
//! (topology or kinematics), a materializer (`materialize`) that folds a
//! stream up to a target tick into typed state, a snapshot store
//! (`snapshot`) of periodic checkpoints for incremental replay, a
//! content-addressed cache (`cache`) of derived artifacts keyed by a
//! fingerprint over their generating inputs, a discrete-event scheduler
//! (`scheduler`) that drives drivers in deterministic `(tick, sphere_id,
//! tie_break)` order, and deterministic id/seed derivation (`ident`,
//! `seed`) so the same logical inputs always produce the same identifiers
//! and random streams.
//!
//! Every component is built over a single key-value storage seam (`kv`)
//! and a shared canonical binary encoding (`codec`) used wherever bytes are
//! hashed: hash-chain links, snapshot state, and artifact fingerprints.

pub mod cache;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod ident;
pub mod kv;
pub mod materialize;
pub mod rng;
pub mod scheduler;
pub mod seed;
pub mod snapshot;
pub mod store;
