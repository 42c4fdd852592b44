// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Domain event payloads and the hash-chained event envelope.
//!
//! Every payload enum derives `Debug` and implements [`CanonicalEncode`]
//! with an explicit, hand-assigned positional field order and enum tag
//! table, recorded in the doc comment directly above each `encode`
//! implementation (Open Question (a) from the originating design notes).

use uuid::Uuid;

use crate::codec::{CanonicalDecode, CanonicalEncode, CodecError, Cursor};
use crate::ident::{
    deterministic_uuid, BoundaryId, Hash, JunctionId, PlateId, SegmentId, StreamIdentity,
    StringTuple, ZERO_HASH,
};

/// Domain-separation namespace for deriving an envelope's `event_id` from
/// its `(dataset, asset, sequence)` triple.
const EVENT_ID_DERIVATION_NAMESPACE: &str = "SHA256-EventId-UUIDv8";

/// Derives a stable `event_id` from a `(dataset, asset, sequence)` triple,
/// matching the stability guarantee `StreamIdentity`-scoped deterministic
/// UUIDs already give callers: identical triples always produce the same id.
#[must_use]
pub fn derive_event_id(dataset: &str, asset: &str, sequence: i64) -> Uuid {
    let sequence = sequence.to_string();
    let tuple = StringTuple(&[dataset, asset, &sequence]);
    deterministic_uuid(EVENT_ID_DERIVATION_NAMESPACE, &tuple)
}

/// A point in the model's fixed 3D reference frame.
#[derive(Clone, Copy, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

/// Tag order: x, y, z.
impl CanonicalEncode for Point3 {
    fn encode(&self, out: &mut Vec<u8>) {
        self.x.encode(out);
        self.y.encode(out);
        self.z.encode(out);
    }
}

impl CanonicalDecode for Point3 {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: f64::decode(cursor)?,
            y: f64::decode(cursor)?,
            z: f64::decode(cursor)?,
        })
    }
}

/// A rigid-body rotation quantized to whole microradians so that identical
/// logical rotations always encode to identical bytes, independent of the
/// floating-point path that produced them upstream.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub struct QuantizedRotation {
    /// Unit rotation axis, each component quantized to nanometers-per-unit-
    /// sphere resolution via `f64::to_bits` equality (callers are
    /// responsible for feeding already-normalized axes).
    pub axis: [i64; 3],
    /// Rotation angle in whole microradians.
    pub angle_microrad: i64,
}

/// Tag order: axis\[0\], axis\[1\], axis\[2\], angle_microrad.
impl CanonicalEncode for QuantizedRotation {
    fn encode(&self, out: &mut Vec<u8>) {
        self.axis[0].encode(out);
        self.axis[1].encode(out);
        self.axis[2].encode(out);
        self.angle_microrad.encode(out);
    }
}

impl CanonicalDecode for QuantizedRotation {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let axis = [i64::decode(cursor)?, i64::decode(cursor)?, i64::decode(cursor)?];
        Ok(Self {
            axis,
            angle_microrad: i64::decode(cursor)?,
        })
    }
}

/// Classification of a plate boundary's relative motion.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum BoundaryClass {
    /// Plates move toward each other.
    Convergent,
    /// Plates move apart.
    Divergent,
    /// Plates slide laterally past each other.
    Transform,
}

/// Tag: 0 Convergent, 1 Divergent, 2 Transform.
impl CanonicalEncode for BoundaryClass {
    fn encode(&self, out: &mut Vec<u8>) {
        let tag: u8 = match self {
            BoundaryClass::Convergent => 0,
            BoundaryClass::Divergent => 1,
            BoundaryClass::Transform => 2,
        };
        tag.encode(out);
    }
}

impl CanonicalDecode for BoundaryClass {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match u8::decode(cursor)? {
            0 => Ok(BoundaryClass::Convergent),
            1 => Ok(BoundaryClass::Divergent),
            2 => Ok(BoundaryClass::Transform),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "BoundaryClass",
            }),
        }
    }
}

/// A tectonic plate as it exists in the topology graph.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct Plate {
    /// Identity of this plate.
    pub id: PlateId,
    /// Human-readable label, not used for hashing identity.
    pub name: String,
}

/// Tag order: id, name.
impl CanonicalEncode for Plate {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.name.encode(out);
    }
}

impl CanonicalDecode for Plate {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: PlateId::decode(cursor)?,
            name: String::decode(cursor)?,
        })
    }
}

/// A boundary between exactly two plates.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct Boundary {
    /// Identity of this boundary.
    pub id: BoundaryId,
    /// Motion classification.
    pub class: BoundaryClass,
    /// First bounding plate.
    pub plate_a: PlateId,
    /// Second bounding plate.
    pub plate_b: PlateId,
}

/// Tag order: id, class, plate_a, plate_b.
impl CanonicalEncode for Boundary {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.class.encode(out);
        self.plate_a.encode(out);
        self.plate_b.encode(out);
    }
}

impl CanonicalDecode for Boundary {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: BoundaryId::decode(cursor)?,
            class: BoundaryClass::decode(cursor)?,
            plate_a: PlateId::decode(cursor)?,
            plate_b: PlateId::decode(cursor)?,
        })
    }
}

/// A point where three or more boundaries meet.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct Junction {
    /// Identity of this junction.
    pub id: JunctionId,
    /// Position in the model's fixed reference frame.
    pub position: Point3,
    /// Boundaries incident to this junction, in canonical ascending-id order.
    pub boundary_ids: Vec<BoundaryId>,
}

/// Tag order: id, position, boundary_ids.
impl CanonicalEncode for Junction {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.position.encode(out);
        self.boundary_ids.encode(out);
    }
}

impl CanonicalDecode for Junction {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: JunctionId::decode(cursor)?,
            position: Point3::decode(cursor)?,
            boundary_ids: Vec::<BoundaryId>::decode(cursor)?,
        })
    }
}

/// A single plate's rotation, valid over a half-open tick interval.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct MotionSegment {
    /// Identity of this motion segment.
    pub id: SegmentId,
    /// Plate this segment describes motion for.
    pub plate_id: PlateId,
    /// Rotation applied over the segment's validity interval.
    pub rotation: QuantizedRotation,
    /// Tick at which this segment becomes active (inclusive).
    pub valid_from_tick: i64,
    /// Tick at which this segment stops being active (exclusive), or `None`
    /// if still open.
    pub valid_to_tick: Option<i64>,
}

/// Tag order: id, plate_id, rotation, valid_from_tick, valid_to_tick.
impl CanonicalEncode for MotionSegment {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.plate_id.encode(out);
        self.rotation.encode(out);
        self.valid_from_tick.encode(out);
        self.valid_to_tick.encode(out);
    }
}

impl CanonicalDecode for MotionSegment {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            id: SegmentId::decode(cursor)?,
            plate_id: PlateId::decode(cursor)?,
            rotation: QuantizedRotation::decode(cursor)?,
            valid_from_tick: i64::decode(cursor)?,
            valid_to_tick: Option::<i64>::decode(cursor)?,
        })
    }
}

/// Topology-domain event payloads.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub enum TopologyEventPayload {
    /// A new plate enters the model.
    PlateCreated(Plate),
    /// A plate is removed from the model (e.g. fully subducted).
    PlateRetired {
        /// Plate being retired.
        plate_id: PlateId,
    },
    /// A new boundary enters the model.
    BoundaryCreated(Boundary),
    /// An existing boundary's motion classification changes.
    BoundaryClassChanged {
        /// Boundary being reclassified.
        boundary_id: BoundaryId,
        /// New classification.
        new_class: BoundaryClass,
    },
    /// A new junction enters the model.
    JunctionCreated(Junction),
    /// An existing junction's position changes.
    JunctionMoved {
        /// Junction being moved.
        junction_id: JunctionId,
        /// New position.
        new_position: Point3,
    },
}

/// Tag: 0 `PlateCreated`, 1 `PlateRetired`, 2 `BoundaryCreated`,
/// 3 `BoundaryClassChanged`, 4 `JunctionCreated`, 5 `JunctionMoved`.
impl CanonicalEncode for TopologyEventPayload {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            TopologyEventPayload::PlateCreated(plate) => {
                0u8.encode(out);
                plate.encode(out);
            }
            TopologyEventPayload::PlateRetired { plate_id } => {
                1u8.encode(out);
                plate_id.encode(out);
            }
            TopologyEventPayload::BoundaryCreated(boundary) => {
                2u8.encode(out);
                boundary.encode(out);
            }
            TopologyEventPayload::BoundaryClassChanged {
                boundary_id,
                new_class,
            } => {
                3u8.encode(out);
                boundary_id.encode(out);
                new_class.encode(out);
            }
            TopologyEventPayload::JunctionCreated(junction) => {
                4u8.encode(out);
                junction.encode(out);
            }
            TopologyEventPayload::JunctionMoved {
                junction_id,
                new_position,
            } => {
                5u8.encode(out);
                junction_id.encode(out);
                new_position.encode(out);
            }
        }
    }
}

impl CanonicalDecode for TopologyEventPayload {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match u8::decode(cursor)? {
            0 => Ok(TopologyEventPayload::PlateCreated(Plate::decode(cursor)?)),
            1 => Ok(TopologyEventPayload::PlateRetired {
                plate_id: PlateId::decode(cursor)?,
            }),
            2 => Ok(TopologyEventPayload::BoundaryCreated(Boundary::decode(
                cursor,
            )?)),
            3 => Ok(TopologyEventPayload::BoundaryClassChanged {
                boundary_id: BoundaryId::decode(cursor)?,
                new_class: BoundaryClass::decode(cursor)?,
            }),
            4 => Ok(TopologyEventPayload::JunctionCreated(Junction::decode(
                cursor,
            )?)),
            5 => Ok(TopologyEventPayload::JunctionMoved {
                junction_id: JunctionId::decode(cursor)?,
                new_position: Point3::decode(cursor)?,
            }),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "TopologyEventPayload",
            }),
        }
    }
}

/// Kinematics-domain event payloads.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub enum KinematicsEventPayload {
    /// A new motion segment becomes active for a plate.
    MotionSegmentAdded(MotionSegment),
    /// An open motion segment is closed at a given tick.
    MotionSegmentClosed {
        /// Segment being closed.
        segment_id: SegmentId,
        /// Tick at which the segment stops applying.
        closed_at_tick: i64,
    },
}

/// Tag: 0 `MotionSegmentAdded`, 1 `MotionSegmentClosed`.
impl CanonicalEncode for KinematicsEventPayload {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            KinematicsEventPayload::MotionSegmentAdded(segment) => {
                0u8.encode(out);
                segment.encode(out);
            }
            KinematicsEventPayload::MotionSegmentClosed {
                segment_id,
                closed_at_tick,
            } => {
                1u8.encode(out);
                segment_id.encode(out);
                closed_at_tick.encode(out);
            }
        }
    }
}

impl CanonicalDecode for KinematicsEventPayload {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match u8::decode(cursor)? {
            0 => Ok(KinematicsEventPayload::MotionSegmentAdded(
                MotionSegment::decode(cursor)?,
            )),
            1 => Ok(KinematicsEventPayload::MotionSegmentClosed {
                segment_id: SegmentId::decode(cursor)?,
                closed_at_tick: i64::decode(cursor)?,
            }),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "KinematicsEventPayload",
            }),
        }
    }
}

/// The payload carried by a single event envelope, tagged by which domain
/// produced it. A stream's domain (see `StreamIdentity`) determines which
/// variant every envelope in that stream must carry; the materializer
/// enforces this rather than the type system, matching this codebase's
/// tagged-variant dispatch style.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub enum EventPayload {
    /// Topology-domain payload.
    Topology(TopologyEventPayload),
    /// Kinematics-domain payload.
    Kinematics(KinematicsEventPayload),
}

/// Tag: 0 Topology, 1 Kinematics.
impl CanonicalEncode for EventPayload {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            EventPayload::Topology(payload) => {
                0u8.encode(out);
                payload.encode(out);
            }
            EventPayload::Kinematics(payload) => {
                1u8.encode(out);
                payload.encode(out);
            }
        }
    }
}

impl CanonicalDecode for EventPayload {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match u8::decode(cursor)? {
            0 => Ok(EventPayload::Topology(TopologyEventPayload::decode(
                cursor,
            )?)),
            1 => Ok(EventPayload::Kinematics(KinematicsEventPayload::decode(
                cursor,
            )?)),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "EventPayload",
            }),
        }
    }
}

/// A single entry in a stream's hash-chained append-only log.
///
/// `hash` is computed as `SHA-256(prev_hash || canonical_encode(envelope
/// without hash))`, where the first envelope in a stream uses
/// [`ZERO_HASH`] as `prev_hash`.
#[derive(Clone, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub struct EventEnvelope {
    /// Stable identifier for this event, derived deterministically from
    /// `(stream, sequence)` unless a caller supplies one explicitly via
    /// [`EventEnvelope::next_with_event_id`].
    pub event_id: Uuid,
    /// Stream this envelope belongs to.
    pub stream: StreamIdentity,
    /// Dense, monotonic, per-stream sequence number, starting at 0.
    pub sequence: i64,
    /// Simulation tick this event logically occurred at. Not required to be
    /// monotonic with `sequence` (back-in-time inserts are allowed).
    pub tick: i64,
    /// Domain event payload.
    pub payload: EventPayload,
    /// Hash of the immediately preceding envelope in this stream.
    pub prev_hash: Hash,
    /// This envelope's own hash, binding `prev_hash` and every other field.
    pub hash: Hash,
}

impl EventEnvelope {
    /// Encodes every field except `hash` itself, in the fixed order
    /// `event_id, stream, sequence, tick, payload, prev_hash` — this is the
    /// byte stream hashed (together with `prev_hash` as a leading chain
    /// link) to produce `hash`.
    fn encode_unhashed(&self, out: &mut Vec<u8>) {
        self.event_id.encode(out);
        self.stream.encode(out);
        self.sequence.encode(out);
        self.tick.encode(out);
        self.payload.encode(out);
        self.prev_hash.encode(out);
    }

    /// Computes the hash this envelope should carry given `prev_hash`,
    /// without consulting the `hash` field already stored on `self`.
    #[must_use]
    pub fn compute_hash(&self) -> Hash {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.prev_hash);
        self.encode_unhashed(&mut buf);
        crate::ident::sha256(&buf)
    }

    /// Builds the first envelope of a stream (`prev_hash` = [`ZERO_HASH`]),
    /// deriving `event_id` from `(stream, sequence)` and computing and
    /// filling in its hash.
    #[must_use]
    pub fn first(stream: StreamIdentity, tick: i64, payload: EventPayload) -> Self {
        Self::next(stream, 0, tick, payload, ZERO_HASH)
    }

    /// Builds a non-initial envelope, deriving `event_id` from
    /// `(stream, sequence)` and computing and filling in its hash from the
    /// supplied `prev_hash`.
    #[must_use]
    pub fn next(
        stream: StreamIdentity,
        sequence: i64,
        tick: i64,
        payload: EventPayload,
        prev_hash: Hash,
    ) -> Self {
        let event_id = derive_event_id(&stream.to_string(), &hex::encode(stream.model_id.as_bytes()), sequence);
        Self::next_with_event_id(event_id, stream, sequence, tick, payload, prev_hash)
    }

    /// Builds a non-initial envelope with a caller-supplied `event_id`
    /// rather than deriving one — the envelope's `event_id` may be "either
    /// random or derived deterministically" per this subsystem's wire
    /// contract.
    #[must_use]
    pub fn next_with_event_id(
        event_id: Uuid,
        stream: StreamIdentity,
        sequence: i64,
        tick: i64,
        payload: EventPayload,
        prev_hash: Hash,
    ) -> Self {
        let mut envelope = Self {
            event_id,
            stream,
            sequence,
            tick,
            payload,
            prev_hash,
            hash: ZERO_HASH,
        };
        envelope.hash = envelope.compute_hash();
        envelope
    }

    /// Returns whether `hash` matches what `compute_hash` would produce,
    /// i.e. whether this envelope has not been tampered with relative to
    /// its recorded `prev_hash`.
    #[must_use]
    pub fn is_hash_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

impl CanonicalEncode for EventEnvelope {
    /// Encodes every field, in the fixed order `event_id, stream, sequence,
    /// tick, payload, prev_hash, hash`.
    fn encode(&self, out: &mut Vec<u8>) {
        self.encode_unhashed(out);
        self.hash.encode(out);
    }
}

impl CanonicalDecode for EventEnvelope {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            event_id: Uuid::decode(cursor)?,
            stream: StreamIdentity::decode(cursor)?,
            sequence: i64::decode(cursor)?,
            tick: i64::decode(cursor)?,
            payload: EventPayload::decode(cursor)?,
            prev_hash: Hash::decode(cursor)?,
            hash: Hash::decode(cursor)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{make_model_id, StreamDomain};

    fn sample_stream() -> StreamIdentity {
        StreamIdentity::new("v1", "main", 0, StreamDomain::Topology, make_model_id("m1")).unwrap()
    }

    #[test]
    fn first_envelope_chains_from_zero_hash() {
        let stream = sample_stream();
        let payload = EventPayload::Topology(TopologyEventPayload::PlateRetired {
            plate_id: crate::ident::make_plate_id("p1"),
        });
        let envelope = EventEnvelope::first(stream, 10, payload);
        assert_eq!(envelope.prev_hash, ZERO_HASH);
        assert!(envelope.is_hash_valid());
    }

    #[test]
    fn chain_breaks_are_detectable() {
        let stream = sample_stream();
        let payload = EventPayload::Topology(TopologyEventPayload::PlateRetired {
            plate_id: crate::ident::make_plate_id("p1"),
        });
        let mut envelope = EventEnvelope::first(stream, 10, payload);
        envelope.tick = 11;
        assert!(!envelope.is_hash_valid());
    }

    #[test]
    fn event_id_is_a_pure_function_of_stream_and_sequence() {
        let stream = sample_stream();
        let payload = EventPayload::Topology(TopologyEventPayload::PlateRetired {
            plate_id: crate::ident::make_plate_id("p1"),
        });
        let a = EventEnvelope::first(stream.clone(), 10, payload.clone());
        let b = EventEnvelope::first(stream, 10, payload);
        assert_eq!(a.event_id, b.event_id);
    }

    #[test]
    fn deterministic_event_id_pinned_inputs_are_stable() {
        // Pinned input triple: deriving a UUID from ("ds-1", "asset-A", "7")
        // must be deterministic and bit-exact run over run.
        let first = derive_event_id("ds-1", "asset-A", 7);
        let second = derive_event_id("ds-1", "asset-A", 7);
        assert_eq!(first, second);
        assert_eq!(first.get_version_num(), 8);
        assert_ne!(first, derive_event_id("ds-1", "asset-A", 8));
    }

    #[test]
    fn envelope_round_trips_through_canonical_codec() {
        let stream = sample_stream();
        let payload = EventPayload::Kinematics(KinematicsEventPayload::MotionSegmentAdded(
            MotionSegment {
                id: crate::ident::make_segment_id("s1"),
                plate_id: crate::ident::make_plate_id("p1"),
                rotation: QuantizedRotation {
                    axis: [0, 0, 1_000_000],
                    angle_microrad: 42,
                },
                valid_from_tick: 0,
                valid_to_tick: None,
            },
        ));
        let envelope = EventEnvelope::first(stream, 0, payload);

        let decoded = EventEnvelope::decode_exact(&envelope.encode_to_vec()).unwrap();
        assert_eq!(decoded, envelope);
    }
}
