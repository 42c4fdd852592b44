// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities: stream identity, domain-separated entity
//! ids, and deterministic UUID derivation.
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec::{CanonicalDecode, CanonicalEncode, Cursor, CodecError};

/// Canonical 256-bit hash used throughout this subsystem for hash-chain
/// links, snapshot roots, and derived-artifact fingerprints.
pub type Hash = [u8; 32];

/// The all-zero sentinel used as the "previous hash" of the first envelope
/// in a stream (Open Question (b): there is no real predecessor to hash).
///
/// This matches the all-zero "no parent" sentinel already used for snapshot
/// and commit hashing elsewhere in this codebase.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Computes the SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn domain_hash(prefix: &[u8], label: &str) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(prefix);
    hasher.update(label.as_bytes());
    hasher.finalize().into()
}

macro_rules! entity_id {
    ($name:ident, $prefix:expr, $make:ident) => {
        #[doc = concat!("Domain-separated entity identifier (prefix `", $prefix, "`).")]
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub Hash);

        impl $name {
            /// Returns the canonical byte representation of this id.
            #[must_use]
            pub fn as_bytes(&self) -> &Hash {
                &self.0
            }
        }

        impl CanonicalEncode for $name {
            fn encode(&self, out: &mut Vec<u8>) {
                self.0.encode(out);
            }
        }

        impl CanonicalDecode for $name {
            fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
                Ok(Self(Hash::decode(cursor)?))
            }
        }

        #[doc = concat!("Derives a stable `", stringify!($name), "` from a human-readable label via `SHA-256(", $prefix, " || label)`.")]
        #[must_use]
        pub fn $make(label: &str) -> $name {
            $name(domain_hash($prefix.as_bytes(), label))
        }
    };
}

entity_id!(ModelId, "model:", make_model_id);
entity_id!(PlateId, "plate:", make_plate_id);
entity_id!(BoundaryId, "boundary:", make_boundary_id);
entity_id!(JunctionId, "junction:", make_junction_id);
entity_id!(SegmentId, "segment:", make_segment_id);

/// Which event stream, within a model, a given identity addresses.
///
/// Topology and kinematics are modeled as independent streams per model so
/// that a consumer materializing kinematics at a tick need not replay
/// unrelated topology events, and vice versa.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub enum StreamDomain {
    /// Plate/boundary/junction graph structure events.
    Topology,
    /// Motion/rotation/velocity events.
    Kinematics,
}

impl CanonicalEncode for StreamDomain {
    fn encode(&self, out: &mut Vec<u8>) {
        let tag: u8 = match self {
            StreamDomain::Topology => 0,
            StreamDomain::Kinematics => 1,
        };
        tag.encode(out);
    }
}

impl CanonicalDecode for StreamDomain {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match u8::decode(cursor)? {
            0 => Ok(StreamDomain::Topology),
            1 => Ok(StreamDomain::Kinematics),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "StreamDomain",
            }),
        }
    }
}

impl StreamDomain {
    /// The dotted-path label this domain contributes to a stream's on-disk
    /// key path (`events/<variant>/<branch>/<level>/<domain>/<model>/...`).
    #[must_use]
    pub fn as_path_label(self) -> &'static str {
        match self {
            StreamDomain::Topology => "topology",
            StreamDomain::Kinematics => "kinematics",
        }
    }
}

/// Uniquely identifies a single append-only event stream as the 5-tuple
/// `(variant_id, branch_id, level, domain, model)`: one model's topology or
/// kinematics stream, within one branch of one variant, at one level of
/// detail.
///
/// `StreamIdentity` implements `Ord`/`Hash` so it can key `BTreeMap`s and
/// `HashMap`s directly, and round-trips through the canonical encoding
/// because it is hashed indirectly into derived-artifact fingerprints (via
/// head hashes) and directly into RNG seed derivation and deterministic
/// UUIDs.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct StreamIdentity {
    /// Named alternate configuration of the model this stream belongs to.
    pub variant_id: String,
    /// Named fork of history within the variant.
    pub branch_id: String,
    /// Level of detail/resolution this stream represents.
    pub level: i32,
    /// Which domain of events this stream carries.
    pub domain: StreamDomain,
    /// Model this stream belongs to.
    pub model_id: ModelId,
}

impl StreamIdentity {
    /// Builds a `StreamIdentity`, rejecting empty `variant_id`/`branch_id`
    /// components.
    ///
    /// # Errors
    /// Returns [`crate::error::TruthError::InvalidStreamIdentity`] if
    /// `variant_id` or `branch_id` is empty.
    pub fn new(
        variant_id: impl Into<String>,
        branch_id: impl Into<String>,
        level: i32,
        domain: StreamDomain,
        model_id: ModelId,
    ) -> Result<Self, crate::error::TruthError> {
        let variant_id = variant_id.into();
        let branch_id = branch_id.into();
        if variant_id.is_empty() {
            return Err(crate::error::TruthError::InvalidStreamIdentity {
                reason: "variant_id must not be empty".to_string(),
            });
        }
        if branch_id.is_empty() {
            return Err(crate::error::TruthError::InvalidStreamIdentity {
                reason: "branch_id must not be empty".to_string(),
            });
        }
        Ok(Self {
            variant_id,
            branch_id,
            level,
            domain,
            model_id,
        })
    }

    /// Builds this identity's on-disk key path segment, matching the
    /// external key layout `<variant>/<branch>/<level:4be>/<domain>/<model>`.
    #[must_use]
    pub fn storage_path(&self) -> Vec<u8> {
        let mut key = Vec::new();
        key.extend_from_slice(self.variant_id.as_bytes());
        key.push(b'/');
        key.extend_from_slice(self.branch_id.as_bytes());
        key.push(b'/');
        key.extend_from_slice(&self.level.to_be_bytes());
        key.push(b'/');
        key.extend_from_slice(self.domain.as_path_label().as_bytes());
        key.push(b'/');
        key.extend_from_slice(hex::encode(self.model_id.as_bytes()).as_bytes());
        key
    }
}

impl std::fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{:?}/{}",
            self.variant_id,
            self.branch_id,
            self.level,
            self.domain,
            hex::encode(self.model_id.as_bytes())
        )
    }
}

impl CanonicalEncode for StreamIdentity {
    fn encode(&self, out: &mut Vec<u8>) {
        self.variant_id.encode(out);
        self.branch_id.encode(out);
        self.level.encode(out);
        self.domain.encode(out);
        self.model_id.encode(out);
    }
}

impl CanonicalDecode for StreamIdentity {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            variant_id: String::decode(cursor)?,
            branch_id: String::decode(cursor)?,
            level: i32::decode(cursor)?,
            domain: StreamDomain::decode(cursor)?,
            model_id: ModelId::decode(cursor)?,
        })
    }
}

/// Derivation algorithm identifier recorded in `SeedAudit`, and also used as
/// the domain-separation label for deterministic UUID derivation.
pub const UUID_DERIVATION_ALGORITHM: &str = "SHA256-StreamIdentity-UUIDv8";

/// Derives a deterministic UUID from arbitrary canonical-encodable input.
///
/// The UUID is built from the first 16 bytes of `SHA-256(namespace ||
/// input.encode_to_vec())` via [`Uuid::new_v8`], which sets the RFC 4122
/// version (8, "custom") and variant bits for us rather than requiring
/// manual bit-twiddling. Identical `(namespace, input)` pairs always produce
/// the same UUID; this is intentionally not randomized.
#[must_use]
pub fn deterministic_uuid(namespace: &str, input: &impl CanonicalEncode) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(input.encode_to_vec());
    let digest: Hash = hasher.finalize().into();
    let mut bytes16 = [0u8; 16];
    bytes16.copy_from_slice(&digest[..16]);
    Uuid::new_v8(bytes16)
}

/// A tuple of strings, canonically encoded as their individual length-
/// prefixed forms in order. Used to feed [`deterministic_uuid`] from a
/// `(dataset, asset, sequence)`-shaped tuple without inventing a one-off
/// wrapper type per call site.
pub struct StringTuple<'a>(pub &'a [&'a str]);

impl CanonicalEncode for StringTuple<'_> {
    fn encode(&self, out: &mut Vec<u8>) {
        for part in self.0 {
            part.encode(out);
        }
    }
}

impl CanonicalEncode for Uuid {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl CanonicalDecode for Uuid {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let bytes: [u8; 16] = <[u8; 16]>::decode(cursor)?;
        Ok(Uuid::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_separation_prevents_cross_type_collisions() {
        let label = "foo";
        assert_ne!(make_model_id(label).0, make_plate_id(label).0);
        assert_ne!(make_plate_id(label).0, make_boundary_id(label).0);
        assert_ne!(make_boundary_id(label).0, make_junction_id(label).0);
        assert_ne!(make_junction_id(label).0, make_segment_id(label).0);
    }

    #[test]
    fn stream_identity_round_trips() {
        let ident = StreamIdentity::new("v1", "main", 0, StreamDomain::Kinematics, make_model_id("m1")).unwrap();
        let decoded = StreamIdentity::decode_exact(&ident.encode_to_vec()).unwrap();
        assert_eq!(ident, decoded);
    }

    #[test]
    fn empty_variant_or_branch_is_rejected() {
        assert!(matches!(
            StreamIdentity::new("", "main", 0, StreamDomain::Topology, make_model_id("m1")),
            Err(crate::error::TruthError::InvalidStreamIdentity { .. })
        ));
        assert!(matches!(
            StreamIdentity::new("v1", "", 0, StreamDomain::Topology, make_model_id("m1")),
            Err(crate::error::TruthError::InvalidStreamIdentity { .. })
        ));
    }

    #[test]
    fn deterministic_uuid_is_stable_and_input_sensitive() {
        let ident_a = StreamIdentity::new("v1", "main", 0, StreamDomain::Topology, make_model_id("m1")).unwrap();
        let ident_b = StreamIdentity::new("v1", "main", 0, StreamDomain::Topology, make_model_id("m2")).unwrap();

        let uuid_a1 = deterministic_uuid(UUID_DERIVATION_ALGORITHM, &ident_a);
        let uuid_a2 = deterministic_uuid(UUID_DERIVATION_ALGORITHM, &ident_a);
        let uuid_b = deterministic_uuid(UUID_DERIVATION_ALGORITHM, &ident_b);

        assert_eq!(uuid_a1, uuid_a2);
        assert_ne!(uuid_a1, uuid_b);
        assert_eq!(uuid_a1.get_version_num(), 8);
    }

    #[test]
    fn event_id_derivation_from_dataset_asset_sequence_is_stable() {
        let tuple = StringTuple(&["ds-1", "asset-A", "7"]);
        let first = deterministic_uuid("SHA256-EventId-UUIDv8", &tuple);
        let second = deterministic_uuid("SHA256-EventId-UUIDv8", &tuple);
        assert_eq!(first, second);
        assert_eq!(first.get_version_num(), 8);

        let other = StringTuple(&["ds-1", "asset-A", "8"]);
        assert_ne!(first, deterministic_uuid("SHA256-EventId-UUIDv8", &other));
    }

    #[test]
    fn zero_hash_is_all_zero_bytes() {
        assert_eq!(ZERO_HASH, [0u8; 32]);
    }
}
