// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Content-addressed derived-artifact cache.
//!
//! The payload-storage trait below is modeled directly on this codebase's
//! content-addressed blob store, generalized from a BLAKE3-only domain to
//! take the digest algorithm as a parameter of the cache (SHA-256, per this
//! subsystem's hashing convention) and extended with the manifest type and
//! single-flight build coordination this cache requires. Single-flight
//! coordination uses a per-fingerprint mutex held for the duration of a
//! build: a second caller racing on the same fingerprint blocks acquiring
//! that lock and, once it succeeds, finds the artifact already built,
//! matching the synchronous, std-only concurrency style used throughout
//! this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::codec::{CanonicalDecode, CanonicalEncode, CodecError, Cursor};
use crate::error::TruthError;
use crate::ident::Hash;
use crate::kv::KvStore;

/// Content-addressed fingerprint of a derived-artifact request tuple.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Fingerprint(pub Hash);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The inputs that uniquely determine a derived artifact's content.
///
/// Tag order for fingerprinting: `generator_id, generator_version, tick,
/// policy_hash, topology_head, kinematics_head, extra_inputs_digest`.
#[derive(Clone, Debug)]
pub struct ArtifactRequest {
    /// Identifier of the generator that produces this artifact kind.
    pub generator_id: String,
    /// Version of the generator.
    pub generator_version: String,
    /// Tick the artifact is derived for.
    pub tick: i64,
    /// Hash of the policy configuration that influenced generation.
    pub policy_hash: Hash,
    /// Head hash of the topology stream the generator read.
    pub topology_head: Hash,
    /// Head hash of the kinematics stream the generator read.
    pub kinematics_head: Hash,
    /// Digest of any additional inputs the generator consumed.
    pub extra_inputs_digest: Hash,
}

impl CanonicalEncode for ArtifactRequest {
    fn encode(&self, out: &mut Vec<u8>) {
        self.generator_id.encode(out);
        self.generator_version.encode(out);
        self.tick.encode(out);
        self.policy_hash.encode(out);
        self.topology_head.encode(out);
        self.kinematics_head.encode(out);
        self.extra_inputs_digest.encode(out);
    }
}

/// Computes the fingerprint of `request` as `HEX(SHA256(canonical_encode(request)))`.
#[must_use]
pub fn compute_fingerprint(request: &ArtifactRequest) -> Fingerprint {
    Fingerprint(crate::ident::sha256(&request.encode_to_vec()))
}

/// Record of a single derived artifact: what produced it, and where its
/// payload lives.
#[derive(Clone, PartialEq, Debug)]
pub struct DerivedArtifactManifest {
    /// Fingerprint of the request that produced this artifact.
    pub fingerprint: Fingerprint,
    /// Generator identifier, carried for the build-audit trail.
    pub generator_id: String,
    /// Generator version, carried for the build-audit trail.
    pub generator_version: String,
    /// Tick the artifact was derived for.
    pub tick: i64,
    /// Hash of the stored payload bytes.
    pub payload_hash: Hash,
    /// Length of the stored payload, in bytes.
    pub payload_len: u64,
    /// Wall-clock time the artifact was built, in milliseconds since the
    /// Unix epoch. Supplied by the caller so this crate never reads the
    /// system clock itself.
    pub created_at_unix_ms: i64,
}

impl CanonicalEncode for DerivedArtifactManifest {
    fn encode(&self, out: &mut Vec<u8>) {
        self.fingerprint.0.encode(out);
        self.generator_id.encode(out);
        self.generator_version.encode(out);
        self.tick.encode(out);
        self.payload_hash.encode(out);
        self.payload_len.encode(out);
        self.created_at_unix_ms.encode(out);
    }
}

impl CanonicalDecode for DerivedArtifactManifest {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            fingerprint: Fingerprint(Hash::decode(cursor)?),
            generator_id: String::decode(cursor)?,
            generator_version: String::decode(cursor)?,
            tick: i64::decode(cursor)?,
            payload_hash: Hash::decode(cursor)?,
            payload_len: u64::decode(cursor)?,
            created_at_unix_ms: i64::decode(cursor)?,
        })
    }
}

/// Content-addressed payload storage, modeled on this codebase's blob
/// store trait.
pub trait ArtifactBlobStore: Send + Sync {
    /// Stores `bytes` under `hash`, overwriting any existing payload.
    fn put(&self, hash: Hash, bytes: Vec<u8>) -> Result<(), TruthError>;
    /// Fetches the payload stored under `hash`, if any.
    fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>, TruthError>;
    /// Removes the payload stored under `hash`, if any.
    fn remove(&self, hash: Hash) -> Result<(), TruthError>;
}

/// In-memory `ArtifactBlobStore` sufficient for single-process use and for
/// tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<HashMap<Hash, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactBlobStore for MemoryBlobStore {
    fn put(&self, hash: Hash, bytes: Vec<u8>) -> Result<(), TruthError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory blob store poisoned".to_string()))?;
        guard.insert(hash, bytes);
        Ok(())
    }

    fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>, TruthError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory blob store poisoned".to_string()))?;
        Ok(guard.get(&hash).cloned())
    }

    fn remove(&self, hash: Hash) -> Result<(), TruthError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| TruthError::StorageUnavailable("memory blob store poisoned".to_string()))?;
        guard.remove(&hash);
        Ok(())
    }
}

fn manifest_key(fingerprint: Fingerprint) -> Vec<u8> {
    let mut key = b"artifact/manifest/".to_vec();
    key.extend_from_slice(&fingerprint.0);
    key
}

fn history_key(generator_id: &str, created_at_unix_ms: i64, fingerprint: Fingerprint) -> Vec<u8> {
    let mut key = b"artifact/history/".to_vec();
    key.extend_from_slice(generator_id.as_bytes());
    key.push(b'/');
    key.extend_from_slice(&(created_at_unix_ms as u64).to_be_bytes());
    key.extend_from_slice(&fingerprint.0);
    key
}

fn history_prefix(generator_id: &str) -> Vec<u8> {
    let mut key = b"artifact/history/".to_vec();
    key.extend_from_slice(generator_id.as_bytes());
    key.push(b'/');
    key
}

/// Content-addressed cache of derived artifacts, with single-flight build
/// coordination and optional payload-hash verification on read.
pub struct ArtifactCache {
    manifests: Arc<dyn KvStore>,
    blobs: Arc<dyn ArtifactBlobStore>,
    /// Whether `lookup`/`build_or_get` re-hash the payload on every read.
    /// Disabling this is a performance escape hatch for trusted storage
    /// backends.
    verify_artifacts_on_read: bool,
    /// One lock per in-flight (or recently-flighted) fingerprint. Held for
    /// the duration of a build, so a second caller racing on the same
    /// fingerprint blocks on `lock()` itself rather than needing a separate
    /// wait/notify handshake — single-flight falls out of ordinary mutex
    /// contention.
    inflight: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl ArtifactCache {
    /// Builds a cache over the given manifest index and blob storage
    /// backends.
    #[must_use]
    pub fn new(
        manifests: Arc<dyn KvStore>,
        blobs: Arc<dyn ArtifactBlobStore>,
        verify_artifacts_on_read: bool,
    ) -> Self {
        Self {
            manifests,
            blobs,
            verify_artifacts_on_read,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a previously built artifact by its request tuple, without
    /// building it if absent.
    pub fn lookup(
        &self,
        request: &ArtifactRequest,
    ) -> Result<Option<(DerivedArtifactManifest, Vec<u8>)>, TruthError> {
        let fingerprint = compute_fingerprint(request);
        self.lookup_by_fingerprint(fingerprint)
    }

    fn lookup_by_fingerprint(
        &self,
        fingerprint: Fingerprint,
    ) -> Result<Option<(DerivedArtifactManifest, Vec<u8>)>, TruthError> {
        let Some(bytes) = self.manifests.get(&manifest_key(fingerprint))? else {
            return Ok(None);
        };
        let manifest = DerivedArtifactManifest::decode_exact(&bytes)?;
        let Some(payload) = self.blobs.get(manifest.payload_hash)? else {
            return Ok(None);
        };
        if self.verify_artifacts_on_read {
            let computed = crate::ident::sha256(&payload);
            if computed != manifest.payload_hash {
                warn!(%fingerprint, "evicting corrupt artifact");
                self.blobs.remove(manifest.payload_hash)?;
                self.manifests.delete(&manifest_key(fingerprint))?;
                return Err(TruthError::CorruptArtifact {
                    fingerprint: fingerprint.to_string(),
                    expected: hex::encode(manifest.payload_hash),
                    computed: hex::encode(computed),
                });
            }
        }
        Ok(Some((manifest, payload)))
    }

    /// Returns the cached artifact for `request`, building it via `build`
    /// (called at most once across concurrent callers racing on the same
    /// fingerprint) if not already present.
    pub fn build_or_get(
        &self,
        request: &ArtifactRequest,
        created_at_unix_ms: i64,
        build: impl FnOnce() -> Result<Vec<u8>, TruthError>,
        cancel: &CancelToken,
    ) -> Result<DerivedArtifactManifest, TruthError> {
        cancel.check()?;
        let fingerprint = compute_fingerprint(request);

        if let Some((manifest, _)) = self.lookup_by_fingerprint(fingerprint)? {
            return Ok(manifest);
        }

        let build_lock = {
            let mut inflight = self
                .inflight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            inflight
                .entry(fingerprint)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let _build_guard = build_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // A caller that waited on `_build_guard` may find the artifact was
        // already built by whoever held it first.
        if let Some((manifest, _)) = self.lookup_by_fingerprint(fingerprint)? {
            return Ok(manifest);
        }

        cancel.check()?;
        let payload = build()?;
        let payload_hash = crate::ident::sha256(&payload);
        let payload_len = payload.len() as u64;
        self.blobs.put(payload_hash, payload)?;

        let manifest = DerivedArtifactManifest {
            fingerprint,
            generator_id: request.generator_id.clone(),
            generator_version: request.generator_version.clone(),
            tick: request.tick,
            payload_hash,
            payload_len,
            created_at_unix_ms,
        };
        self.manifests
            .put(&manifest_key(fingerprint), manifest.encode_to_vec())?;
        self.manifests.put(
            &history_key(&request.generator_id, created_at_unix_ms, fingerprint),
            manifest.encode_to_vec(),
        )?;

        info!(%fingerprint, generator = %request.generator_id, "built derived artifact");

        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inflight.remove(&fingerprint);

        Ok(manifest)
    }

    /// Returns every manifest built by `generator_id`, ordered by
    /// `created_at_unix_ms` ascending.
    pub fn history(&self, generator_id: &str) -> Result<Vec<DerivedArtifactManifest>, TruthError> {
        let entries = self.manifests.scan_prefix(&history_prefix(generator_id))?;
        entries
            .into_iter()
            .map(|(_, bytes)| DerivedArtifactManifest::decode_exact(&bytes).map_err(TruthError::from))
            .collect()
    }
}
