// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use truth_core::cache::{ArtifactCache, ArtifactRequest, MemoryBlobStore};
use truth_core::cancel::CancelToken;
use truth_core::ident::ZERO_HASH;
use truth_core::kv::MemoryKv;

fn request() -> ArtifactRequest {
    ArtifactRequest {
        generator_id: "contour".to_string(),
        generator_version: "2.0.0".to_string(),
        tick: 42,
        policy_hash: ZERO_HASH,
        topology_head: ZERO_HASH,
        kinematics_head: ZERO_HASH,
        extra_inputs_digest: ZERO_HASH,
    }
}

/// Many callers racing `build_or_get` on the same fingerprint must observe
/// exactly one call to the build closure, and all must end up with the same
/// manifest.
#[test]
fn concurrent_callers_on_the_same_fingerprint_build_exactly_once() {
    let cache = Arc::new(ArtifactCache::new(
        Arc::new(MemoryKv::new()),
        Arc::new(MemoryBlobStore::new()),
        true,
    ));
    let build_count = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let threads: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            let build_count = build_count.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let cancel = CancelToken::new();
                barrier.wait();
                cache
                    .build_or_get(
                        &request(),
                        1_000 + i64::from(i),
                        || {
                            build_count.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok(vec![7, 7, 7])
                        },
                        &cancel,
                    )
                    .unwrap()
            })
        })
        .collect();

    let manifests: Vec<_> = threads.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(build_count.load(Ordering::SeqCst), 1);
    let first = &manifests[0];
    for manifest in &manifests {
        assert_eq!(manifest.fingerprint, first.fingerprint);
        assert_eq!(manifest.payload_hash, first.payload_hash);
    }
}
