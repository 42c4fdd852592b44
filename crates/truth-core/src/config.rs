// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configuration surface.
//!
//! `TruthConfig` is a plain, `serde`-(de)serializable struct, matching this
//! codebase's split of "typed value" (this struct) from "byte storage" (the
//! [`ConfigStore`] trait, implemented against the filesystem in the CLI
//! binary rather than here).

use serde::{Deserialize, Serialize};

use crate::error::TruthError;
use crate::store::TickPolicy;

/// Where derived-artifact payloads are physically stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStorageMode {
    /// Payloads live only in process memory; lost on restart.
    Memory,
    /// Payloads are persisted under a filesystem directory.
    Filesystem,
}

/// The full set of recognized configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthConfig {
    /// Policy applied to back-in-time ticks on append.
    pub tick_policy: TickPolicy,
    /// Where derived-artifact payloads are stored.
    pub artifact_storage_mode: ArtifactStorageMode,
    /// Whether artifact payloads are re-hashed on every cache read.
    pub verify_artifacts_on_read: bool,
    /// Seed used to derive scenario-level randomness, independent of any
    /// single stream's derived RNG seed.
    pub scenario_seed: u64,
    /// Name of the seed-derivation algorithm in effect, recorded for audit
    /// purposes; must match [`crate::seed::SEED_DERIVATION_ALGORITHM`].
    pub seed_algorithm: String,
}

impl Default for TruthConfig {
    fn default() -> Self {
        Self {
            tick_policy: TickPolicy::Warn,
            artifact_storage_mode: ArtifactStorageMode::Memory,
            verify_artifacts_on_read: true,
            scenario_seed: 0,
            seed_algorithm: crate::seed::SEED_DERIVATION_ALGORITHM.to_string(),
        }
    }
}

/// Storage seam for [`TruthConfig`], implemented against the filesystem by
/// the CLI binary; kept as a trait in the core crate so library consumers
/// can supply their own backend.
pub trait ConfigStore {
    /// Loads the stored configuration, or `None` if none has been saved yet.
    fn load(&self) -> Result<Option<TruthConfig>, TruthError>;
    /// Persists `config`.
    fn save(&self, config: &TruthConfig) -> Result<(), TruthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = TruthConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: TruthConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
