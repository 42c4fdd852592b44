// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Truth CLI entrypoint.
//!
//! Drives `truth-core` from the command line for manual inspection and
//! scenario replay: showing and initializing the on-disk configuration,
//! printing a stream's derived deterministic seed, and running a small
//! deterministic scenario end to end (append, materialize, build a derived
//! artifact) to exercise the full pipeline.
//!
//! # Usage
//! ```text
//! truth-cli <command> [options]
//! ```
//!
//! The CLI exits with code `0` on success and non-zero on error.

#![deny(rust_2018_idioms)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]
// The CLI is expected to print to stdout/stderr.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use truth_core::cache::{compute_fingerprint, ArtifactCache, ArtifactRequest, MemoryBlobStore};
use truth_core::cancel::CancelToken;
use truth_core::config::{ConfigStore, TruthConfig};
use truth_core::event::{Plate, TopologyEventPayload};
use truth_core::ident::{make_model_id, StreamDomain, StreamIdentity};
use truth_core::kv::MemoryKv;
use truth_core::materialize::{materialize, MaterializeTarget};
use truth_core::seed::derive_stream_seed;
use truth_core::snapshot::{SnapshotStore, StateView};
use truth_core::store::{AppendOptions, EventStore};

#[derive(Debug, Parser)]
#[command(name = "truth-cli", about = "Inspect and replay truth-core scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Configuration inspection and initialization.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Prints the deterministic RNG seed derived for a model's stream.
    Seed {
        /// Human-readable model label.
        model_label: String,
        /// Which domain's stream to derive a seed for.
        #[arg(value_enum)]
        domain: DomainArg,
        /// Scenario variant identifier.
        #[arg(long, default_value = "v1")]
        variant_id: String,
        /// Branch identifier.
        #[arg(long, default_value = "main")]
        branch_id: String,
        /// Level-of-detail index.
        #[arg(long, default_value_t = 0)]
        level: i32,
    },
    /// Runs a small deterministic scenario: append a few topology events,
    /// materialize at a target tick, and build a derived artifact from the
    /// result.
    Demo {
        /// Model label to scope the scenario's streams under.
        #[arg(long, default_value = "demo-model")]
        model_label: String,
        /// Tick to materialize state at.
        #[arg(long, default_value_t = 2)]
        target_tick: i64,
        /// Scenario variant identifier.
        #[arg(long, default_value = "v1")]
        variant_id: String,
        /// Branch identifier.
        #[arg(long, default_value = "main")]
        branch_id: String,
        /// Level-of-detail index.
        #[arg(long, default_value_t = 0)]
        level: i32,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Prints the effective configuration (on-disk, falling back to
    /// defaults).
    Show,
    /// Writes the default configuration to disk, without overwriting an
    /// existing file.
    Init,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum DomainArg {
    Topology,
    Kinematics,
}

impl From<DomainArg> for StreamDomain {
    fn from(value: DomainArg) -> Self {
        match value {
            DomainArg::Topology => StreamDomain::Topology,
            DomainArg::Kinematics => StreamDomain::Kinematics,
        }
    }
}

/// Filesystem-backed `ConfigStore`, reusing this codebase's config-port
/// pattern: the trait lives at the core crate's library boundary, the
/// filesystem implementation lives here in the CLI binary.
struct FsConfigStore {
    path: PathBuf,
}

impl FsConfigStore {
    fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "flyingrobots", "truth")
            .context("could not determine a config directory for this platform")?;
        let dir = dirs.config_dir();
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self {
            path: dir.join("config.json"),
        })
    }
}

impl ConfigStore for FsConfigStore {
    fn load(&self) -> Result<Option<TruthConfig>, truth_core::error::TruthError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let config = serde_json::from_str(&contents).map_err(|err| {
                    truth_core::error::TruthError::StorageUnavailable(err.to_string())
                })?;
                Ok(Some(config))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(truth_core::error::TruthError::StorageUnavailable(
                err.to_string(),
            )),
        }
    }

    fn save(&self, config: &TruthConfig) -> Result<(), truth_core::error::TruthError> {
        let json = serde_json::to_string_pretty(config)
            .map_err(|err| truth_core::error::TruthError::StorageUnavailable(err.to_string()))?;
        fs::write(&self.path, json)
            .map_err(|err| truth_core::error::TruthError::StorageUnavailable(err.to_string()))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Config { action } => run_config(action),
        Command::Seed {
            model_label,
            domain,
            variant_id,
            branch_id,
            level,
        } => run_seed(&model_label, domain, &variant_id, &branch_id, level),
        Command::Demo {
            model_label,
            target_tick,
            variant_id,
            branch_id,
            level,
        } => run_demo(&model_label, target_tick, &variant_id, &branch_id, level),
    }
}

fn run_config(action: ConfigAction) -> Result<()> {
    let store = FsConfigStore::discover()?;
    match action {
        ConfigAction::Show => {
            let config = store.load()?.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            if store.load()?.is_some() {
                println!("config already exists at {}", store.path.display());
            } else {
                store.save(&TruthConfig::default())?;
                println!("wrote default config to {}", store.path.display());
            }
        }
    }
    Ok(())
}

fn run_seed(
    model_label: &str,
    domain: DomainArg,
    variant_id: &str,
    branch_id: &str,
    level: i32,
) -> Result<()> {
    let config_store = FsConfigStore::discover()?;
    let config = config_store.load()?.unwrap_or_default();

    let stream = StreamIdentity::new(
        variant_id,
        branch_id,
        level,
        domain.into(),
        make_model_id(model_label),
    )
    .map_err(|err| anyhow::anyhow!(err))?;
    let audit = derive_stream_seed(config.scenario_seed, &stream);
    println!(
        "{{\"stream\":\"{stream}\",\"algorithm\":\"{}\",\"seed0\":{},\"seed1\":{}}}",
        audit.algorithm, audit.seed0, audit.seed1
    );
    Ok(())
}

fn run_demo(
    model_label: &str,
    target_tick: i64,
    variant_id: &str,
    branch_id: &str,
    level: i32,
) -> Result<()> {
    let kv = Arc::new(MemoryKv::new());
    let store = EventStore::new(kv.clone());
    let snapshots = SnapshotStore::new(kv.clone());
    let cache = ArtifactCache::new(kv, Arc::new(MemoryBlobStore::new()), true);
    let cancel = CancelToken::new();

    let stream = StreamIdentity::new(
        variant_id,
        branch_id,
        level,
        StreamDomain::Topology,
        make_model_id(model_label),
    )
    .map_err(|err| anyhow::anyhow!(err))?;

    for (tick, label) in [(0, "pacific"), (1, "nazca"), (2, "cocos")] {
        store.append(
            &stream,
            tick,
            truth_core::event::EventPayload::Topology(TopologyEventPayload::PlateCreated(
                Plate {
                    id: truth_core::ident::make_plate_id(label),
                    name: label.to_string(),
                },
            )),
            AppendOptions::default(),
            &cancel,
        )?;
    }

    let head = store
        .head(&stream)?
        .context("expected at least one appended event")?;

    let state = materialize(
        &store,
        &snapshots,
        MaterializeTarget {
            stream: stream.clone(),
            tick: target_tick,
        },
        &cancel,
    )?;
    let StateView::Topology(topology) = state else {
        anyhow::bail!("expected topology state for a topology stream");
    };
    println!(
        "materialized {} plate(s) at tick {target_tick}",
        topology.plates.len()
    );

    let request = ArtifactRequest {
        generator_id: "plate-roster".to_string(),
        generator_version: "1.0.0".to_string(),
        tick: target_tick,
        policy_hash: truth_core::ident::ZERO_HASH,
        topology_head: head.hash,
        kinematics_head: truth_core::ident::ZERO_HASH,
        extra_inputs_digest: truth_core::ident::ZERO_HASH,
    };
    let fingerprint = compute_fingerprint(&request);
    let names: Vec<&str> = topology.plates.values().map(|plate| plate.name.as_str()).collect();
    let manifest = cache.build_or_get(
        &request,
        0,
        || Ok(names.join(",").into_bytes()),
        &cancel,
    )?;

    println!(
        "derived artifact {fingerprint} payload_len={}",
        manifest.payload_len
    );
    Ok(())
}
