//! # Panoforge - Provisioning utility for Pano devnet deployments
//!
//! This library bootstraps multi-node test networks for the Pano
//! blockchain stack: it derives per-node cryptographic identities,
//! assembles network-discovery metadata, renders node-specific
//! configuration, and wires the nodes into a container-based or
//! remote-host-based topology.
//!
//! ## Overview
//!
//! Given a node count and a topology, panoforge deterministically lays
//! out one workspace per node (`node0`, `node1`, ...) containing identity
//! files, an encrypted keystore, the full-mesh discovery peer list, and
//! the mutated configuration of both constituent chains. Provisioning
//! runs as a fail-fast pipeline of named steps; re-running a failed
//! pipeline is safe because every step overwrites rather than appends.
//!
//! ## Architecture
//!
//! - `config`: network configuration structures, YAML loading, validation
//! - `topology`: colocated/distributed placement strategies
//! - `identity`: per-node secp256k1 keypair and address derivation
//! - `discovery`: enode endpoints and the ordered peer set
//! - `keystore`: encrypted-at-rest key material (Web3 Secret Storage v3)
//! - `mutator`: typed field substitution in foreign config files
//! - `pipeline`: ordered, nestable, fail-fast task execution
//! - `signer`: externally supplied consensus key material
//! - `workspace`: the per-node directory layout
//! - `external`: collaborator traits (cloner, process runner, templates)
//! - `setup`: the genesis, pano, and devnet orchestration stages
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use panoforge::external::{GitCloner, ShellRunner, VarRenderer};
//! use panoforge::setup::{Devnet, ProvisionState};
//!
//! let config = panoforge::config::load_config(std::path::Path::new("devnet.yaml"))?;
//!
//! let runner = ShellRunner;
//! let cloner = GitCloner::new(&runner);
//! let devnet = Devnet::new(config, &cloner, &runner, &VarRenderer);
//!
//! let mut state = ProvisionState::default();
//! devnet.tasks().run(&mut state)?;
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Error Handling
//!
//! Typed error kinds (`ValidationError`, `EntropyError`,
//! `ConfigMutationError`, `CloneError`, `BuildError`) abort the pipeline
//! at the first failure; `color_eyre` carries the failing step name to
//! the operator. Nothing is retried inside this engine.

pub mod config;
pub mod discovery;
pub mod external;
pub mod identity;
pub mod keystore;
pub mod mutator;
pub mod pipeline;
pub mod setup;
pub mod signer;
pub mod topology;
pub mod workspace;
