//! Genesis contracts setup.
//!
//! Clones the genesis-contracts repository (and its nested pano-contracts
//! checkout), prepares the validator definitions from the collected signer
//! accounts, and drives the upstream generators that produce the shared
//! pano `genesis.json`.

use crate::config::NetworkConfig;
use crate::external::{ProcessRunner, RepositoryCloner};
use crate::pipeline::{Pipeline, Step};
use crate::setup::ProvisionState;
use color_eyre::eyre::{ensure, WrapErr};
use color_eyre::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const GENESIS_CONTRACTS_URL: &str = "https://github.com/panoprotocol/genesis-contracts";

/// Balance granted to every genesis validator (without 10^18).
const DEFAULT_BALANCE: u64 = 300_000_000;

/// One validator entry in `validators.json`.
#[derive(Debug, Serialize)]
struct ValidatorDefinition {
    address: String,
    stake: u64,
    balance: u64,
}

/// Write `validators.json` for the genesis generators, backing up any
/// stray `validators.js` the repository ships with.
pub fn write_validators_file(
    repository_dir: &Path,
    genesis_addresses: &[String],
    default_stake: u64,
) -> Result<()> {
    ensure!(
        !genesis_addresses.is_empty(),
        "no genesis validator addresses collected"
    );

    let validators: Vec<ValidatorDefinition> = genesis_addresses
        .iter()
        .map(|address| ValidatorDefinition {
            address: address.clone(),
            stake: default_stake,
            balance: DEFAULT_BALANCE,
        })
        .collect();

    let stray = repository_dir.join("validators.js");
    if stray.exists() {
        fs::rename(&stray, repository_dir.join("validators.js.backup"))
            .wrap_err("failed to back up validators.js")?;
    }

    let path = repository_dir.join("validators.json");
    fs::write(&path, serde_json::to_string_pretty(&validators)?)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

/// Genesis contracts stage.
pub struct Genesis<'a> {
    config: NetworkConfig,
    cloner: &'a dyn RepositoryCloner,
    runner: &'a dyn ProcessRunner,
}

impl<'a> Genesis<'a> {
    pub fn new(
        config: &NetworkConfig,
        cloner: &'a dyn RepositoryCloner,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            config: config.clone(),
            cloner,
            runner,
        }
    }

    /// Checkout of the genesis-contracts repository.
    pub fn repository_dir(&self) -> PathBuf {
        self.config.code_dir().join("genesis-contracts")
    }

    /// Nested pano-contracts checkout inside genesis-contracts.
    pub fn pano_contracts_dir(&self) -> PathBuf {
        self.repository_dir().join("pano-contracts")
    }

    /// The generated shared genesis file.
    pub fn genesis_file_path(&self) -> PathBuf {
        self.repository_dir().join("genesis.json")
    }

    /// Build the genesis pipeline. Requires the signer accounts to have
    /// been collected into the state before it runs.
    pub fn into_tasks(self) -> Pipeline<'a, ProvisionState> {
        let cloner = self.cloner;
        let runner = self.runner;
        let code_dir = self.config.code_dir();
        let repo_dir = self.repository_dir();
        let contracts_dir = self.pano_contracts_dir();
        let contracts_branch = self.config.contracts_branch.clone();
        let pano_chain_id = self.config.pano_chain_id.to_string();
        let delivery_chain_id = self.config.delivery_chain_id.clone();
        let default_stake = self.config.default_stake;

        let mut pipeline = Pipeline::new("genesis");

        pipeline.push(Step::leaf("Clone genesis-contracts repository", {
            let code_dir = code_dir.clone();
            move |_| {
                cloner.clone_repo("genesis-contracts", "master", GENESIS_CONTRACTS_URL, &code_dir)?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Install dependencies for genesis-contracts", {
            let dir = repo_dir.clone();
            move |_| {
                runner.run("npm", &["install"], &dir)?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Initialize submodules", {
            let dir = repo_dir.clone();
            move |_| {
                runner.run("git", &["submodule", "init"], &dir)?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Update submodules", {
            let dir = repo_dir.clone();
            move |_| {
                runner.run("git", &["submodule", "update"], &dir)?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Switch pano-contracts branch", {
            let dir = contracts_dir.clone();
            let branch = contracts_branch;
            move |_| {
                runner.run("git", &["checkout", &branch], &dir)?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Install dependencies for pano-contracts", {
            let dir = contracts_dir.clone();
            move |_| {
                runner.run("npm", &["install"], &dir)?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Process contract templates", {
            let dir = contracts_dir;
            let chain_id = pano_chain_id.clone();
            move |_| {
                runner.run(
                    "npm",
                    &["run", "template:process", "--", "--pano-chain-id", &chain_id],
                    &dir,
                )?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Write validator definitions", {
            let dir = repo_dir.clone();
            move |state: &mut ProvisionState| {
                write_validators_file(&dir, &state.genesis_addresses, default_stake)
            }
        }));

        pipeline.push(Step::leaf("Generate pano validator set", {
            let dir = repo_dir.clone();
            let pano = pano_chain_id.clone();
            let delivery = delivery_chain_id.clone();
            move |_| {
                runner.run(
                    "node",
                    &[
                        "generate-borvalidatorset.js",
                        "--pano-chain-id",
                        &pano,
                        "--delivery-chain-id",
                        &delivery,
                    ],
                    &dir,
                )?;
                Ok(())
            }
        }));

        pipeline.push(Step::leaf("Generate genesis file", {
            let dir = repo_dir;
            move |_| {
                runner.run(
                    "node",
                    &[
                        "generate-genesis.js",
                        "--pano-chain-id",
                        &pano_chain_id,
                        "--delivery-chain-id",
                        &delivery_chain_id,
                    ],
                    &dir,
                )?;
                Ok(())
            }
        }));

        pipeline
    }
}
