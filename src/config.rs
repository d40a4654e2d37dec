//! Network configuration loading and validation.
//!
//! The network config is the single shared parameter object for a
//! provisioning run. It is loaded from YAML once, host lists are resolved
//! for the selected topology, and the result is treated as immutable by
//! every pipeline step.

use crate::topology::{self, Topology};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors produced while validating a network configuration or the
/// externally supplied key material it references.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("network must have at least one node")]
    NoNodes,

    #[error("host list has {actual} entries, expected {expected}")]
    HostCountMismatch { expected: usize, actual: usize },

    #[error("invalid contract address for {name}: '{address}'")]
    InvalidContractAddress { name: String, address: String },

    #[error("missing endpoint URL: {0}")]
    MissingEndpoint(&'static str),

    #[error("signer dump has {actual} entries, need at least {expected}")]
    SignerDumpTooShort { expected: usize, actual: usize },

    #[error(
        "signer dump entry {index}: listed address {listed} does not match \
         its private key (derived {derived})"
    )]
    SignerAddressMismatch {
        index: usize,
        listed: String,
        derived: String,
    },
}

/// Shared parameters for a provisioning run, read from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Number of validator nodes.
    pub validator_count: u32,
    /// Number of non-validator (full) nodes.
    pub non_validator_count: u32,
    /// Chain id of the pano execution chain.
    pub pano_chain_id: u64,
    /// Chain id of the delivery checkpointing chain.
    pub delivery_chain_id: String,
    /// Root-chain (Ethereum) RPC endpoint.
    pub eth_rpc_url: String,
    /// BSC RPC endpoint.
    pub bsc_rpc_url: String,
    /// External pano RPC endpoint.
    pub pano_rpc_url: String,
    /// Pano grid service endpoint.
    pub pano_grid_url: String,
    /// Node placement strategy.
    pub topology: Topology,
    /// One host per node. Required for the distributed topology; synthesized
    /// at load time for the colocated topology.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Deployed root-chain contract addresses, when already available.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contract_addresses: Option<ContractAddresses>,
    /// How keystore passwords are assigned to nodes.
    #[serde(default)]
    pub password_policy: PasswordPolicy,
    /// Stake per validator in the generated genesis (without 10^18).
    #[serde(default = "default_stake")]
    pub default_stake: u64,
    /// Delivery span poll interval.
    #[serde(with = "humantime_serde", default = "default_span_poll_interval")]
    pub span_poll_interval: Duration,
    /// Delivery checkpoint poll interval.
    #[serde(with = "humantime_serde", default = "default_checkpoint_poll_interval")]
    pub checkpoint_poll_interval: Duration,
    /// Branch of the delivery repository to build.
    #[serde(default = "default_branch")]
    pub delivery_branch: String,
    /// Branch of the pano repository to build.
    #[serde(default = "default_branch")]
    pub pano_branch: String,
    /// Branch of the nested pano-contracts checkout.
    #[serde(default = "default_contracts_branch")]
    pub contracts_branch: String,
    /// Output root. The devnet tree lives under `<target_dir>/devnet`,
    /// cloned repositories under `<target_dir>/code`.
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,
}

fn default_stake() -> u64 {
    10000
}

fn default_span_poll_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_checkpoint_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_contracts_branch() -> String {
    "stake".to_string()
}

fn default_target_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Deployed root-chain contract addresses, matching the layout of the
/// contract deployment output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub root: RootContracts,
}

/// Contracts deployed on the root chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootContracts {
    pub tokens: TokenAddresses,
    #[serde(rename = "StakeManagerProxy")]
    pub stake_manager_proxy: String,
    #[serde(rename = "RootChainProxy")]
    pub root_chain_proxy: String,
    #[serde(rename = "StakingInfo")]
    pub staking_info: String,
    #[serde(rename = "StateSender")]
    pub state_sender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAddresses {
    #[serde(rename = "TestToken")]
    pub test_token: String,
}

impl RootContracts {
    /// All addresses paired with the names used in error reporting.
    pub fn named_addresses(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("TestToken", self.tokens.test_token.as_str()),
            ("StakeManagerProxy", self.stake_manager_proxy.as_str()),
            ("RootChainProxy", self.root_chain_proxy.as_str()),
            ("StakingInfo", self.staking_info.as_str()),
            ("StateSender", self.state_sender.as_str()),
        ]
    }
}

/// Keystore password assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordPolicy {
    /// One password per node: `<prefix><index>`.
    PerNode { prefix: String },
    /// The same password for every node.
    Fixed { password: String },
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        PasswordPolicy::PerNode {
            prefix: "password".to_string(),
        }
    }
}

impl PasswordPolicy {
    /// Password for the node at `index`.
    pub fn password_for(&self, index: usize) -> String {
        match self {
            PasswordPolicy::PerNode { prefix } => format!("{}{}", prefix, index),
            PasswordPolicy::Fixed { password } => password.clone(),
        }
    }
}

impl NetworkConfig {
    /// Total number of nodes in the network.
    pub fn total_nodes(&self) -> usize {
        (self.validator_count + self.non_validator_count) as usize
    }

    /// Root of the per-node devnet tree.
    pub fn devnet_dir(&self) -> PathBuf {
        self.target_dir.join("devnet")
    }

    /// Directory holding cloned third-party repositories.
    pub fn code_dir(&self) -> PathBuf {
        self.target_dir.join("code")
    }

    /// Fill in the host list for topologies that synthesize their own
    /// address space. Distributed hosts are left exactly as supplied.
    pub fn resolve_hosts(&mut self) {
        if self.topology == Topology::Colocated {
            self.hosts = topology::synthesize_pano_hosts(self.total_nodes());
        }
    }

    /// Host list for the delivery chain, derived from the topology.
    pub fn delivery_hosts(&self) -> Vec<String> {
        topology::delivery_hosts(self.topology, &self.hosts)
    }

    /// Validate the configuration. Must be called after `resolve_hosts`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.total_nodes() == 0 {
            return Err(ValidationError::NoNodes);
        }

        if self.hosts.len() != self.total_nodes() {
            return Err(ValidationError::HostCountMismatch {
                expected: self.total_nodes(),
                actual: self.hosts.len(),
            });
        }

        for (name, url) in [
            ("eth_rpc_url", &self.eth_rpc_url),
            ("bsc_rpc_url", &self.bsc_rpc_url),
            ("pano_rpc_url", &self.pano_rpc_url),
            ("pano_grid_url", &self.pano_grid_url),
        ] {
            if url.is_empty() {
                return Err(ValidationError::MissingEndpoint(name));
            }
        }

        if let Some(contracts) = &self.contract_addresses {
            let address_re = Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex");
            for (name, address) in contracts.root.named_addresses() {
                if !address_re.is_match(address) {
                    return Err(ValidationError::InvalidContractAddress {
                        name: name.to_string(),
                        address: address.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Load and validate a network configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<NetworkConfig> {
    info!("Loading network configuration from {:?}", path);

    let file = File::open(path)
        .wrap_err_with(|| format!("failed to open network config '{}'", path.display()))?;

    let mut config: NetworkConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("failed to parse network config '{}'", path.display()))?;

    config.resolve_hosts();
    config.validate()?;

    info!(
        "Network config: {} validators, {} non-validators, topology {:?}",
        config.validator_count, config.non_validator_count, config.topology
    );

    Ok(config)
}
