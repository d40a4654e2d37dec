//! Multi-node devnet provisioning.
//!
//! Assembles the full devnet pipeline: delivery testnet generation, signer
//! account collection, genesis contracts, per-node keystores, discovery
//! identities, service endpoint rewrites, and the topology-specific
//! rendering pass.

use crate::config::NetworkConfig;
use crate::discovery::{self, PeerSet, DISCOVERY_PORT};
use crate::external::{ProcessRunner, RepositoryCloner, TemplateContext, TemplateRenderer};
use crate::identity::{write_secret_file, NodeKeypair};
use crate::keystore;
use crate::mutator::{FieldKey, FileReplacer};
use crate::pipeline::{Capability, Pipeline, Selection, Step, StepOutcome};
use crate::setup::genesis::Genesis;
use crate::setup::ProvisionState;
use crate::topology::{self, Topology};
use crate::workspace::{DevnetWorkspace, NodeWorkspace};
use color_eyre::eyre::{ensure, WrapErr};
use color_eyre::Result;
use log::info;
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DELIVERY_REPO_URL: &str = "https://github.com/panoprotocol/delivery";

/// Per-node container descriptor for the colocated topology.
const DOCKER_COMPOSE_TEMPLATE: &str = r#"version: "3"

services:
  rabbit{{ node }}:
    image: rabbitmq:3-alpine
    container_name: rabbit{{ node }}
    networks:
      - devnet

  delivery{{ node }}:
    image: delivery:latest
    container_name: delivery{{ node }}
    command: deliveryd start --home /deliveryd
    volumes:
      - ./deliveryd:/deliveryd
    depends_on:
      - rabbit{{ node }}
    networks:
      - devnet

  pano{{ node }}:
    image: pano:latest
    container_name: pano{{ node }}
    entrypoint: /pano/pano-start.sh
    volumes:
      - ./pano:/pano
    networks:
      devnet:
        ipv4_address: {{ pano_host }}

networks:
  devnet:
    external: true
"#;

const PANO_SETUP_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

NODE_DIR=$PWD/pano

pano --datadir $NODE_DIR/data init $NODE_DIR/genesis.json
cp $NODE_DIR/nodekey $NODE_DIR/data/pano/nodekey
cp $NODE_DIR/static-nodes.json $NODE_DIR/data/pano/static-nodes.json
"#;

const PANO_START_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

NODE_DIR=$PWD/pano
BTTC_CHAIN_ID=

pano --datadir $NODE_DIR/data \
  --networkid $BTTC_CHAIN_ID \
  --port 30303 \
  --http --http.addr 0.0.0.0 --http.port 8545 \
  --unlock {{ signer_address }} \
  --password $NODE_DIR/password.txt \
  --keystore $NODE_DIR/keystore \
  --allow-insecure-unlock \
  --mine
"#;

const DELIVERY_START_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

deliveryd start --home $PWD/deliveryd
"#;

const DELIVERY_SERVER_START_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

deliveryd rest-server --home $PWD/deliveryd --node tcp://localhost:26657
"#;

const DELIVERY_BRIDGE_START_TEMPLATE: &str = r#"#!/usr/bin/env bash
set -e

delivery-bridge start --home $PWD/deliveryd --node-id {{ node }}
"#;

/// Format a poll interval the way the delivery config expects ("0m15s").
fn format_poll_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    format!("{}m{}s", secs / 60, secs % 60)
}

/// Multi-node devnet stage.
pub struct Devnet<'a> {
    config: NetworkConfig,
    workspace: DevnetWorkspace,
    cloner: &'a dyn RepositoryCloner,
    runner: &'a dyn ProcessRunner,
    renderer: &'a dyn TemplateRenderer,
}

impl<'a> Devnet<'a> {
    pub fn new(
        config: NetworkConfig,
        cloner: &'a dyn RepositoryCloner,
        runner: &'a dyn ProcessRunner,
        renderer: &'a dyn TemplateRenderer,
    ) -> Self {
        let workspace = DevnetWorkspace::new(config.devnet_dir());
        Self {
            config,
            workspace,
            cloner,
            runner,
            renderer,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn workspace(&self) -> &DevnetWorkspace {
        &self.workspace
    }

    /// Assemble the devnet pipeline for this configuration's topology.
    pub fn tasks(&'a self) -> Pipeline<'a, ProvisionState> {
        let selection = Selection::from_config(&self.config);

        Pipeline::assemble(
            "devnet",
            &selection,
            vec![
                Step::leaf("Set up delivery testnet", move |_| {
                    self.create_delivery_testnet()
                }),
                Step::leaf("Collect signer accounts", move |state| {
                    self.collect_accounts(state)
                }),
                Step::new("Set up genesis contracts", move |_| {
                    Ok(StepOutcome::Nested(
                        Genesis::new(&self.config, self.cloner, self.runner).into_tasks(),
                    ))
                }),
                Step::leaf("Distribute pano genesis", move |_| {
                    self.distribute_genesis()
                }),
                Step::leaf("Set up keystores", move |state| {
                    self.provision_keystores(state)
                }),
                Step::leaf("Set up discovery identities", move |state| {
                    self.provision_identities(state)
                }),
                Step::leaf("Rewrite delivery service endpoints", move |_| {
                    self.rewrite_delivery_endpoints()
                }),
                Step::leaf("Inject contract addresses", move |_| {
                    self.inject_contract_addresses()
                })
                .requires(Capability::Contracts),
                Step::leaf("Render container descriptors", move |_| {
                    self.render_container_descriptors()
                })
                .for_topology(Topology::Colocated),
                Step::leaf("Render start scripts", move |state| {
                    self.render_start_scripts(state)
                })
                .for_topology(Topology::Distributed),
            ],
        )
    }

    /// Clone and build the delivery repository, generate its testnet
    /// files, and point each node's config at its assigned hosts.
    fn create_delivery_testnet(&self) -> Result<()> {
        self.cloner.clone_repo(
            "delivery",
            &self.config.delivery_branch,
            DELIVERY_REPO_URL,
            &self.config.code_dir(),
        )?;

        let repo_dir = self.config.code_dir().join("delivery");
        self.runner.run("make", &["build"], &repo_dir)?;

        let deliveryd = repo_dir.join("build").join("deliveryd");
        let deliveryd_cmd = deliveryd.to_string_lossy().into_owned();
        let validators = self.config.validator_count.to_string();
        let non_validators = self.config.non_validator_count.to_string();

        self.runner.run(
            &deliveryd_cmd,
            &[
                "create-testnet",
                "--v",
                &validators,
                "--n",
                &non_validators,
                "--chain-id",
                &self.config.delivery_chain_id,
                "--node-host-prefix",
                "delivery",
                "--output-dir",
                "devnet",
            ],
            &self.config.target_dir,
        )?;

        let delivery_hosts = self.config.delivery_hosts();
        let pano_chain_id = self.config.pano_chain_id.to_string();

        for index in 0..self.config.total_nodes() {
            let node = self.workspace.node(index);

            let mut config_toml = FileReplacer::open(node.delivery_config_path())?;
            config_toml.replace_matches(r"(?i)delivery(\d+)", |caps| {
                let peer: usize = caps[1].parse().unwrap_or(0);
                delivery_hosts
                    .get(peer)
                    .cloned()
                    .unwrap_or_else(|| format!("delivery{}", peer))
            })?;
            config_toml.set(FieldKey::toml("moniker"), &format!("delivery{}", index))?;
            config_toml.save()?;

            let mut genesis_json = FileReplacer::open(node.delivery_genesis_path())?;
            genesis_json.set(FieldKey::json("bor_chain_id"), &pano_chain_id)?;
            genesis_json.save()?;
        }

        Ok(())
    }

    /// Load the signer dump and record the validator addresses.
    pub fn collect_accounts(&self, state: &mut ProvisionState) -> Result<()> {
        let signers = crate::signer::load_signer_dump(
            &self.workspace.signer_dump_path(),
            self.config.total_nodes(),
        )?;

        state.genesis_addresses = signers
            .iter()
            .take(self.config.validator_count as usize)
            .map(|entry| entry.address_lower())
            .collect();
        state.signers = signers;

        Ok(())
    }

    /// Copy the generated pano genesis into every node workspace.
    fn distribute_genesis(&self) -> Result<()> {
        let genesis = Genesis::new(&self.config, self.cloner, self.runner);
        let source = genesis.genesis_file_path();

        for index in 0..self.config.total_nodes() {
            let node = self.workspace.node(index);
            fs::create_dir_all(node.pano_dir())?;
            fs::copy(&source, node.pano_genesis_path()).wrap_err_with(|| {
                format!("failed to copy genesis into node{}", index)
            })?;
        }

        Ok(())
    }

    /// Write per-node passwords, key files, and encrypted keystores from
    /// the signer dump.
    pub fn provision_keystores(&self, state: &mut ProvisionState) -> Result<()> {
        let total = self.config.total_nodes();
        ensure!(
            state.signers.len() >= total,
            "signer accounts must be collected before keystore setup"
        );

        for index in 0..total {
            let node = self.workspace.node(index);
            node.create_dirs()?;

            let entry = &state.signers[index];
            let password = self.config.password_policy.password_for(index);

            fs::write(node.password_path(), format!("{}\n", password))?;
            write_secret_file(
                &node.private_key_path(),
                entry.private_key.trim_start_matches("0x"),
            )?;
            fs::write(node.address_path(), format!("{}\n", entry.address_lower()))?;

            let encrypted = keystore::encrypt(&entry.private_key, &password)?;
            keystore::write_keystore(&node.keystore_dir(), &encrypted)?;
        }

        info!("Wrote keystores for {} nodes", total);
        Ok(())
    }

    /// Generate every node's discovery identity, then fan in to the peer
    /// set and replicate `static-nodes.json` to all nodes.
    ///
    /// Per-node generation has no cross-node ordering dependency, so it
    /// runs as a bounded fan-out; the peer set is only assembled after the
    /// barrier because it needs every identity to exist.
    pub fn provision_identities(&self, state: &mut ProvisionState) -> Result<()> {
        let hosts = &self.config.hosts;
        let total = self.config.total_nodes();
        ensure!(
            hosts.len() == total,
            "host list must cover every node before identity generation"
        );

        // The fan-out closure captures only Sync data, not the
        // collaborator trait objects.
        let workspace = self.workspace.clone();
        let endpoints: Vec<String> = (0..total)
            .into_par_iter()
            .map(|index| -> Result<String> {
                let node = workspace.node(index);
                fs::create_dir_all(node.pano_dir())?;

                let keypair = NodeKeypair::generate()?;
                write_secret_file(&node.node_key_path(), &keypair.secret_hex())?;

                let endpoint = discovery::enode_endpoint(
                    &keypair.public_key_bytes(),
                    &hosts[index],
                    DISCOVERY_PORT,
                );
                write_secret_file(&node.enode_path(), &endpoint)?;

                Ok(endpoint)
            })
            .collect::<Result<Vec<_>>>()?;

        let peer_set = PeerSet::from_endpoints(endpoints);
        for index in 0..total {
            peer_set.write_static_nodes(&self.workspace.node(index).static_nodes_path())?;
        }

        info!("Generated {} discovery identities", peer_set.len());
        state.peer_set = Some(peer_set);
        Ok(())
    }

    /// Point each node's delivery services at the configured external
    /// chains and at its topology-local pano/AMQP endpoints.
    fn rewrite_delivery_endpoints(&self) -> Result<()> {
        let span_interval = format_poll_interval(self.config.span_poll_interval);
        let checkpoint_interval = format_poll_interval(self.config.checkpoint_poll_interval);

        for index in 0..self.config.total_nodes() {
            let node = self.workspace.node(index);

            let mut replacer = FileReplacer::open(node.delivery_app_config_path())?;
            replacer
                .set(FieldKey::toml("eth_rpc_url"), &self.config.eth_rpc_url)?
                .set(FieldKey::toml("bsc_rpc_url"), &self.config.bsc_rpc_url)?
                .set(FieldKey::toml("panoptis_rpc_url"), &self.config.pano_rpc_url)?
                .set(FieldKey::toml("panoptis_grid_url"), &self.config.pano_grid_url)?
                .set(
                    FieldKey::toml("pano_rpc_url"),
                    &topology::pano_rpc_endpoint(self.config.topology, index),
                )?
                .set(
                    FieldKey::toml("amqp_url"),
                    &topology::amqp_endpoint(self.config.topology, index),
                )?
                .set(FieldKey::toml("span_poll_interval"), &span_interval)?
                .set(FieldKey::toml("checkpoint_poll_interval"), &checkpoint_interval)?;
            replacer.save()?;
        }

        Ok(())
    }

    /// Stamp the deployed root-chain contract addresses into every
    /// delivery genesis.
    fn inject_contract_addresses(&self) -> Result<()> {
        let contracts = self
            .config
            .contract_addresses
            .as_ref()
            .map(|c| &c.root)
            .ok_or_else(|| color_eyre::eyre::eyre!("contract addresses not configured"))?;

        for index in 0..self.config.total_nodes() {
            let node = self.workspace.node(index);

            let mut replacer = FileReplacer::open(node.delivery_genesis_path())?;
            replacer
                .set(
                    FieldKey::json("matic_token_address"),
                    &contracts.tokens.test_token,
                )?
                .set(
                    FieldKey::json("staking_manager_address"),
                    &contracts.stake_manager_proxy,
                )?
                .set(
                    FieldKey::json("root_chain_address"),
                    &contracts.root_chain_proxy,
                )?
                .set(
                    FieldKey::json("staking_info_address"),
                    &contracts.staking_info,
                )?
                .set(
                    FieldKey::json("state_sender_address"),
                    &contracts.state_sender,
                )?;
            replacer.save()?;
        }

        Ok(())
    }

    /// Expand a template once per node, writing the result through
    /// `dest`, then drop the template file.
    fn render_per_node(
        &self,
        template_name: &str,
        template_body: &str,
        signers: Option<&[crate::signer::SignerEntry]>,
        dest: impl Fn(&NodeWorkspace) -> PathBuf,
    ) -> Result<()> {
        let template_path = self.config.target_dir.join(template_name);
        fs::write(&template_path, template_body)?;

        for index in 0..self.config.total_nodes() {
            let node = self.workspace.node(index);
            fs::create_dir_all(node.dir())?;

            let mut context =
                TemplateContext::for_node(index).with("pano_host", &self.config.hosts[index]);
            if let Some(signers) = signers {
                context = context.with_signer(&signers[index]);
            }

            let rendered = self.renderer.render(&template_path, &context)?;
            let out_path = dest(&node);
            fs::write(&out_path, rendered)?;

            if out_path.extension().map_or(false, |ext| ext == "sh") {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mut perms = fs::metadata(&out_path)?.permissions();
                    perms.set_mode(0o755);
                    fs::set_permissions(&out_path, perms)?;
                }
            }
        }

        fs::remove_file(&template_path)?;
        Ok(())
    }

    /// Colocated topology: one container descriptor per node.
    fn render_container_descriptors(&self) -> Result<()> {
        self.render_per_node(
            "docker-compose.yml.tmpl",
            DOCKER_COMPOSE_TEMPLATE,
            None,
            |node| node.docker_compose_path(),
        )
    }

    /// Distributed topology: per-node start scripts with the node's
    /// signer entry injected, then the chain id stamped into the pano
    /// start script.
    fn render_start_scripts(&self, state: &mut ProvisionState) -> Result<()> {
        ensure!(
            state.signers.len() >= self.config.total_nodes(),
            "signer accounts must be collected before script rendering"
        );

        self.render_per_node(
            "pano-setup.sh.tmpl",
            PANO_SETUP_TEMPLATE,
            None,
            |node| node.pano_setup_script_path(),
        )?;
        self.render_per_node(
            "pano-start.sh.tmpl",
            PANO_START_TEMPLATE,
            Some(&state.signers),
            |node| node.pano_start_script_path(),
        )?;
        self.render_per_node(
            "delivery-start.sh.tmpl",
            DELIVERY_START_TEMPLATE,
            None,
            |node| node.delivery_start_script_path(),
        )?;
        self.render_per_node(
            "delivery-server-start.sh.tmpl",
            DELIVERY_SERVER_START_TEMPLATE,
            None,
            |node| node.delivery_server_start_script_path(),
        )?;
        self.render_per_node(
            "delivery-bridge-start.sh.tmpl",
            DELIVERY_BRIDGE_START_TEMPLATE,
            None,
            |node| node.delivery_bridge_start_script_path(),
        )?;

        let chain_id = self.config.pano_chain_id.to_string();
        for index in 0..self.config.total_nodes() {
            let node = self.workspace.node(index);
            let mut replacer = FileReplacer::open(node.pano_start_script_path())?;
            replacer.set(FieldKey::bare("BTTC_CHAIN_ID"), &chain_id)?;
            replacer.save()?;
        }

        Ok(())
    }
}
