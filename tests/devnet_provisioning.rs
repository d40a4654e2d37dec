//! End-to-end provisioning scenarios exercised through the public
//! library surface, with collaborator stand-ins for the external tools.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use panoforge::config::{NetworkConfig, PasswordPolicy, ValidationError};
use panoforge::external::{
    BuildError, CloneError, ProcessOutput, ProcessRunner, RepositoryCloner, VarRenderer,
};
use panoforge::identity::NodeKeypair;
use panoforge::pipeline::{Pipeline, Selection, Step};
use panoforge::setup::{Devnet, ProvisionState};
use panoforge::signer::SignerEntry;
use panoforge::topology::Topology;

struct NoopRunner;

impl ProcessRunner for NoopRunner {
    fn run(
        &self,
        _command: &str,
        _args: &[&str],
        _cwd: &Path,
    ) -> Result<ProcessOutput, BuildError> {
        Ok(ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        })
    }
}

struct NoopCloner;

impl RepositoryCloner for NoopCloner {
    fn clone_repo(
        &self,
        _name: &str,
        _branch: &str,
        _url: &str,
        _dest_dir: &Path,
    ) -> Result<(), CloneError> {
        Ok(())
    }
}

fn make_config(
    validators: u32,
    non_validators: u32,
    topology: Topology,
    target_dir: PathBuf,
) -> NetworkConfig {
    NetworkConfig {
        validator_count: validators,
        non_validator_count: non_validators,
        pano_chain_id: 1029,
        delivery_chain_id: "delivery-1029".to_string(),
        eth_rpc_url: "https://eth.example/rpc".to_string(),
        bsc_rpc_url: "https://bsc.example/rpc".to_string(),
        pano_rpc_url: "https://pano.example/rpc".to_string(),
        pano_grid_url: "https://grid.example".to_string(),
        topology,
        hosts: Vec::new(),
        contract_addresses: None,
        password_policy: PasswordPolicy::PerNode {
            prefix: "password".to_string(),
        },
        default_stake: 10000,
        span_poll_interval: Duration::from_secs(15),
        checkpoint_poll_interval: Duration::from_secs(60),
        delivery_branch: "master".to_string(),
        pano_branch: "master".to_string(),
        contracts_branch: "stake".to_string(),
        target_dir,
    }
}

/// Write a signer dump covering `total` nodes and return its entries.
fn write_signer_dump(devnet_dir: &Path, total: usize) -> Vec<SignerEntry> {
    let entries: Vec<SignerEntry> = (0..total)
        .map(|_| {
            let keypair = NodeKeypair::generate().unwrap();
            SignerEntry {
                address: keypair.address(),
                private_key: keypair.secret_hex(),
            }
        })
        .collect();

    fs::create_dir_all(devnet_dir).unwrap();
    fs::write(
        devnet_dir.join("signer-dump.json"),
        serde_json::to_string_pretty(&entries).unwrap(),
    )
    .unwrap();

    entries
}

#[test]
fn colocated_devnet_provisions_every_node() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = make_config(2, 2, Topology::Colocated, dir.path().to_path_buf());
    config.resolve_hosts();
    config.validate().unwrap();

    assert_eq!(
        config.hosts,
        vec!["172.20.1.100", "172.20.1.101", "172.20.1.102", "172.20.1.103"]
    );

    let runner = NoopRunner;
    let cloner = NoopCloner;
    let devnet = Devnet::new(config, &cloner, &runner, &VarRenderer);
    write_signer_dump(devnet.workspace().root(), 4);

    // The provisioning subset that needs no external tools, run through
    // the pipeline machinery.
    let selection = Selection::new(Topology::Colocated);
    let pipeline = Pipeline::assemble(
        "provision",
        &selection,
        vec![
            Step::leaf("Collect signer accounts", |state| {
                devnet.collect_accounts(state)
            }),
            Step::leaf("Set up keystores", |state| {
                devnet.provision_keystores(state)
            }),
            Step::leaf("Set up discovery identities", |state| {
                devnet.provision_identities(state)
            }),
        ],
    );

    let mut state = ProvisionState::default();
    pipeline.run(&mut state).unwrap();

    let peer_set = state.peer_set.as_ref().expect("peer set built");
    assert_eq!(peer_set.len(), 4);

    let enode_re = Regex::new(r"^enode://[0-9a-f]{128}@172\.20\.1\.10[0-3]:30303$").unwrap();
    for (i, endpoint) in peer_set.endpoints().iter().enumerate() {
        assert!(
            enode_re.is_match(endpoint),
            "endpoint {} is not a valid discovery URI: {}",
            i,
            endpoint
        );
        assert!(endpoint.ends_with(&format!("@172.20.1.{}:30303", 100 + i)));
    }

    let expected_static_nodes = serde_json::to_string(peer_set.endpoints()).unwrap();
    for i in 0..4 {
        let node = devnet.workspace().node(i);
        assert!(node.dir().is_dir(), "node{} directory missing", i);
        assert!(node.node_key_path().exists());
        assert!(node.enode_path().exists());
        assert!(node.private_key_path().exists());
        assert!(node.address_path().exists());
        assert!(node.password_path().exists());
        assert_eq!(
            fs::read_to_string(node.password_path()).unwrap(),
            format!("password{}\n", i)
        );
        assert_eq!(fs::read_dir(node.keystore_dir()).unwrap().count(), 1);

        // Every node sees the identical full-mesh peer list.
        let static_nodes: Vec<String> =
            serde_json::from_str(&fs::read_to_string(node.static_nodes_path()).unwrap()).unwrap();
        assert_eq!(
            serde_json::to_string(&static_nodes).unwrap(),
            expected_static_nodes
        );
        assert_eq!(static_nodes.len(), 4);
    }
}

#[test]
fn distributed_host_mismatch_aborts_before_any_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = make_config(2, 2, Topology::Distributed, dir.path().to_path_buf());
    config.hosts = vec!["10.1.0.1".to_string(), "10.1.0.2".to_string()];
    config.resolve_hosts();

    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        ValidationError::HostCountMismatch {
            expected: 4,
            actual: 2
        }
    ));

    // Validation failed before provisioning, so nothing was created.
    assert!(!config.devnet_dir().exists());
}

#[test]
fn devnet_pipeline_selects_topology_steps() {
    let dir = tempfile::tempdir().unwrap();

    let mut colocated = make_config(1, 1, Topology::Colocated, dir.path().join("colocated"));
    colocated.resolve_hosts();
    let runner = NoopRunner;
    let cloner = NoopCloner;
    let devnet = Devnet::new(colocated, &cloner, &runner, &VarRenderer);
    let names = devnet.tasks().step_names().join(", ");
    assert!(names.contains("Render container descriptors"));
    assert!(!names.contains("Render start scripts"));
    // No contract addresses configured, so the injection step is dropped.
    assert!(!names.contains("Inject contract addresses"));

    let mut distributed = make_config(1, 1, Topology::Distributed, dir.path().join("distributed"));
    distributed.hosts = vec!["10.1.0.1".to_string(), "10.1.0.2".to_string()];
    distributed.resolve_hosts();
    let devnet = Devnet::new(distributed, &cloner, &runner, &VarRenderer);
    let names = devnet.tasks().step_names().join(", ");
    assert!(names.contains("Render start scripts"));
    assert!(!names.contains("Render container descriptors"));
}

#[test]
fn reprovisioning_generates_fresh_identities() {
    // Two provisioning runs over the same workspace must not reuse keys.
    let dir = tempfile::tempdir().unwrap();
    let mut config = make_config(1, 0, Topology::Colocated, dir.path().to_path_buf());
    config.resolve_hosts();

    let runner = NoopRunner;
    let cloner = NoopCloner;
    let devnet = Devnet::new(config, &cloner, &runner, &VarRenderer);

    let mut state = ProvisionState::default();
    devnet.provision_identities(&mut state).unwrap();
    let first = fs::read_to_string(devnet.workspace().node(0).node_key_path()).unwrap();

    let mut state = ProvisionState::default();
    devnet.provision_identities(&mut state).unwrap();
    let second = fs::read_to_string(devnet.workspace().node(0).node_key_path()).unwrap();

    assert_ne!(first, second);
}
