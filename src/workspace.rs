//! Filesystem layout of a provisioned devnet.
//!
//! Every node is addressed purely by its zero-based index; the directory
//! tree is the durable record of provisioning. Nothing here deletes;
//! cleanup belongs to the operator.

use std::fs;
use std::path::{Path, PathBuf};

/// The devnet root: one `node{i}` directory per node plus shared files.
#[derive(Debug, Clone)]
pub struct DevnetWorkspace {
    root: PathBuf,
}

impl DevnetWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The externally generated validator key dump.
    pub fn signer_dump_path(&self) -> PathBuf {
        self.root.join("signer-dump.json")
    }

    /// Workspace of the node at `index`.
    pub fn node(&self, index: usize) -> NodeWorkspace {
        NodeWorkspace {
            dir: self.root.join(format!("node{}", index)),
        }
    }
}

/// Directory tree of a single node.
#[derive(Debug, Clone)]
pub struct NodeWorkspace {
    dir: PathBuf,
}

impl NodeWorkspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pano_dir(&self) -> PathBuf {
        self.dir.join("pano")
    }

    pub fn pano_data_dir(&self) -> PathBuf {
        self.pano_dir().join("data")
    }

    pub fn pano_chain_data_dir(&self) -> PathBuf {
        self.pano_data_dir().join("pano")
    }

    pub fn keystore_dir(&self) -> PathBuf {
        self.pano_dir().join("keystore")
    }

    pub fn password_path(&self) -> PathBuf {
        self.pano_dir().join("password.txt")
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.pano_dir().join("privatekey.txt")
    }

    pub fn address_path(&self) -> PathBuf {
        self.pano_dir().join("address.txt")
    }

    pub fn node_key_path(&self) -> PathBuf {
        self.pano_dir().join("nodekey")
    }

    pub fn enode_path(&self) -> PathBuf {
        self.pano_dir().join("enode.txt")
    }

    pub fn static_nodes_path(&self) -> PathBuf {
        self.pano_dir().join("static-nodes.json")
    }

    pub fn pano_genesis_path(&self) -> PathBuf {
        self.pano_dir().join("genesis.json")
    }

    pub fn delivery_dir(&self) -> PathBuf {
        self.dir.join("deliveryd")
    }

    pub fn delivery_config_dir(&self) -> PathBuf {
        self.delivery_dir().join("config")
    }

    pub fn delivery_config_path(&self) -> PathBuf {
        self.delivery_config_dir().join("config.toml")
    }

    pub fn delivery_genesis_path(&self) -> PathBuf {
        self.delivery_config_dir().join("genesis.json")
    }

    pub fn delivery_app_config_path(&self) -> PathBuf {
        self.delivery_config_dir().join("delivery-config.toml")
    }

    pub fn docker_compose_path(&self) -> PathBuf {
        self.dir.join("docker-compose.yml")
    }

    pub fn pano_start_script_path(&self) -> PathBuf {
        self.dir.join("pano-start.sh")
    }

    pub fn pano_setup_script_path(&self) -> PathBuf {
        self.dir.join("pano-setup.sh")
    }

    pub fn delivery_start_script_path(&self) -> PathBuf {
        self.dir.join("delivery-start.sh")
    }

    pub fn delivery_server_start_script_path(&self) -> PathBuf {
        self.dir.join("delivery-server-start.sh")
    }

    pub fn delivery_bridge_start_script_path(&self) -> PathBuf {
        self.dir.join("delivery-bridge-start.sh")
    }

    /// Create the directories identity and keystore files land in.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.pano_chain_data_dir())?;
        fs::create_dir_all(self.keystore_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_paths_are_index_addressed() {
        let devnet = DevnetWorkspace::new("/tmp/net/devnet");
        let node = devnet.node(3);

        assert_eq!(node.dir(), Path::new("/tmp/net/devnet/node3"));
        assert_eq!(
            node.node_key_path(),
            Path::new("/tmp/net/devnet/node3/pano/nodekey")
        );
        assert_eq!(
            node.delivery_app_config_path(),
            Path::new("/tmp/net/devnet/node3/deliveryd/config/delivery-config.toml")
        );
        assert_eq!(
            devnet.signer_dump_path(),
            Path::new("/tmp/net/devnet/signer-dump.json")
        );
    }

    #[test]
    fn test_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let devnet = DevnetWorkspace::new(dir.path().join("devnet"));
        let node = devnet.node(0);

        node.create_dirs().unwrap();
        assert!(node.pano_chain_data_dir().is_dir());
        assert!(node.keystore_dir().is_dir());
    }
}
