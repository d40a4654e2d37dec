//! Discovery endpoint construction and peer-set assembly.
//!
//! A discovery endpoint is the canonical enode URI other nodes use to find
//! and authenticate a peer. The peer set is the full-mesh bootstrap list:
//! every node receives the same `static-nodes.json`, in cluster index
//! order, so each node's view of the network is identical and stable
//! across re-runs with the same identities.

use std::fs;
use std::path::Path;

/// Fixed discovery port used by every node.
pub const DISCOVERY_PORT: u16 = 30303;

/// Format the canonical discovery URI for a node identity on a host.
pub fn enode_endpoint(public_key: &[u8; 64], host: &str, port: u16) -> String {
    format!("enode://{}@{}:{}", hex::encode(public_key), host, port)
}

/// Ordered collection of every node's discovery endpoint.
///
/// Order is the cluster node index order; no sorting and no deduplication.
/// Duplicate hosts are expected under the colocated topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSet {
    endpoints: Vec<String>,
}

impl PeerSet {
    /// Build a peer set from endpoints in node index order.
    pub fn from_endpoints(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Serialize the peer set as the `static-nodes.json` array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.endpoints)
    }

    /// Write the peer set to a node's `static-nodes.json`.
    pub fn write_static_nodes(&self, path: &Path) -> color_eyre::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enode_format() {
        let public_key = [0xabu8; 64];
        let endpoint = enode_endpoint(&public_key, "172.20.1.100", DISCOVERY_PORT);
        assert_eq!(
            endpoint,
            format!("enode://{}@172.20.1.100:30303", "ab".repeat(64))
        );
    }

    #[test]
    fn test_peer_set_preserves_order() {
        let endpoints = vec![
            "enode://cc@10.0.0.3:30303".to_string(),
            "enode://aa@10.0.0.1:30303".to_string(),
            "enode://bb@10.0.0.2:30303".to_string(),
        ];
        let peers = PeerSet::from_endpoints(endpoints.clone());
        assert_eq!(peers.endpoints(), endpoints.as_slice());
    }

    #[test]
    fn test_peer_set_keeps_duplicate_hosts() {
        // Colocated nodes deliberately share an address block; only the
        // embedded public key distinguishes them.
        let endpoints = vec![
            format!("enode://{}@172.20.1.100:30303", "aa".repeat(64)),
            format!("enode://{}@172.20.1.100:30303", "bb".repeat(64)),
        ];
        let peers = PeerSet::from_endpoints(endpoints);
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn test_static_nodes_json() {
        let peers = PeerSet::from_endpoints(vec![
            "enode://aa@h0:30303".to_string(),
            "enode://bb@h1:30303".to_string(),
        ]);

        let json = peers.to_json().unwrap();
        let parsed: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, peers.endpoints());
    }

    #[test]
    fn test_write_static_nodes_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node0").join("pano").join("static-nodes.json");

        let peers = PeerSet::from_endpoints(vec!["enode://aa@h0:30303".to_string()]);
        peers.write_static_nodes(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("enode://aa@h0:30303"));
    }
}
