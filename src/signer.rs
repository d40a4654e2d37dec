//! Signer dump loading.
//!
//! The signer dump is the externally generated, ordered list of
//! validator and non-validator key material (`signer-dump.json`, written
//! by the delivery testnet generator). Entry `i` is the consensus-layer
//! account of node `i`, distinct key material from the discovery-layer
//! node identity. It is treated as ground truth, so each entry's listed
//! address is cross-checked against its private key before anything
//! downstream consumes it.

use crate::config::ValidationError;
use crate::identity::NodeKeypair;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One externally supplied account: address plus hex private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerEntry {
    pub address: String,
    #[serde(rename = "priv_key")]
    pub private_key: String,
}

impl SignerEntry {
    /// Address in canonical lowercase `0x...` form.
    pub fn address_lower(&self) -> String {
        let trimmed = self.address.trim().trim_start_matches("0x");
        format!("0x{}", trimmed.to_lowercase())
    }
}

/// Load the signer dump and verify it covers `total_nodes` entries whose
/// addresses match their private keys.
pub fn load_signer_dump(path: &Path, total_nodes: usize) -> Result<Vec<SignerEntry>> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read signer dump '{}'", path.display()))?;

    let entries: Vec<SignerEntry> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("failed to parse signer dump '{}'", path.display()))?;

    if entries.len() < total_nodes {
        return Err(ValidationError::SignerDumpTooShort {
            expected: total_nodes,
            actual: entries.len(),
        }
        .into());
    }

    for (index, entry) in entries.iter().take(total_nodes).enumerate() {
        let keypair = NodeKeypair::from_secret_hex(&entry.private_key)
            .wrap_err_with(|| format!("signer dump entry {} has an invalid private key", index))?;

        let derived = keypair.address();
        if derived != entry.address_lower() {
            return Err(ValidationError::SignerAddressMismatch {
                index,
                listed: entry.address.clone(),
                derived,
            }
            .into());
        }
    }

    info!(
        "Loaded signer dump with {} entries from {:?}",
        entries.len(),
        path
    );

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry_for(keypair: &NodeKeypair) -> SignerEntry {
        SignerEntry {
            address: keypair.address(),
            private_key: format!("0x{}", keypair.secret_hex()),
        }
    }

    fn dump_file(entries: &[SignerEntry]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", serde_json::to_string_pretty(entries).unwrap()).unwrap();
        f
    }

    #[test]
    fn test_load_valid_dump() {
        let keypairs: Vec<NodeKeypair> =
            (0..3).map(|_| NodeKeypair::generate().unwrap()).collect();
        let entries: Vec<SignerEntry> = keypairs.iter().map(entry_for).collect();
        let file = dump_file(&entries);

        let loaded = load_signer_dump(file.path(), 3).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[1].address, entries[1].address);
    }

    #[test]
    fn test_known_vector_entry() {
        let entries = vec![SignerEntry {
            address: "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".to_string(),
            private_key:
                "0x0000000000000000000000000000000000000000000000000000000000000001"
                    .to_string(),
        }];
        let file = dump_file(&entries);

        // Mixed-case listed address still matches the derived one.
        assert!(load_signer_dump(file.path(), 1).is_ok());
    }

    #[test]
    fn test_dump_too_short() {
        let keypair = NodeKeypair::generate().unwrap();
        let file = dump_file(&[entry_for(&keypair)]);

        let err = load_signer_dump(file.path(), 4).unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().unwrap();
        assert!(matches!(
            validation,
            ValidationError::SignerDumpTooShort {
                expected: 4,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_address_mismatch_rejected() {
        let a = NodeKeypair::generate().unwrap();
        let b = NodeKeypair::generate().unwrap();
        let entries = vec![SignerEntry {
            address: b.address(),
            private_key: a.secret_hex(),
        }];
        let file = dump_file(&entries);

        let err = load_signer_dump(file.path(), 1).unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().unwrap();
        assert!(matches!(
            validation,
            ValidationError::SignerAddressMismatch { index: 0, .. }
        ));
    }
}
