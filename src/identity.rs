//! Node identity generation.
//!
//! Each node gets a fresh secp256k1 keypair for the discovery layer:
//! - Private key: 32 bytes, written hex-encoded to `nodekey` (mode 0600)
//! - Public key: 64-byte uncompressed point, embedded in the enode URI
//! - Address: last 20 bytes of the Keccak-256 of the public key
//!
//! Generation is pure; persisting the material is the caller's concern.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Keccak256};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Errors raised when the entropy source cannot produce a usable key.
/// These are fatal for the run and never retried.
#[derive(Debug, thiserror::Error)]
pub enum EntropyError {
    #[error("entropy source failure: {0}")]
    Source(String),

    #[error("entropy source produced an out-of-range scalar")]
    InvalidScalar,
}

/// A freshly generated discovery-layer keypair.
pub struct NodeKeypair {
    secret: SecretKey,
}

impl NodeKeypair {
    /// Generate a new keypair from the operating system entropy source.
    pub fn generate() -> Result<Self, EntropyError> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EntropyError::Source(e.to_string()))?;

        let secret = SecretKey::from_slice(&bytes).map_err(|_| EntropyError::InvalidScalar)?;
        Ok(Self { secret })
    }

    /// Reconstruct a keypair from a hex-encoded 32-byte secret.
    pub fn from_secret_hex(hex_key: &str) -> Result<Self, EntropyError> {
        let trimmed = hex_key.trim().trim_start_matches("0x");
        let bytes = hex::decode(trimmed).map_err(|e| EntropyError::Source(e.to_string()))?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| EntropyError::InvalidScalar)?;
        Ok(Self { secret })
    }

    /// Hex-encoded private key, without a `0x` prefix.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Uncompressed public key without the SEC1 `0x04` prefix byte.
    pub fn public_key_bytes(&self) -> [u8; 64] {
        let point = self.secret.public_key().to_encoded_point(false);
        let mut out = [0u8; 64];
        out.copy_from_slice(&point.as_bytes()[1..]);
        out
    }

    /// Derived account address: `0x` + last 20 bytes of
    /// Keccak-256 over the 64-byte public key.
    pub fn address(&self) -> String {
        let digest = Keccak256::digest(self.public_key_bytes());
        format!("0x{}", hex::encode(&digest[12..]))
    }
}

/// Write key material to `path` with permissions restricted to the owner.
pub fn write_secret_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.write_all(b"\n")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}
