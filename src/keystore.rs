//! Encrypted keystore files (Web3 Secret Storage, version 3).
//!
//! Each node's consensus-layer private key is written encrypted at rest:
//! AES-128-CTR over the raw key, scrypt-derived encryption key, and a
//! Keccak-256 MAC binding ciphertext to the derived key. The light scrypt
//! profile is used; these are devnet keys regenerated on every
//! provisioning run.

use crate::identity::{self, NodeKeypair};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use chrono::Utc;
use ctr::Ctr128BE;
use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::{scrypt, Params};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

type Aes128Ctr = Ctr128BE<Aes128>;

const SCRYPT_LOG_N: u8 = 13;
const SCRYPT_N: u32 = 1 << SCRYPT_LOG_N;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const DKLEN: usize = 32;

/// Errors raised while encrypting or decrypting a keystore.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("invalid private key material")]
    InvalidKey,

    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("unsupported KDF parameters")]
    KdfParams,

    #[error("unsupported cipher '{0}'")]
    UnsupportedCipher(String),

    #[error("MAC mismatch (wrong password or corrupted keystore)")]
    MacMismatch,

    #[error("failed to serialize keystore")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write keystore file")]
    Write(#[from] std::io::Error),
}

/// A version-3 keystore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keystore {
    /// Account address, hex without the `0x` prefix.
    pub address: String,
    pub crypto: Crypto,
    pub id: String,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crypto {
    pub cipher: String,
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub kdf: String,
    pub kdfparams: KdfParams,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub dklen: u32,
    pub n: u32,
    pub p: u32,
    pub r: u32,
    pub salt: String,
}

fn derive_key(
    password: &str,
    salt: &[u8],
    log_n: u8,
    r: u32,
    p: u32,
) -> Result<[u8; DKLEN], KeystoreError> {
    let params = Params::new(log_n, r, p, DKLEN).map_err(|_| KeystoreError::KdfParams)?;
    let mut derived = [0u8; DKLEN];
    scrypt(password.as_bytes(), salt, &params, &mut derived)
        .map_err(|_| KeystoreError::KdfParams)?;
    Ok(derived)
}

fn keystore_mac(derived: &[u8; DKLEN], ciphertext: &[u8]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(&derived[16..32]);
    hasher.update(ciphertext);
    hex::encode(hasher.finalize())
}

/// Encrypt a hex private key under `password`.
pub fn encrypt(private_key_hex: &str, password: &str) -> Result<Keystore, KeystoreError> {
    let keypair =
        NodeKeypair::from_secret_hex(private_key_hex).map_err(|_| KeystoreError::InvalidKey)?;
    let mut secret = hex::decode(keypair.secret_hex()).map_err(|_| KeystoreError::InvalidKey)?;

    let mut salt = [0u8; 32];
    let mut iv = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt)
        .and_then(|_| OsRng.try_fill_bytes(&mut iv))
        .map_err(|e| KeystoreError::Entropy(e.to_string()))?;

    let derived = derive_key(password, &salt, SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)?;

    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(&derived[..16]),
        GenericArray::from_slice(&iv),
    );
    cipher.apply_keystream(&mut secret);

    let mac = keystore_mac(&derived, &secret);

    Ok(Keystore {
        address: keypair.address().trim_start_matches("0x").to_string(),
        crypto: Crypto {
            cipher: "aes-128-ctr".to_string(),
            ciphertext: hex::encode(&secret),
            cipherparams: CipherParams {
                iv: hex::encode(iv),
            },
            kdf: "scrypt".to_string(),
            kdfparams: KdfParams {
                dklen: DKLEN as u32,
                n: SCRYPT_N,
                p: SCRYPT_P,
                r: SCRYPT_R,
                salt: hex::encode(salt),
            },
            mac,
        },
        id: Uuid::new_v4().to_string(),
        version: 3,
    })
}

/// Decrypt a keystore, returning the hex private key.
pub fn decrypt(keystore: &Keystore, password: &str) -> Result<String, KeystoreError> {
    if keystore.crypto.cipher != "aes-128-ctr" {
        return Err(KeystoreError::UnsupportedCipher(
            keystore.crypto.cipher.clone(),
        ));
    }

    let params = &keystore.crypto.kdfparams;
    if !params.n.is_power_of_two() || params.dklen != DKLEN as u32 {
        return Err(KeystoreError::KdfParams);
    }
    let log_n = params.n.trailing_zeros() as u8;

    let salt = hex::decode(&params.salt).map_err(|_| KeystoreError::KdfParams)?;
    let iv = hex::decode(&keystore.crypto.cipherparams.iv).map_err(|_| KeystoreError::KdfParams)?;
    if iv.len() != 16 {
        return Err(KeystoreError::KdfParams);
    }
    let mut ciphertext =
        hex::decode(&keystore.crypto.ciphertext).map_err(|_| KeystoreError::KdfParams)?;

    let derived = derive_key(password, &salt, log_n, params.r, params.p)?;

    if keystore_mac(&derived, &ciphertext) != keystore.crypto.mac {
        return Err(KeystoreError::MacMismatch);
    }

    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(&derived[..16]),
        GenericArray::from_slice(&iv),
    );
    cipher.apply_keystream(&mut ciphertext);

    Ok(hex::encode(ciphertext))
}

/// Conventional keystore filename: `UTC--<timestamp>--<address>`.
pub fn keystore_filename(address: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.9fZ");
    format!(
        "UTC--{}--{}",
        timestamp,
        address.trim_start_matches("0x").to_lowercase()
    )
}

/// Serialize a keystore into `dir` with owner-only permissions.
pub fn write_keystore(dir: &Path, keystore: &Keystore) -> Result<PathBuf, KeystoreError> {
    let path = dir.join(keystore_filename(&keystore.address));
    let json = serde_json::to_string_pretty(keystore)?;
    identity::write_secret_file(&path, &json)?;
    Ok(path)
}
