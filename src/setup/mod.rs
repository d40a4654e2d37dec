//! Provisioning orchestration.
//!
//! Each network stage (genesis contracts, single-node pano, multi-node
//! devnet) assembles a pipeline from the shared components and runs it
//! against a [`ProvisionState`] accumulator. The network config itself is
//! never written to by a step; everything a later step needs from an
//! earlier one travels through the state.

pub mod devnet;
pub mod genesis;
pub mod pano;

pub use devnet::Devnet;
pub use genesis::Genesis;
pub use pano::Pano;

use crate::discovery::PeerSet;
use crate::signer::SignerEntry;

/// Results accumulated across pipeline steps.
#[derive(Default)]
pub struct ProvisionState {
    /// Signer dump entries, one per node, loaded by the account step.
    pub signers: Vec<SignerEntry>,
    /// Validator addresses feeding the genesis contracts.
    pub genesis_addresses: Vec<String>,
    /// Full-mesh discovery peer list, built after every identity exists.
    pub peer_set: Option<PeerSet>,
}
