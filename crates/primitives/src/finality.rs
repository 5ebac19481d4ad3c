//! Finality providers and equivocation evidence.

use bitcoin::XOnlyPublicKey;
use secp256k1::SecretKey;

use crate::{
    eots::{self, EotsSignature, PubRand},
    errors::EotsError,
};

/// A finality provider as registered on the App chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalityProvider {
    /// BIP340 key of the provider.
    pub btc_pk: XOnlyPublicKey,

    /// App-chain height at which the provider was slashed, zero if never.
    pub slashed_height: u64,

    /// Bitcoin height at which the provider was slashed, zero if never.
    pub slashed_btc_height: u32,
}

impl FinalityProvider {
    /// Slashing is permanent.
    pub const fn is_slashed(&self) -> bool {
        self.slashed_height > 0 || self.slashed_btc_height > 0
    }
}

/// The message a finality provider signs when voting for a block.
pub fn vote_message(height: u64, app_hash: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + app_hash.len());
    msg.extend_from_slice(&height.to_be_bytes());
    msg.extend_from_slice(app_hash);
    msg
}

/// Proof that a finality provider voted for two blocks at the same height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    /// The equivocating provider.
    pub fp_btc_pk: XOnlyPublicKey,

    /// Height of the conflicting votes.
    pub block_height: u64,

    /// Randomness committed for `block_height`.
    pub pub_rand: PubRand,

    /// App hash of the canonical block.
    pub canonical_app_hash: Vec<u8>,

    /// App hash of the fork block.
    pub fork_app_hash: Vec<u8>,

    /// Vote on the canonical block.
    pub canonical_finality_sig: EotsSignature,

    /// Vote on the fork block.
    pub fork_finality_sig: EotsSignature,
}

impl Evidence {
    /// Extracts the secret key of the equivocating provider.
    pub fn extract_sk(&self) -> Result<SecretKey, EotsError> {
        eots::extract(
            &self.fp_btc_pk,
            &self.pub_rand,
            &vote_message(self.block_height, &self.canonical_app_hash),
            &self.canonical_finality_sig,
            &vote_message(self.block_height, &self.fork_app_hash),
            &self.fork_finality_sig,
        )
    }
}
