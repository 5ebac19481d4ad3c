//! This crate contains the types, cryptography and pure functions shared by the vigilante
//! crates: BTC delegations as seen by the App chain, the Babylon staking tapscripts, adaptor
//! signatures, extractable one-time signatures and the slashing transaction witness layout.
//!
//! It lies at the bottom of the crate hierarchy in this workspace i.e., it does not depend on any
//! other crate in this workspace.

pub mod adaptor;
pub mod delegation;
pub mod eots;
pub mod errors;
pub mod finality;
pub mod msgs;
pub mod params;
pub mod schnorr;
pub mod scripts;
pub mod secp;
pub mod witness;

#[cfg(test)]
mod test_utils;
