//! # `vigilante-app-chain`
//!
//! Client side of the App chain for the vigilante: the [`traits::AppChainClient`] capability,
//! its JSON-RPC gateway implementation in [`client`], the wire types and their conversion into
//! the domain types of `vigilante-primitives`, and the reliably-send envelope used to submit
//! messages.

// This cfg_attr is needed so that we can disable coverage in parts of the code that we don't want
// polluting coverage analysis. Removing this will cause this module to fail to compile.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod client;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod pagination;
pub mod rpc;
pub mod subscription;
pub mod traits;
pub mod types;
