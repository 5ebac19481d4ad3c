//! # `btc-notify`
//!
//! `btc-notify` is the crate through which the vigilante talks to Bitcoin. It provides
//!
//! - the [`traits::Reader`] and [`traits::Broadcaster`] capabilities and a `bitcoind` JSON-RPC
//!   implementation of both in [`rpc`],
//! - the [`traits::ChainNotifier`] capability delivering block epochs and one-shot spend
//!   notifications, implemented by the polling [`notifier::PollingNotifier`].

// This cfg_attr is needed so that we can disable coverage in parts of the code that we don't want
// polluting coverage analysis. Removing this will cause this module to fail to compile.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
mod constants;
pub mod errors;
pub mod event;
pub mod notifier;
pub mod rpc;
pub mod subscription;
pub mod traits;

pub use constants::{DEFAULT_CONFIRMATION_DEPTH, DEFAULT_POLL_INTERVAL};
