//! This crate provides test-utilities for the vigilante crates.
//!
//! It contains random generators for keys and Bitcoin values, a [`fixtures::DelegationFixture`]
//! that builds fully signed delegations, and in-memory Bitcoin and App-chain adapters that
//! record every broadcast and submitted message.

pub mod bitcoin;
pub mod fixtures;
pub mod mock_app_chain;
pub mod mock_btc;
