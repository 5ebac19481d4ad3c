//! Bitcoin scripts.

pub mod staking;
pub mod taproot;

pub use staking::StakingScripts;
pub use taproot::{StakingOutput, UnbondingOutput, UNSPENDABLE_INTERNAL_KEY};
