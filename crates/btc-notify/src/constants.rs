//! This module provides the constant values used throughout the crate.

use std::time::Duration;

/// Default number of blocks that must be built on top of a block before the notifier surfaces it.
///
/// One confirmation keeps the common single-block races out of the surfaced chain. Deeper reorgs
/// are still handled by surfacing the replacement branch.
pub const DEFAULT_CONFIRMATION_DEPTH: u32 = 1;

/// Default interval between two polls of the best block.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on the number of blocks the notifier walks back in a single poll.
///
/// A larger gap makes the notifier re-bootstrap at the new tip. This is also the number of
/// surfaced block hashes kept to find the fork point of a reorg.
pub(crate) const MAX_CATCHUP_BLOCKS: u32 = 1_000;

/// `RPC_INVALID_ADDRESS_OR_KEY`, returned by `bitcoind` for unknown transactions and blocks.
pub(crate) const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;

/// `RPC_VERIFY_ALREADY_IN_CHAIN`, returned when broadcasting a transaction that is already mined.
pub(crate) const RPC_VERIFY_ALREADY_IN_CHAIN: i32 = -27;
