//! Events delivered through [`crate::subscription::Subscription`]s.

use bitcoin::{block::Header, BlockHash, OutPoint, Transaction, Txid};

/// A block connected to the best chain, surfaced once it reached the confirmation depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEpoch {
    /// Hash of the block.
    pub hash: BlockHash,

    /// Height of the block.
    pub height: u32,

    /// Header of the block.
    pub header: Header,
}

/// The transaction that spent a registered outpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendDetail {
    /// The outpoint that was spent.
    pub spent_outpoint: OutPoint,

    /// Hash of the spending transaction.
    pub spender_txid: Txid,

    /// The spending transaction.
    pub spending_tx: Transaction,

    /// Index of the input spending `spent_outpoint`.
    pub spender_input_index: u32,

    /// Height of the block containing the spending transaction.
    pub spending_height: u32,
}
