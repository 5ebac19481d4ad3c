//! Error types of the Bitcoin adapters.

use bitcoin::OutPoint;
use thiserror::Error;

use crate::constants::{RPC_INVALID_ADDRESS_OR_KEY, RPC_VERIFY_ALREADY_IN_CHAIN};

/// Errors returned by [`crate::traits::Reader`] and [`crate::traits::Broadcaster`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BtcRpcError {
    /// The node answered with a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// `bitcoind` error code.
        code: i32,

        /// Error message.
        message: String,
    },

    /// The request did not reach the node or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response did not decode into the expected type.
    #[error("could not decode {what}: {reason}")]
    Decode {
        /// What was being decoded.
        what: &'static str,

        /// Underlying error.
        reason: String,
    },

    /// The client could not be constructed.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl BtcRpcError {
    /// Whether the node reported an unknown transaction or block.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == RPC_INVALID_ADDRESS_OR_KEY)
    }

    /// Whether a broadcast failed because the transaction is already mined.
    pub const fn is_already_in_chain(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == RPC_VERIFY_ALREADY_IN_CHAIN)
    }
}

impl From<jsonrpsee::core::ClientError> for BtcRpcError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        match err {
            jsonrpsee::core::ClientError::Call(obj) => Self::Rpc {
                code: obj.code(),
                message: obj.message().to_string(),
            },
            jsonrpsee::core::ClientError::ParseError(e) => Self::Decode {
                what: "response",
                reason: e.to_string(),
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Errors returned by [`crate::traits::ChainNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifierError {
    /// The underlying node could not be queried.
    #[error("bitcoin rpc: {0}")]
    Rpc(#[from] BtcRpcError),

    /// The registered locking script does not match the one of the outpoint.
    #[error("pk script mismatch for {0}")]
    PkScriptMismatch(OutPoint),

    /// The notifier has been shut down.
    #[error("notifier is shut down")]
    Shutdown,
}
