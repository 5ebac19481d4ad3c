//! Error types of the App-chain client.

use thiserror::Error;
use vigilante_primitives::errors::DecodeError;

/// Logged by the App chain when evidence is submitted against an already slashed provider.
pub const ERR_FP_ALREADY_SLASHED: &str = "the finality provider has been slashed";

/// Logged by the App chain for an unknown staking transaction hash.
pub const ERR_DELEGATION_NOT_FOUND: &str = "the BTC delegation is not found";

/// Logged by the App chain when an unbonding is reported twice.
pub const ERR_DELEGATION_ALREADY_UNBONDED: &str = "the BTC delegation has already been unbonded";

/// Logged by the App chain for a finality provider it does not know.
pub const ERR_FP_NOT_FOUND: &str = "the finality provider is not found";

/// Errors returned by [`crate::traits::AppChainClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppChainError {
    /// The node answered with a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// Error code.
        code: i32,

        /// Error message.
        message: String,
    },

    /// The request did not reach the node or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// A transaction was included but its execution failed.
    #[error("tx {tx_hash} failed with code {code}: {log}")]
    TxFailed {
        /// Hash of the App-chain transaction.
        tx_hash: String,

        /// ABCI result code.
        code: u32,

        /// Execution log.
        log: String,
    },

    /// A response did not convert into a domain type.
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    /// The client could not be constructed or is missing a setting.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl AppChainError {
    /// Whether any of `patterns` occurs in the error message.
    pub fn matches_any(&self, patterns: &[&str]) -> bool {
        let msg = self.to_string();
        patterns.iter().any(|p| msg.contains(p))
    }
}

impl From<jsonrpsee::core::ClientError> for AppChainError {
    fn from(err: jsonrpsee::core::ClientError) -> Self {
        match err {
            jsonrpsee::core::ClientError::Call(obj) => Self::Rpc {
                code: obj.code(),
                message: obj.message().to_string(),
            },
            jsonrpsee::core::ClientError::ParseError(e) => {
                Self::Decode(DecodeError::invalid("response", e))
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_match_against_the_full_message() {
        let err = AppChainError::TxFailed {
            tx_hash: "ABCD".into(),
            code: 1103,
            log: ERR_FP_ALREADY_SLASHED.into(),
        };

        assert!(err.matches_any(&["has been slashed"]));
        assert!(err.matches_any(&["nope", "1103"]));
        assert!(!err.matches_any(&[]));
        assert!(!err.matches_any(&["not found"]));
    }
}
