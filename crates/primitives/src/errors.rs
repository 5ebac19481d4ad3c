//! Error types for the primitives in this crate.

use bitcoin::Txid;
use thiserror::Error;

/// Errors raised while parsing or using adaptor signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdaptorSigError {
    /// The encoding does not have the expected length.
    #[error("malformed adaptor signature: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Required length.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The first byte of `R` is not a SEC1 compressed point prefix.
    #[error("invalid first byte of R: {0:#04x}")]
    InvalidPointPrefix(u8),

    /// A point could not be decompressed.
    #[error("point is not on the curve")]
    InvalidPoint,

    /// A scalar is not reduced modulo the curve order.
    #[error("scalar overflows the curve order")]
    ScalarOverflow,

    /// `R` must have an even y coordinate.
    #[error("nonce point has odd y coordinate")]
    OddNonce,

    /// The adaptor signature does not verify against the given keys and message.
    #[error("adaptor signature verification failed")]
    VerificationFailed,

    /// A derived secret is zero.
    #[error("derived secret key is zero")]
    ZeroSecret,
}

/// Errors raised by the extractable one-time signature scheme.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EotsError {
    /// A signature or randomness encoding is invalid.
    #[error("invalid {0} encoding")]
    InvalidEncoding(&'static str),

    /// Both signatures commit to the same challenge, nothing can be extracted.
    #[error("signatures share the same challenge")]
    IdenticalMessages,

    /// The extracted key does not belong to the claimed public key.
    #[error("extracted secret key does not match the public key")]
    KeyMismatch,
}

/// Errors raised while building staking scripts and taproot outputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// A multisig script needs at least two keys.
    #[error("multisig needs at least two keys, got {0}")]
    InsufficientMultisigKeys(usize),

    /// The same key appears twice in a multisig set.
    #[error("duplicate key in multisig set")]
    DuplicateKeys,

    /// The threshold is larger than the key set.
    #[error("quorum {quorum} exceeds key count {keys}")]
    QuorumExceedsKeyCount {
        /// Requested threshold.
        quorum: u32,
        /// Number of keys.
        keys: usize,
    },

    /// The taproot tree could not be assembled.
    #[error("could not build taproot tree: {0}")]
    Taproot(String),

    /// The control block for a leaf is missing from the spend info.
    #[error("no control block for the requested leaf")]
    MissingControlBlock,
}

/// Errors raised while assembling or parsing a slashing transaction witness.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WitnessError {
    /// The transaction has no inputs.
    #[error("transaction {0} has no inputs")]
    NoInputs(Txid),

    /// The witness stack is too short for the expected layout.
    #[error("witness has {actual} elements, need at least {required}")]
    TooShort {
        /// Minimum number of elements.
        required: usize,
        /// Actual number of elements.
        actual: usize,
    },

    /// A signature slot holds something that is neither empty nor a 64-byte signature.
    #[error("slot {slot} does not hold a valid BIP340 signature")]
    InvalidSignature {
        /// Position in the witness stack.
        slot: usize,
    },

    /// No finality provider slot carries a signature.
    #[error("no finality provider signed the slashing transaction")]
    NoFinalityProviderSignature,

    /// The finality provider is not part of the delegation.
    #[error("finality provider is not covered by the delegation")]
    UnknownFinalityProvider,

    /// Fewer covenant signatures than the quorum are available.
    #[error("only {available} covenant signatures available, quorum is {quorum}")]
    InsufficientCovenantSignatures {
        /// Available signatures.
        available: usize,
        /// Required signatures.
        quorum: u32,
    },

    /// An adaptor signature could not be decrypted.
    #[error("adaptor signature error: {0}")]
    Adaptor(#[from] AdaptorSigError),

    /// The tapscript spend path could not be derived.
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// The sighash could not be computed.
    #[error("sighash error: {0}")]
    Sighash(String),
}

/// Errors raised while decoding App-chain delegation data into domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A hex field could not be decoded.
    #[error("invalid hex in {field}: {reason}")]
    Hex {
        /// Name of the field.
        field: &'static str,
        /// Underlying error.
        reason: String,
    },

    /// A field decoded to bytes that are not a valid value of its type.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the field.
        field: &'static str,
        /// Underlying error.
        reason: String,
    },
}

impl DecodeError {
    /// Builds a [`DecodeError::Invalid`] from any displayable error.
    pub fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}
