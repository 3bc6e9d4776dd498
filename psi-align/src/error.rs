//! Error types for the alignment protocol.

use crate::context::{CurveName, Role};

/// Errors that can occur during a PSI alignment run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PsiError {
    /// The protocol context is invalid. Raised before any exchange.
    #[error("Invalid protocol context: {0}")]
    Config(#[from] ConfigError),

    /// A message disagreed with the negotiated context.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Input data was empty.
    #[error("Input data cannot be empty")]
    EmptyInput,

    /// Items handed to a filter did not share one non-zero length.
    #[error("Invalid item length: expected {expected} bytes, got {actual}")]
    InvalidItemLength { expected: usize, actual: usize },

    /// A cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// The transport could not deliver or receive a message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The worker pool for a run could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Reading or writing a config file failed.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Reasons a [`ProtocolContext`](crate::ProtocolContext) is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("point encoding length must be 32 or 33, but got {0}")]
    InvalidEncodingLength(usize),

    #[error("curve {curve} encodes points in {expected} bytes, but point encoding length is {actual}")]
    EncodingLengthMismatch {
        curve: CurveName,
        expected: usize,
        actual: usize,
    },

    #[error("compare length should be in [12, 32], but got {0}")]
    CompareLengthOutOfRange(usize),

    #[error("compare length must equal point encoding length for the filter variant ({compare_len} != {point_encoding_len})")]
    CompareLengthMismatch {
        compare_len: usize,
        point_encoding_len: usize,
    },

    #[error("security parameter should be in [1, 128], but got {0}")]
    InvalidSecurityParameter(u32),

    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("both parties have the same role: {0}")]
    SameRole(Role),

    #[error("input data is empty")]
    EmptySelfSet,

    #[error("peer input data is empty")]
    EmptyPeerSet,

    #[error("unknown role {0:?}, expected \"alice\" or \"bob\"")]
    UnknownRole(String),

    #[error("unknown communication role {0:?}, expected \"client\" or \"server\"")]
    UnknownCommRole(String),

    #[error("unknown psi variant {0:?}, expected \"filter_ecdh\" or \"ecdh\"")]
    UnknownVariant(String),

    #[error("unknown curve {0:?}, expected \"ristretto255\" or \"secp256k1\"")]
    UnknownCurve(String),

    #[error("bucket number should be in [1, 1000000], but got {0}")]
    InvalidBucketNum(usize),
}

/// Result type for PSI operations.
pub type Result<T> = std::result::Result<T, PsiError>;
