//! Error types for the benchmark.
//!
//! Every failure during a benchmark run is fatal to that run; startup
//! failures are fatal to the server process.

use crate::Format;
use thiserror::Error;

/// Result type alias for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Phase of a benchmark cycle an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Encode,
    Transfer,
    Decode,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Encode => "encode",
            Phase::Transfer => "transfer",
            Phase::Decode => "decode",
        })
    }
}

/// Main error type.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Server could not initialize (schema load, bind).
    #[error("startup error: {0}")]
    Startup(String),

    /// Network failure or timeout while fetching a format.
    #[error("request error [{format}/transfer]: {source}")]
    Request {
        format: Format,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("request error [{format}/transfer]: server answered {status}: {body}")]
    Status {
        format: Format,
        status: u16,
        body: String,
    },

    /// Codec not attached yet (protobuf schema still loading).
    #[error("{0} codec is not ready")]
    NotReady(Format),

    /// Bytes could not be decoded as the declared format.
    #[error("decode error [{format}/decode]: {message}")]
    Decode { format: Format, message: String },

    /// Dataset could not be encoded.
    #[error("encode error [{format}/encode]: {message}")]
    Encode { format: Format, message: String },

    #[error("unknown format: {0} (json|msgpack|protobuf|pson)")]
    UnknownFormat(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    pub fn decode(format: Format, err: impl std::fmt::Display) -> Self {
        BenchError::Decode {
            format,
            message: err.to_string(),
        }
    }

    pub fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        BenchError::Encode {
            format,
            message: err.to_string(),
        }
    }

    /// Format and phase the error is attributed to, when there is one.
    pub fn location(&self) -> Option<(Format, Phase)> {
        match self {
            BenchError::Request { format, .. } | BenchError::Status { format, .. } => {
                Some((*format, Phase::Transfer))
            }
            BenchError::NotReady(format) => Some((*format, Phase::Transfer)),
            BenchError::Decode { format, .. } => Some((*format, Phase::Decode)),
            BenchError::Encode { format, .. } => Some((*format, Phase::Encode)),
            _ => None,
        }
    }
}
