//! Error types for the export pipeline

use thiserror::Error;

/// Main error type for the exporter
#[derive(Error, Debug)]
pub enum Error {
    /// Schema construction error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Malformed stats document
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// API transport or protocol error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error is the transient "no response" condition that
    /// triggers bisection retry rather than a terminal chunk failure.
    pub fn is_no_response(&self) -> bool {
        matches!(self, Error::Api(ApiError::NoResponse(_)))
    }
}

/// Schema construction errors
///
/// All of these are startup errors: they surface before any network
/// activity and abort the run with a specific diagnostic.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Two fields resolve to the same source key
    #[error("Duplicate field key: {key}")]
    DuplicateKey {
        /// The source key declared more than once
        key: String,
    },

    /// One field list references two different types for the same relation
    #[error("Mixed {relation} types in one field list: {first} and {second}")]
    MixedRelationTypes {
        /// The relation kind ("parent" or "child")
        relation: String,
        /// The type seen first
        first: String,
        /// The conflicting type
        second: String,
    },

    /// Aggregation name not in the closed kind set
    #[error("Unknown aggregation: {0}")]
    UnknownAggregation(String),

    /// A field key could not be parsed
    #[error("Invalid field key {key:?}: {reason}")]
    InvalidKey {
        /// The key as written in the field list
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// A schema needs at least one field
    #[error("Field list is empty")]
    Empty,
}

/// Malformed-input errors from the streaming decoder
///
/// Cursor position integrity is required for the rest of the stream, so
/// every variant is fatal for the chunk being decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The document yielded a token the format does not allow here
    #[error("Unexpected token at byte {offset}: expected {expected}, found {found}")]
    Unexpected {
        /// What the format calls for at this position
        expected: String,
        /// Description of the token actually read
        found: String,
        /// Byte offset into the stream
        offset: u64,
    },

    /// The stream ended mid-document
    #[error("Unexpected end of stream at byte {offset}: expected {expected}")]
    UnexpectedEnd {
        /// What the format calls for at this position
        expected: String,
        /// Byte offset into the stream
        offset: u64,
    },

    /// A numeric literal did not parse
    #[error("Invalid number {text:?} at byte {offset}")]
    Number {
        /// The literal as read
        text: String,
        /// Byte offset into the stream
        offset: u64,
    },

    /// A string literal held invalid UTF-8 or a bad escape
    #[error("Invalid string encoding at byte {offset}")]
    Encoding {
        /// Byte offset into the stream
        offset: u64,
    },
}

/// REST API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection-level failure where the server never answered: the
    /// overload signal that drives bisection retry
    #[error("No response from server: {0}")]
    NoResponse(String),

    /// The server answered with a non-2xx status
    #[error("HTTP {status} from {context}")]
    Status {
        /// Response status code
        status: u16,
        /// The request that failed
        context: String,
    },

    /// Transport error from the HTTP client
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response document did not match the expected shape
    #[error("Malformed response document: {0}")]
    Document(#[from] serde_json::Error),

    /// Endpoint URL could not be assembled
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
