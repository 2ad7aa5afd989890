//! Error types for the mmdbscan library
use std::net::IpAddr;
use thiserror::Error;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, MmdbError>;

/// Main error type for database operations
///
/// A lookup that finds no data is not an error; it is reported as `Ok(None)`.
#[derive(Debug, Error)]
pub enum MmdbError {
    /// I/O errors while opening or mapping the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata marker was not found near the end of the file
    #[error("MMDB metadata marker not found")]
    MetadataNotFound,

    /// Metadata was found but is malformed or missing required fields
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Structural corruption in the search tree or section layout
    #[error("invalid database: {0}")]
    InvalidDatabase(String),

    /// A tree path ran past the address width without reaching a leaf
    #[error("invalid search tree at {ip}/{prefix_len}")]
    InvalidSearchTree {
        /// Address accumulated when the walk ran out of bits
        ip: IpAddr,
        /// Number of bits consumed
        prefix_len: u8,
    },

    /// Data section decoding errors
    #[error("decoding error: {0}")]
    Decode(String),

    /// Address family does not fit the database
    #[error("IP version mismatch: {0}")]
    IpVersionMismatch(String),

    /// Malformed network or address text
    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

impl MmdbError {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        MmdbError::Decode(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        MmdbError::InvalidDatabase(msg.into())
    }
}
