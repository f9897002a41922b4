use std::path::PathBuf;

use thiserror::Error;

/// The error type for piecewise CRF operations.
///
/// Decode failures abort a single record. Configuration failures abort loss
/// construction entirely. Nothing here is raised during per-step loss execution.
#[derive(Error, Debug)]
pub enum PiecewiseError {
    /// A declared record field is absent.
    #[error("Record is missing field `{field}`")]
    MissingField {
        /// The wire name of the missing field.
        field: &'static str,
    },

    /// A record field is present but cannot be decoded into its declared shape.
    #[error("Malformed record field `{field}`: {reason}")]
    MalformedRecord {
        /// The wire name of the offending field.
        field: &'static str,
        /// Why the field was rejected.
        reason: String,
    },

    /// The record bytes are not a valid serialized example message.
    #[error("Record is not a valid serialized example")]
    InvalidRecordEncoding {
        #[source]
        source: prost::DecodeError,
    },

    /// The network output and the data pipeline disagree on a size.
    #[error("Configuration mismatch for {quantity}: data pipeline declares {expected}, network reports {actual}")]
    ConfigMismatch {
        /// The quantity being compared.
        quantity: &'static str,
        /// The size declared by the data pipeline.
        expected: usize,
        /// The size reported by the network.
        actual: usize,
    },

    /// The configuration is internally inconsistent.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// A record file has a broken frame or checksum.
    #[error("Corrupt record file {path}: {reason}")]
    CorruptRecordFile {
        /// The file being read.
        path: PathBuf,
        /// What was wrong with the frame.
        reason: String,
    },

    /// Reading a record file failed.
    #[error("Failed to read {path}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Dataset assembly failed.
    #[error("Dataset error: {message}")]
    DatasetError {
        /// The error message.
        message: String,
    },
}

/// A specialized `Result` type for piecewise CRF operations.
pub type PiecewiseResult<T> = Result<T, PiecewiseError>;
