//! Error types for the graph builder

use std::io;
use thiserror::Error;

/// Result type for builder operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while building, merging or materializing a graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Already present: {0}")]
    AlreadyPresent(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Opset version conflict for domain '{domain}': registered {existing}, requested {requested}")]
    VersionConflict {
        domain: String,
        existing: i64,
        requested: i64,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Handle was already transferred: {0}")]
    UseAfterTransfer(String),

    #[error("No opset registered for domain '{0}'")]
    MissingOpset(String),

    #[error("Graph contains a cycle: {0}")]
    CyclicGraph(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Stable, fieldless status code for an error
///
/// This is what crosses the handle table boundary; the discriminants are
/// part of the table contract and are only ever appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    InvalidArgument = 1,
    DuplicateName = 2,
    AlreadyPresent = 3,
    UnresolvedReference = 4,
    DanglingReference = 5,
    VersionConflict = 6,
    Unsupported = 7,
    UseAfterTransfer = 8,
    MissingOpset = 9,
    CyclicGraph = 10,
    Execution = 11,
    Io = 12,
    Serialization = 13,
}

impl ErrorKind {
    /// Look up a kind by its status code
    pub fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            1 => ErrorKind::InvalidArgument,
            2 => ErrorKind::DuplicateName,
            3 => ErrorKind::AlreadyPresent,
            4 => ErrorKind::UnresolvedReference,
            5 => ErrorKind::DanglingReference,
            6 => ErrorKind::VersionConflict,
            7 => ErrorKind::Unsupported,
            8 => ErrorKind::UseAfterTransfer,
            9 => ErrorKind::MissingOpset,
            10 => ErrorKind::CyclicGraph,
            11 => ErrorKind::Execution,
            12 => ErrorKind::Io,
            13 => ErrorKind::Serialization,
            _ => return None,
        };
        Some(kind)
    }
}

impl GraphError {
    /// Get the status code of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GraphError::DuplicateName(_) => ErrorKind::DuplicateName,
            GraphError::AlreadyPresent(_) => ErrorKind::AlreadyPresent,
            GraphError::UnresolvedReference(_) => ErrorKind::UnresolvedReference,
            GraphError::DanglingReference(_) => ErrorKind::DanglingReference,
            GraphError::VersionConflict { .. } => ErrorKind::VersionConflict,
            GraphError::Unsupported(_) => ErrorKind::Unsupported,
            GraphError::UseAfterTransfer(_) => ErrorKind::UseAfterTransfer,
            GraphError::MissingOpset(_) => ErrorKind::MissingOpset,
            GraphError::CyclicGraph(_) => ErrorKind::CyclicGraph,
            GraphError::Execution(_) => ErrorKind::Execution,
            GraphError::Io(_) => ErrorKind::Io,
            GraphError::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}
