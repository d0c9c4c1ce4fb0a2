//! Error types for specflow.
//!
//! All errors are represented by the `SpecflowError` enum, which maps the
//! failure taxonomy of the spec pipeline: document loading and merging,
//! graph compilation, condition routing, and node execution.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all specflow operations.
///
/// Loading and compiling errors fail fast before any run starts; execution
/// errors surface as the terminal result of a run, together with the last
/// `State` (see [`crate::RunFailure`]).
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum SpecflowError {
    /// Malformed spec document (unreadable or not a valid YAML/JSON tree).
    #[error("{0}")]
    Parse(String),

    /// Deep merge found a map on one side and a non-map on the other.
    #[error("merge type conflict at '{key}': {left} vs {right}")]
    MergeType {
        key: String,
        left: String,
        right: String,
    },

    /// A document reappeared in its own reference ancestor chain.
    #[error("circular reference: {}", chain.join(" -> "))]
    CircularReference {
        chain: Vec<String>,
    },

    /// Malformed `reference` value in a spec document.
    #[error("invalid reference in '{document}': {detail}")]
    WorkflowReference {
        document: String,
        detail: String,
    },

    /// Structural defect found while compiling the spec into a graph.
    #[error("{0}")]
    Validation(String),

    /// Routing failure: dead end, or an unsafe/unparseable condition.
    #[error("{0}")]
    Routing(String),

    /// A cyclic workflow hit its iteration cap with no forward edge to take.
    #[error("iteration limit exceeded at node '{nid}' (max_iterations: {max})")]
    IterationLimit {
        nid: String,
        max: u32,
    },

    /// A node executor (or its collaborator) failed.
    #[error("node '{nid}' ({kind}) failed: {message}")]
    NodeExecution {
        nid: String,
        kind: String,
        message: String,
    },

    /// Data conversion errors (JSON, YAML).
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl From<SpecflowError> for String {
    fn from(val: SpecflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for SpecflowError {
    fn from(error: std::io::Error) -> Self {
        SpecflowError::IoError(error.to_string())
    }
}

impl From<SpecflowError> for std::io::Error {
    fn from(val: SpecflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for SpecflowError {
    fn from(error: serde_json::Error) -> Self {
        SpecflowError::Convert(error.to_string())
    }
}

impl From<serde_yaml::Error> for SpecflowError {
    fn from(error: serde_yaml::Error) -> Self {
        SpecflowError::Parse(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for SpecflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        SpecflowError::Validation(error.to_string())
    }
}
