//! Error types for the optimizer.
//!
//! All pipeline errors are fatal: no pass attempts local recovery, and a
//! failed pass must not leak a partially-transformed program to its
//! successors. Negative results of a predicate (a constant fold that would
//! divide by zero, a colouring attempt that leaves a node uncoloured) are
//! not errors.

use thiserror::Error;

/// Optimizer error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptimizerError {
    /// A pass was invoked on a program that does not satisfy its input
    /// predicate (e.g. live ranges requested for a non-SSA program, or a
    /// procedure with two return blocks).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A block, value, or live range was requested by name and not found.
    /// Always a bug in the caller, never a valid outcome.
    #[error("lookup failed: no {kind} named `{name}`")]
    LookupFailed {
        /// What was being looked up ("block", "live range", ...)
        kind: &'static str,
        /// The name that missed
        name: String,
    },

    /// An opcode the categorizer does not classify, or an instruction
    /// shape a pass cannot handle.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Malformed ILOC source text.
    #[error("parse error at line {line}: {message}")]
    ParseError {
        /// 1-based source line
        line: usize,
        /// What went wrong
        message: String,
    },
}

impl OptimizerError {
    pub fn lookup(kind: &'static str, name: impl Into<String>) -> Self {
        OptimizerError::LookupFailed {
            kind,
            name: name.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OptimizerError>;
