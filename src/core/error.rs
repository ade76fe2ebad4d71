// Copyright 2025 Relcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for Relcore
//!
//! Every fallible operation in the planner and the executor returns
//! [`Result`]. End-of-stream is never an error: cursors and operators report
//! it through `Option`/`bool` return values.

use std::fmt;

use thiserror::Error;

/// Result type alias for Relcore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // =========================================================================
    // Caller errors
    // =========================================================================
    /// Malformed operator spec or function argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Construct the planner or executor does not implement
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The planner could not produce a plan for the query
    #[error("unplannable query: {0}")]
    Unplannable(String),

    // =========================================================================
    // Catalog errors
    // =========================================================================
    /// An id referenced by a plan or expression is unknown to the catalog
    #[error("{kind} {id} not found in catalog")]
    CatalogMismatch { kind: &'static str, id: u32 },

    // =========================================================================
    // Internal consistency
    // =========================================================================
    /// Internal state is inconsistent; terminates the current query
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Query cancelled
    #[error("query cancelled")]
    QueryCancelled,

    // =========================================================================
    // Evaluation errors
    // =========================================================================
    /// Type error during expression evaluation
    #[error("type error: {0}")]
    Type(String),

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Integer overflow during arithmetic
    #[error("{0} out of range")]
    NumericOutOfRange(&'static str),

    /// IO error (wrapped), raised by the tuplestore spill file
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error for unexpected conditions
    #[error("{message}")]
    Internal { message: String },
}

/// Category codes reported alongside a failed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    InvalidArgument,
    Unsupported,
    Unplannable,
    CatalogMismatch,
    InvariantViolation,
    Cancelled,
    DataException,
    Internal,
}

impl ErrorCategory {
    /// Stable five character code for the category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidArgument => "22023",
            ErrorCategory::Unsupported => "0A000",
            ErrorCategory::Unplannable => "42P20",
            ErrorCategory::CatalogMismatch => "42704",
            ErrorCategory::InvariantViolation => "XX000",
            ErrorCategory::Cancelled => "57014",
            ErrorCategory::DataException => "22000",
            ErrorCategory::Internal => "XX001",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::InvalidArgument => "invalid argument",
            ErrorCategory::Unsupported => "unsupported",
            ErrorCategory::Unplannable => "unplannable",
            ErrorCategory::CatalogMismatch => "catalog mismatch",
            ErrorCategory::InvariantViolation => "invariant violation",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::DataException => "data exception",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

impl Error {
    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Create a new NotSupported error
    pub fn not_supported(message: impl Into<String>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Create a new Unplannable error
    pub fn unplannable(message: impl Into<String>) -> Self {
        Error::Unplannable(message.into())
    }

    /// Create a new CatalogMismatch error
    pub fn catalog_mismatch(kind: &'static str, id: u32) -> Self {
        Error::CatalogMismatch { kind, id }
    }

    /// Create a new InvariantViolation error
    pub fn invariant(message: impl Into<String>) -> Self {
        Error::InvariantViolation(message.into())
    }

    /// Create a new Type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io {
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Map this error to its taxonomy category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            Error::NotSupported(_) => ErrorCategory::Unsupported,
            Error::Unplannable(_) => ErrorCategory::Unplannable,
            Error::CatalogMismatch { .. } => ErrorCategory::CatalogMismatch,
            Error::InvariantViolation(_) => ErrorCategory::InvariantViolation,
            Error::QueryCancelled => ErrorCategory::Cancelled,
            Error::Type(_) | Error::DivisionByZero | Error::NumericOutOfRange(_) => {
                ErrorCategory::DataException
            }
            Error::Io { .. } | Error::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Check if this error terminates the query as a programming error
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }

    /// Check if this error was raised by cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::QueryCancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io(err.to_string())
    }
}
