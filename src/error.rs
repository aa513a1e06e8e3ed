// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Error types for loading, querying and the wire protocol

use std::path::PathBuf;
use thiserror::Error;

/// A color identity string containing something other than `WUBRG`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color identity {0:?}: expected a subset of WUBRG")]
pub struct InvalidColorIdentity(pub String);

/// Fatal dataset load errors. The service never becomes ready after one.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The dataset file could not be read
    #[error("failed to read dataset {path}")]
    Io {
        /// Dataset path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The dataset is not JSON of an accepted shape
    #[error("failed to parse dataset {origin}")]
    Parse {
        /// Path or label of the input
        origin: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Two records share an id
    #[error("duplicate combo id {0:?}")]
    DuplicateComboId(String),

    /// A combo without any cards reached the graph builder
    #[error("combo {0:?} has no cards")]
    EmptyCombo(String),

    /// Every record was rejected
    #[error("dataset {origin} contains no valid combos ({skipped} records skipped)")]
    NoValidCombos {
        /// Path or label of the input
        origin: String,
        /// Number of rejected records
        skipped: usize,
    },
}

/// Why a single record was skipped during load
#[derive(Debug, Error)]
pub enum RecordError {
    /// No usable id
    #[error("record has no id")]
    MissingId,

    /// Card list missing or empty after trimming
    #[error("record has no cards")]
    NoCards,

    /// No color identity field
    #[error("record has no color identity")]
    MissingColorIdentity,

    /// Color identity present but not a subset of WUBRG
    #[error(transparent)]
    InvalidColorIdentity(#[from] InvalidColorIdentity),

    /// Fields have the wrong JSON types
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors returned by [`crate::query::QueryEngine`] operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Unknown combo id
    #[error("combo not found: {0}")]
    ComboNotFound(String),

    /// Unknown card name
    #[error("card not found: {0}")]
    CardNotFound(String),

    /// Argument outside its valid range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<InvalidColorIdentity> for QueryError {
    fn from(err: InvalidColorIdentity) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
