//! Status codes and error types.
//!
//! Filter operations report through [`Status`], a plain tagged return with no
//! payload, so the hot path never allocates and never unwinds. `Result`-based
//! errors are reserved for the edges: construction and dataset loading.

use std::io;

use thiserror::Error;

/// Result alias for fallible crate operations.
pub type Result<T, E = FilterError> = std::result::Result<T, E>;

/// Outcome of a filter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// The queried (or removed) item is not present.
    NotFound,
    /// Cuckoo kicks exceeded the limit and the evicted tag was parked in the
    /// segment's victim slot. Inserting further before a successful split
    /// risks false negatives.
    NotEnoughSpace,
    /// The addressed segment is down to a single lookup-table entry and
    /// cannot split again. The filter has hit its configuration ceiling;
    /// callers must stop inserting.
    NotSupported,
}

/// Errors raised at filter construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The requested fingerprint width cannot be represented.
    #[error("fingerprint width {bits} out of range (1..={max} bits)")]
    InvalidBitsPerItem {
        /// The rejected width.
        bits: usize,
        /// The widest width this variant supports.
        max: usize,
    },
}

/// Errors raised while loading benchmark datasets.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The trace file could not be read.
    #[error("failed to read dataset: {0}")]
    Io(#[from] io::Error),

    /// A line held something other than a dotted-quad IPv4 address.
    #[error("line {line}: invalid IPv4 address {addr:?}")]
    InvalidIpv4 {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        addr: String,
    },

    /// A line did not have the expected field count.
    #[error("line {line}: expected two space-separated addresses")]
    InvalidRecord {
        /// 1-based line number.
        line: usize,
    },
}
