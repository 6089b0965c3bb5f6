//! # dff
//!
//! A dynamic fingerprint filter: an approximate-membership set with
//! insertion, deletion, and queries at a tunable false-positive rate and
//! zero false negatives, which grows in place as the working set outruns
//! its initial capacity.
//!
//! The filter is built from fixed-size cuckoo segments holding bit-packed
//! fingerprints. An overflowing segment splits in two, and a flat lookup
//! table with per-region expansion counters keeps addressing O(1) no matter
//! how many splits have happened. Query cost stays flat across orders of
//! magnitude of growth, unlike chained dynamic filters.
//!
//! ## Example
//!
//! ```
//! use dff::{Dff, Status};
//!
//! let mut filter = Dff::<u64>::new(16)?;
//! assert_eq!(filter.insert(&42), Status::Ok);
//! assert_eq!(filter.query(&42), Status::Ok);
//! assert_eq!(filter.remove(&42), Status::Ok);
//! assert_eq!(filter.query(&42), Status::NotFound);
//! # Ok::<(), dff::FilterError>(())
//! ```
//!
//! ## Variants
//!
//! [`Dff`] keeps the fingerprint width fixed. [`DffFg`] widens fingerprints
//! by one bit per split, trading memory for a lower asymptotic
//! false-positive rate; when a tag runs out of bits it is kept in both
//! children of a split, a documented space-for-correctness fallback.
//!
//! The filter is single-threaded by design: a split rewires the global
//! lookup table, so concurrent use requires an external lock around the
//! whole filter.

#![doc(html_root_url = "https://docs.rs/dff/0.1.0")]
#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    rust_2018_idioms,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_qualifications
)]
#![allow(clippy::module_name_repetitions)]

/// Benchmark dataset readers (CAIDA traces, YCSB workloads).
pub mod dataset;
/// Status codes and error types.
pub mod error;
/// The filter itself and its split protocol.
pub mod filter;
/// Key hashing.
pub mod hash;
/// Compile-time layout constants.
pub mod params;

mod segment;
mod table;

pub use error::{DatasetError, FilterError, Result, Status};
pub use filter::{Dff, DffFg, DynamicFingerprintFilter, FilterStats, DEFAULT_BITS_PER_ITEM};
pub use hash::{murmur_hash2_x64a, FilterKey};

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
