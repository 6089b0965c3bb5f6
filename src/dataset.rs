//! Trace-file readers for the benchmark tasks.
//!
//! Two line-oriented formats are supported: CAIDA-style packet traces (one
//! `src dst` IPv4 pair per line, packed into a 64-bit key) and YCSB workload
//! files (each line is a key in its own right).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::DatasetError;

/// Read a CAIDA-style trace.
///
/// Each line holds two whitespace-separated dotted-quad IPv4 addresses; the
/// source lands in the high 32 bits of the key, the destination in the low
/// 32. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`DatasetError`] on I/O failure or on the first malformed line.
pub fn read_caida(path: impl AsRef<Path>) -> Result<Vec<u64>, DatasetError> {
    let file = File::open(path)?;
    let mut keys = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(src), Some(dst)) = (fields.next(), fields.next()) else {
            return Err(DatasetError::InvalidRecord { line: idx + 1 });
        };
        keys.push((u64::from(parse_ipv4(src, idx + 1)?) << 32) | u64::from(parse_ipv4(dst, idx + 1)?));
    }

    Ok(keys)
}

/// Read a YCSB workload file: one key per line, kept verbatim.
///
/// # Errors
///
/// Returns [`DatasetError::Io`] when the file cannot be read.
pub fn read_ycsb(path: impl AsRef<Path>) -> Result<Vec<String>, DatasetError> {
    let file = File::open(path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        lines.push(line?);
    }
    Ok(lines)
}

fn parse_ipv4(addr: &str, line: usize) -> Result<u32, DatasetError> {
    addr.parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| DatasetError::InvalidIpv4 {
            line,
            addr: addr.to_string(),
        })
}
