//! End-to-end demonstration of the filter.
//!
//! Inserts four million evenly spread keys, verifies that none of them goes
//! missing, samples the false-positive rate against a disjoint key set, and
//! removes everything again, logging throughput for each phase.
//!
//! ```text
//! cargo run --release --example filter_demo
//! ```

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dff::{Dff, Status};

const INSERT_CAP: usize = 1 << 22;
const GENERATE_NUM: usize = 1 << 23;

/// Distinct keys spread evenly over the 64-bit space: one random sample per
/// stride-sized interval.
fn generate_keys(n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(12821);
    let stride = u64::MAX / n as u64;
    (0..n as u64)
        .map(|i| stride * i + rng.gen_range(0..stride))
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut filter = match Dff::<u64>::new(16) {
        Ok(filter) => filter,
        Err(err) => {
            error!("failed to create filter: {err}");
            return;
        }
    };
    let keys = generate_keys(GENERATE_NUM);

    info!("insert cap: {INSERT_CAP}");

    // Insert
    let mut insert_count = 0usize;
    let insert_start = Instant::now();
    for &key in &keys[..INSERT_CAP] {
        if filter.insert(&key) != Status::Ok {
            warn!("failed to insert key {key}");
            break;
        }
        insert_count += 1;
    }
    let insert_secs = insert_start.elapsed().as_secs_f64();

    info!("inserted {insert_count} keys in {insert_secs:.4} seconds");
    info!(
        "insert success rate: {:.2}%",
        insert_count as f64 * 100.0 / INSERT_CAP as f64
    );
    info!(
        "insert throughput: {:.2} Mops/s",
        insert_count as f64 / insert_secs / 1_000_000.0
    );
    info!("segments after growth: {}", filter.num_segments());

    // Query
    let mut query_count = 0usize;
    let query_start = Instant::now();
    for (i, key) in keys[..insert_count].iter().enumerate() {
        let status = filter.query(key);
        if status != Status::Ok {
            // Must always hold: the filter admits no false negatives.
            error!("failed to query key {key} at i={i} ({status:?})");
            continue;
        }
        query_count += 1;
    }
    let query_secs = query_start.elapsed().as_secs_f64();

    info!("queried {insert_count} keys in {query_secs:.4} seconds");
    info!(
        "query success rate: {:.2}%",
        query_count as f64 * 100.0 / insert_count as f64
    );
    info!(
        "query throughput: {:.2} Mops/s",
        query_count as f64 / query_secs / 1_000_000.0
    );

    // False positive rate
    let false_positives = keys[INSERT_CAP..]
        .iter()
        .filter(|&key| filter.query(key) == Status::Ok)
        .count();
    info!(
        "false positive rate: {}%",
        false_positives as f64 * 100.0 / (GENERATE_NUM - INSERT_CAP) as f64
    );

    // Remove
    let mut remove_count = 0usize;
    let remove_start = Instant::now();
    for key in &keys[..insert_count] {
        if filter.remove(key) != Status::Ok {
            error!("failed to remove key {key}");
            continue;
        }
        remove_count += 1;
    }
    let remove_secs = remove_start.elapsed().as_secs_f64();

    info!("removed {remove_count} keys in {remove_secs:.4} seconds");
    info!(
        "remove success rate: {:.2}%",
        remove_count as f64 * 100.0 / insert_count as f64
    );
    info!(
        "remove throughput: {:.2} Mops/s",
        remove_count as f64 / remove_secs / 1_000_000.0
    );
}
