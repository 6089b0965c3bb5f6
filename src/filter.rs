//! The filter: segment ownership, constant-time addressing, and splits.
//!
//! A filter owns an append-only list of cuckoo segments and a flat lookup
//! table routing every 32-bit sub-hash to exactly one of them. When a
//! segment overflows, it splits: a sibling is appended, half of the
//! overflowing segment's lookup-table entries are rewired to the sibling,
//! and each stored tag follows its own discriminant bit. Per-region
//! expansion counters keep addressing O(1) no matter how many splits have
//! happened.

use std::cell::Cell;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{FilterError, Status};
use crate::hash::{generate_hash_seed, FilterKey};
use crate::params::{
    BUCKETS_PER_SEG, ENTRIES_PER_SEG_LOG2, INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG,
    INITIAL_SEG_COUNT, LOOKUP_TABLE_SIZE, MAX_BITS_PER_ITEM, MAX_INITIAL_BITS_GROWTH,
    SLOTS_PER_BUCKET, TABLE_MASK,
};
use crate::segment::Segment;

/// Default fingerprint width in bits.
pub const DEFAULT_BITS_PER_ITEM: usize = 16;

/// Baseline filter: every segment keeps the initial fingerprint width.
pub type Dff<K> = DynamicFingerprintFilter<K, false>;

/// Fingerprint-growth variant: each split creates a segment one bit wider,
/// trading memory for a lower asymptotic false-positive rate.
pub type DffFg<K> = DynamicFingerprintFilter<K, true>;

/// A dynamic fingerprint filter over keys of type `K`.
///
/// An approximate membership set supporting insertion, deletion, and
/// queries with a tunable false-positive rate and no false negatives. The
/// filter grows by splitting fixed-size cuckoo segments and keeps query
/// cost flat across arbitrary growth through its constant-time lookup
/// table.
///
/// Not safe for concurrent mutation; wrap the whole filter in a mutex if it
/// must be shared. A split rewires global routing state, so per-segment
/// locking would not be sound either.
pub struct DynamicFingerprintFilter<K, const GROWTH: bool = false> {
    segments: Vec<Segment<GROWTH>>,
    /// Entry-to-segment routing. Indices into `segments`; never dangling.
    lookup_table: Vec<u32>,
    /// Split count of the segment behind each entry.
    expansion_times: Vec<usize>,
    /// Deepest split depth seen in each initial region of the lookup table.
    max_expansion: [usize; INITIAL_SEG_COUNT],
    initial_bits_per_item: usize,
    hash_seed: u64,
    expansion_time: Duration,
    addressing_time: Cell<Duration>,
    track_addressing: bool,
    _key: PhantomData<fn(&K) -> u64>,
}

/// Point-in-time filter statistics.
#[derive(Debug, Clone, Copy)]
pub struct FilterStats {
    /// Live segment count.
    pub num_segments: usize,
    /// Occupied slots across all segments, parked victims included.
    pub num_items: usize,
    /// Logical table size in bits (slot width × slot count, padding
    /// excluded).
    pub table_bits: usize,
    /// Heap bytes held by the slot tables.
    pub table_bytes: usize,
    /// Cumulative wall time spent splitting segments.
    pub expansion_time: Duration,
    /// Cumulative wall time spent hashing and addressing inside `query`,
    /// when the addressing timer is enabled.
    pub addressing_time: Duration,
}

enum SplitOutcome {
    /// The segment is down to one lookup-table entry and cannot split.
    Refused,
    Split {
        /// Whether a parked victim (if any) found a slot in a child.
        victim_drained: bool,
    },
}

impl<K: FilterKey, const GROWTH: bool> DynamicFingerprintFilter<K, GROWTH> {
    /// Create a filter whose fingerprints start at `initial_bits_per_item`
    /// bits.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidBitsPerItem`] when the width is zero or
    /// wider than the variant supports ([`MAX_BITS_PER_ITEM`] baseline,
    /// [`MAX_INITIAL_BITS_GROWTH`] for the growth variant, whose splits
    /// widen tags further).
    ///
    /// [`MAX_INITIAL_BITS_GROWTH`]: crate::params::MAX_INITIAL_BITS_GROWTH
    pub fn new(initial_bits_per_item: usize) -> Result<Self, FilterError> {
        let max = if GROWTH {
            MAX_INITIAL_BITS_GROWTH
        } else {
            MAX_BITS_PER_ITEM
        };
        if initial_bits_per_item == 0 || initial_bits_per_item > max {
            return Err(FilterError::InvalidBitsPerItem {
                bits: initial_bits_per_item,
                max,
            });
        }

        let mut segments = Vec::with_capacity(INITIAL_SEG_COUNT);
        let mut lookup_table = vec![0u32; LOOKUP_TABLE_SIZE];
        for seg_id in 0..INITIAL_SEG_COUNT {
            let mut seg = Segment::new(initial_bits_per_item, initial_bits_per_item);
            let base = seg_id * INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG;
            for entry in base..base + INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG {
                lookup_table[entry] = seg_id as u32;
                seg.lut_slots.push(entry as u32);
            }
            segments.push(seg);
        }

        Ok(Self {
            segments,
            lookup_table,
            expansion_times: vec![0; LOOKUP_TABLE_SIZE],
            max_expansion: [0; INITIAL_SEG_COUNT],
            initial_bits_per_item,
            hash_seed: generate_hash_seed(),
            expansion_time: Duration::ZERO,
            addressing_time: Cell::new(Duration::ZERO),
            track_addressing: false,
            _key: PhantomData,
        })
    }

    /// Insert a key.
    ///
    /// Returns [`Status::Ok`] on success, including the case where the
    /// insert overflowed a segment and a split absorbed it. A
    /// [`Status::NotEnoughSpace`] return means the key's tag is parked in a
    /// victim slot and still answerable, but no further inserts should be
    /// attempted; [`Status::NotSupported`] means the addressed segment can
    /// no longer split and the filter is at its ceiling.
    pub fn insert(&mut self, key: &K) -> Status {
        let (bucket, hash) = self.index_and_hash(key);
        let entry = self.segment_entry(hash);
        let seg_id = self.lookup_table[entry] as usize;

        let seg = &mut self.segments[seg_id];
        let result = seg.insert(bucket, hash);

        if result != Status::NotEnoughSpace && seg.num_items <= seg.capacity {
            return result;
        }

        match self.split(entry) {
            SplitOutcome::Refused => {
                if result == Status::Ok {
                    Status::Ok
                } else {
                    Status::NotSupported
                }
            }
            SplitOutcome::Split { victim_drained } => {
                if result == Status::NotEnoughSpace && !victim_drained {
                    Status::NotEnoughSpace
                } else {
                    Status::Ok
                }
            }
        }
    }

    /// Query a key. Returns [`Status::Ok`] when the key may be present and
    /// [`Status::NotFound`] when it is definitely absent. No side effects.
    pub fn query(&self, key: &K) -> Status {
        let (bucket, hash, entry) = if self.track_addressing {
            let start = Instant::now();
            let (bucket, hash) = self.index_and_hash(key);
            let entry = self.segment_entry(hash);
            self.addressing_time
                .set(self.addressing_time.get() + start.elapsed());
            (bucket, hash, entry)
        } else {
            let (bucket, hash) = self.index_and_hash(key);
            let entry = self.segment_entry(hash);
            (bucket, hash, entry)
        };

        self.segments[self.lookup_table[entry] as usize].query(bucket, hash)
    }

    /// Remove a key. Returns [`Status::NotFound`] when nothing matched.
    pub fn remove(&mut self, key: &K) -> Status {
        let (bucket, hash) = self.index_and_hash(key);
        let entry = self.segment_entry(hash);
        let seg_id = self.lookup_table[entry] as usize;
        self.segments[seg_id].remove(bucket, hash)
    }

    /// Compact the filter.
    ///
    /// A no-op today: segments never merge back together.
    /// TODO: merge sibling segments once combined occupancy fits one table.
    pub fn compact(&mut self) -> Status {
        Status::Ok
    }

    /// Number of live segments.
    #[must_use]
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Number of stored items, parked victims included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments
            .iter()
            .map(|seg| seg.num_items + usize::from(seg.victim.is_some()))
            .sum()
    }

    /// Whether the filter holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fingerprint width segments start with.
    #[must_use]
    pub fn initial_bits_per_item(&self) -> usize {
        self.initial_bits_per_item
    }

    /// Start accumulating hash-and-addressing time inside `query`.
    pub fn enable_addressing_timer(&mut self) {
        self.track_addressing = true;
    }

    /// Snapshot the filter's size and timing counters.
    #[must_use]
    pub fn stats(&self) -> FilterStats {
        FilterStats {
            num_segments: self.segments.len(),
            num_items: self.len(),
            table_bits: self.segments.iter().map(Segment::table_bits).sum(),
            table_bytes: self.segments.iter().map(Segment::byte_size).sum(),
            expansion_time: self.expansion_time,
            addressing_time: self.addressing_time.get(),
        }
    }

    /// Verify the routing invariants: every lookup-table entry points at a
    /// live segment that claims it, the segments' entry lists partition the
    /// whole table, and the per-region depth maxima agree with the per-entry
    /// counters. Intended for tests and debugging; runs in O(table size).
    #[must_use]
    pub fn verify_routing(&self) -> bool {
        let mut claimed = vec![false; LOOKUP_TABLE_SIZE];
        for (seg_id, seg) in self.segments.iter().enumerate() {
            if seg.lut_slots.is_empty() {
                return false;
            }
            for &entry in &seg.lut_slots {
                let entry = entry as usize;
                if entry >= LOOKUP_TABLE_SIZE
                    || claimed[entry]
                    || self.lookup_table[entry] as usize != seg_id
                {
                    return false;
                }
                claimed[entry] = true;
            }
        }
        if !claimed.iter().all(|&c| c) {
            return false;
        }

        for region in 0..INITIAL_SEG_COUNT {
            let base = region * INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG;
            let deepest = (base..base + INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG)
                .map(|entry| self.expansion_times[entry])
                .max()
                .unwrap_or(0);
            if self.max_expansion[region] != deepest {
                return false;
            }
        }
        true
    }

    /// Map a 64-bit digest to the bucket index and the 32-bit routing hash.
    fn index_and_hash(&self, key: &K) -> (usize, u32) {
        let digest = key.hash64(self.hash_seed);
        let bucket = ((digest >> 32) as usize) & (BUCKETS_PER_SEG - 1);
        (bucket, digest as u32)
    }

    /// Constant-time lookup-table addressing.
    ///
    /// Replaces the low entry bits with the region's deepest expansion bits
    /// taken from the top of the hash: the flat equivalent of descending a
    /// trie one level per split.
    fn segment_entry(&self, hash: u32) -> usize {
        let initial_entry = (hash & TABLE_MASK) as usize;
        let depth = self.max_expansion[initial_entry / INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG];
        ((initial_entry >> ENTRIES_PER_SEG_LOG2) << ENTRIES_PER_SEG_LOG2)
            + ((u64::from(hash) >> (32 - depth as u32)) as usize)
                * (INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG >> depth)
    }

    /// Split the segment behind `entry`.
    ///
    /// A new segment takes over the upper half of the old segment's
    /// lookup-table entries and every stored tag whose discriminant bit is
    /// set. Tags keep their `(bucket, slot)` coordinates: only the routing
    /// above them changes.
    fn split(&mut self, entry: usize) -> SplitOutcome {
        let old_id = self.lookup_table[entry] as usize;
        if self.segments[old_id].lut_slots.len() < 2 {
            warn!(
                segment = old_id,
                items = self.segments[old_id].num_items,
                "segment overflowed but cannot split further"
            );
            return SplitOutcome::Refused;
        }

        let start = Instant::now();
        let old_bits = self.segments[old_id].bits_per_item;
        let new_bits = if GROWTH {
            old_bits + 1
        } else {
            self.initial_bits_per_item
        };
        let depth = self.expansion_times[entry];
        let new_id = self.segments.len() as u32;

        let mut new_seg: Segment<GROWTH> = Segment::new(new_bits, self.initial_bits_per_item);

        let mut moved = 0usize;
        let mut duplicated = 0usize;
        let victim;
        {
            let old = &mut self.segments[old_id];

            for bucket in 0..BUCKETS_PER_SEG {
                for slot in 0..SLOTS_PER_BUCKET {
                    let tag = old.read_slot(bucket, slot);
                    if tag == 0 {
                        continue;
                    }
                    let (to_new, from_old) = split_route::<GROWTH>(tag, depth, old_bits);
                    if from_old {
                        old.clear_slot(bucket, slot);
                    }
                    if to_new {
                        let tag = if GROWTH { tag << 1 } else { tag };
                        new_seg.write_slot(bucket, slot, tag);
                        if from_old {
                            moved += 1;
                        } else {
                            duplicated += 1;
                        }
                    }
                }
            }

            victim = old.take_victim();
            let half = old.lut_slots.len() / 2;
            new_seg.lut_slots = old.lut_slots.split_off(half);
        }

        for &e in &new_seg.lut_slots {
            self.lookup_table[e as usize] = new_id;
            self.expansion_times[e as usize] += 1;
        }
        for &e in &self.segments[old_id].lut_slots {
            self.expansion_times[e as usize] += 1;
        }

        let region = entry / INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG;
        self.max_expansion[region] = self.max_expansion[region].max(self.expansion_times[entry]);

        self.segments.push(new_seg);

        // Settle the parked victim in whichever child owns its tag now.
        let mut victim_drained = true;
        if let Some(victim) = victim {
            let (to_new, from_old) = split_route::<GROWTH>(victim.tag, depth, old_bits);
            if to_new {
                let tag = if GROWTH { victim.tag << 1 } else { victim.tag };
                victim_drained &=
                    self.segments[new_id as usize].insert_tag(victim.index, tag) == Status::Ok;
            }
            if !from_old {
                victim_drained &=
                    self.segments[old_id].insert_tag(victim.index, victim.tag) == Status::Ok;
            }
        }

        self.expansion_time += start.elapsed();

        debug!(
            old_segment = old_id,
            new_segment = new_id,
            segments = self.segments.len(),
            bits_per_item = new_bits,
            depth = depth + 1,
            moved,
            duplicated,
            "segment split"
        );

        SplitOutcome::Split { victim_drained }
    }
}

impl<K: FilterKey, const GROWTH: bool> Default for DynamicFingerprintFilter<K, GROWTH> {
    fn default() -> Self {
        Self::new(DEFAULT_BITS_PER_ITEM).expect("default fingerprint width is valid")
    }
}

impl<K, const GROWTH: bool> std::fmt::Debug for DynamicFingerprintFilter<K, GROWTH> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicFingerprintFilter")
            .field("growth", &GROWTH)
            .field("segments", &self.segments.len())
            .field(
                "items",
                &self
                    .segments
                    .iter()
                    .map(|seg| seg.num_items + usize::from(seg.victim.is_some()))
                    .sum::<usize>(),
            )
            .field("initial_bits_per_item", &self.initial_bits_per_item)
            .finish_non_exhaustive()
    }
}

/// Decide where a tag goes when its segment splits at `depth`.
///
/// Returns `(move_to_new, remove_from_old)`. The two differ only when the
/// fingerprint has no routing bit left for this depth; such a tag is kept in
/// both children so membership stays answerable, at some cost in space.
fn split_route<const GROWTH: bool>(tag: u32, depth: usize, bits_per_item: usize) -> (bool, bool) {
    if GROWTH {
        let age = tag.trailing_zeros() as usize;
        if depth >= bits_per_item - age {
            (true, false)
        } else {
            let moves = (tag >> (bits_per_item - depth)) & 1 == 1;
            (moves, moves)
        }
    } else if depth + 1 >= bits_per_item {
        (true, false)
    } else {
        let moves = (tag >> (bits_per_item - 1 - depth)) & 1 == 1;
        (moves, moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn roundtrip_small() {
        let mut filter = Dff::<u64>::new(16).unwrap();
        assert_eq!(filter.insert(&42), Status::Ok);
        assert_eq!(filter.query(&42), Status::Ok);
        assert_eq!(filter.remove(&42), Status::Ok);
        assert_eq!(filter.query(&42), Status::NotFound);
        assert!(filter.is_empty());
    }

    #[test]
    fn rejects_bad_fingerprint_widths() {
        assert_eq!(
            Dff::<u64>::new(0).unwrap_err(),
            FilterError::InvalidBitsPerItem {
                bits: 0,
                max: MAX_BITS_PER_ITEM
            }
        );
        assert_eq!(
            Dff::<u64>::new(31).unwrap_err(),
            FilterError::InvalidBitsPerItem {
                bits: 31,
                max: MAX_BITS_PER_ITEM
            }
        );
        assert!(Dff::<u64>::new(MAX_BITS_PER_ITEM).is_ok());

        // The growth variant reserves headroom for widening splits.
        assert!(DffFg::<u64>::new(MAX_INITIAL_BITS_GROWTH).is_ok());
        assert_eq!(
            DffFg::<u64>::new(MAX_INITIAL_BITS_GROWTH + 1).unwrap_err(),
            FilterError::InvalidBitsPerItem {
                bits: MAX_INITIAL_BITS_GROWTH + 1,
                max: MAX_INITIAL_BITS_GROWTH
            }
        );
    }

    #[test]
    fn growth_triggers_splits() {
        let mut filter = Dff::<u64>::new(16).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let keys: Vec<u64> = (0..150_000).map(|_| rng.gen()).collect();

        for key in &keys {
            assert_eq!(filter.insert(key), Status::Ok);
        }
        assert!(filter.num_segments() > INITIAL_SEG_COUNT);
        assert!(filter.verify_routing());

        for key in &keys {
            assert_eq!(filter.query(key), Status::Ok);
        }
    }

    #[test]
    fn growth_variant_widens_fingerprints() {
        let mut filter = DffFg::<u64>::new(16).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let keys: Vec<u64> = (0..120_000).map(|_| rng.gen()).collect();

        for key in &keys {
            assert_eq!(filter.insert(key), Status::Ok);
        }
        assert!(filter.num_segments() > INITIAL_SEG_COUNT);
        assert!(filter.verify_routing());
        // Splits allocate wider tables than the four initial segments.
        let stats = filter.stats();
        assert!(
            stats.table_bits
                > filter.num_segments() * BUCKETS_PER_SEG * SLOTS_PER_BUCKET * 16
        );

        for key in &keys {
            assert_eq!(filter.query(key), Status::Ok);
        }
    }

    #[test]
    fn string_and_byte_keys() {
        let mut filter = Dff::<String>::new(16).unwrap();
        let key = String::from("usertable:user6284781860667377211");
        assert_eq!(filter.insert(&key), Status::Ok);
        assert_eq!(filter.query(&key), Status::Ok);

        let mut filter = Dff::<bytes::Bytes>::new(16).unwrap();
        let key = bytes::Bytes::from_static(b"10.10.64.1 10.10.64.2");
        assert_eq!(filter.insert(&key), Status::Ok);
        assert_eq!(filter.query(&key), Status::Ok);
    }

    #[test]
    fn compact_is_a_nop() {
        let mut filter = Dff::<u64>::new(16).unwrap();
        for key in 0u64..1000 {
            assert_eq!(filter.insert(&key), Status::Ok);
        }
        assert_eq!(filter.compact(), Status::Ok);
        assert_eq!(filter.len(), 1000);
        for key in 0u64..1000 {
            assert_eq!(filter.query(&key), Status::Ok);
        }
    }

    #[test]
    fn default_uses_sixteen_bits() {
        let filter = Dff::<u64>::default();
        assert_eq!(filter.initial_bits_per_item(), DEFAULT_BITS_PER_ITEM);
        assert_eq!(filter.num_segments(), INITIAL_SEG_COUNT);
    }

    #[test]
    fn query_is_idempotent() {
        let mut filter = Dff::<u64>::new(16).unwrap();
        for key in 0u64..5000 {
            assert_eq!(filter.insert(&key), Status::Ok);
        }
        for key in 0u64..10_000 {
            let first = filter.query(&key);
            let second = filter.query(&key);
            assert_eq!(first, second);
        }
        assert_eq!(filter.len(), 5000);
    }

    #[test]
    fn expansion_timer_accumulates() {
        let mut filter = Dff::<u64>::new(16).unwrap();
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..150_000 {
            let key: u64 = rng.gen();
            assert_eq!(filter.insert(&key), Status::Ok);
        }
        assert!(filter.stats().expansion_time > Duration::ZERO);
    }

    #[test]
    fn addressing_timer_is_opt_in() {
        let mut filter = Dff::<u64>::new(16).unwrap();
        for key in 0u64..100 {
            assert_eq!(filter.insert(&key), Status::Ok);
        }
        for key in 0u64..100 {
            assert_eq!(filter.query(&key), Status::Ok);
        }
        assert_eq!(filter.stats().addressing_time, Duration::ZERO);

        filter.enable_addressing_timer();
        for key in 0u64..100 {
            assert_eq!(filter.query(&key), Status::Ok);
        }
        assert!(filter.stats().addressing_time > Duration::ZERO);
    }

    #[test]
    fn split_route_baseline_uses_depth_bit() {
        // depth 0 inspects the top bit of a 16-bit tag.
        assert_eq!(split_route::<false>(0x8000, 0, 16), (true, true));
        assert_eq!(split_route::<false>(0x7fff, 0, 16), (false, false));
        // depth 1 inspects the next bit down.
        assert_eq!(split_route::<false>(0x4000, 1, 16), (true, true));
        assert_eq!(split_route::<false>(0x3fff, 1, 16), (false, false));
        // Exhausted fingerprints stay in both children.
        assert_eq!(split_route::<false>(0x0001, 15, 16), (true, false));
    }

    #[test]
    fn split_route_growth_respects_age() {
        // Fresh tag (marker at bit 0) in a 16-bit segment, depth 0: the
        // discriminant is bit 16.
        assert_eq!(split_route::<true>(0x1_0001, 0, 16), (true, true));
        assert_eq!(split_route::<true>(0x0_ffff, 0, 16), (false, false));
        // An aged tag with its marker one step from the top has no routing
        // bits left at high depth.
        let exhausted = 1u32 << 15;
        assert_eq!(split_route::<true>(exhausted, 1, 16), (true, false));
    }
}
