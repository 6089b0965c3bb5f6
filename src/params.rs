//! Compile-time layout constants.
//!
//! Every quantity here is fixed at build time; the only runtime-configurable
//! parameter of the filter is the initial fingerprint width passed to the
//! constructor.

/// Number of entries in the flat segment lookup table. Must be a power of two.
pub const LOOKUP_TABLE_SIZE: usize = 4096;

/// log2 of [`BUCKETS_PER_SEG`].
pub const BUCKETS_PER_SEG_POWER: usize = 12;

/// Buckets per segment. Must be a power of two.
pub const BUCKETS_PER_SEG: usize = 1 << BUCKETS_PER_SEG_POWER;

/// Tag slots per bucket.
pub const SLOTS_PER_BUCKET: usize = 4;

/// Item capacity the filter is provisioned for before any split occurs.
pub const INITIAL_FILTER_CAPACITY: usize = 1 << 16;

/// Number of segments created at construction.
pub const INITIAL_SEG_COUNT: usize =
    INITIAL_FILTER_CAPACITY / SLOTS_PER_BUCKET / BUCKETS_PER_SEG;

/// Lookup-table entries routed to each segment at construction.
pub const INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG: usize = LOOKUP_TABLE_SIZE / INITIAL_SEG_COUNT;

/// Mask selecting the lookup-table entry from the low hash bits.
pub const TABLE_MASK: u32 = (LOOKUP_TABLE_SIZE - 1) as u32;

/// Maximum number of cuckoo kicks before an insert parks the evicted tag as
/// the segment's victim and reports `NotEnoughSpace`.
pub const K_MAX_KICK_COUNT: usize = 500;

/// Fraction of a segment's slots that may fill before a split is triggered.
pub const SEGMENT_LOAD_FACTOR: f64 = 0.9;

/// Widest supported fingerprint in the baseline variant.
pub const MAX_BITS_PER_ITEM: usize = 30;

/// Widest supported initial fingerprint in the growth variant. Every split
/// level widens new tags by one bit, the deepest split chain is
/// `log2(INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG)` levels, and the widest tag
/// plus its unary marker must still fit a `u32`.
pub const MAX_INITIAL_BITS_GROWTH: usize =
    31 - INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG.trailing_zeros() as usize;

pub(crate) const ENTRIES_PER_SEG_LOG2: u32 =
    INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG.trailing_zeros();

const _: () = {
    assert!(LOOKUP_TABLE_SIZE.is_power_of_two());
    assert!(BUCKETS_PER_SEG.is_power_of_two());
    assert!(INITIAL_LOOKUP_TABLE_ENTRIES_PER_SEG.is_power_of_two());
    assert!(INITIAL_SEG_COUNT >= 1);
    // The bucket index and the lookup-table entry are both carved out of the
    // low hash bits; the addressing scheme requires the two spaces to
    // coincide.
    assert!(BUCKETS_PER_SEG == LOOKUP_TABLE_SIZE);
};
