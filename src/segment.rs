//! Cuckoo segment: one fixed-size fingerprint table plus its routing state.
//!
//! A segment is a plain cuckoo hash table over its slot table. Every item
//! has two candidate buckets; insertion kicks residents between them for up
//! to [`K_MAX_KICK_COUNT`] rounds before parking the last evicted tag in the
//! victim record. The filter orchestrator owns the segment list and decides
//! when a segment splits.

use crate::error::Status;
use crate::params::{BUCKETS_PER_SEG, K_MAX_KICK_COUNT, SEGMENT_LOAD_FACTOR, SLOTS_PER_BUCKET};
use crate::table::SlotTable;

/// A tag evicted after the kick limit, parked so membership for it stays
/// answerable until a split or a removal frees space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Victim {
    pub(crate) index: usize,
    pub(crate) tag: u32,
}

pub(crate) struct Segment<const GROWTH: bool> {
    table: SlotTable<GROWTH>,
    /// Fingerprint bits per stored item, excluding the growth marker.
    /// Constant for the segment's lifetime; differs across segments in the
    /// growth variant.
    pub(crate) bits_per_item: usize,
    /// Occupied slot count.
    pub(crate) num_items: usize,
    /// Soft occupancy limit; exceeding it triggers a split.
    pub(crate) capacity: usize,
    /// Lookup-table entries currently routed here, ascending.
    pub(crate) lut_slots: Vec<u32>,
    pub(crate) victim: Option<Victim>,
    /// Tag bits skipped when mixing the alternate index. Derived from the
    /// filter's initial width so the alternate index of a key is identical
    /// in every segment regardless of how often it has split.
    alt_index_shift: u32,
}

impl<const GROWTH: bool> Segment<GROWTH> {
    pub(crate) fn new(bits_per_item: usize, initial_bits_per_item: usize) -> Self {
        Self {
            table: SlotTable::new(BUCKETS_PER_SEG, bits_per_item),
            bits_per_item,
            num_items: 0,
            capacity: ((BUCKETS_PER_SEG * SLOTS_PER_BUCKET) as f64 * SEGMENT_LOAD_FACTOR) as usize,
            lut_slots: Vec::new(),
            victim: None,
            alt_index_shift: (bits_per_item - initial_bits_per_item + 1) as u32,
        }
    }

    /// The other candidate bucket for a tag sitting at `index`.
    fn alt_index(&self, index: usize, tag: u32) -> usize {
        // 0x5bd1e995 is the MurmurHash2 mixing constant.
        let mixed = if GROWTH { tag >> self.alt_index_shift } else { tag };
        ((index as u32) ^ mixed.wrapping_mul(0x5bd1_e995)) as usize & (BUCKETS_PER_SEG - 1)
    }

    /// Insert the tag derived from `hash`, starting at `index`.
    pub(crate) fn insert(&mut self, index: usize, hash: u32) -> Status {
        let tag = self.table.gen_tag(hash);
        self.insert_tag(index, tag)
    }

    /// Cuckoo placement of an already-derived tag.
    ///
    /// Also the re-entry point for parked victims, which must keep their
    /// stored tag rather than re-derive one.
    pub(crate) fn insert_tag(&mut self, index: usize, tag: u32) -> Status {
        let mut cur_index = index;
        let mut cur_tag = tag;

        if self.table.try_place(cur_index, cur_tag) {
            self.num_items += 1;
            return Status::Ok;
        }
        cur_index = self.alt_index(cur_index, cur_tag);

        for _ in 0..K_MAX_KICK_COUNT {
            if self.table.try_place(cur_index, cur_tag) {
                self.num_items += 1;
                return Status::Ok;
            }
            cur_tag = self.table.swap_random(cur_index, cur_tag);
            cur_index = self.alt_index(cur_index, cur_tag);
        }

        self.victim = Some(Victim {
            index: cur_index,
            tag: cur_tag,
        });
        Status::NotEnoughSpace
    }

    /// Membership probe. No side effects.
    pub(crate) fn query(&self, index: usize, hash: u32) -> Status {
        let tag = self.table.gen_tag(hash);
        let index2 = self.alt_index(index, tag);

        if let Some(victim) = self.victim {
            if self.victim_matches(victim, index, index2, hash, tag) {
                return Status::Ok;
            }
        }

        let found = if GROWTH {
            self.table.match_hash_in_buckets(index, index2, hash)
        } else {
            self.table.find_tag_in_buckets(index, index2, tag)
        };

        if found {
            Status::Ok
        } else {
            Status::NotFound
        }
    }

    /// Remove one matching tag, or the victim if only it matches.
    pub(crate) fn remove(&mut self, index: usize, hash: u32) -> Status {
        let tag = self.table.gen_tag(hash);
        let index2 = self.alt_index(index, tag);

        let removed = if GROWTH {
            self.table.remove_hash_from_buckets(index, index2, hash)
        } else {
            self.table.remove_tag_from_bucket(index, tag)
                || self.table.remove_tag_from_bucket(index2, tag)
        };

        if removed {
            self.num_items -= 1;
            if let Some(victim) = self.victim.take() {
                // A slot just opened up; give the parked tag another run.
                let _ = self.insert_tag(victim.index, victim.tag);
            }
            return Status::Ok;
        }

        match self.victim {
            Some(victim) if self.victim_matches(victim, index, index2, hash, tag) => {
                self.victim = None;
                Status::Ok
            }
            _ => Status::NotFound,
        }
    }

    fn victim_matches(
        &self,
        victim: Victim,
        index: usize,
        index2: usize,
        hash: u32,
        tag: u32,
    ) -> bool {
        if victim.index != index && victim.index != index2 {
            return false;
        }
        if GROWTH {
            self.table.matches_hash(hash, victim.tag)
        } else {
            victim.tag == tag
        }
    }

    pub(crate) fn read_slot(&self, bucket: usize, slot: usize) -> u32 {
        self.table.read_tag(bucket, slot)
    }

    pub(crate) fn clear_slot(&mut self, bucket: usize, slot: usize) {
        self.table.remove_tag(bucket, slot);
        self.num_items -= 1;
    }

    pub(crate) fn write_slot(&mut self, bucket: usize, slot: usize, tag: u32) {
        self.table.write_tag(bucket, slot, tag);
        self.num_items += 1;
    }

    pub(crate) fn take_victim(&mut self) -> Option<Victim> {
        self.victim.take()
    }

    /// Logical table size in bits: slot width times slot count.
    pub(crate) fn table_bits(&self) -> usize {
        BUCKETS_PER_SEG * SLOTS_PER_BUCKET * (self.bits_per_item + usize::from(GROWTH))
    }

    /// Heap bytes held by the slot table.
    pub(crate) fn byte_size(&self) -> usize {
        self.table.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_segment() -> Segment<false> {
        Segment::new(16, 16)
    }

    #[test]
    fn insert_query_remove_roundtrip() {
        let mut seg = test_segment();
        // Synthetic (bucket, hash) pairs spread over the table.
        let items: Vec<(usize, u32)> = (0..1000u32)
            .map(|i| {
                (
                    (i.wrapping_mul(2654435761) as usize) & (BUCKETS_PER_SEG - 1),
                    i.wrapping_mul(0x9e37_79b9),
                )
            })
            .collect();

        for &(index, hash) in &items {
            assert_eq!(seg.insert(index, hash), Status::Ok);
        }
        assert_eq!(seg.num_items, items.len());

        for &(index, hash) in &items {
            assert_eq!(seg.query(index, hash), Status::Ok);
        }

        for &(index, hash) in &items {
            assert_eq!(seg.remove(index, hash), Status::Ok);
        }
        assert_eq!(seg.num_items, 0);
        for &(index, hash) in &items {
            assert_eq!(seg.query(index, hash), Status::NotFound);
        }
    }

    #[test]
    fn overfilled_segment_parks_a_victim_without_losing_members() {
        let mut seg = test_segment();
        let mut inserted = Vec::new();

        // Fill until the kick limit trips; every item accepted before (and
        // the one that tripped it) must remain answerable.
        for i in 0u32.. {
            let index = (i.wrapping_mul(2654435761) as usize) & (BUCKETS_PER_SEG - 1);
            let hash = i.wrapping_mul(0x9e37_79b9).rotate_left(11) ^ i;
            match seg.insert(index, hash) {
                Status::Ok => inserted.push((index, hash)),
                Status::NotEnoughSpace => {
                    inserted.push((index, hash));
                    break;
                }
                other => panic!("unexpected status {other:?}"),
            }
        }

        assert!(seg.victim.is_some());
        for &(index, hash) in &inserted {
            assert_eq!(seg.query(index, hash), Status::Ok, "lost ({index}, {hash:#x})");
        }
    }

    #[test]
    fn removal_after_overflow_keeps_members_answerable() {
        let mut seg = test_segment();
        let mut inserted = Vec::new();
        for i in 0u32.. {
            let index = (i.wrapping_mul(2654435761) as usize) & (BUCKETS_PER_SEG - 1);
            let hash = i.wrapping_mul(0x9e37_79b9).rotate_left(11) ^ i;
            match seg.insert(index, hash) {
                Status::Ok => inserted.push((index, hash)),
                _ => break,
            }
        }
        assert!(seg.victim.is_some());

        // Removing a member frees a slot and re-runs the parked tag; whether
        // or not it lands, every other member must stay answerable.
        let (index, hash) = inserted.swap_remove(inserted.len() / 2);
        assert_eq!(seg.remove(index, hash), Status::Ok);
        for &(index, hash) in &inserted {
            assert_eq!(seg.query(index, hash), Status::Ok);
        }
    }

    #[test]
    fn growth_segment_roundtrip() {
        let mut seg: Segment<true> = Segment::new(16, 16);
        for i in 0..500u32 {
            let index = (i as usize * 37) & (BUCKETS_PER_SEG - 1);
            let hash = i.wrapping_mul(0x85eb_ca6b);
            assert_eq!(seg.insert(index, hash), Status::Ok);
            assert_eq!(seg.query(index, hash), Status::Ok);
        }
    }

    #[test]
    fn alternate_index_is_an_involution() {
        let seg = test_segment();
        for i in 1..200u32 {
            let tag = i.wrapping_mul(0x9e37_79b9) >> 16 | 1;
            let i1 = (i as usize * 977) & (BUCKETS_PER_SEG - 1);
            let i2 = seg.alt_index(i1, tag);
            assert_eq!(seg.alt_index(i2, tag), i1);
        }
    }
}
