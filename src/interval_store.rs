use std::collections::BTreeMap;

/// Where a candidate segment falls relative to the blocks received so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// a block starts at exactly the candidate's offset - this is a retransmission, possibly
    ///  with a different length
    Exact { len: u32 },
    /// the candidate intersects one or more received blocks without starting at the same offset
    Overlapping,
    /// the candidate covers only bytes that were not received yet
    Free,
}

/// The byte ranges of one message that were received so far, keyed by offset.
///
/// NB: There is an invariant that stored blocks are pairwise disjoint. It is established by
///      only inserting blocks that were classified as [Placement::Free], which is why
///      [IntervalStore::classify] needs to look only at the immediate neighbours of a candidate.
#[derive(Default, Debug)]
pub struct IntervalStore {
    blocks: BTreeMap<u32, u32>,
    covered_bytes: u64,
}

impl IntervalStore {
    pub fn classify(&self, offset: u32, len: u32) -> Placement {
        if let Some(&existing_len) = self.blocks.get(&offset) {
            return Placement::Exact { len: existing_len };
        }

        let end = offset as u64 + len as u64;

        // the first block starting after the candidate must start at or after the candidate's end
        if let Some((&successor_offset, _)) = self.blocks.range(offset..).next() {
            if end > successor_offset as u64 {
                return Placement::Overlapping;
            }
        }

        // the last block starting before the candidate must end at or before the candidate's start
        if let Some((&predecessor_offset, &predecessor_len)) = self.blocks.range(..offset).next_back() {
            if predecessor_offset as u64 + predecessor_len as u64 > offset as u64 {
                return Placement::Overlapping;
            }
        }

        Placement::Free
    }

    /// NB: This is intended for blocks classified as [Placement::Free] only
    pub fn insert(&mut self, offset: u32, len: u32) {
        debug_assert_eq!(self.classify(offset, len), Placement::Free);
        self.blocks.insert(offset, len);
        self.covered_bytes += len as u64;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// sum of the lengths of all blocks
    pub fn covered_bytes(&self) -> u64 {
        self.covered_bytes
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.covered_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    fn store(blocks: &[(u32, u32)]) -> IntervalStore {
        let mut result = IntervalStore::default();
        for &(offset, len) in blocks {
            result.insert(offset, len);
        }
        result
    }

    #[rstest]
    #[case::empty(vec![], 0, 10, Placement::Free)]
    #[case::exact_same_len(vec![(10, 5)], 10, 5, Placement::Exact { len: 5 })]
    #[case::exact_other_len(vec![(10, 5)], 10, 7, Placement::Exact { len: 5 })]
    #[case::before_touching(vec![(10, 5)], 5, 5, Placement::Free)]
    #[case::before_overlapping(vec![(10, 5)], 5, 6, Placement::Overlapping)]
    #[case::after_touching(vec![(10, 5)], 15, 5, Placement::Free)]
    #[case::after_overlapping(vec![(10, 5)], 14, 5, Placement::Overlapping)]
    #[case::inside(vec![(10, 5)], 11, 2, Placement::Overlapping)]
    #[case::enclosing(vec![(10, 5)], 9, 10, Placement::Overlapping)]
    #[case::enclosing_several(vec![(10, 5), (20, 5)], 0, 100, Placement::Overlapping)]
    #[case::gap_exact_fit(vec![(10, 5), (20, 5)], 15, 5, Placement::Free)]
    #[case::gap_too_long(vec![(10, 5), (20, 5)], 15, 6, Placement::Overlapping)]
    #[case::gap_starts_early(vec![(10, 5), (20, 5)], 14, 2, Placement::Overlapping)]
    #[case::empty_segment_in_gap(vec![(10, 5)], 20, 0, Placement::Free)]
    #[case::empty_segment_inside_block(vec![(10, 5)], 12, 0, Placement::Overlapping)]
    #[case::max_offset(vec![(10, 5)], u32::MAX, 1, Placement::Free)]
    fn test_classify(#[case] blocks: Vec<(u32, u32)>, #[case] offset: u32, #[case] len: u32, #[case] expected: Placement) {
        assert_eq!(store(&blocks).classify(offset, len), expected);
    }

    #[test]
    fn test_insert_and_clear() {
        let mut store = store(&[(0, 3), (10, 5)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.covered_bytes(), 8);

        store.insert(3, 7);
        assert_eq!(store.len(), 3);
        assert_eq!(store.covered_bytes(), 15);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.covered_bytes(), 0);
        assert_eq!(store.classify(0, 3), Placement::Free);
    }
}
