//! Set arithmetic over block ranges.
//!
//! An [`ExtentRanges`] is an ordered set of non-overlapping, non-touching extents plus a
//! cached total block count. Adjacent or overlapping insertions are coalesced on the way
//! in, so the representation is always minimal and `blocks()` always equals the sum of the
//! member lengths.

use crate::extent::{Extent, extent_for_range};

#[derive(Debug, Clone, Default)]
pub struct ExtentRanges {
    extents: Vec<Extent>,
    blocks: u64,
}

impl ExtentRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `a` and `b` overlap or sit flush against each other. Two sparse-hole
    /// extents are considered to touch (useful for detection); a sparse extent never
    /// touches a concrete one.
    pub fn extents_overlap_or_touch(a: &Extent, b: &Extent) -> bool {
        if a.start_block == b.start_block {
            return true;
        }
        if a.is_sparse() || b.is_sparse() {
            return false;
        }
        if a.start_block < b.start_block {
            a.end_block() >= b.start_block
        } else {
            b.end_block() >= a.start_block
        }
    }

    /// Like [`Self::extents_overlap_or_touch`] but flush extents do not count.
    pub fn extents_overlap(a: &Extent, b: &Extent) -> bool {
        if a.start_block == b.start_block {
            return true;
        }
        if a.is_sparse() || b.is_sparse() {
            return false;
        }
        if a.start_block < b.start_block {
            a.end_block() > b.start_block
        } else {
            b.end_block() > a.start_block
        }
    }

    pub fn add_block(&mut self, block: u64) {
        self.add_extent(extent_for_range(block, 1));
    }

    pub fn subtract_block(&mut self, block: u64) {
        self.subtract_extent(extent_for_range(block, 1));
    }

    /// Inserts `extent`, merging it with every member it overlaps or touches. Sparse or
    /// empty extents are ignored.
    pub fn add_extent(&mut self, extent: Extent) {
        if extent.is_sparse() || extent.num_blocks == 0 {
            return;
        }

        let mut start_block = extent.start_block;
        let mut end_block = extent.end_block();
        let mut first_merged: Option<usize> = None;
        let mut last_merged = 0;
        for (i, member) in self.extents.iter().enumerate() {
            if Self::extents_overlap_or_touch(member, &extent) {
                start_block = start_block.min(member.start_block);
                end_block = end_block.max(member.end_block());
                if first_merged.is_none() {
                    first_merged = Some(i);
                }
                last_merged = i;
            }
        }

        // Members that overlap or touch a concrete extent form one contiguous run in the
        // sorted set, so a single drain removes them all.
        if let Some(first) = first_merged {
            let removed: u64 = self
                .extents
                .drain(first..=last_merged)
                .map(|e| e.num_blocks)
                .sum();
            self.blocks -= removed;
        }

        let merged = extent_for_range(start_block, end_block - start_block);
        let pos = self
            .extents
            .partition_point(|m| m.start_block < merged.start_block);
        self.extents.insert(pos, merged);
        self.blocks += merged.num_blocks;
    }

    /// Removes the intersection of `extent` from the set, splitting any overlapping member
    /// into zero, one, or two remaining pieces. Sparse or empty extents are ignored.
    pub fn subtract_extent(&mut self, extent: Extent) {
        if extent.is_sparse() || extent.num_blocks == 0 {
            return;
        }

        let sub_start = extent.start_block;
        let sub_end = extent.end_block();
        let mut result: Vec<Extent> = Vec::with_capacity(self.extents.len() + 1);
        let mut blocks = 0;
        for member in &self.extents {
            if member.end_block() <= sub_start || member.start_block >= sub_end {
                result.push(*member);
                blocks += member.num_blocks;
                continue;
            }
            if member.start_block < sub_start {
                let left = extent_for_range(member.start_block, sub_start - member.start_block);
                blocks += left.num_blocks;
                result.push(left);
            }
            if member.end_block() > sub_end {
                let right = extent_for_range(sub_end, member.end_block() - sub_end);
                blocks += right.num_blocks;
                result.push(right);
            }
        }
        self.extents = result;
        self.blocks = blocks;
    }

    pub fn add_ranges(&mut self, ranges: &ExtentRanges) {
        for extent in ranges.extents() {
            self.add_extent(*extent);
        }
    }

    pub fn subtract_ranges(&mut self, ranges: &ExtentRanges) {
        for extent in ranges.extents() {
            self.subtract_extent(*extent);
        }
    }

    pub fn add_repeated_extents(&mut self, extents: &[Extent]) {
        for extent in extents {
            self.add_extent(*extent);
        }
    }

    pub fn subtract_repeated_extents(&mut self, extents: &[Extent]) {
        for extent in extents {
            self.subtract_extent(*extent);
        }
    }

    pub fn contains_block(&self, block: u64) -> bool {
        self.extents
            .iter()
            .any(|e| !e.is_sparse() && e.start_block <= block && block < e.end_block())
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Returns, in ascending start-block order, the minimal prefix of stored ranges whose
    /// total block count is exactly `count`. Does not mutate the set.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds [`Self::blocks`]; asking for more scratch than the set
    /// holds is a caller contract violation.
    pub fn get_extents_for_block_count(&self, count: u64) -> Vec<Extent> {
        let mut out: Vec<Extent> = Vec::new();
        if count == 0 {
            return out;
        }
        assert!(
            count <= self.blocks,
            "requested {count} blocks from a set holding {}",
            self.blocks
        );
        let mut out_blocks = 0;
        for extent in &self.extents {
            let blocks_needed = count - out_blocks;
            let mut taken = *extent;
            if taken.num_blocks > blocks_needed {
                taken.num_blocks = blocks_needed;
            }
            out_blocks += taken.num_blocks;
            out.push(taken);
            if out_blocks == count {
                break;
            }
        }
        debug_assert_eq!(out_blocks, count);
        out
    }
}
