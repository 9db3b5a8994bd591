//! Contiguous block ranges and conversions between extent lists and flat block lists.

/// Sentinel start address meaning "zero-filled, no real backing block".
///
/// A sparse-hole extent is never addressable and never allocatable; set arithmetic and
/// scratch search must ignore it.
pub const SPARSE_HOLE: u64 = u64::MAX;

/// First address of the synthetic temp-block range handed out while cutting cycles.
///
/// Every temp address stays inside `[TEMP_BLOCK_START, SPARSE_HOLE)`; the whole range sits
/// numerically below [`SPARSE_HOLE`] so a temp block can never be mistaken for a hole.
pub const TEMP_BLOCK_START: u64 = SPARSE_HOLE - (1 << 32);

/// A contiguous run of disk blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start_block: u64,
    pub num_blocks: u64,
}

impl Extent {
    pub fn new(start_block: u64, num_blocks: u64) -> Self {
        Self {
            start_block,
            num_blocks,
        }
    }

    /// One past the last block. Meaningless for sparse extents.
    pub fn end_block(&self) -> u64 {
        self.start_block + self.num_blocks
    }

    pub fn is_sparse(&self) -> bool {
        self.start_block == SPARSE_HOLE
    }
}

/// Shorthand constructor matching the `(start, count)` call sites throughout the engine.
pub fn extent_for_range(start_block: u64, num_blocks: u64) -> Extent {
    Extent::new(start_block, num_blocks)
}

/// Total block count of an extent list.
pub fn blocks_in_extents(extents: &[Extent]) -> u64 {
    extents.iter().map(|e| e.num_blocks).sum()
}

/// Appends `block` to `extents`, extending the last extent when the block is the next one
/// in its run. A run of sparse-hole blocks extends a sparse extent the same way.
pub fn append_block_to_extents(extents: &mut Vec<Extent>, block: u64) {
    if let Some(last) = extents.last_mut() {
        let next_block = if last.start_block == SPARSE_HOLE {
            SPARSE_HOLE
        } else {
            last.end_block()
        };
        if next_block == block {
            last.num_blocks += 1;
            return;
        }
    }
    extents.push(Extent::new(block, 1));
}

/// Expands an extent list into one entry per block. Sparse-hole extents expand to
/// [`SPARSE_HOLE`] per covered slot, keeping the flat form the same length as the data it
/// describes.
pub fn expand_extents(extents: &[Extent]) -> Vec<u64> {
    let mut blocks = Vec::with_capacity(blocks_in_extents(extents) as usize);
    for extent in extents {
        if extent.is_sparse() {
            blocks.extend(std::iter::repeat_n(SPARSE_HOLE, extent.num_blocks as usize));
        } else {
            blocks.extend(extent.start_block..extent.end_block());
        }
    }
    blocks
}

/// Inverse of [`expand_extents`]: recompresses a flat block list into a minimal extent list.
pub fn compress_extents(blocks: &[u64]) -> Vec<Extent> {
    let mut extents = Vec::new();
    for &block in blocks {
        append_block_to_extents(&mut extents, block);
    }
    extents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_merges_consecutive_blocks_and_separates_gaps() {
        let mut extents = Vec::new();
        for block in [10, 11, 12, 20, 21, 30] {
            append_block_to_extents(&mut extents, block);
        }
        assert_eq!(
            extents,
            vec![
                extent_for_range(10, 3),
                extent_for_range(20, 2),
                extent_for_range(30, 1),
            ]
        );
        assert_eq!(blocks_in_extents(&extents), 6);
    }

    #[test]
    fn append_merges_sparse_runs() {
        let mut extents = Vec::new();
        for block in [SPARSE_HOLE, SPARSE_HOLE, 5, SPARSE_HOLE] {
            append_block_to_extents(&mut extents, block);
        }
        assert_eq!(
            extents,
            vec![
                extent_for_range(SPARSE_HOLE, 2),
                extent_for_range(5, 1),
                extent_for_range(SPARSE_HOLE, 1),
            ]
        );
    }

    #[test]
    fn expand_and_compress_are_inverses() {
        let extents = vec![
            extent_for_range(0, 2),
            extent_for_range(SPARSE_HOLE, 3),
            extent_for_range(7, 1),
        ];
        let blocks = expand_extents(&extents);
        assert_eq!(blocks, vec![0, 1, SPARSE_HOLE, SPARSE_HOLE, SPARSE_HOLE, 7]);
        assert_eq!(compress_extents(&blocks), extents);
    }

    #[test]
    fn temp_range_sits_below_the_sparse_hole() {
        assert!(TEMP_BLOCK_START < SPARSE_HOLE);
    }
}
