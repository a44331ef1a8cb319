use std::fmt;
use std::ops::Range;

use log::{debug, trace, warn};

use crate::alloc_table::{AllocTable, BlockState};
use crate::config::BuddyConfig;
use crate::errors::{AllocError, ConfigError, ReleaseError};
use crate::utils::{level_to_size, size_to_level};


/// A block handed out by a [`BuddyTree`].
/// It is the only thing the owner needs to keep around to release the block later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {

    /// First unit of the block.
    pub offset: usize,

    /// `log2` of the block size in units.
    pub level: u8,

}

impl Block {

    /// Number of units in the block.
    ///
    /// # Panics
    ///
    /// Panics if `level` is too large for the size to fit in a `usize`.
    /// Blocks returned by a [`BuddyTree`] never are.
    pub const fn size(&self) -> usize {
        match self.checked_size() {
            Some(size) => size,
            None => panic!("block level is too large for its size to fit in a usize"),
        }
    }


    /// Number of units in the block, or `None` if it does not fit in a `usize`.
    pub const fn checked_size(&self) -> Option<usize> {
        1usize.checked_shl(self.level as u32)
    }


    /// Units covered by the block.
    ///
    /// # Panics
    ///
    /// Panics under the same condition as [`Block::size`], or if the block ends past `usize::MAX`.
    pub const fn range(&self) -> Range<usize> {
        match self.offset.checked_add(self.size()) {
            Some(end) => self.offset..end,
            None => panic!("block range overflows a usize"),
        }
    }

}


/**
    A binary buddy allocator over an arena of `arena_size` units.

    The arena is recursively split into half-sized buddy blocks. A complete binary tree,
    stored in a flat array, records for every block the size of the largest free block
    inside it, so that allocating and releasing only ever touch one root-to-leaf path.

    The tree state is the only bookkeeping: the allocator does not keep a list of live
    blocks, and a block is released from its offset alone.
*/
#[derive(Clone)]
pub struct BuddyTree {

    /// A binary tree that keeps track of the allocated and free blocks.
    alloc_table: AllocTable,

    /// Largest level that a single allocation may claim.
    max_level: u8,

    /// The total amount of free units, which may not be available as a whole due to fragmentation.
    free_units: usize,

}

impl BuddyTree {

    /// Create an arena from a validated configuration.
    pub fn new(config: BuddyConfig) -> Result<Self, ConfigError> {

        let (root_level, max_level) = config.validate()?;

        debug!(
            "buddy tree: {} units, root level {}, max level {}",
            config.arena_size, root_level, max_level
        );

        Ok(Self {
            alloc_table: AllocTable::new(root_level),
            max_level,
            free_units: config.arena_size,
        })
    }


    /// Create an arena of `arena_size` units where no allocation may exceed `max_alloc_size` units.
    pub fn create(arena_size: usize, max_alloc_size: usize) -> Result<Self, ConfigError> {
        Self::new(BuddyConfig::new(arena_size, max_alloc_size))
    }


    /// Allocate a block of at least `size` units.
    /// The size is rounded up to a power of two; a size of zero allocates a single unit.
    pub fn allocate(&mut self, size: usize) -> Result<Block, AllocError> {

        let max_alloc_size = self.max_alloc_size();

        if size > max_alloc_size {
            trace!("buddy tree: request of {} units over the {} units limit", size, max_alloc_size);
            return Err(AllocError::RequestTooLarge {
                requested: size,
                max_alloc_size,
            });
        }

        let level = size_to_level(size);

        let Some(offset) = self.alloc_table.alloc(level) else {
            trace!("buddy tree: no free block of level {}", level);
            return Err(AllocError::OutOfMemory {
                size: level_to_size(level),
                largest_free: self.largest_free(),
            });
        };

        let block = Block { offset, level };

        // Keep track of the free units
        self.free_units -= block.size();

        trace!("buddy tree: allocated {:?}", block);
        Ok(block)
    }


    /// Release the block starting at `offset`.
    ///
    /// The size of the block is recovered from the tree while merging buddies on the way
    /// back to the root. The offset must be one returned by a previous allocation that has
    /// not been released yet; anything else leaves the tree in an unspecified state.
    /// Use [`BuddyTree::try_release`] to have the block checked first.
    ///
    /// # Panics
    ///
    /// Panics if `offset` lies outside of the arena.
    pub fn release(&mut self, offset: usize) {

        assert!(
            offset < self.arena_size(),
            "buddy tree: released offset {} is outside of the arena of {} units",
            offset,
            self.arena_size()
        );

        match self.alloc_table.free(offset) {

            Some(level) => {
                self.free_units += level_to_size(level);
                trace!("buddy tree: released {:?}", Block { offset, level });
            },

            None => warn!("buddy tree: released offset {} was not allocated", offset),
        }
    }


    /// Release a block after checking that it is currently allocated.
    /// Nothing is modified when an error is returned.
    pub fn try_release(&mut self, block: Block) -> Result<(), ReleaseError> {

        self.check_allocated(block)?;
        self.release(block.offset);
        Ok(())
    }


    /// Whether `block` is currently allocated as a whole.
    pub fn is_allocated(&self, block: Block) -> bool {
        self.check_allocated(block).is_ok()
    }


    fn check_allocated(&self, block: Block) -> Result<(), ReleaseError> {

        let Block { offset, level } = block;

        if offset >= self.arena_size() {
            return Err(ReleaseError::OutOfBounds {
                offset,
                arena_size: self.arena_size(),
            });
        }

        if level > self.root_level() {
            return Err(ReleaseError::InvalidLevel {
                level,
                root_level: self.root_level(),
            });
        }

        if offset % block.size() != 0 {
            return Err(ReleaseError::Misaligned { offset, level });
        }

        let index = self.alloc_table.index_of(offset, level);
        if self.alloc_table.is_claimed(index) {
            Ok(())
        } else {
            Err(ReleaseError::NotAllocated { offset, level })
        }
    }


    /// Free every block at once.
    /// All previously returned blocks become invalid.
    pub fn reset(&mut self) {
        self.alloc_table.reset();
        self.free_units = self.arena_size();
        debug!("buddy tree: reset {} units", self.arena_size());
    }


    /// Return the total number of units in the arena.
    pub fn arena_size(&self) -> usize {
        self.alloc_table.leaf_count()
    }


    /// Return `log2` of the arena size.
    pub fn root_level(&self) -> u8 {
        self.alloc_table.root_level()
    }


    /// Return the largest level a single allocation may claim.
    pub fn max_level(&self) -> u8 {
        self.max_level
    }


    /// Return the largest number of units a single allocation may claim.
    pub fn max_alloc_size(&self) -> usize {
        level_to_size(self.max_level)
    }


    /// Return the size of the largest block that can currently be allocated, ignoring the
    /// allocation limit. Zero when the arena is full.
    pub fn largest_free(&self) -> usize {
        self.alloc_table.root().free_level().map_or(0, level_to_size)
    }


    /// Return the total number of free units.
    /// Note that these units may not be usable as a whole because of fragmentation.
    pub fn free_units(&self) -> usize {
        self.free_units
    }


    /// Return the number of units currently in use.
    pub fn allocated_units(&self) -> usize {
        self.arena_size() - self.free_units
    }


    /// Return the state of the node at `index`, the root being at index 0.
    pub fn node(&self, index: usize) -> Option<BlockState> {
        self.alloc_table.nodes().get(index).copied()
    }


    /// Return the states of every node, level by level starting from the root.
    pub fn nodes(&self) -> &[BlockState] {
        self.alloc_table.nodes()
    }


    /// Check that every node agrees with its children.
    /// Walks the whole tree, so it is meant for diagnostics and tests.
    pub fn is_consistent(&self) -> bool {
        self.alloc_table.is_consistent()
    }


    /// Return a human-readable rendering of the tree, one line per depth.
    pub fn dump(&self) -> String {
        format!("{:#}", self)
    }

}

impl fmt::Display for BuddyTree {

    /// Render the tree one depth per line. The alternate form adds a summary header.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {

        if f.alternate() {
            writeln!(
                f,
                "arena_size:{}\troot_level:{}\tmax_level:{}\tfree_units:{}",
                self.arena_size(),
                self.root_level(),
                self.max_level,
                self.free_units
            )?;
        }

        fmt::Display::fmt(&self.alloc_table, f)
    }

}

impl fmt::Debug for BuddyTree {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyTree")
            .field("arena_size", &self.arena_size())
            .field("max_level", &self.max_level)
            .field("free_units", &self.free_units)
            .field("largest_free", &self.largest_free())
            .finish()
    }

}


#[cfg(test)]
mod tests {

    use super::*;


    #[test]
    fn check_new_tree() {

        let tree = BuddyTree::create(64, 16).unwrap();

        assert_eq!(tree.arena_size(), 64);
        assert_eq!(tree.root_level(), 6);
        assert_eq!(tree.max_level(), 4);
        assert_eq!(tree.max_alloc_size(), 16);
        assert_eq!(tree.node(0), Some(BlockState::Free(6)));
        assert_eq!(tree.nodes().len(), 127);
        assert_eq!(tree.free_units(), 64);
        assert_eq!(tree.largest_free(), 64);
        assert!(tree.is_consistent());
    }


    #[test]
    fn check_invalid_trees() {
        assert_eq!(BuddyTree::create(0, 1).unwrap_err(), ConfigError::ZeroArenaSize);
        assert_eq!(BuddyTree::create(12, 4).unwrap_err(), ConfigError::ArenaSizeNotPowerOfTwo(12));
        assert!(matches!(BuddyTree::create(64, 128), Err(ConfigError::MaxAllocTooLarge { .. })));
    }


    #[test]
    fn check_rounded_max_level() {
        let tree = BuddyTree::create(64, 5).unwrap();
        assert_eq!(tree.max_level(), 3);
        assert_eq!(tree.max_alloc_size(), 8);
    }


    #[test]
    fn check_block_size_limits() {

        let block = Block { offset: 8, level: 3 };
        assert_eq!(block.size(), 8);
        assert_eq!(block.checked_size(), Some(8));
        assert_eq!(block.range(), 8..16);

        let top = Block { offset: 0, level: (usize::BITS - 1) as u8 };
        assert_eq!(top.checked_size(), Some(1 << (usize::BITS - 1)));

        assert_eq!(Block { offset: 0, level: 70 }.checked_size(), None);
        assert_eq!(Block { offset: 0, level: usize::BITS as u8 }.checked_size(), None);

        // A forged level is rejected before its size is ever computed.
        let tree = BuddyTree::create(64, 16).unwrap();
        assert!(!tree.is_allocated(Block { offset: 0, level: 70 }));
    }


    #[test]
    #[should_panic(expected = "too large")]
    fn check_block_size_overflow() {
        let _ = Block { offset: 0, level: 70 }.size();
    }


    #[test]
    #[should_panic(expected = "overflows")]
    fn check_block_range_overflow() {
        let _ = Block { offset: usize::MAX, level: 1 }.range();
    }


    #[test]
    fn check_allocate_bounds() {

        let mut tree = BuddyTree::create(64, 16).unwrap();

        assert_eq!(
            tree.allocate(17),
            Err(AllocError::RequestTooLarge { requested: 17, max_alloc_size: 16 })
        );
        assert_eq!(
            tree.allocate(usize::MAX),
            Err(AllocError::RequestTooLarge { requested: usize::MAX, max_alloc_size: 16 })
        );

        // A rejected request leaves no trace.
        assert_eq!(tree.free_units(), 64);
        assert!(tree.allocate(16).is_ok());
    }


    #[test]
    fn check_zero_allocation() {

        let mut tree = BuddyTree::create(8, 8).unwrap();

        let block = tree.allocate(0).unwrap();
        assert_eq!(block, Block { offset: 0, level: 0 });
        assert_eq!(block.size(), 1);
        assert_eq!(tree.free_units(), 7);
    }


    #[test]
    fn check_out_of_memory() {

        let mut tree = BuddyTree::create(8, 8).unwrap();

        let _ = tree.allocate(1).unwrap();
        assert_eq!(
            tree.allocate(8),
            Err(AllocError::OutOfMemory { size: 8, largest_free: 4 })
        );

        let _ = tree.allocate(4).unwrap();
        let _ = tree.allocate(2).unwrap();
        let _ = tree.allocate(1).unwrap();

        assert_eq!(tree.largest_free(), 0);
        assert_eq!(
            tree.allocate(1),
            Err(AllocError::OutOfMemory { size: 1, largest_free: 0 })
        );
    }


    #[test]
    fn check_counters() {

        let mut tree = BuddyTree::create(32, 32).unwrap();

        let a = tree.allocate(3).unwrap();
        let b = tree.allocate(9).unwrap();
        assert_eq!(tree.allocated_units(), 4 + 16);

        tree.release(b.offset);
        assert_eq!(tree.allocated_units(), 4);

        tree.release(a.offset);
        assert_eq!(tree.free_units(), 32);
    }


    #[test]
    #[should_panic(expected = "outside of the arena")]
    fn check_release_out_of_bounds() {
        let mut tree = BuddyTree::create(16, 16).unwrap();
        tree.release(16);
    }


    #[test]
    fn check_release_unallocated() {

        let mut tree = BuddyTree::create(16, 16).unwrap();

        // The path holds nothing to release: counters stay untouched.
        tree.release(3);
        assert_eq!(tree.free_units(), 16);
        assert_eq!(tree.node(0), Some(BlockState::Free(4)));
    }


    #[test]
    fn check_try_release() {

        let mut tree = BuddyTree::create(16, 8).unwrap();

        let block = tree.allocate(4).unwrap();
        assert_eq!(block, Block { offset: 0, level: 2 });

        assert_eq!(
            tree.try_release(Block { offset: 16, level: 0 }),
            Err(ReleaseError::OutOfBounds { offset: 16, arena_size: 16 })
        );
        assert_eq!(
            tree.try_release(Block { offset: 0, level: 5 }),
            Err(ReleaseError::InvalidLevel { level: 5, root_level: 4 })
        );
        assert_eq!(
            tree.try_release(Block { offset: 2, level: 2 }),
            Err(ReleaseError::Misaligned { offset: 2, level: 2 })
        );
        assert_eq!(
            tree.try_release(Block { offset: 0, level: 1 }),
            Err(ReleaseError::NotAllocated { offset: 0, level: 1 })
        );
        assert_eq!(
            tree.try_release(Block { offset: 4, level: 2 }),
            Err(ReleaseError::NotAllocated { offset: 4, level: 2 })
        );

        assert!(tree.is_allocated(block));
        assert_eq!(tree.try_release(block), Ok(()));
        assert!(!tree.is_allocated(block));

        // Double release
        assert_eq!(
            tree.try_release(block),
            Err(ReleaseError::NotAllocated { offset: 0, level: 2 })
        );
        assert_eq!(tree.free_units(), 16);
    }


    #[test]
    fn check_try_release_used_up_parent() {

        let mut tree = BuddyTree::create(4, 4).unwrap();

        let a = tree.allocate(2).unwrap();
        let b = tree.allocate(2).unwrap();

        // The root has no free capacity but was never claimed as a whole.
        assert_eq!(tree.node(0), Some(BlockState::Allocated));
        assert_eq!(
            tree.try_release(Block { offset: 0, level: 2 }),
            Err(ReleaseError::NotAllocated { offset: 0, level: 2 })
        );

        assert!(tree.try_release(a).is_ok());
        assert!(tree.try_release(b).is_ok());
        assert_eq!(tree.largest_free(), 4);
    }


    #[test]
    fn check_reset() {

        let mut tree = BuddyTree::create(64, 16).unwrap();
        let fresh = tree.nodes().to_vec();

        for size in [1, 5, 16, 2] {
            let _ = tree.allocate(size).unwrap();
        }
        tree.reset();

        assert_eq!(tree.nodes(), fresh.as_slice());
        assert_eq!(tree.free_units(), 64);
    }


    #[test]
    fn check_dump() {

        let mut tree = BuddyTree::create(4, 4).unwrap();
        let _ = tree.allocate(2).unwrap();

        let dump = tree.dump();
        let mut lines = dump.lines();

        assert_eq!(lines.next(), Some("arena_size:4\troot_level:2\tmax_level:2\tfree_units:2"));
        assert_eq!(lines.next(), Some("  1\tlevel:0\tcount:1"));
        assert_eq!(lines.next(), Some(" -1  1\tlevel:1\tcount:2"));
        assert_eq!(lines.next(), Some("  0  0  0  0\tlevel:2\tcount:4"));
        assert_eq!(lines.next(), None);

        // The plain form has no header.
        assert!(tree.to_string().starts_with("  1\t"));
    }

}
