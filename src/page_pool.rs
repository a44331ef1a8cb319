use std::ops::Range;

use log::debug;

use crate::buddy_tree::{Block, BuddyTree};
use crate::config::BuddyConfig;
use crate::errors::{AllocError, ConfigError, ReleaseError};


/// A run of pages handed out by a [`PagePool`].
/// It can only be given back by value, so a block cannot be freed twice.
/// It is also tied to the pool generation it was handed out in, so it cannot outlive a
/// [`PagePool::free_all`].
#[derive(Debug, PartialEq, Eq)]
pub struct PageBlock {

    block: Block,

    /// Value of the pool generation when the block was handed out.
    generation: u64,

    /// Number of bytes that were requested.
    len: usize,

}

impl PageBlock {

    /// The underlying block, in pages.
    pub const fn block(&self) -> Block {
        self.block
    }


    /// Number of bytes that were requested.
    pub const fn len(&self) -> usize {
        self.len
    }


    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

}


/**
    A byte buffer split into pages of `page_size` bytes and handed out in power-of-two runs
    of pages by a [`BuddyTree`].

    The number of pages in the buffer must be a power of two.
*/
pub struct PagePool {

    /// The actual buffer where the pages are stored.
    memory: Box<[u8]>,

    /// Size of a page in bytes. A power of two.
    page_size: usize,

    /// Keeps track of the allocated and free pages.
    tree: BuddyTree,

    /// Bumped by every `free_all`.
    generation: u64,

}

impl PagePool {

    /// Create a pool over `buffer`, where no allocation may exceed `max_alloc_bytes` bytes
    /// (rounded up to whole pages).
    pub fn new(buffer: impl Into<Box<[u8]>>, page_size: usize, max_alloc_bytes: usize) -> Result<Self, ConfigError> {

        let memory = buffer.into();

        if !page_size.is_power_of_two() {
            return Err(ConfigError::PageSizeNotPowerOfTwo(page_size));
        }

        if memory.is_empty() || memory.len() % page_size != 0 {
            return Err(ConfigError::BufferNotPageMultiple {
                buffer_len: memory.len(),
                page_size,
            });
        }

        let pages = memory.len() / page_size;
        let tree = BuddyTree::new(BuddyConfig::new(pages, max_alloc_bytes.div_ceil(page_size)))?;

        debug!("page pool: {} pages of {} bytes", pages, page_size);

        Ok(Self {
            memory,
            page_size,
            tree,
            generation: 0,
        })
    }


    /// Create a pool over a zeroed buffer of `pages` pages.
    pub fn with_capacity(pages: usize, page_size: usize, max_alloc_bytes: usize) -> Result<Self, ConfigError> {

        if !page_size.is_power_of_two() {
            return Err(ConfigError::PageSizeNotPowerOfTwo(page_size));
        }

        // Check the geometry before allocating the buffer.
        BuddyConfig::new(pages, max_alloc_bytes.div_ceil(page_size)).validate()?;

        let bytes = pages
            .checked_mul(page_size)
            .ok_or(ConfigError::ArenaTooLarge(pages))?;

        Self::new(vec![0u8; bytes], page_size, max_alloc_bytes)
    }


    /// Allocate enough pages to store at least `bytes` bytes.
    /// Zero bytes still claim one page. Sizes in errors are expressed in pages.
    pub fn alloc(&mut self, bytes: usize) -> Result<PageBlock, AllocError> {

        let block = self.tree.allocate(bytes.div_ceil(self.page_size))?;

        Ok(PageBlock {
            block,
            generation: self.generation,
            len: bytes,
        })
    }


    /// Give the pages of `block` back to the pool.
    /// A block handed out before the last [`PagePool::free_all`] is rejected and the pool is
    /// left untouched.
    pub fn free(&mut self, block: PageBlock) -> Result<(), ReleaseError> {

        if block.generation != self.generation {
            return Err(ReleaseError::Stale {
                offset: block.block.offset,
                level: block.block.level,
            });
        }

        self.tree.try_release(block.block)
    }


    fn byte_range(&self, block: &PageBlock) -> Range<usize> {
        assert!(
            block.generation == self.generation,
            "page pool: block at page {} was handed out before the pool was cleared",
            block.block.offset
        );
        let start = block.block.offset * self.page_size;
        start..start + block.len
    }


    /// Return the requested bytes of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `block` comes from a larger pool or was handed out before the last
    /// [`PagePool::free_all`].
    pub fn slice(&self, block: &PageBlock) -> &[u8] {
        &self.memory[self.byte_range(block)]
    }


    /// Return the requested bytes of `block`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `block` comes from a larger pool or was handed out before the last
    /// [`PagePool::free_all`].
    pub fn slice_mut(&mut self, block: &PageBlock) -> &mut [u8] {
        let range = self.byte_range(block);
        &mut self.memory[range]
    }


    pub fn page_size(&self) -> usize {
        self.page_size
    }


    /// Return the total size of the pool in bytes.
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }


    /// Return the number of bytes in free pages.
    /// Note that these pages may not be usable as a whole because of fragmentation.
    pub fn free_bytes(&self) -> usize {
        self.tree.free_units() * self.page_size
    }


    /// Return the tree that keeps track of the pages.
    pub fn tree(&self) -> &BuddyTree {
        &self.tree
    }


    /// Free every page at once.
    /// Every block handed out so far becomes stale: passing one to [`PagePool::free`] is an
    /// error and passing one to [`PagePool::slice`] or [`PagePool::slice_mut`] panics, even if
    /// a new block now covers the same pages.
    pub fn free_all(&mut self) {
        self.tree.reset();
        self.generation = self.generation.wrapping_add(1);
        debug!("page pool: cleared, generation {}", self.generation);
    }


    /// Drop the pool and return its buffer.
    pub fn into_buffer(self) -> Box<[u8]> {
        self.memory
    }

}
