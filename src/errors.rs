use thiserror::Error;


/// Enum representing errors that may happen when configuring an arena.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {

    /// The arena must hold at least one unit
    #[error("arena size must be at least 1")]
    ZeroArenaSize,
    /// The arena size is not a power of two
    #[error("arena size {0} is not a power of two")]
    ArenaSizeNotPowerOfTwo(usize),
    /// The maximum allocation size must be at least one unit
    #[error("maximum allocation size must be at least 1")]
    ZeroMaxAllocSize,
    /// The maximum allocation size exceeds the arena
    #[error("maximum allocation size {max_alloc_size} exceeds arena size {arena_size}")]
    MaxAllocTooLarge { max_alloc_size: usize, arena_size: usize },
    /// The arena has more levels than a node can describe
    #[error("arena size {0} is too large to be tracked")]
    ArenaTooLarge(usize),
    /// The page size of a pool is not a power of two
    #[error("page size {0} is not a power of two")]
    PageSizeNotPowerOfTwo(usize),
    /// The pool buffer cannot be split into whole pages
    #[error("buffer of {buffer_len} bytes is not a non-zero multiple of the page size {page_size}")]
    BufferNotPageMultiple { buffer_len: usize, page_size: usize },

}


/// Enum representing errors that may happen when allocating blocks.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {

    /// The request exceeds the largest block the arena hands out
    #[error("requested {requested} units but the largest allowed block is {max_alloc_size} units")]
    RequestTooLarge { requested: usize, max_alloc_size: usize },
    /// No free block is big enough for the request
    #[error("no free block of {size} units (largest free block is {largest_free} units)")]
    OutOfMemory { size: usize, largest_free: usize },

}


/// Enum representing errors that may happen when releasing blocks through a checked release.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseError {

    /// The offset lies outside of the arena
    #[error("offset {offset} is outside of the arena of {arena_size} units")]
    OutOfBounds { offset: usize, arena_size: usize },
    /// The level is larger than the root level
    #[error("level {level} exceeds the root level {root_level}")]
    InvalidLevel { level: u8, root_level: u8 },
    /// The offset is not aligned to the block size
    #[error("offset {offset} is not aligned to a block of level {level}")]
    Misaligned { offset: usize, level: u8 },
    /// No block of that level is allocated at the offset
    #[error("no block of level {level} is allocated at offset {offset}")]
    NotAllocated { offset: usize, level: u8 },
    /// The block was handed out before its pool was cleared
    #[error("block of level {level} at offset {offset} was handed out before the pool was cleared")]
    Stale { offset: usize, level: u8 },

}
