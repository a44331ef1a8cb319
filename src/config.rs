use crate::errors::ConfigError;
use crate::utils::{log2_floor, size_to_level};


/// Largest root level an arena may have.
/// Keeps `2 * arena_size - 1` nodes addressable on every target.
pub const MAX_ROOT_LEVEL: u8 = (usize::BITS - 2) as u8;


/// Construction parameters of a buddy arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyConfig {

    /// Number of allocatable units. Must be a power of two.
    pub arena_size: usize,

    /// Largest single allocation, in units. Rounded up to a power of two.
    pub max_alloc_size: usize,

}

impl BuddyConfig {

    pub const fn new(arena_size: usize, max_alloc_size: usize) -> Self {
        Self {
            arena_size,
            max_alloc_size,
        }
    }


    /// An arena where a single allocation may claim the whole arena.
    pub const fn full(arena_size: usize) -> Self {
        Self::new(arena_size, arena_size)
    }


    /// Check the parameters and return the derived `(root_level, max_level)`.
    pub fn validate(&self) -> Result<(u8, u8), ConfigError> {

        if self.arena_size == 0 {
            return Err(ConfigError::ZeroArenaSize);
        }

        if !self.arena_size.is_power_of_two() {
            return Err(ConfigError::ArenaSizeNotPowerOfTwo(self.arena_size));
        }

        let root_level = log2_floor(self.arena_size);
        if root_level > MAX_ROOT_LEVEL {
            return Err(ConfigError::ArenaTooLarge(self.arena_size));
        }

        if self.max_alloc_size == 0 {
            return Err(ConfigError::ZeroMaxAllocSize);
        }

        if self.max_alloc_size > self.arena_size {
            return Err(ConfigError::MaxAllocTooLarge {
                max_alloc_size: self.max_alloc_size,
                arena_size: self.arena_size,
            });
        }

        // Cannot overflow: max_alloc_size <= arena_size, which is itself a power of two.
        Ok((root_level, size_to_level(self.max_alloc_size)))
    }

}
