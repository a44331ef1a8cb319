//! A binary buddy allocator over a fixed arena of power-of-two size.
//!
//! The arena is made of `arena_size` units (pages of a pool, slots of a table...) and is
//! recursively split into half-sized buddy blocks. A complete binary tree stored in a flat
//! array records, for every block, the size of the largest free block it contains. Allocating
//! walks down that tree, releasing walks back up from a leaf and merges buddies on the way.
//! Both only touch a single root-to-leaf path.
//!
//! ```
//! use buddy_tree::BuddyTree;
//!
//! // 64 units, no single allocation larger than 16 units.
//! let mut tree = BuddyTree::create(64, 16).unwrap();
//!
//! // 3 units are rounded up to a block of 4.
//! let block = tree.allocate(3).unwrap();
//! assert_eq!((block.offset, block.size()), (0, 4));
//!
//! // The offset is enough to give the block back.
//! tree.release(block.offset);
//! assert_eq!(tree.largest_free(), 64);
//! ```
//!
//! [`PagePool`] pairs a tree with a byte buffer, handing out runs of pages as slices.

mod alloc_table;
mod buddy_tree;
mod config;
mod errors;
mod page_pool;
mod utils;

pub use alloc_table::BlockState;
pub use buddy_tree::{Block, BuddyTree};
pub use config::{BuddyConfig, MAX_ROOT_LEVEL};
pub use errors::{AllocError, ConfigError, ReleaseError};
pub use page_pool::{PageBlock, PagePool};
pub use utils::{level_to_size, log2_floor, round_up_pow2, size_to_level};
