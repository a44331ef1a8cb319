use std::fmt;

use crate::utils::log2_floor;


/// The state of an allocation tree node.
///
/// `Allocated` orders below every `Free` level, so the largest free block under a node
/// is always the maximum of its children's states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockState {

    /// The block has been handed out as a whole and has no free capacity left.
    Allocated,

    /// The largest free block under this node has `2^level` units.
    Free(u8)

}

impl BlockState {

    pub const fn is_allocated(self) -> bool {
        matches!(self, Self::Allocated)
    }


    /// Return the level of the largest free block under the node, if any.
    pub const fn free_level(self) -> Option<u8> {
        match self {
            Self::Free(level) => Some(level),
            Self::Allocated => None,
        }
    }

}

impl fmt::Display for BlockState {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocated => f.pad("-1"),
            Self::Free(level) => fmt::Display::fmt(level, f),
        }
    }

}


#[inline]
pub(crate) const fn left_child(index: usize) -> usize {
    index * 2 + 1
}


#[inline]
pub(crate) const fn right_child(index: usize) -> usize {
    index * 2 + 2
}


#[inline]
pub(crate) const fn parent(index: usize) -> usize {
    (index + 1) / 2 - 1
}


/// Depth of a node, the root being at depth 0.
#[inline]
pub(crate) const fn depth(index: usize) -> u8 {
    log2_floor(index + 1)
}


/// A complete binary tree stored in a flat array that keeps track of the allocated and free blocks.
///
/// Node `0` spans the whole arena and each level of the tree halves the block size, down to
/// one leaf per unit. Every node stores the level of the largest free block beneath it.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct AllocTable {

    nodes: Box<[BlockState]>,

    /// Level of the root node, that is `log2(leaf count)`.
    root_level: u8,

}

impl AllocTable {

    /// Create a table where every block is free.
    pub fn new(root_level: u8) -> Self {

        let leaves = 1usize << root_level;
        let mut nodes = vec![BlockState::Allocated; 2 * leaves - 1].into_boxed_slice();
        Self::fill(&mut nodes, root_level);

        Self {
            nodes,
            root_level,
        }
    }


    /// Set every node to the level of the block it spans, in one pass.
    fn fill(nodes: &mut [BlockState], root_level: u8) {

        let mut level = root_level;

        // Every time the index crosses into a new depth, blocks get half as big.
        for (index, node) in nodes.iter_mut().enumerate() {
            if index != 0 && (index + 1).is_power_of_two() {
                level -= 1;
            }
            *node = BlockState::Free(level);
        }
    }


    #[inline]
    pub fn root_level(&self) -> u8 {
        self.root_level
    }


    #[inline]
    pub fn leaf_count(&self) -> usize {
        1 << self.root_level
    }


    #[inline]
    pub fn root(&self) -> BlockState {
        self.nodes[0]
    }


    #[inline]
    pub fn nodes(&self) -> &[BlockState] {
        &self.nodes
    }


    /// Index of the node describing the block of the given level that starts at `offset`.
    /// Assume `offset` is aligned to the block size and `level <= root_level`.
    #[inline]
    pub fn index_of(&self, offset: usize, level: u8) -> usize {
        ((offset + self.leaf_count()) >> level) - 1
    }


    /// Offset of the first unit covered by the node at `index`, which has the given level.
    #[inline]
    fn offset_of(&self, index: usize, level: u8) -> usize {
        ((index + 1) << level) - self.leaf_count()
    }


    /// Try to allocate a block of the given level.
    /// Return the offset of the allocated block.
    pub fn alloc(&mut self, level: u8) -> Option<usize> {

        if self.root() < BlockState::Free(level) {
            // Not even the largest free block can fit the request.
            return None;
        }

        // Walk down to a node of the requested level, preferring the left child.
        // A right child always fits when the left one doesn't, since the parent does.
        let mut index = 0;
        let mut current = self.root_level;
        while current != level {
            let left = left_child(index);
            index = if self.nodes[left] >= BlockState::Free(level) {
                left
            } else {
                right_child(index)
            };
            current -= 1;
        }

        let offset = self.offset_of(index, level);
        self.nodes[index] = BlockState::Allocated;

        // Only the ancestors of the claimed node changed.
        while index != 0 {
            index = parent(index);
            self.nodes[index] = self.nodes[left_child(index)].max(self.nodes[right_child(index)]);
        }

        Some(offset)
    }


    /// Free the block that starts at `offset`, merging buddies on the way up.
    /// Return the level of the allocated block met on the path, which is the released block,
    /// or `None` if the path held no allocated block.
    /// Assume `offset` < `leaf_count`.
    pub fn free(&mut self, offset: usize) -> Option<u8> {

        let mut index = offset + self.leaf_count() - 1;
        let mut level = 0;
        let mut released = self.nodes[index].is_allocated().then_some(level);

        self.nodes[index] = BlockState::Free(level);

        while index != 0 {
            index = parent(index);

            if released.is_none() && self.nodes[index].is_allocated() {
                released = Some(level + 1);
            }

            let left = self.nodes[left_child(index)];
            let right = self.nodes[right_child(index)];

            // Two fully free buddies merge into their parent.
            self.nodes[index] = if left == BlockState::Free(level) && right == BlockState::Free(level) {
                BlockState::Free(level + 1)
            } else {
                left.max(right)
            };

            level += 1;
        }

        released
    }


    /// Whether the node at `index` was claimed whole by an allocation, as opposed to having
    /// no free capacity because both of its halves are used up.
    pub fn is_claimed(&self, index: usize) -> bool {

        if !self.nodes[index].is_allocated() {
            return false;
        }

        let left = left_child(index);

        // Leaves can only be claimed. A claimed node keeps its halves untouched.
        left >= self.nodes.len() || !(self.nodes[left].is_allocated() && self.nodes[right_child(index)].is_allocated())
    }


    /// Mark every block as free.
    pub fn reset(&mut self) {
        Self::fill(&mut self.nodes, self.root_level);
    }


    /// Check that every node agrees with its children.
    pub fn is_consistent(&self) -> bool {

        let first_leaf = self.leaf_count() - 1;

        for (index, &state) in self.nodes.iter().enumerate() {

            let nominal = self.root_level - depth(index);

            match state {

                BlockState::Allocated => {
                    // Either both halves are used up, or the node was claimed whole
                    // and everything below it is untouched.
                    if index < first_leaf {
                        let children = self.nodes[left_child(index)].max(self.nodes[right_child(index)]);
                        if !children.is_allocated() && !self.is_pristine(index) {
                            return false;
                        }
                    }
                },

                BlockState::Free(level) => {

                    if level > nominal {
                        return false;
                    }

                    if index < first_leaf {
                        let left = self.nodes[left_child(index)];
                        let right = self.nodes[right_child(index)];

                        let expected = if left == BlockState::Free(nominal - 1) && right == BlockState::Free(nominal - 1) {
                            BlockState::Free(nominal)
                        } else {
                            left.max(right)
                        };

                        if state != expected {
                            return false;
                        }
                    }
                },
            }
        }

        true
    }


    /// Whether every node strictly below `index` holds its nominal level.
    fn is_pristine(&self, index: usize) -> bool {

        let mut first = left_child(index);
        let mut width = 2;

        while first < self.nodes.len() {
            let nominal = BlockState::Free(self.root_level - depth(first));
            if self.nodes[first..first + width].iter().any(|&state| state != nominal) {
                return false;
            }
            first = left_child(first);
            width *= 2;
        }

        true
    }

}

impl fmt::Display for AllocTable {

    /// One line per depth with every node's level, `-1` marking allocated blocks.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {

        for depth in 0..=self.root_level {
            let first = (1usize << depth) - 1;
            let count = 1usize << depth;

            for state in &self.nodes[first..first + count] {
                write!(f, "{:>3}", state)?;
            }
            writeln!(f, "\tlevel:{}\tcount:{}", depth, count)?;
        }

        Ok(())
    }

}

impl fmt::Debug for AllocTable {

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocTable")
            .field("root_level", &self.root_level)
            .field("root", &self.root())
            .finish()
    }

}
