/// Round `size` up to the next power of two.
/// A size of zero is treated as a request for a single unit.
#[inline]
pub const fn round_up_pow2(size: usize) -> usize {
    if size <= 1 {
        1
    } else {
        size.next_power_of_two()
    }
}


/// Integer base-2 logarithm, rounded down. `log2_floor(0)` is 0.
#[inline]
pub const fn log2_floor(n: usize) -> u8 {
    if n == 0 {
        0
    } else {
        (usize::BITS - 1 - n.leading_zeros()) as u8
    }
}


/// Level of the smallest block able to hold `size` units.
#[inline]
pub const fn size_to_level(size: usize) -> u8 {
    log2_floor(round_up_pow2(size))
}


/// Number of units in a block of the given level.
/// `level` must be below `usize::BITS`; see [`crate::Block::checked_size`] for untrusted levels.
#[inline]
pub const fn level_to_size(level: u8) -> usize {
    1 << level
}
