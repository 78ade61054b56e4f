//! Count trailing zeros of a byte using look-up tables
//!
//! The ready list and the event wait lists are two-level bitmaps made of
//! bytes. Finding the lowest set bit of a byte is done by an array-based
//! look-up table instead of a hardware instruction so that the operation takes
//! the same (small) number of cycles on every target, including cores without
//! a CTZ/CLZ instruction.

/// Maps a bit position (`0..8`) to the corresponding bit mask.
pub(crate) const MAP_TBL: [u8; 8] = {
    let mut array = [0u8; 8];
    // `for` is unusable in `const fn`
    let mut i = 0;
    while i < array.len() {
        array[i] = 1 << i;
        i += 1;
    }
    array
};

/// Maps a byte to the position of its least significant set bit. The entry
/// for `0` is `0`; callers must check for zero themselves.
pub(crate) const UNMAP_TBL: [u8; 256] = {
    let mut array = [0u8; 256];
    let mut i = 1;
    while i < array.len() {
        array[i] = (i as u8).trailing_zeros() as u8;
        i += 1;
    }
    array
};

/// Return the position of the least significant set bit in `x`, or `None` if
/// `x` is zero.
#[inline]
pub(crate) fn lowest_set_bit(x: u8) -> Option<u8> {
    if x == 0 {
        None
    } else {
        Some(UNMAP_TBL[x as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn quickcheck_lowest_set_bit(x: u8) {
        let got = lowest_set_bit(x);
        let expected = if x == 0 {
            None
        } else {
            Some(x.trailing_zeros() as u8)
        };
        assert_eq!(got, expected, "lowest_set_bit({x:#010b})");
    }

    #[test]
    fn continuous() {
        for x in 0..=255u8 {
            if x != 0 {
                assert_eq!(UNMAP_TBL[x as usize] as u32, x.trailing_zeros());
            }
        }
        assert_eq!(UNMAP_TBL[0], 0);
    }

    #[test]
    fn map_table() {
        for (i, &mask) in MAP_TBL.iter().enumerate() {
            assert_eq!(mask.count_ones(), 1);
            assert_eq!(UNMAP_TBL[mask as usize] as usize, i);
        }
    }
}
