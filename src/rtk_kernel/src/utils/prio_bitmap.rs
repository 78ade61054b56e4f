//! Provides `PrioBitmap`, a two-level bit array supporting constant-time
//! "find the lowest set bit" operations over 64 priority levels.
use core::fmt;

use super::{
    ctz::{lowest_set_bit, MAP_TBL},
    Init,
};

/// The number of priority levels representable by [`PrioBitmap`].
pub const PRIO_BITMAP_LEN: usize = ROW_LEN * ROW_LEN;

const ROW_LEN: usize = 8;

/// The position of a priority level within a [`PrioBitmap`].
///
/// Computed once from a priority by [`PrioCoords::new`] and cached by its
/// owner (e.g., a task control block) so that inserting or removing the
/// priority doesn't have to redo the arithmetic.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrioCoords {
    /// The row index (`priority / 8`).
    pub(crate) y: u8,
    /// The bit index within the row (`priority % 8`).
    pub(crate) x: u8,
    /// `1 << y`, the bit in the group mask.
    pub(crate) bit_y: u8,
    /// `1 << x`, the bit in the row.
    pub(crate) bit_x: u8,
}

impl PrioCoords {
    /// Calculate the coordinates of `priority`.
    ///
    /// Panics if `priority` is out of range (`>= PRIO_BITMAP_LEN`).
    #[inline]
    pub const fn new(priority: u8) -> Self {
        assert!((priority as usize) < PRIO_BITMAP_LEN, "priority out of range");
        let y = priority >> 3;
        let x = priority & 7;
        Self {
            y,
            x,
            bit_y: MAP_TBL[y as usize],
            bit_x: MAP_TBL[x as usize],
        }
    }

    /// Get the priority these coordinates were calculated from.
    #[inline]
    pub const fn priority(&self) -> u8 {
        (self.y << 3) | self.x
    }
}

impl Init for PrioCoords {
    const INIT: Self = Self::new(0);
}

impl fmt::Debug for PrioCoords {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PrioCoords").field(&self.priority()).finish()
    }
}

/// A two-level bit array. The first level (`group`) has one bit per row of
/// eight priorities; the second level (`rows`) has one bit per priority.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PrioBitmap {
    // Invariant: `(group & (1 << y) != 0) == (rows[y] != 0)`
    group: u8,
    rows: [u8; ROW_LEN],
}

impl Init for PrioBitmap {
    const INIT: Self = Self {
        group: 0,
        rows: [0; ROW_LEN],
    };
}

impl fmt::Debug for PrioBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PrioBitmap {
    /// Get the bit at the specified coordinates.
    #[inline]
    pub fn get(&self, coords: PrioCoords) -> bool {
        self.rows[coords.y as usize] & coords.bit_x != 0
    }

    /// Set the bit at the specified coordinates. Setting a bit that is
    /// already set leaves the bitmap unchanged.
    #[inline]
    pub fn set(&mut self, coords: PrioCoords) {
        self.group |= coords.bit_y;
        self.rows[coords.y as usize] |= coords.bit_x;
    }

    /// Clear the bit at the specified coordinates.
    #[inline]
    pub fn clear(&mut self, coords: PrioCoords) {
        let row = &mut self.rows[coords.y as usize];
        *row &= !coords.bit_x;
        if *row == 0 {
            self.group &= !coords.bit_y;
        }
    }

    /// Get the position of the first (numerically lowest) set bit.
    #[inline]
    pub fn find_set(&self) -> Option<u8> {
        let y = lowest_set_bit(self.group)?;
        let row = self.rows[y as usize];
        debug_assert_ne!(row, 0);
        let x = lowest_set_bit(row)?;
        Some((y << 3) + x)
    }

    /// Return `true` if no bits are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.group == 0
    }

    /// Iterate over the set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..PRIO_BITMAP_LEN as u8).filter(move |&i| self.get(PrioCoords::new(i)))
    }
}
