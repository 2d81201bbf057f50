use std::fmt;

/// Bitmap of register numbers (guest GPRs/FPRs or host registers).
///
/// Supports up to 64 registers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegSet(u64);

impl RegSet {
    pub const EMPTY: RegSet = RegSet(0);

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn set(self, reg: usize) -> Self {
        Self(self.0 | (1u64 << reg))
    }

    pub const fn clear(self, reg: usize) -> Self {
        Self(self.0 & !(1u64 << reg))
    }

    pub const fn contains(self, reg: usize) -> bool {
        self.0 & (1u64 << reg) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: RegSet) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: RegSet) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn subtract(self, other: RegSet) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Return the lowest set register, or None.
    pub const fn first(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Contiguous range `lo..=hi`.
    pub const fn range(lo: usize, hi: usize) -> Self {
        let upper = if hi >= 63 { u64::MAX } else { (1u64 << (hi + 1)) - 1 };
        Self(upper & !((1u64 << lo) - 1))
    }

    /// Iterate set registers in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let reg = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(reg)
        })
    }
}

impl Default for RegSet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl FromIterator<usize> for RegSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter().fold(RegSet::EMPTY, RegSet::set)
    }
}

impl fmt::Debug for RegSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegSet(0x{:016x})", self.0)
    }
}
