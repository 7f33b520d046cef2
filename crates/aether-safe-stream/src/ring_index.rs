use std::ops::{Add, AddAssign, Sub};

use aether_codec::{CodecError, Packable, Packer, Unpacker};

const HALF_RING: u16 = 1 << 15;

/// Protocol offset on a 16-bit ring.
///
/// Comparisons use signed wrap-around arithmetic: `a.is_before(b)` iff the
/// forward distance from `a` to `b` lies in `(0, 2^15]`. Offsets more than
/// half the ring apart are not ordered; window sizes keep live offsets well
/// inside that bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SsRingIndex(pub u16);

impl SsRingIndex {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn is_before(self, other: Self) -> bool {
        let forward = other.0.wrapping_sub(self.0);
        forward != 0 && forward <= HALF_RING
    }

    #[inline]
    pub fn is_after(self, other: Self) -> bool {
        other.is_before(self)
    }

    /// Forward distance from `self` to `other`.
    #[inline]
    pub fn distance_to(self, other: Self) -> u16 {
        other.0.wrapping_sub(self.0)
    }

    #[inline]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[inline]
    pub fn prev(self) -> Self {
        Self(self.0.wrapping_sub(1))
    }
}

impl Add<u16> for SsRingIndex {
    type Output = Self;

    fn add(self, rhs: u16) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u16> for SsRingIndex {
    fn add_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub<u16> for SsRingIndex {
    type Output = Self;

    fn sub(self, rhs: u16) -> Self {
        Self(self.0.wrapping_sub(rhs))
    }
}

impl std::fmt::Display for SsRingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Packable for SsRingIndex {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u16(self.0);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_u16().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ordering_across_the_wrap() {
        let a = SsRingIndex(u16::MAX - 2);
        let b = SsRingIndex(3);
        assert!(a.is_before(b));
        assert!(b.is_after(a));
        assert_eq!(a.distance_to(b), 6);
    }

    #[test]
    fn equal_is_neither() {
        let a = SsRingIndex(42);
        assert!(!a.is_before(a));
        assert!(!a.is_after(a));
    }

    proptest! {
        // for offsets less than half the ring apart, exactly one of
        // before/after/equal holds
        #[test]
        fn trichotomy_within_half_ring(base: u16, delta in 0u16..HALF_RING) {
            let a = SsRingIndex(base);
            let b = SsRingIndex(base.wrapping_add(delta));
            let relations =
                u32::from(a.is_before(b)) + u32::from(a.is_after(b)) + u32::from(a == b);
            prop_assert_eq!(relations, 1);
        }

        #[test]
        fn distance_is_additive(base: u16, x in 0u16..16_000, y in 0u16..16_000) {
            let a = SsRingIndex(base);
            let b = a + x;
            let c = b + y;
            prop_assert_eq!(
                a.distance_to(b) as u32 + b.distance_to(c) as u32,
                a.distance_to(c) as u32
            );
        }
    }
}
