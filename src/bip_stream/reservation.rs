//! A producer-side token for an exclusive, uncommitted slice of the ring.

use core::cell::UnsafeCell;

/// An exclusive slice of the data area reserved by [`super::Producer::reserve`],
/// not yet visible to the consumer until passed to [`super::Producer::commit`].
///
/// Dropping a `Reservation` without committing it is allowed (the bytes
/// simply remain unpublished and the space is reclaimed the next time this
/// same offset is reserved), but per spec.md §5 there is no way to cancel a
/// reservation that has *already* been committed.
pub struct Reservation<'a> {
    data: &'a [UnsafeCell<u8>],
    wraparound: bool,
}

impl<'a> Reservation<'a> {
    pub(super) fn new(data: &'a [UnsafeCell<u8>], wraparound: bool) -> Self {
        Self { data, wraparound }
    }

    /// Length of the reserved slice in bytes.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Whether committing this reservation will reset `write` to `0`.
    pub fn wraparound(&self) -> bool {
        self.wraparound
    }

    /// Mutable view over the reserved bytes.
    ///
    /// # Safety reasoning
    ///
    /// The slice this reservation wraps is disjoint from every byte range
    /// the consumer currently considers valid, by the invariants `reserve`
    /// maintains; producing a `&mut [u8]` from the `UnsafeCell` cells is
    /// therefore sound as long as at most one `Reservation` derived from
    /// this range is alive at a time, which the single-producer contract
    /// guarantees.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see doc comment above; `data` is a valid `&[UnsafeCell<u8>]`
        // slice for the lifetime `'a`, and `UnsafeCell<u8>` has the same
        // layout as `u8`.
        unsafe { core::slice::from_raw_parts_mut(self.data[0].get(), self.data.len()) }
    }
}
