//! Bookkeeping entry for one tracked allocation.

use std::cell::Cell;

/// How an allocation was produced, which is also how it must be released.
///
/// This is deliberately separate from the *reported* array flag and extent
/// on the record: those mirror the owning handle's static declaration, while
/// the kind records what was actually allocated so the sweep can hand the
/// memory back with the matching form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocKind {
    /// Null or foreign address; releasing is a no-op.
    Untracked,
    /// A single boxed value.
    Scalar,
    /// A boxed slice with its actual element count.
    Array { len: usize },
}

/// Bookkeeping value for one allocation: address, array flag, declared
/// extent, and the live reference count.
///
/// Identity is the address alone; two records for the same address never
/// coexist in a registry.
pub(crate) struct AllocRecord<T> {
    addr: *mut T,
    is_array: bool,
    extent: usize,
    refcount: Cell<u32>,
    kind: AllocKind,
}

impl<T> AllocRecord<T> {
    /// Create a record for a freshly denoted address with refcount 1.
    pub(crate) fn new(addr: *mut T, is_array: bool, extent: usize, kind: AllocKind) -> Self {
        Self {
            addr,
            is_array,
            extent,
            refcount: Cell::new(1),
            kind,
        }
    }

    #[inline]
    pub(crate) fn addr(&self) -> *mut T {
        self.addr
    }

    #[inline]
    pub(crate) fn is_array(&self) -> bool {
        self.is_array
    }

    #[inline]
    pub(crate) fn extent(&self) -> usize {
        self.extent
    }

    #[inline]
    pub(crate) fn refcount(&self) -> u32 {
        self.refcount.get()
    }

    /// Increment the reference count, returning the new value.
    #[inline]
    pub(crate) fn increment(&self) -> u32 {
        let val = self.refcount.get() + 1;
        self.refcount.set(val);
        val
    }

    /// Decrement the reference count, returning the new value.
    #[inline]
    pub(crate) fn decrement(&self) -> u32 {
        let val = self.refcount.get();
        debug_assert!(val > 0, "decrementing zero reference count");
        self.refcount.set(val - 1);
        val - 1
    }

    /// Force the reference count to zero (shutdown path).
    #[inline]
    pub(crate) fn zero(&self) {
        self.refcount.set(0);
    }

    /// Actual element count of the underlying allocation, when known.
    ///
    /// `None` for untracked addresses; cursors over those degrade to an
    /// empty range rather than guessing a length.
    pub(crate) fn alloc_len(&self) -> Option<usize> {
        match self.kind {
            AllocKind::Untracked => None,
            AllocKind::Scalar => Some(1),
            AllocKind::Array { len } => Some(len),
        }
    }

    /// Release the underlying allocation with the form it was made with.
    pub(crate) fn release(self) {
        match self.kind {
            AllocKind::Untracked => {}
            AllocKind::Scalar => {
                if !self.addr.is_null() {
                    drop(unsafe { Box::from_raw(self.addr) });
                }
            }
            AllocKind::Array { len } => {
                drop(unsafe { Vec::from_raw_parts(self.addr, len, len) });
            }
        }
    }
}

// Equality is address-only; refcount, flag, and extent never enter into it.
impl<T> PartialEq for AllocRecord<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for AllocRecord<T> {}

impl<T> std::fmt::Debug for AllocRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocRecord")
            .field("addr", &self.addr)
            .field("is_array", &self.is_array)
            .field("extent", &self.extent)
            .field("refcount", &self.refcount.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_round_trip() {
        let rec = AllocRecord::<i32>::new(std::ptr::null_mut(), false, 0, AllocKind::Untracked);
        assert_eq!(rec.refcount(), 1);
        assert_eq!(rec.increment(), 2);
        assert_eq!(rec.increment(), 3);
        assert_eq!(rec.decrement(), 2);
        rec.zero();
        assert_eq!(rec.refcount(), 0);
    }

    #[test]
    fn test_equality_is_address_only() {
        let mut a = 1i32;
        let mut b = 2i32;
        let r1 = AllocRecord::new(&mut a as *mut i32, false, 0, AllocKind::Untracked);
        let r2 = AllocRecord::new(&mut a as *mut i32, true, 9, AllocKind::Untracked);
        let r3 = AllocRecord::new(&mut b as *mut i32, false, 0, AllocKind::Untracked);
        r2.increment();

        assert_eq!(r1, r2);
        assert_ne!(r1, r3);
    }

    #[test]
    fn test_alloc_len_follows_kind() {
        let rec = AllocRecord::<u8>::new(std::ptr::null_mut(), false, 0, AllocKind::Untracked);
        assert_eq!(rec.alloc_len(), None);

        let boxed = Box::into_raw(Box::new(7u8));
        let rec = AllocRecord::new(boxed, false, 0, AllocKind::Scalar);
        assert_eq!(rec.alloc_len(), Some(1));
        rec.release();

        let slice = vec![1u8, 2, 3].into_boxed_slice();
        let len = slice.len();
        let rec = AllocRecord::new(
            Box::into_raw(slice).cast::<u8>(),
            true,
            5,
            AllocKind::Array { len },
        );
        assert_eq!(rec.alloc_len(), Some(3));
        rec.release();
    }
}
