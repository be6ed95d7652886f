//! Bounds-checked traversal cursor.

use crate::error::OutOfRange;
use std::mem::size_of;

/// A non-owning cursor over a contiguous run of `T`, with every access
/// checked against the half-open range `[begin, end)`.
///
/// Cursors are handed out by [`Counted::begin`](crate::Counted::begin) and
/// [`Counted::end`](crate::Counted::end) but are otherwise independent of the
/// registry: they never touch reference counts, and holding one does not keep
/// the underlying allocation alive. A cursor whose allocation has been
/// reclaimed is dangling; that hazard is documented, not prevented.
///
/// The cursor is an index into the range rather than a live pointer, so a
/// failed step leaves it representably out of range (exactly where the step
/// put it) and every later access keeps failing until it is stepped back in.
///
/// # Example
///
/// ```
/// use refsweep::Counted;
///
/// let arr: Counted<i32, 3> = Counted::new_array([10, 20, 30]);
/// let mut it = arr.begin();
/// assert_eq!(*it.get().unwrap(), 10);
/// it.advance().unwrap();
/// assert_eq!(*it.get().unwrap(), 20);
/// assert_eq!(*it.at(2).unwrap(), 30);
/// assert!(it.at(3).is_err());
/// ```
pub struct BoundedIter<T> {
    base: *mut T,
    len: usize,
    pos: isize,
}

impl<T> BoundedIter<T> {
    pub(crate) fn new(base: *mut T, len: usize, pos: isize) -> Self {
        Self { base, len, pos }
    }

    /// Length of the range this cursor traverses.
    #[inline]
    pub fn size(&self) -> usize {
        self.len
    }

    #[inline]
    fn check(&self) -> Result<(), OutOfRange> {
        if self.pos >= 0 && (self.pos as usize) < self.len {
            Ok(())
        } else {
            Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            })
        }
    }

    /// Read the element under the cursor.
    pub fn get(&self) -> Result<&T, OutOfRange> {
        self.check()?;
        Ok(unsafe { &*self.base.offset(self.pos) })
    }

    /// Mutable access to the element under the cursor.
    pub fn get_mut(&mut self) -> Result<&mut T, OutOfRange> {
        self.check()?;
        Ok(unsafe { &mut *self.base.offset(self.pos) })
    }

    /// Read the element at `i`, counted from the start of the range
    /// (not from the cursor). Defined exactly for `0 <= i < size()`.
    pub fn at(&self, i: usize) -> Result<&T, OutOfRange> {
        if i >= self.len {
            return Err(OutOfRange {
                pos: i as isize,
                len: self.len,
            });
        }
        Ok(unsafe { &*self.base.add(i) })
    }

    /// Mutable access to the element at `i` from the start of the range.
    pub fn at_mut(&mut self, i: usize) -> Result<&mut T, OutOfRange> {
        if i >= self.len {
            return Err(OutOfRange {
                pos: i as isize,
                len: self.len,
            });
        }
        Ok(unsafe { &mut *self.base.add(i) })
    }

    /// Pre-increment: step forward, then fail if the cursor reached or
    /// passed the end.
    pub fn advance(&mut self) -> Result<(), OutOfRange> {
        self.pos += 1;
        if self.pos >= self.len as isize {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        }
        Ok(())
    }

    /// Pre-decrement: step back, then fail if the cursor precedes the start.
    pub fn retreat(&mut self) -> Result<(), OutOfRange> {
        self.pos -= 1;
        if self.pos < 0 {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        }
        Ok(())
    }

    /// Post-increment: refuse if the cursor is already at or past the end,
    /// else step forward and return the pre-step snapshot. Unlike
    /// [`advance`](Self::advance), this may step *onto* the end position.
    pub fn advance_post(&mut self) -> Result<Self, OutOfRange> {
        if self.pos >= self.len as isize {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        }
        let snapshot = *self;
        self.pos += 1;
        Ok(snapshot)
    }

    /// Post-decrement: refuse if the cursor is at or before the start, else
    /// step back and return the pre-step snapshot.
    ///
    /// Note the boundary: this refuses when the cursor *equals* the start,
    /// one element earlier than [`retreat`](Self::retreat) would fail.
    pub fn retreat_post(&mut self) -> Result<Self, OutOfRange> {
        if self.pos <= 0 {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        }
        let snapshot = *self;
        self.pos -= 1;
        Ok(snapshot)
    }

    /// Move the cursor forward by `n` elements in place, failing if the
    /// result reaches or passes the end.
    ///
    /// A step too large to represent as a position cannot land anywhere in
    /// the range; it fails with the cursor unmoved.
    pub fn seek_forward(&mut self, n: usize) -> Result<(), OutOfRange> {
        let Some(pos) = isize::try_from(n)
            .ok()
            .and_then(|offset| self.pos.checked_add(offset))
        else {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        };
        self.pos = pos;
        if self.pos >= self.len as isize {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        }
        Ok(())
    }

    /// Move the cursor back by `n` elements in place, failing if the result
    /// precedes the start.
    ///
    /// A step too large to represent as a position cannot land anywhere in
    /// the range; it fails with the cursor unmoved.
    pub fn seek_back(&mut self, n: usize) -> Result<(), OutOfRange> {
        let Some(pos) = isize::try_from(n)
            .ok()
            .and_then(|offset| self.pos.checked_sub(offset))
        else {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        };
        self.pos = pos;
        if self.pos < 0 {
            return Err(OutOfRange {
                pos: self.pos,
                len: self.len,
            });
        }
        Ok(())
    }

    /// Non-negative element distance between two cursors.
    ///
    /// Always absolute, never a signed offset. Comparing cursors over
    /// different allocations is permitted but not meaningful.
    pub fn distance(&self, other: &Self) -> usize {
        match size_of::<T>() {
            0 => self.pos.abs_diff(other.pos),
            size => self.cursor_addr().abs_diff(other.cursor_addr()) / size,
        }
    }

    // Address the cursor currently denotes; wrapping so an out-of-range
    // cursor is still representable.
    fn cursor_addr(&self) -> usize {
        (self.base as usize).wrapping_add_signed(self.pos.wrapping_mul(size_of::<T>() as isize))
    }
}

// Manual impls so cursors copy without any bound on T.
impl<T> Clone for BoundedIter<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BoundedIter<T> {}

// Ordering compares cursor position only, independent of the range bounds.
impl<T> PartialEq for BoundedIter<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cursor_addr() == other.cursor_addr()
    }
}

impl<T> Eq for BoundedIter<T> {}

impl<T> PartialOrd for BoundedIter<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for BoundedIter<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cursor_addr().cmp(&other.cursor_addr())
    }
}

impl<T> std::fmt::Debug for BoundedIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedIter")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor_over(data: &mut [i32]) -> BoundedIter<i32> {
        BoundedIter::new(data.as_mut_ptr(), data.len(), 0)
    }

    #[test]
    fn test_get_and_at_within_bounds() {
        let mut data = [1, 2, 3];
        let it = cursor_over(&mut data);
        assert_eq!(it.size(), 3);
        assert_eq!(*it.get().unwrap(), 1);
        assert_eq!(*it.at(0).unwrap(), 1);
        assert_eq!(*it.at(2).unwrap(), 3);
        assert!(it.at(3).is_err());
    }

    #[test]
    fn test_at_is_relative_to_start_not_cursor() {
        let mut data = [1, 2, 3];
        let mut it = cursor_over(&mut data);
        it.advance().unwrap();
        assert_eq!(*it.at(0).unwrap(), 1);
    }

    #[test]
    fn test_get_mut_writes_through() {
        let mut data = [1, 2, 3];
        let mut it = cursor_over(&mut data);
        *it.get_mut().unwrap() = 9;
        *it.at_mut(2).unwrap() = 7;
        assert_eq!(data, [9, 2, 7]);
    }

    #[test]
    fn test_pre_increment_refuses_reaching_end() {
        let mut data = [1, 2, 3];
        let mut it = cursor_over(&mut data);
        it.advance().unwrap();
        it.advance().unwrap();
        // Third step would land on end.
        let err = it.advance().unwrap_err();
        assert_eq!(err.pos, 3);
        assert_eq!(err.len, 3);
        // The cursor stayed where the failed step put it.
        assert!(it.get().is_err());
    }

    #[test]
    fn test_post_increment_may_reach_end() {
        let mut data = [1, 2];
        let mut it = cursor_over(&mut data);
        let before = it.advance_post().unwrap();
        assert_eq!(*before.get().unwrap(), 1);
        it.advance_post().unwrap();
        // Cursor now equals end; one more refuses.
        assert!(it.advance_post().is_err());
    }

    #[test]
    fn test_pre_decrement_boundary() {
        let mut data = [1, 2];
        let mut it = cursor_over(&mut data);
        it.advance().unwrap();
        it.retreat().unwrap();
        assert_eq!(*it.get().unwrap(), 1);
        // From the start, stepping back precedes begin.
        assert!(it.retreat().is_err());
    }

    #[test]
    fn test_post_decrement_refuses_at_start() {
        let mut data = [1, 2];
        let mut it = cursor_over(&mut data);
        // Asymmetric with retreat(): refuses while still at the start.
        assert!(it.retreat_post().is_err());
        it.advance().unwrap();
        let before = it.retreat_post().unwrap();
        assert_eq!(*before.get().unwrap(), 2);
        assert_eq!(*it.get().unwrap(), 1);
    }

    #[test]
    fn test_seeks_check_bounds() {
        let mut data = [1, 2, 3, 4];
        let mut it = cursor_over(&mut data);
        it.seek_forward(3).unwrap();
        assert_eq!(*it.get().unwrap(), 4);
        it.seek_back(3).unwrap();
        assert_eq!(*it.get().unwrap(), 1);
        assert!(it.seek_forward(4).is_err());
    }

    #[test]
    fn test_failed_seek_leaves_cursor_moved() {
        let mut data = [1, 2, 3, 4];
        let mut it = cursor_over(&mut data);
        let err = it.seek_forward(4).unwrap_err();
        assert_eq!(err.pos, 4);
        assert!(it.get().is_err(), "cursor stays where the failed seek put it");
        // Stepping back in range recovers the last element.
        it.seek_back(1).unwrap();
        assert_eq!(*it.get().unwrap(), 4);
    }

    #[test]
    fn test_oversized_seeks_fail_without_wrapping() {
        let mut data = [1, 2, 3];
        let mut it = cursor_over(&mut data);
        it.advance().unwrap();

        let err = it.seek_back(usize::MAX).unwrap_err();
        assert_eq!(err.pos, 1, "unrepresentable step leaves the cursor put");
        assert_eq!(*it.get().unwrap(), 2);

        let err = it.seek_forward(usize::MAX).unwrap_err();
        assert_eq!(err.pos, 1);
        assert_eq!(*it.get().unwrap(), 2);

        // A step that overflows the position arithmetic fails the same way.
        assert!(it.seek_forward(isize::MAX as usize).is_err());
        assert_eq!(*it.get().unwrap(), 2);
    }

    #[test]
    fn test_distance_is_absolute() {
        let mut data = [1, 2, 3, 4, 5];
        let a = cursor_over(&mut data);
        let mut b = cursor_over(&mut data);
        b.seek_forward(3).unwrap();
        assert_eq!(a.distance(&b), 3);
        assert_eq!(b.distance(&a), 3);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn test_ordering_compares_cursor_only() {
        let mut data = [1, 2, 3];
        let a = cursor_over(&mut data);
        let mut b = cursor_over(&mut data);
        assert_eq!(a, b);
        b.advance().unwrap();
        assert!(a < b);
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_range_rejects_everything() {
        let it: BoundedIter<i32> = BoundedIter::new(std::ptr::null_mut(), 0, 0);
        assert_eq!(it.size(), 0);
        assert!(it.get().is_err());
        assert!(it.at(0).is_err());
    }
}
