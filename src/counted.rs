//! The reference-counted owning handle and its registry sweep.

use std::fmt;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::ptr;

use crate::iter::BoundedIter;
use crate::record::{AllocKind, AllocRecord};
use crate::registry::{self, RecordInfo};

/// A reference-counted owning handle over one heap allocation.
///
/// Every `Counted<T, N>` denotes exactly one record in the registry for the
/// `(T, N)` pair: construction inserts or increments, cloning increments,
/// reassignment and drop decrement, and a count that reaches zero triggers a
/// synchronous [`collect`](Self::collect) sweep. Collection points are thus
/// fully deterministic: the registry only ever changes inside these calls.
///
/// `N` is the statically declared array extent; the default of 0 denotes a
/// scalar. Handles with the same `T` but different `N` use separate
/// registries.
///
/// # Example
///
/// ```
/// use refsweep::Counted;
///
/// let p: Counted<i32> = Counted::new(42);
/// let q = p.clone();
/// assert_eq!(p.ref_count(), 2);
/// assert_eq!(Counted::<i32>::registry_size(), 1);
///
/// drop(q);
/// assert_eq!(p.ref_count(), 1);
/// drop(p);
/// // Last handle gone: the record was swept out synchronously.
/// assert_eq!(Counted::<i32>::registry_size(), 0);
/// ```
pub struct Counted<T: 'static, const N: usize = 0> {
    addr: *mut T,
    is_array: bool,
    extent: usize,
    // Pins T without implying ownership of a T value.
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static, const N: usize> Counted<T, N> {
    /// Box `value` and construct a handle owning it.
    pub fn new(value: T) -> Self {
        let addr = Box::into_raw(Box::new(value));
        Self::adopt(addr, AllocKind::Scalar)
    }

    /// Construct a handle with a null address.
    ///
    /// The registry still receives a record for the null address with
    /// refcount 1; releasing it is a no-op. All null handles of one `(T, N)`
    /// pair share that record.
    pub fn null() -> Self {
        Self::adopt(ptr::null_mut(), AllocKind::Untracked)
    }

    /// Adopt an already-boxed scalar.
    pub fn from_box(boxed: Box<T>) -> Self {
        Self::adopt(Box::into_raw(boxed), AllocKind::Scalar)
    }

    /// Construct a handle from a raw address.
    ///
    /// If the address is already registered its record is incremented;
    /// otherwise a record with refcount 1 is inserted and the allocation is
    /// treated as a `Box<T>` for later release.
    ///
    /// # Safety
    ///
    /// An unregistered non-null `ptr` must have come from `Box::<T>::into_raw`
    /// and must not be owned by anything else; the sweep will free it. A
    /// registered `ptr` (for instance from [`as_ptr`](Self::as_ptr) on a live
    /// handle) is always fine.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let kind = if ptr.is_null() {
            AllocKind::Untracked
        } else {
            AllocKind::Scalar
        };
        Self::adopt(ptr, kind)
    }

    fn adopt(addr: *mut T, kind: AllocKind) -> Self {
        registry::register_teardown::<T>(N, Self::shutdown);
        registry::with_registry::<T, _>(N, |reg| match reg.find(addr) {
            Some(rec) => {
                rec.increment();
            }
            None => reg.insert(AllocRecord::new(addr, N > 0, N, kind)),
        });
        Self {
            addr,
            is_array: N > 0,
            extent: N,
            _marker: PhantomData,
        }
    }

    /// Raw address this handle denotes.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.addr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }

    /// Whether this handle was declared over an array (`N > 0`).
    #[inline]
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// The statically declared extent (0 for scalars).
    #[inline]
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Current reference count of the record this handle denotes, or 0 if
    /// the record is gone (for instance after [`shutdown`](Self::shutdown)).
    pub fn ref_count(&self) -> u32 {
        registry::with_registry::<T, _>(N, |reg| {
            reg.find(self.addr).map(AllocRecord::refcount).unwrap_or(0)
        })
    }

    /// Shared access to the pointee.
    ///
    /// `None` for a null address, and for a handle whose allocation is no
    /// longer on record, such as one outliving [`shutdown`](Self::shutdown).
    pub fn get(&self) -> Option<&T> {
        if !self.pointee_live() {
            return None;
        }
        Some(unsafe { &*self.addr })
    }

    /// Mutable access to the pointee. Refused under the same conditions as
    /// [`get`](Self::get).
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if !self.pointee_live() {
            return None;
        }
        Some(unsafe { &mut *self.addr })
    }

    // The address may be dereferenced only while the registry still has a
    // record of the allocation behind it. Records of unknown origin never
    // qualify; their addresses were adopted after the allocation's own
    // record disappeared.
    fn pointee_live(&self) -> bool {
        if self.addr.is_null() {
            return false;
        }
        registry::with_registry::<T, _>(N, |reg| {
            reg.find(self.addr)
                .is_some_and(|rec| rec.alloc_len().is_some())
        })
    }

    /// Element access checked against the actual allocation length.
    pub fn at(&self, i: usize) -> Option<&T> {
        if i >= self.range_len() {
            return None;
        }
        Some(unsafe { &*self.addr.add(i) })
    }

    /// Mutable element access checked against the actual allocation length.
    pub fn at_mut(&mut self, i: usize) -> Option<&mut T> {
        if i >= self.range_len() {
            return None;
        }
        Some(unsafe { &mut *self.addr.add(i) })
    }

    /// Rebind this handle to a freshly boxed scalar, returning the new
    /// address. The old record is decremented first and a sweep runs if it
    /// reached zero.
    pub fn assign_box(&mut self, boxed: Box<T>) -> *mut T {
        let addr = Box::into_raw(boxed);
        self.rebind(addr, AllocKind::Scalar)
    }

    /// Rebind this handle to a raw address, returning it.
    ///
    /// A no-op when the address equals the current one. Otherwise the old
    /// record is decremented (sweeping on zero) and the new address is
    /// incremented, or inserted with refcount 1 using **this handle's**
    /// static extent, not anything inferred from the address.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw).
    pub unsafe fn assign_raw(&mut self, ptr: *mut T) -> *mut T {
        let kind = if ptr.is_null() {
            AllocKind::Untracked
        } else {
            AllocKind::Scalar
        };
        self.rebind(ptr, kind)
    }

    /// Rebind this handle to another handle's address.
    ///
    /// The old record is decremented (sweeping on zero); the new address is
    /// incremented, or inserted with refcount 1 using **this handle's** array
    /// flag and extent rather than `other`'s.
    pub fn assign(&mut self, other: &Self) {
        self.rebind(other.addr, AllocKind::Untracked);
    }

    fn rebind(&mut self, new_addr: *mut T, kind: AllocKind) -> *mut T {
        if new_addr == self.addr {
            return new_addr;
        }
        let old_zero = registry::with_registry::<T, _>(N, |reg| {
            reg.find(self.addr).is_some_and(|rec| rec.decrement() == 0)
        });
        if old_zero {
            Self::collect();
        }
        registry::with_registry::<T, _>(N, |reg| match reg.find(new_addr) {
            Some(rec) => {
                rec.increment();
            }
            None => reg.insert(AllocRecord::new(new_addr, self.is_array, self.extent, kind)),
        });
        self.addr = new_addr;
        new_addr
    }

    // Cursor range length: the declared extent (1 for scalars) clamped to
    // the actual allocation length on record, so a shorter adopted slice
    // never yields an over-long range. Unknown or missing records clamp
    // to empty.
    fn range_len(&self) -> usize {
        if self.addr.is_null() {
            return 0;
        }
        let declared = if self.is_array { self.extent } else { 1 };
        registry::with_registry::<T, _>(N, |reg| {
            reg.find(self.addr)
                .and_then(AllocRecord::alloc_len)
                .map_or(0, |actual| declared.min(actual))
        })
    }

    /// Cursor at the start of the allocation.
    pub fn begin(&self) -> BoundedIter<T> {
        BoundedIter::new(self.addr, self.range_len(), 0)
    }

    /// Cursor one past the last element.
    pub fn end(&self) -> BoundedIter<T> {
        let len = self.range_len();
        BoundedIter::new(self.addr, len, len as isize)
    }

    /// Sweep the `(T, N)` registry: release and remove every record whose
    /// refcount is zero. Returns true iff anything was reclaimed.
    ///
    /// Runs synchronously from drop and reassignment when a count hits zero,
    /// and never recurses: dead records are detached under the registry
    /// borrow and released after it ends, so a pointee whose fields are
    /// themselves `Counted` can decrement freely while it drops.
    pub fn collect() -> bool {
        let dead = registry::with_registry::<T, _>(N, |reg| reg.detach_dead());
        let reclaimed = !dead.is_empty();
        for rec in dead {
            rec.release();
        }
        reclaimed
    }

    /// Count of live records in the `(T, N)` registry.
    pub fn registry_size() -> usize {
        registry::with_registry::<T, _>(N, |reg| reg.len())
    }

    /// Force every record's refcount to zero and sweep.
    ///
    /// A no-op on an empty registry, and therefore idempotent. Outstanding
    /// handles are left dangling; their later drops find no record and do
    /// nothing. Registered automatically (once per `(T, N)`) with
    /// [`shutdown_all`](crate::shutdown_all) on first construction.
    pub fn shutdown() {
        let empty = registry::with_registry::<T, _>(N, |reg| {
            if reg.is_empty() {
                true
            } else {
                reg.zero_all();
                false
            }
        });
        if !empty {
            Self::collect();
        }
    }

    /// Point-in-time view of the registry in insertion order. Pure observer.
    pub fn snapshot() -> Vec<RecordInfo> {
        registry::with_registry::<T, _>(N, |reg| {
            reg.records()
                .map(|rec| RecordInfo {
                    addr: rec.addr() as usize,
                    refcount: rec.refcount(),
                    is_array: rec.is_array(),
                    extent: rec.extent(),
                })
                .collect()
        })
    }
}

impl<T: fmt::Display + 'static, const N: usize> Counted<T, N> {
    /// Write the registry listing: a header naming the element type and
    /// extent, a column header, one line per record in insertion order, and
    /// a trailing blank line. An empty registry prints an explicit notice.
    pub fn write_list(out: &mut impl Write) -> io::Result<()> {
        let records = Self::snapshot();
        writeln!(out, "registry<{}, {}>:", std::any::type_name::<T>(), N)?;
        writeln!(out, "address refcount value")?;
        if records.is_empty() {
            writeln!(out, "  (registry is empty)")?;
        }
        for info in &records {
            if info.addr == 0 {
                writeln!(out, "[0x0] refcount: {} value: ---", info.refcount)?;
            } else {
                let value = unsafe { &*(info.addr as *const T) };
                writeln!(
                    out,
                    "[{:#x}] refcount: {} value: {}",
                    info.addr, info.refcount, value
                )?;
            }
        }
        writeln!(out)
    }

    /// Print the registry listing to standard output. Diagnostic observer
    /// with no error channel.
    pub fn show_list() {
        let mut out = io::stdout();
        let _ = Self::write_list(&mut out);
    }
}

impl<T: 'static, const N: usize> Clone for Counted<T, N> {
    /// Denote the same address, incrementing its record. If the record is
    /// unexpectedly absent a new one is inserted with refcount 1.
    fn clone(&self) -> Self {
        registry::with_registry::<T, _>(N, |reg| match reg.find(self.addr) {
            Some(rec) => {
                rec.increment();
            }
            None => reg.insert(AllocRecord::new(
                self.addr,
                self.is_array,
                self.extent,
                AllocKind::Untracked,
            )),
        });
        Self {
            addr: self.addr,
            is_array: self.is_array,
            extent: self.extent,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static, const N: usize> Drop for Counted<T, N> {
    /// Decrement the record; a count of zero triggers a synchronous sweep.
    /// A missing record (post-shutdown handle) is a no-op.
    fn drop(&mut self) {
        let zero = registry::with_registry::<T, _>(N, |reg| {
            reg.find(self.addr).is_some_and(|rec| rec.decrement() == 0)
        });
        if zero {
            Self::collect();
        }
    }
}

impl<T: 'static, const N: usize> Default for Counted<T, N> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: 'static, const N: usize> fmt::Debug for Counted<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("addr", &self.addr)
            .field("is_array", &self.is_array)
            .field("extent", &self.extent)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

impl<T: 'static, const N: usize> Counted<T, N> {
    /// Box an `N`-element array and construct a handle owning it.
    pub fn new_array(values: [T; N]) -> Self {
        let addr = Box::into_raw(Box::new(values)).cast::<T>();
        Self::adopt(addr, AllocKind::Array { len: N })
    }

    /// Adopt an already-boxed slice of any length.
    ///
    /// The record's reported extent is still `N` (the handle's static
    /// declaration), even when the slice is shorter or longer; only
    /// reclamation and cursor ranges use the actual length.
    pub fn from_boxed_slice(boxed: Box<[T]>) -> Self {
        let len = boxed.len();
        let addr = Box::into_raw(boxed).cast::<T>();
        Self::adopt(addr, AllocKind::Array { len })
    }

    /// Rebind this handle to an already-boxed slice, returning the new
    /// address. Same record-extent behavior as
    /// [`from_boxed_slice`](Self::from_boxed_slice).
    pub fn assign_boxed_slice(&mut self, boxed: Box<[T]>) -> *mut T {
        let len = boxed.len();
        let addr = Box::into_raw(boxed).cast::<T>();
        self.rebind(addr, AllocKind::Array { len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registers_one_record() {
        let p: Counted<i32> = Counted::new(5);
        assert_eq!(p.ref_count(), 1);
        assert_eq!(Counted::<i32>::registry_size(), 1);
        assert!(!p.is_array());
        assert_eq!(p.extent(), 0);
        assert_eq!(p.get(), Some(&5));
    }

    #[test]
    fn test_clone_shares_record() {
        let p: Counted<i32> = Counted::new(5);
        let q = p.clone();
        assert_eq!(p.ref_count(), 2);
        assert_eq!(q.as_ptr(), p.as_ptr());
        assert_eq!(Counted::<i32>::registry_size(), 1);
    }

    #[test]
    fn test_collect_is_idempotent() {
        let p: Counted<i32> = Counted::new(5);
        drop(p);
        // Drop already swept; a fresh sweep has nothing to do.
        assert!(!Counted::<i32>::collect());
        assert!(!Counted::<i32>::collect());
    }

    #[test]
    fn test_null_handles_share_a_record() {
        let a: Counted<i32> = Counted::null();
        let b: Counted<i32> = Counted::default();
        assert!(a.is_null());
        assert_eq!(a.get(), None);
        assert_eq!(a.ref_count(), 2);
        assert_eq!(Counted::<i32>::registry_size(), 1);
        drop(a);
        drop(b);
        assert_eq!(Counted::<i32>::registry_size(), 0);
    }

    #[test]
    fn test_get_mut_writes_through() {
        let mut p: Counted<i32> = Counted::new(1);
        if let Some(v) = p.get_mut() {
            *v = 8;
        }
        assert_eq!(p.get(), Some(&8));
    }

    #[test]
    fn test_at_checks_actual_length() {
        let p: Counted<i32, 3> = Counted::new_array([1, 2, 3]);
        assert_eq!(p.at(2), Some(&3));
        assert_eq!(p.at(3), None);

        let scalar: Counted<i32> = Counted::new(7);
        assert_eq!(scalar.at(0), Some(&7));
        assert_eq!(scalar.at(1), None);
    }

    #[test]
    fn test_mixed_extents_use_separate_registries() {
        let _a: Counted<i32, 2> = Counted::new_array([1, 2]);
        let _b: Counted<i32, 3> = Counted::new_array([1, 2, 3]);
        assert_eq!(Counted::<i32, 2>::registry_size(), 1);
        assert_eq!(Counted::<i32, 3>::registry_size(), 1);
        assert_eq!(Counted::<i32>::registry_size(), 0);
    }
}
