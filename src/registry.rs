//! Per-(element type, extent) record registries and the teardown hook list.
//!
//! There is one registry for every `(TypeId, extent)` combination that has
//! ever constructed a handle, lazily created and held in a thread-local map
//! (the crate's single-threaded model scopes all bookkeeping to the current
//! thread). Lookups are a linear scan over live records; the live set is
//! expected to stay small, and the scan keeps insertion order intact for
//! diagnostics.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::record::AllocRecord;

type Key = (TypeId, usize);

thread_local! {
    static REGISTRIES: RefCell<HashMap<Key, Rc<dyn Any>>> = RefCell::new(HashMap::new());
    static TEARDOWN: RefCell<Vec<(Key, fn())>> = const { RefCell::new(Vec::new()) };
}

/// Ordered collection of records for one (element type, extent) pair.
pub(crate) struct Registry<T> {
    records: Vec<AllocRecord<T>>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Linear scan for the record denoting `addr`.
    pub(crate) fn find(&self, addr: *mut T) -> Option<&AllocRecord<T>> {
        self.records.iter().find(|rec| rec.addr() == addr)
    }

    /// Append a record. At most one record per address may be live.
    pub(crate) fn insert(&mut self, record: AllocRecord<T>) {
        debug_assert!(
            self.find(record.addr()).is_none(),
            "duplicate record for address"
        );
        self.records.push(record);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &AllocRecord<T>> {
        self.records.iter()
    }

    /// Force every refcount to zero (shutdown path).
    pub(crate) fn zero_all(&mut self) {
        for rec in &self.records {
            rec.zero();
        }
    }

    /// Remove and return every zero-refcount record, preserving the order
    /// of the survivors. The caller releases the detached records after the
    /// registry borrow ends, so pointee drops never observe a held borrow.
    pub(crate) fn detach_dead(&mut self) -> Vec<AllocRecord<T>> {
        let mut dead = Vec::new();
        let records = std::mem::take(&mut self.records);
        for rec in records {
            if rec.refcount() == 0 {
                dead.push(rec);
            } else {
                self.records.push(rec);
            }
        }
        dead
    }
}

/// Run `f` against the registry for `(T, extent)`, creating it on first use.
///
/// The map borrow is released before the registry borrow is taken, and the
/// registry borrow ends when `f` returns; callers must not run user code
/// (value drops, `Display` impls) inside `f`.
pub(crate) fn with_registry<T: 'static, R>(
    extent: usize,
    f: impl FnOnce(&mut Registry<T>) -> R,
) -> R {
    let any = REGISTRIES.with(|map| {
        Rc::clone(
            map.borrow_mut()
                .entry((TypeId::of::<T>(), extent))
                .or_insert_with(|| Rc::new(RefCell::new(Registry::<T>::new())) as Rc<dyn Any>),
        )
    });
    let Ok(cell) = any.downcast::<RefCell<Registry<T>>>() else {
        unreachable!("registry map entry holds a foreign type");
    };
    let mut registry = cell.borrow_mut();
    f(&mut registry)
}

/// Record a teardown hook for `(T, extent)` once.
///
/// Called on every handle construction; the key check makes registration
/// idempotent, mirroring a first-use flag.
pub(crate) fn register_teardown<T: 'static>(extent: usize, hook: fn()) {
    let key = (TypeId::of::<T>(), extent);
    TEARDOWN.with(|cell| {
        let mut hooks = cell.borrow_mut();
        if !hooks.iter().any(|(k, _)| *k == key) {
            hooks.push((key, hook));
        }
    });
}

/// Run every registered per-(type, extent) shutdown hook.
///
/// This is the explicit teardown the host application calls at the end of
/// its lifetime; each hook forces the refcounts in its registry to zero and
/// sweeps it, so everything is released regardless of outstanding handles.
/// Hooks are drained before running, and construction after the fact
/// re-registers them, so calling this more than once is safe.
pub fn shutdown_all() {
    let hooks: Vec<(Key, fn())> = TEARDOWN.with(|cell| cell.borrow_mut().drain(..).collect());
    for (_, hook) in hooks {
        hook();
    }
}

/// Point-in-time view of one registry record, in insertion order.
///
/// Produced by [`Counted::snapshot`](crate::Counted::snapshot); a pure
/// observer that never touches refcounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    /// Address of the allocation (0 for a null handle's record).
    pub addr: usize,
    /// Live reference count at snapshot time.
    pub refcount: u32,
    /// Whether the record was declared as an array.
    pub is_array: bool,
    /// Declared extent (0 for scalars).
    pub extent: usize,
}
