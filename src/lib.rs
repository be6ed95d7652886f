//! # Refsweep
//!
//! Deterministic, library-level reference counting for heap allocations,
//! with inspectable collection points and a bounds-checked traversal cursor
//! decoupled from ownership. There is no tracing collector and no background
//! machinery: the registry only changes inside the calls that say they
//! change it.
//!
//! ## Features
//!
//! - **Counted handles**: [`Counted<T, N>`](Counted) shares ownership of one
//!   allocation by reference count; the last handle out sweeps the record.
//! - **Per-(type, extent) registries**: one ordered record list per element
//!   type and declared array extent, inspectable via
//!   [`snapshot`](Counted::snapshot) and [`show_list`](Counted::show_list).
//! - **Synchronous collection**: drop and reassignment sweep immediately
//!   when a count reaches zero; [`collect`](Counted::collect) can also be
//!   called explicitly and reports whether it reclaimed anything.
//! - **Bounds-checked cursors**: [`BoundedIter`] walks an allocation with
//!   every access validated, independent of the refcounts.
//! - **Explicit teardown**: [`shutdown_all`] releases everything still
//!   registered, regardless of outstanding handles.
//!
//! ## Quick Start
//!
//! ```rust
//! use refsweep::Counted;
//!
//! let p: Counted<i32> = Counted::new(42);
//! let q = p.clone();
//! assert_eq!(p.ref_count(), 2);
//! assert_eq!(Counted::<i32>::registry_size(), 1);
//!
//! drop(q);
//! drop(p);
//! assert_eq!(Counted::<i32>::registry_size(), 0);
//! ```
//!
//! ## Integration
//!
//! All bookkeeping is thread-local; handles are not sendable and no internal
//! locking exists (single-threaded model). The host application should call
//! [`shutdown_all`] (or the per-type [`Counted::shutdown`]) at the end of its
//! lifetime: handles that never drop otherwise keep their allocations until
//! then. Cursors do not pin allocations; a cursor outliving its allocation
//! dangles, which is documented rather than prevented.

mod counted;
mod error;
mod iter;
mod record;
mod registry;

pub use counted::Counted;
pub use error::OutOfRange;
pub use iter::BoundedIter;
pub use registry::{shutdown_all, RecordInfo};
