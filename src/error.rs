//! Cursor bounds error.

use thiserror::Error;

/// Raised when a cursor operation would land outside its valid range.
///
/// Every bounds-violating access on a [`BoundedIter`](crate::BoundedIter)
/// surfaces this error to the immediate caller; nothing is recovered or
/// logged internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cursor position {pos} outside range of length {len}")]
pub struct OutOfRange {
    /// The offending cursor position, relative to the range start.
    pub pos: isize,
    /// Length of the range the cursor traverses.
    pub len: usize,
}
