//! Byte layout of a series region.
//!
//! ```text
//! offset  size  field
//! 0       4     count          (AtomicI32)
//! 4       4     padding
//! 8       8     start_ts       (f64)
//! 16      8     interval       (f64)
//! 24      4     capacity       (i32)
//! 28      4     tail padding
//! 32      N*S   elements       (S = size_of::<T>(), N = capacity)
//! ```
//!
//! Endianness is native. Writer and readers agree on the layout through the
//! element type parameter, so both sides must be built with the same `T`.

use std::mem;
use std::sync::atomic::AtomicI32;

/// Tolerance of the grid law: slot `i` holds a timestamp within `EPSILON` of
/// `start_ts + i * interval`.
pub const EPSILON: f64 = 1e-6;

/// A fixed-size record stored in a series slot.
///
/// # Safety
///
/// Slots are shared byte-for-byte with other processes. Implementors must be
/// `#[repr(C)]` (or otherwise have a stable layout), must not contain
/// pointers or references, and must be valid for any bit pattern a writer of
/// the same type may have stored.
pub unsafe trait Element: Copy + Send + Sync + 'static {
    /// Timestamp of the record.
    fn ts(&self) -> f64;
}

/// Fixed prefix at byte 0 of every region.
///
/// `count` is the only field written after creation, and it is the
/// publication point of every append.
#[repr(C)]
#[derive(Debug)]
pub struct Header {
    pub count: AtomicI32,
    pub start_ts: f64,
    pub interval: f64,
    pub capacity: i32,
}

const _: () = assert!(mem::size_of::<Header>() == 32);
const _: () = assert!(mem::align_of::<Header>() == 8);

pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Byte offset of slot 0.
#[inline]
pub const fn elements_offset<T>() -> usize {
    let align = mem::align_of::<T>();
    (HEADER_SIZE + align - 1) / align * align
}

/// Total byte size of a region holding `capacity` elements of `T`.
///
/// Returns `None` for a negative capacity or when the size overflows.
pub fn region_size<T>(capacity: i32) -> Option<usize> {
    let capacity = usize::try_from(capacity).ok()?;
    capacity
        .checked_mul(mem::size_of::<T>())?
        .checked_add(elements_offset::<T>())
}
