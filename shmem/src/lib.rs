//! Single-writer, append-only time series in a named POSIX shared memory
//! region.
//!
//! A [`writer::SeriesWriter`] creates the region and appends records whose
//! timestamps sit on a fixed grid `start_ts + i * interval`. Any number of
//! [`reader::SeriesReader`]s in other processes attach by name and read the
//! published prefix directly from the mapping. The atomic `count` word in the
//! [`layout::Header`] is the only synchronisation between them.

pub mod core;
mod errors;
pub mod layout;
pub mod reader;
mod sample;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::core::{Region, ShmemConfig, DEFAULT_CAPACITY, DEFAULT_INTERVAL, DEFAULT_NAME};
pub use crate::errors::{Result, ShmemLibError};
pub use crate::layout::{Element, Header, EPSILON};
pub use crate::sample::Sample;
