use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShmemLibError>;

#[derive(Debug, Error)]
pub enum ShmemLibError {
    #[error("shared memory region {name} already exists")]
    AlreadyExists { name: String },

    #[error("failed to create shared memory region {name}: {source}")]
    CreateFailed { name: String, source: io::Error },

    #[error("failed to resize shared memory region {name} to {size} bytes: {source}")]
    ResizeFailed {
        name: String,
        size: usize,
        source: io::Error,
    },

    #[error("failed to map shared memory region {name}: {source}")]
    MapFailed { name: String, source: io::Error },

    #[error("failed to open shared memory region {name}: {source}")]
    OpenFailed { name: String, source: io::Error },

    #[error("failed to stat shared memory region {name}: {source}")]
    StatFailed { name: String, source: io::Error },

    #[error("failed to remove shared memory region {name}: {source}")]
    UnlinkFailed { name: String, source: io::Error },

    #[error("shared memory region {name} has {actual} bytes, expected {expected}")]
    LayoutMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("series is empty")]
    Empty,

    #[error("timestamp {0} is not a finite number")]
    InvalidTimestamp(f64),

    #[error("timestamp gap: expected {expected}, got {actual}")]
    Gap { expected: f64, actual: f64 },

    #[error("series is full: {capacity} slots, the last one is reserved")]
    Full { capacity: i32 },

    #[error("index {index} is out of range, {count} elements published")]
    OutOfRange { index: i64, count: i32 },
}
