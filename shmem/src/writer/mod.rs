use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::Ordering;

use log::debug;
use serde_derive::{Deserialize, Serialize};

use crate::core::{Region, ShmemConfig};
use crate::errors::{Result, ShmemLibError};
use crate::layout::{Element, EPSILON};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default)]
    pub shmem: ShmemConfig,
}

/// The single writer of a series region.
///
/// Owns the region: dropping the writer unmaps it and unlinks its name.
#[derive(Debug)]
pub struct SeriesWriter<T: Element> {
    region: Region,
    _element: PhantomData<T>,
}

impl<T: Element> SeriesWriter<T> {
    pub fn new(cfg: &WriterConfig) -> Result<SeriesWriter<T>> {
        let region = Region::create::<T>(&cfg.shmem)?;
        Ok(SeriesWriter {
            region,
            _element: PhantomData,
        })
    }

    /// Appends `element` if its timestamp is exactly one interval (within
    /// `EPSILON`) past the last record.
    ///
    /// The slot is written before `count` is release-stored, so a reader that
    /// acquires the new count sees the whole element. `Full`, `Gap` and
    /// `InvalidTimestamp` leave the region untouched.
    pub fn append(&mut self, element: T) -> Result<()> {
        let header = self.region.header_ptr();
        // Only this writer stores to count.
        let n = unsafe { (*header).count.load(Ordering::Relaxed) };
        let capacity = self.region.capacity();
        let ts = element.ts();

        if !ts.is_finite() {
            debug!("{}: rejected non-finite timestamp {}", self.region.name(), ts);
            return Err(ShmemLibError::InvalidTimestamp(ts));
        }

        if n == 0 {
            unsafe {
                ptr::addr_of_mut!((*header).start_ts).write(ts);
                ptr::write(self.region.slot_ptr::<T>(0), element);
                (*header).count.store(1, Ordering::Release);
            }
            return Ok(());
        }

        // The last slot stays empty so "full" is visible before it is used.
        if n + 1 == capacity {
            debug!("{}: rejected append at ts {}, series is full", self.region.name(), ts);
            return Err(ShmemLibError::Full { capacity });
        }

        let last = unsafe { ptr::read(self.region.slot_ptr::<T>(n as usize - 1)) };
        let expected = last.ts() + self.region.interval();
        if (expected - ts).abs() > EPSILON {
            debug!("{}: rejected append, expected ts {}, got {}", self.region.name(), expected, ts);
            return Err(ShmemLibError::Gap { expected, actual: ts });
        }

        unsafe {
            ptr::write(self.region.slot_ptr::<T>(n as usize), element);
            (*header).count.store(n + 1, Ordering::Release);
        }
        Ok(())
    }

    pub fn get_index(&self, ts: f64) -> Result<i64> {
        self.region.index_of(ts)
    }

    pub fn read(&self, index: i64) -> Result<T> {
        self.region.read(index)
    }

    pub fn len(&self) -> usize {
        self.region.count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.region.count() == 0
    }

    /// True once `count == capacity - 1`; every further append fails.
    pub fn is_full(&self) -> bool {
        self.region.count() + 1 == self.region.capacity()
    }

    pub fn capacity(&self) -> i32 {
        self.region.capacity()
    }

    pub fn interval(&self) -> f64 {
        self.region.interval()
    }

    pub fn start_ts(&self) -> f64 {
        self.region.start_ts()
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }
}
