use std::marker::PhantomData;
use std::slice;

use serde_derive::{Deserialize, Serialize};

use crate::core::{Region, ShmemConfig};
use crate::errors::Result;
use crate::layout::Element;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub shmem: ShmemConfig,
}

/// Read-only view of a series created by another process (or thread).
///
/// Every call snapshots `count` once with acquire ordering and only touches
/// slots below that snapshot. Dropping the reader unmaps; the name is left
/// alone.
#[derive(Debug)]
pub struct SeriesReader<T: Element> {
    region: Region,
    _element: PhantomData<T>,
}

impl<T: Element> SeriesReader<T> {
    pub fn new(cfg: &ReaderConfig) -> Result<SeriesReader<T>> {
        SeriesReader::open(&cfg.shmem.name)
    }

    pub fn open(name: &str) -> Result<SeriesReader<T>> {
        let region = Region::attach::<T>(name)?;
        Ok(SeriesReader {
            region,
            _element: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.region.count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.region.count() == 0
    }

    pub fn is_full(&self) -> bool {
        self.region.count() + 1 == self.region.capacity()
    }

    pub fn capacity(&self) -> i32 {
        self.region.capacity()
    }

    pub fn interval(&self) -> f64 {
        self.region.interval()
    }

    /// Zero until the first record is published.
    pub fn start_ts(&self) -> f64 {
        self.region.start_ts()
    }

    pub fn read(&self, index: i64) -> Result<T> {
        self.region.read(index)
    }

    pub fn get_index(&self, ts: f64) -> Result<i64> {
        self.region.index_of(ts)
    }

    /// Zero-copy view of the prefix published at call time.
    pub fn as_slice(&self) -> &[T] {
        let count = self.region.count() as usize;
        unsafe { slice::from_raw_parts(self.region.slot_ptr::<T>(0), count) }
    }

    /// Copies out the prefix published at call time.
    pub fn snapshot(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Copies out the records published in `[from, count)`.
    pub fn since(&self, from: usize) -> Vec<T> {
        let published = self.as_slice();
        published.get(from..).map(<[T]>::to_vec).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::unique_name;
    use crate::writer::{SeriesWriter, WriterConfig};
    use crate::{Sample, ShmemLibError};

    fn pair(tag: &str, capacity: i32) -> Result<(SeriesWriter<Sample>, SeriesReader<Sample>)> {
        let shmem = ShmemConfig::new(unique_name(tag), capacity, 1.0);
        let writer = SeriesWriter::new(&WriterConfig { shmem: shmem.clone() })?;
        let reader = SeriesReader::new(&ReaderConfig { shmem })?;
        Ok((writer, reader))
    }

    #[test]
    fn reader_sees_header_of_empty_series() -> Result<()> {
        let (_writer, reader) = pair("reader-empty", 16)?;
        assert!(reader.is_empty());
        assert_eq!(reader.capacity(), 16);
        assert_eq!(reader.interval(), 1.0);
        assert_eq!(reader.start_ts(), 0.0);
        assert!(reader.as_slice().is_empty());
        assert!(matches!(reader.get_index(3.0), Err(ShmemLibError::Empty)));
        assert!(matches!(reader.read(0), Err(ShmemLibError::OutOfRange { index: 0, count: 0 })));
        Ok(())
    }

    #[test]
    fn reader_follows_appends() -> Result<()> {
        let (mut writer, reader) = pair("reader-follow", 16)?;
        writer.append(Sample::new(7.0, 70))?;
        writer.append(Sample::new(8.0, 80))?;
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.start_ts(), 7.0);
        assert_eq!(reader.snapshot(), vec![Sample::new(7.0, 70), Sample::new(8.0, 80)]);

        writer.append(Sample::new(9.0, 90))?;
        assert_eq!(reader.since(2), vec![Sample::new(9.0, 90)]);
        assert!(reader.since(5).is_empty());
        assert_eq!(reader.read(reader.get_index(8.0)?)?, Sample::new(8.0, 80));
        Ok(())
    }

    #[test]
    fn reader_outlives_writer() -> Result<()> {
        let (mut writer, reader) = pair("reader-outlives", 4)?;
        let name = writer.name().to_string();
        writer.append(Sample::new(1.0, 1))?;
        drop(writer);

        assert_eq!(reader.snapshot(), vec![Sample::new(1.0, 1)]);
        assert!(matches!(
            SeriesReader::<Sample>::open(&name),
            Err(ShmemLibError::OpenFailed { .. })
        ));
        Ok(())
    }
}
