use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::reader::SeriesReader;
use crate::writer::{SeriesWriter, WriterConfig};
use crate::{Element, ShmemConfig, ShmemLibError};

use super::unique_name;

const START_TS: f64 = 1_000.0;

/// Wide enough that a torn copy would mix words from two different appends.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
struct Tick {
    ts: f64,
    seq: u64,
    check: [u64; 6],
}

unsafe impl Element for Tick {
    fn ts(&self) -> f64 {
        self.ts
    }
}

impl Tick {
    fn new(seq: u64) -> Tick {
        Tick {
            ts: START_TS + seq as f64,
            seq,
            check: [seq.wrapping_mul(0x9E37_79B9_7F4A_7C15); 6],
        }
    }

    fn is_consistent(&self) -> bool {
        self.ts == START_TS + self.seq as f64
            && self.check.iter().all(|&c| c == self.seq.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

#[test]
fn test_tick_consistency_check() {
    let tick = Tick::new(12345);
    assert!(tick.is_consistent());
    let mut torn = tick;
    torn.check[3] = Tick::new(12346).check[3];
    assert!(!torn.is_consistent());
}

#[test]
fn test_reader_sees_monotone_untorn_prefix() -> Result<(), Box<dyn Error>> {
    let capacity = 4096;
    let shmem = ShmemConfig::new(unique_name("torn"), capacity, 1.0);
    let mut writer = SeriesWriter::<Tick>::new(&WriterConfig { shmem: shmem.clone() })?;
    // Separate mapping of the same name, as another process would have.
    let reader = SeriesReader::<Tick>::open(&shmem.name)?;

    let writer_done = Arc::new(AtomicBool::new(false));
    let writer_thread = thread::spawn({
        let writer_done = Arc::clone(&writer_done);
        move || -> Result<SeriesWriter<Tick>, ShmemLibError> {
            let mut seq = 0u64;
            loop {
                match writer.append(Tick::new(seq)) {
                    Ok(()) => seq += 1,
                    Err(ShmemLibError::Full { .. }) => break,
                    Err(e) => return Err(e),
                }
                if seq % 64 == 0 {
                    thread::yield_now();
                }
            }
            writer_done.store(true, AtomicOrdering::Release);
            // Hand the writer back so the name stays linked until the reader is done.
            Ok(writer)
        }
    });

    let deadline = Instant::now() + Duration::from_secs(30);
    let mut seen = 0usize;
    let mut snapshots = 0usize;
    while seen < capacity as usize - 1 {
        assert!(Instant::now() < deadline, "reader stalled at {} records", seen);
        let published = reader.as_slice();
        assert!(published.len() >= seen, "count went backwards");
        for (i, tick) in published.iter().enumerate().skip(seen) {
            assert!(tick.is_consistent(), "torn record at {}: {:?}", i, tick);
            assert_eq!(tick.seq, i as u64, "out of order record at {}", i);
        }
        seen = published.len();
        snapshots += 1;
        if seen == 0 && writer_done.load(AtomicOrdering::Acquire) {
            panic!("writer finished without publishing");
        }
    }

    let writer = writer_thread.join().expect("writer thread panicked")?;
    assert!(writer.is_full());
    assert_eq!(reader.len(), capacity as usize - 1);
    assert_eq!(reader.start_ts(), START_TS);
    assert!(snapshots > 0);
    Ok(())
}
