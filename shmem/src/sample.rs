use crate::layout::Element;

/// The record exchanged by the producer and reader harnesses.
///
/// Laid out like the C struct `{ double ts; int v; }`: 16 bytes, 8-aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    pub ts: f64,
    pub v: i32,
}

impl Sample {
    pub fn new(ts: f64, v: i32) -> Sample {
        Sample { ts, v }
    }
}

unsafe impl Element for Sample {
    #[inline]
    fn ts(&self) -> f64 {
        self.ts
    }
}
