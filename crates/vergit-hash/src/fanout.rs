use std::ops::Range;

use crate::HashError;

/// On-disk size of the table: 256 big-endian u32 values.
pub const FANOUT_SIZE: usize = 256 * 4;

/// Cumulative fan-out table from a pack index header.
///
/// Entry `k` holds the number of objects whose first hash byte is ≤ `k`,
/// so the final entry is the pack's object total and the bucket below
/// byte 0 is implicitly empty.
#[derive(Debug)]
pub struct FanoutTable {
    cumulative: [u32; 256],
}

impl FanoutTable {
    /// Parse the on-disk form, rejecting any decreasing step.
    pub fn parse(data: &[u8]) -> Result<Self, HashError> {
        if data.len() < FANOUT_SIZE {
            return Err(HashError::TruncatedFanout { actual: data.len() });
        }

        let mut cumulative = [0u32; 256];
        let mut previous = 0u32;
        for (byte, (entry, raw)) in cumulative
            .iter_mut()
            .zip(data.chunks_exact(4))
            .enumerate()
        {
            let count = u32::from_be_bytes(raw.try_into().expect("4-byte chunk"));
            if count < previous {
                return Err(HashError::NonMonotonicFanout { byte: byte as u8 });
            }
            *entry = count;
            previous = count;
        }

        Ok(Self { cumulative })
    }

    /// Range into the sorted OID table for ids whose first byte is `byte`.
    pub fn bucket(&self, byte: u8) -> Range<usize> {
        let end = self.cumulative[byte as usize] as usize;
        let start = match byte.checked_sub(1) {
            Some(prev) => self.cumulative[prev as usize] as usize,
            None => 0,
        };
        start..end
    }

    /// Total number of objects the table covers.
    pub fn total(&self) -> u32 {
        self.cumulative[255]
    }
}
