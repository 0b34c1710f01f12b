//! Eager delta application against an in-memory base.

use std::io::Read;

use super::{read_instruction, read_size, DeltaInstruction};
use crate::PackError;

/// Apply a delta program to a base object, producing the target bytes.
///
/// Both prologue sizes are validated, and every copy range is bounds
/// checked against the base before use.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut cursor = delta;

    let source_size = read_size(&mut cursor)?;
    let target_size = read_size(&mut cursor)?;

    if source_size != base.len() as u64 {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "source size mismatch: delta says {source_size}, base is {}",
                base.len()
            ),
        });
    }

    let mut output = Vec::with_capacity(target_size as usize);

    while let Some(inst) = read_instruction(&mut cursor)? {
        match inst {
            DeltaInstruction::Copy { offset, size } => {
                let offset = offset as usize;
                let size = size as usize;
                if offset.checked_add(size).map_or(true, |end| end > base.len()) {
                    return Err(PackError::InvalidDelta {
                        offset: 0,
                        reason: format!(
                            "copy out of bounds: offset={offset}, size={size}, base_len={}",
                            base.len()
                        ),
                    });
                }
                output.extend_from_slice(&base[offset..offset + size]);
            }
            DeltaInstruction::Insert { size } => {
                let n = size as usize;
                if cursor.len() < n {
                    return Err(PackError::InvalidDelta {
                        offset: 0,
                        reason: "truncated insert data".into(),
                    });
                }
                let mut literal = vec![0u8; n];
                cursor.read_exact(&mut literal)?;
                output.extend_from_slice(&literal);
            }
        }
    }

    if output.len() as u64 != target_size {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "target size mismatch: delta says {target_size}, got {}",
                output.len()
            ),
        });
    }

    Ok(output)
}
