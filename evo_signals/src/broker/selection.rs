//! Sample-window and block selection tables.
//!
//! A `Samples` row `{begin, end, total}` selects samples by fraction of the
//! ring depth, counted back from the most recent sample:
//!
//! ```text
//! maxIdx   = numberOfSamples - 1
//! beginIdx = maxIdx - begin * maxIdx / total
//! endIdx   = maxIdx - end   * maxIdx / total
//! count    = endIdx - beginIdx + 1
//! ```
//!
//! An `Operation` row `{begin, end}` selects elements `begin..=end` of each
//! sample.

use serde::Serialize;
use tracing::{error, warn};

use crate::consts::{BLOCK_COLUMNS, SAMPLES_COLUMNS};
use crate::error::{SignalError, SignalResult};
use crate::text::parse_matrix;

/// Consecutive run of samples in the shared ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleWindow {
    /// Absolute index of the first sample.
    pub begin: u32,
    pub count: u32,
}

/// Byte range inside one sample of the shared signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Block {
    pub begin_byte: usize,
    pub size: usize,
}

/// Only the most recent sample.
pub fn latest_sample(number_of_samples: u32) -> SampleWindow {
    SampleWindow {
        begin: number_of_samples.max(1) - 1,
        count: 1,
    }
}

pub fn parse_samples(signal: &str, text: &str) -> SignalResult<Vec<[u32; SAMPLES_COLUMNS]>> {
    parse_matrix::<SAMPLES_COLUMNS>(text).map_err(|reason| malformed_samples(signal, reason))
}

pub fn parse_operation(signal: &str, text: &str) -> SignalResult<Vec<[u32; BLOCK_COLUMNS]>> {
    parse_matrix::<BLOCK_COLUMNS>(text).map_err(|reason| malformed_operation(signal, reason))
}

/// Map fractional rows onto a ring of `number_of_samples`.
pub fn sample_windows(
    signal: &str,
    rows: &[[u32; SAMPLES_COLUMNS]],
    number_of_samples: u32,
) -> SignalResult<Vec<SampleWindow>> {
    let max_index = u64::from(number_of_samples.max(1) - 1);
    rows.iter()
        .enumerate()
        .map(|(r, &[begin, end, total])| {
            if total == 0 {
                return Err(malformed_samples(signal, format!("row {r}: total must be positive")));
            }
            if begin > total || end > total {
                return Err(malformed_samples(
                    signal,
                    format!("row {r}: begin and end must not exceed {total}"),
                ));
            }
            if end > begin {
                return Err(malformed_samples(signal, format!("row {r}: end {end} > begin {begin}")));
            }
            let begin_index = max_index - u64::from(begin) * max_index / u64::from(total);
            let end_index = max_index - u64::from(end) * max_index / u64::from(total);
            Ok(SampleWindow {
                begin: begin_index as u32,
                count: (end_index - begin_index + 1) as u32,
            })
        })
        .collect()
}

/// Block covering the first `gam_elements` elements.
pub fn full_block(
    signal: &str,
    type_size: usize,
    gam_elements: u32,
    ds_elements: u32,
) -> SignalResult<Block> {
    if gam_elements > ds_elements {
        error!(signal, requested = gam_elements, available = ds_elements, "Too many elements");
        return Err(SignalError::TooManyElements {
            signal: signal.to_string(),
            requested: gam_elements,
            available: ds_elements,
        });
    }
    Ok(Block {
        begin_byte: 0,
        size: type_size * gam_elements as usize,
    })
}

/// Convert element ranges into byte blocks.
///
/// Covering more elements than the module declares fails; fewer only warns.
pub fn blocks(
    signal: &str,
    rows: &[[u32; BLOCK_COLUMNS]],
    type_size: usize,
    gam_elements: u32,
    ds_elements: u32,
) -> SignalResult<Vec<Block>> {
    let mut covered: u64 = 0;
    let mut out = Vec::with_capacity(rows.len());
    for (r, &[begin, end]) in rows.iter().enumerate() {
        if end < begin {
            return Err(malformed_operation(signal, format!("row {r}: end {end} < begin {begin}")));
        }
        if begin >= ds_elements || end >= ds_elements {
            return Err(malformed_operation(
                signal,
                format!("row {r}: range {begin}..={end} outside {ds_elements} elements"),
            ));
        }
        let elements = (end - begin + 1) as usize;
        covered += elements as u64;
        out.push(Block {
            begin_byte: begin as usize * type_size,
            size: elements * type_size,
        });
    }
    if covered > u64::from(gam_elements) {
        error!(signal, requested = covered, available = gam_elements, "Blocks exceed the module elements");
        return Err(SignalError::TooManyElements {
            signal: signal.to_string(),
            requested: covered.min(u64::from(u32::MAX)) as u32,
            available: gam_elements,
        });
    }
    if covered < u64::from(gam_elements) {
        warn!(signal, copied = covered, declared = gam_elements, "Fewer elements copied than declared");
    }
    Ok(out)
}

fn malformed_samples(signal: &str, reason: String) -> SignalError {
    error!(signal, %reason, "Malformed samples");
    SignalError::MalformedSamples {
        signal: signal.to_string(),
        reason,
    }
}

fn malformed_operation(signal: &str, reason: String) -> SignalError {
    error!(signal, %reason, "Malformed operation");
    SignalError::MalformedOperation {
        signal: signal.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_recent_of_ten() {
        let w = sample_windows("x", &[[0, 0, 1]], 10).unwrap();
        assert_eq!(w, vec![SampleWindow { begin: 9, count: 1 }]);
        assert_eq!(latest_sample(10), w[0]);
    }

    #[test]
    fn whole_ring() {
        let w = sample_windows("x", &[[1, 0, 1]], 10).unwrap();
        assert_eq!(w, vec![SampleWindow { begin: 0, count: 10 }]);
    }

    #[test]
    fn half_ring_rounds_down() {
        // maxIdx 9: begin 9 - 9/2 = 5, end 9
        let w = sample_windows("x", &[[1, 0, 2]], 10).unwrap();
        assert_eq!(w, vec![SampleWindow { begin: 5, count: 5 }]);
    }

    #[test]
    fn single_sample_ring() {
        let w = sample_windows("x", &[[1, 0, 1]], 1).unwrap();
        assert_eq!(w, vec![SampleWindow { begin: 0, count: 1 }]);
    }

    #[test]
    fn invalid_sample_rows() {
        assert!(sample_windows("x", &[[0, 0, 0]], 10).is_err());
        assert!(sample_windows("x", &[[2, 0, 1]], 10).is_err());
        assert!(sample_windows("x", &[[0, 1, 1]], 10).is_err());
        assert!(parse_samples("x", "{{0,0}}").is_err());
    }

    #[test]
    fn block_bytes() {
        let b = blocks("x", &[[2, 5]], 4, 4, 10).unwrap();
        assert_eq!(b, vec![Block { begin_byte: 8, size: 16 }]);
    }

    #[test]
    fn blocks_bounds_and_totals() {
        assert!(matches!(
            blocks("x", &[[5, 2]], 4, 4, 10),
            Err(SignalError::MalformedOperation { .. })
        ));
        assert!(matches!(
            blocks("x", &[[8, 10]], 4, 4, 10),
            Err(SignalError::MalformedOperation { .. })
        ));
        assert!(matches!(
            blocks("x", &[[0, 4]], 4, 4, 10),
            Err(SignalError::TooManyElements { requested: 5, .. })
        ));
        // Fewer elements is a warning only.
        let b = blocks("x", &[[0, 0], [3, 3]], 4, 4, 10).unwrap();
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn full_block_needs_room() {
        assert_eq!(
            full_block("x", 4, 3, 3).unwrap(),
            Block { begin_byte: 0, size: 12 }
        );
        assert!(full_block("x", 4, 4, 3).is_err());
    }
}
