//! Signal shapes (`[n][m][k]`).
//!
//! A shape is written as a sequence of bracketed element counts:
//! `""` (scalar), `"[8]"` (vector), `"[2][3]"` (matrix), `"[2][2][2]"` (cube).

use heapless::Vec as HVec;
use serde::Serialize;
use tracing::warn;

use crate::consts::MAX_DIMENSIONS;
use crate::error::{SignalError, SignalResult};

/// Number of dimensions and the element count of each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    elements: HVec<u32, MAX_DIMENSIONS>,
}

impl Dimensions {
    /// Zero-dimensional shape.
    pub fn scalar() -> Self {
        Self::default()
    }

    /// Build from explicit per-dimension counts, dropping dimensions beyond
    /// [`MAX_DIMENSIONS`].
    pub fn from_elements(elements: &[u32]) -> Self {
        let mut dims = Self::default();
        for (i, &n) in elements.iter().enumerate() {
            if dims.elements.push(n).is_err() {
                warn!(
                    dimension = i,
                    max = MAX_DIMENSIONS,
                    "Only {MAX_DIMENSIONS} dimensions are supported, ignoring the rest"
                );
                break;
            }
        }
        dims
    }

    /// Parse a shape string.
    ///
    /// Pointer modifiers (`*`) are accepted and ignored with a warning.
    pub fn parse(text: &str) -> SignalResult<Self> {
        let err = |reason: &str| SignalError::Parse {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        let mut counts: Vec<u32> = Vec::new();
        let mut rest = text.trim();
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix('*') {
                warn!(dimensions = text, "Pointer modifiers are not supported, ignoring");
                rest = tail.trim_start();
                continue;
            }
            let Some(tail) = rest.strip_prefix('[') else {
                return Err(err("expected '['"));
            };
            let Some(close) = tail.find(']') else {
                return Err(err("missing ']'"));
            };
            let n: u32 = tail[..close]
                .trim()
                .parse()
                .map_err(|_| err("element count is not an unsigned integer"))?;
            if n == 0 {
                return Err(err("element count cannot be zero"));
            }
            counts.push(n);
            rest = tail[close + 1..].trim_start();
        }
        let dims = Self::from_elements(&counts);
        if dims.checked_element_count().is_none() {
            return Err(err("element count does not fit in 32 bits"));
        }
        Ok(dims)
    }

    /// Number of dimensions (0 for a scalar).
    #[inline]
    pub fn count(&self) -> usize {
        self.elements.len()
    }

    /// Per-dimension element counts.
    #[inline]
    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    /// Total number of elements, 1 for a scalar. Saturates at `u32::MAX`.
    pub fn element_count(&self) -> u32 {
        self.checked_element_count().unwrap_or(u32::MAX)
    }

    /// Total number of elements, `None` on overflow.
    pub fn checked_element_count(&self) -> Option<u32> {
        self.elements.iter().try_fold(1u32, |acc, &n| acc.checked_mul(n))
    }

    /// `true` for a zero-dimensional shape.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_scalar() {
        let d = Dimensions::parse("").unwrap();
        assert!(d.is_scalar());
        assert_eq!(d.element_count(), 1);
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn vector_and_matrix() {
        let v = Dimensions::parse("[8]").unwrap();
        assert_eq!(v.count(), 1);
        assert_eq!(v.element_count(), 8);

        let m = Dimensions::parse(" [2] [3] ").unwrap();
        assert_eq!(m.elements(), &[2, 3]);
        assert_eq!(m.element_count(), 6);
    }

    #[test]
    fn extra_dimensions_are_dropped() {
        let d = Dimensions::parse("[2][2][2][5]").unwrap();
        assert_eq!(d.count(), MAX_DIMENSIONS);
        assert_eq!(d.element_count(), 8);
    }

    #[test]
    fn pointer_modifier_ignored() {
        let d = Dimensions::parse("*[4]").unwrap();
        assert_eq!(d.elements(), &[4]);
    }

    #[test]
    fn malformed_shapes() {
        assert!(Dimensions::parse("4").is_err());
        assert!(Dimensions::parse("[4").is_err());
        assert!(Dimensions::parse("[x]").is_err());
        assert!(Dimensions::parse("[0]").is_err());
    }

    #[test]
    fn overflowing_shape_rejected() {
        assert!(matches!(
            Dimensions::parse("[65536][65536]"),
            Err(SignalError::Parse { .. })
        ));
        assert_eq!(Dimensions::parse("[65536][65535]").unwrap().element_count(), 65536 * 65535);
    }

    #[test]
    fn element_count_saturates() {
        let d = Dimensions::from_elements(&[65536, 65536]);
        assert_eq!(d.checked_element_count(), None);
        assert_eq!(d.element_count(), u32::MAX);
    }
}
