//! Host time domain and codec frame indexing.
//!
//! The host counts frames from 1; the codec's frame index is zero-based.

use serde::{Deserialize, Serialize};

/// Inclusive frame range in host time (one-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub min: i32,
    pub max: i32,
}

impl FrameRange {
    /// Create a new range.
    #[inline]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Host range `[1, frame_count]`, or `None` when the clip has no frames.
    pub fn for_frame_count(frame_count: u64) -> Option<Self> {
        if frame_count == 0 {
            return None;
        }
        let max = i32::try_from(frame_count).unwrap_or(i32::MAX);
        Some(Self::new(1, max))
    }

    /// Number of frames in the range.
    #[inline]
    pub fn len(self) -> u32 {
        (self.max - self.min + 1).max(0) as u32
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Map a one-based host time to the codec's zero-based frame index.
///
/// Computes `max(time - 1, 0)`, truncating any fractional part.
pub fn frame_index_for_time(time: f64) -> u64 {
    if time > 1.0 {
        (time - 1.0) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_index_mapping() {
        assert_eq!(frame_index_for_time(1.0), 0);
        assert_eq!(frame_index_for_time(0.0), 0);
        assert_eq!(frame_index_for_time(5.0), 4);
        assert_eq!(frame_index_for_time(-3.0), 0);
    }

    #[test]
    fn test_range_for_frame_count() {
        assert_eq!(FrameRange::for_frame_count(240), Some(FrameRange::new(1, 240)));
        assert_eq!(FrameRange::for_frame_count(0), None);
        assert_eq!(FrameRange::new(1, 240).len(), 240);
    }

    proptest! {
        #[test]
        fn prop_frame_index_is_time_minus_one(t in 1u32..1_000_000) {
            prop_assert_eq!(frame_index_for_time(t as f64), (t - 1) as u64);
        }

        #[test]
        fn prop_non_positive_time_maps_to_first_frame(t in -1.0e6f64..=1.0) {
            prop_assert_eq!(frame_index_for_time(t), 0);
        }
    }
}
