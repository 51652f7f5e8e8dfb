//! Decode quality and output geometry.

use std::fmt;
use std::str::FromStr;

use brawofx_sdk::ResolutionScale;
use serde::{Deserialize, Serialize};

use crate::error::ReaderError;

/// Discrete decode resolution, in the order the quality choice lists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Full,
    Half,
    Quarter,
    Eighth,
}

impl Quality {
    pub const ALL: [Quality; 4] = [Self::Full, Self::Half, Self::Quarter, Self::Eighth];

    /// Quality for a choice index. Unknown indices decode at full resolution.
    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Integer divisor applied to both native dimensions.
    pub fn divisor(self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Quarter => 4,
            Self::Eighth => 8,
        }
    }

    pub fn resolution_scale(self) -> ResolutionScale {
        match self {
            Self::Full => ResolutionScale::Full,
            Self::Half => ResolutionScale::Half,
            Self::Quarter => ResolutionScale::Quarter,
            Self::Eighth => ResolutionScale::Eighth,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Half => "Half",
            Self::Quarter => "Quarter",
            Self::Eighth => "Eighth",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quality {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| ReaderError::InvalidParameter(format!("unknown quality {s:?}")))
    }
}

/// Output size of a clip decoded at `quality`.
///
/// Dimensions are divided with truncation. `None` when either native
/// dimension or either result is zero.
pub fn resolve(native_width: u32, native_height: u32, quality: Quality) -> Option<(u32, u32)> {
    if native_width == 0 || native_height == 0 {
        return None;
    }
    let d = quality.divisor();
    let (width, height) = (native_width / d, native_height / d);
    (width > 0 && height > 0).then_some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quarter_of_dci_4k() {
        assert_eq!(resolve(4096, 2160, Quality::Quarter), Some((1024, 540)));
    }

    #[test]
    fn test_division_truncates() {
        assert_eq!(resolve(1001, 999, Quality::Half), Some((500, 499)));
        assert_eq!(resolve(15, 15, Quality::Eighth), Some((1, 1)));
    }

    #[test]
    fn test_degenerate_sizes_fail() {
        assert_eq!(resolve(0, 1080, Quality::Full), None);
        assert_eq!(resolve(1920, 0, Quality::Full), None);
        assert_eq!(resolve(7, 2160, Quality::Eighth), None);
    }

    #[test]
    fn test_index_and_parse() {
        assert_eq!(Quality::from_index(2), Quality::Quarter);
        assert_eq!(Quality::from_index(9), Quality::Full);
        assert_eq!(Quality::Eighth.index(), 3);
        assert_eq!("half".parse::<Quality>().unwrap(), Quality::Half);
        assert!("sixteenth".parse::<Quality>().is_err());
    }

    fn any_quality() -> impl Strategy<Value = Quality> {
        prop::sample::select(Quality::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_resolve_is_floor_division(w in 1u32..20_000, h in 1u32..20_000, q in any_quality()) {
            let d = q.divisor();
            let expected = (w / d, h / d);
            match resolve(w, h, q) {
                Some(size) => prop_assert_eq!(size, expected),
                None => prop_assert!(expected.0 == 0 || expected.1 == 0),
            }
        }

        #[test]
        fn prop_full_is_identity(w in 1u32..20_000, h in 1u32..20_000) {
            prop_assert_eq!(resolve(w, h, Quality::Full), Some((w, h)));
        }
    }
}
