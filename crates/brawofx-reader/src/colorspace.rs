//! File colorspace guessing.

/// Rec.709 colorspace names in the order they are tried.
pub const REC709_CANDIDATES: &[&str] = &[
    "Rec709",
    "nuke_rec709",
    "Rec.709 - Full",
    "out_rec709full",
    "rrt_rec709_full_100nits",
    "rrt_rec709",
    "hd10",
];

/// First Rec.709 colorspace the host knows, if any.
pub fn guess_colorspace(has: impl Fn(&str) -> bool) -> Option<&'static str> {
    REC709_CANDIDATES.iter().copied().find(|name| has(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_earlier_names() {
        let available = ["hd10", "nuke_rec709", "linear"];
        assert_eq!(guess_colorspace(|n| available.contains(&n)), Some("nuke_rec709"));
    }

    #[test]
    fn test_unknown_config_gives_none() {
        assert_eq!(guess_colorspace(|n| n == "ACEScg"), None);
    }
}
