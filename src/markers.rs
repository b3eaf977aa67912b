use aho_corasick::AhoCorasick;

use crate::error::Result;

/// Any-of substring test over a fixed set of literal markers.
///
/// Used for the endpoint scope check, where a URL is in scope as soon as it
/// contains one of several path fragments.
pub(crate) enum MarkerSet {
    /// No markers configured; nothing matches.
    Empty,
    Literals(AhoCorasick),
}

impl MarkerSet {
    pub fn build(markers: &[String]) -> Result<MarkerSet> {
        if markers.is_empty() {
            return Ok(MarkerSet::Empty);
        }
        Ok(MarkerSet::Literals(AhoCorasick::new(markers)?))
    }

    pub fn matches(&self, haystack: &str) -> bool {
        match self {
            Self::Empty => false,
            Self::Literals(ac) => ac.is_match(haystack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(markers: &[&str]) -> MarkerSet {
        let owned: Vec<String> = markers.iter().map(|m| m.to_string()).collect();
        MarkerSet::build(&owned).unwrap()
    }

    #[test]
    fn any_marker_matches() {
        let s = set(&["/s/sfsites/aura", "/aura?"]);
        assert!(s.matches("https://x.example/s/sfsites/aura?r=1"));
        assert!(s.matches("https://x.example/aura?r=1"));
        assert!(!s.matches("https://x.example/aura/r=1"));
    }

    #[test]
    fn empty_set_never_matches() {
        assert!(!set(&[]).matches("/aura?"));
    }
}
