//! Voice filter selection model
//!
//! A filter selection is a tagged union of kind + intensity, so applying a
//! new filter cannot leave a previous filter's parameters behind: the chain
//! always resets before applying whatever variant it is handed.

use serde::{Deserialize, Serialize};

/// Filter intensity range, inclusive
pub const MIN_LEVEL: f32 = 0.0;
pub const MAX_LEVEL: f32 = 100.0;

/// The selectable voice filters
///
/// `None` is a sentinel meaning "no processing"; it is never applied to the
/// chain as an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    HighPitch,
    LowPitch,
    Alien,
    Reverb,
    None,
}

impl FilterKind {
    /// Parse a filter kind from its CLI name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high-pitch" | "high_pitch" | "highpitch" | "high" => Some(FilterKind::HighPitch),
            "low-pitch" | "low_pitch" | "lowpitch" | "low" => Some(FilterKind::LowPitch),
            "alien" => Some(FilterKind::Alien),
            "reverb" => Some(FilterKind::Reverb),
            "none" => Some(FilterKind::None),
            _ => None,
        }
    }

    /// String identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::HighPitch => "high-pitch",
            FilterKind::LowPitch => "low-pitch",
            FilterKind::Alien => "alien",
            FilterKind::Reverb => "reverb",
            FilterKind::None => "none",
        }
    }

    /// Default intensity when the filter is first selected
    ///
    /// High/low pitch and reverb start at half scale, the alien voice is
    /// subtle by default.
    pub fn default_level(&self) -> f32 {
        match self {
            FilterKind::HighPitch | FilterKind::LowPitch | FilterKind::Reverb => 50.0,
            FilterKind::Alien => 10.0,
            FilterKind::None => 0.0,
        }
    }
}

/// An active filter selection: kind plus clamped intensity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "filter", content = "level")]
pub enum ActiveFilter {
    None,
    HighPitch(f32),
    LowPitch(f32),
    Alien(f32),
    Reverb(f32),
}

impl Default for ActiveFilter {
    fn default() -> Self {
        ActiveFilter::None
    }
}

impl ActiveFilter {
    /// Build a selection from kind + level, clamping level to [0, 100]
    ///
    /// `FilterKind::None` ignores the level.
    pub fn new(kind: FilterKind, level: f32) -> Self {
        let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
        match kind {
            FilterKind::HighPitch => ActiveFilter::HighPitch(level),
            FilterKind::LowPitch => ActiveFilter::LowPitch(level),
            FilterKind::Alien => ActiveFilter::Alien(level),
            FilterKind::Reverb => ActiveFilter::Reverb(level),
            FilterKind::None => ActiveFilter::None,
        }
    }

    /// The filter kind of this selection
    pub fn kind(&self) -> FilterKind {
        match self {
            ActiveFilter::None => FilterKind::None,
            ActiveFilter::HighPitch(_) => FilterKind::HighPitch,
            ActiveFilter::LowPitch(_) => FilterKind::LowPitch,
            ActiveFilter::Alien(_) => FilterKind::Alien,
            ActiveFilter::Reverb(_) => FilterKind::Reverb,
        }
    }

    /// The intensity of this selection (0 for `None`)
    pub fn level(&self) -> f32 {
        match self {
            ActiveFilter::None => 0.0,
            ActiveFilter::HighPitch(l)
            | ActiveFilter::LowPitch(l)
            | ActiveFilter::Alien(l)
            | ActiveFilter::Reverb(l) => *l,
        }
    }

    /// True if this selection applies no processing
    pub fn is_none(&self) -> bool {
        matches!(self, ActiveFilter::None)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_level() {
        assert_eq!(ActiveFilter::new(FilterKind::Alien, 150.0).level(), 100.0);
        assert_eq!(ActiveFilter::new(FilterKind::Alien, -5.0).level(), 0.0);
    }

    #[test]
    fn test_none_ignores_level() {
        let filter = ActiveFilter::new(FilterKind::None, 80.0);
        assert!(filter.is_none());
        assert_eq!(filter.level(), 0.0);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            FilterKind::HighPitch,
            FilterKind::LowPitch,
            FilterKind::Alien,
            FilterKind::Reverb,
        ] {
            let filter = ActiveFilter::new(kind, 30.0);
            assert_eq!(filter.kind(), kind);
            assert_eq!(filter.level(), 30.0);
        }
    }

    #[test]
    fn test_equality_is_kind_and_level() {
        assert_eq!(
            ActiveFilter::new(FilterKind::Reverb, 50.0),
            ActiveFilter::new(FilterKind::Reverb, 50.0)
        );
        assert_ne!(
            ActiveFilter::new(FilterKind::Reverb, 50.0),
            ActiveFilter::new(FilterKind::Reverb, 51.0)
        );
        assert_ne!(
            ActiveFilter::new(FilterKind::Reverb, 50.0),
            ActiveFilter::new(FilterKind::Alien, 50.0)
        );
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in [
            FilterKind::HighPitch,
            FilterKind::LowPitch,
            FilterKind::Alien,
            FilterKind::Reverb,
            FilterKind::None,
        ] {
            assert_eq!(FilterKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(FilterKind::from_str("vocoder"), None);
    }

    #[test]
    fn test_default_levels() {
        assert_eq!(FilterKind::HighPitch.default_level(), 50.0);
        assert_eq!(FilterKind::Alien.default_level(), 10.0);
        assert_eq!(FilterKind::None.default_level(), 0.0);
    }

    #[test]
    fn test_active_filter_json_roundtrip() {
        let filter = ActiveFilter::new(FilterKind::Alien, 30.0);
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"filter":"alien","level":30.0}"#);

        let back: ActiveFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);

        let none = serde_json::to_string(&ActiveFilter::None).unwrap();
        assert_eq!(none, r#"{"filter":"none"}"#);
    }
}
