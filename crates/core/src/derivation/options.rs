//! Image request options and their canonical form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

/// How a resized image fits the requested box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Cover the box, cropping the overflow.
    Cover,
    /// Fit inside the box and letterbox the rest.
    #[default]
    Contain,
    /// Stretch to the exact box.
    Fill,
    /// Fit inside the box without letterboxing.
    Inside,
    /// Scale until both sides reach the box.
    Outside,
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fill" => Ok(Self::Fill),
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            other => Err(format!("unknown fit mode: {other}")),
        }
    }
}

/// Opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Parses `rrggbb` or `#rrggbb`. Anything else is `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        Some(Self([(value >> 16) as u8, (value >> 8) as u8, value as u8]))
    }

    /// The colour with full alpha.
    #[must_use]
    pub fn to_rgba(self) -> [u8; 4] {
        let [r, g, b] = self.0;
        [r, g, b, 255]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "{r:02x}{g:02x}{b:02x}")
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Requested derivation of an image, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    /// Target width in pixels.
    #[serde(default)]
    pub width: Option<u32>,
    /// Target height in pixels.
    #[serde(default)]
    pub height: Option<u32>,
    /// Background colour, `#rrggbb` or `rrggbb`.
    #[serde(default)]
    pub background_color: Option<String>,
    /// Fit mode; contain when omitted.
    #[serde(default)]
    pub fit_mode: FitMode,
}

impl TransformOptions {
    /// Canonical form: a zero size counts as absent, other sizes are capped
    /// at `max_size`, unparseable colours are dropped.
    #[must_use]
    pub fn normalize(&self, max_size: u32) -> NormalizedOptions {
        let max_size = max_size.max(1);
        let clamp = |v: Option<u32>| v.filter(|v| *v > 0).map(|v| v.min(max_size));
        NormalizedOptions {
            width: clamp(self.width),
            height: clamp(self.height),
            background: self.background_color.as_deref().and_then(Rgb::parse),
            fit: self.fit_mode,
        }
    }
}

/// Options after clamping and colour parsing. Drives both the transform and
/// the derivation cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedOptions {
    /// Target width.
    pub width: Option<u32>,
    /// Target height.
    pub height: Option<u32>,
    /// Background colour.
    pub background: Option<Rgb>,
    /// Fit mode.
    pub fit: FitMode,
}

impl NormalizedOptions {
    /// Whether the image has to be resized or flattened at all.
    #[must_use]
    pub fn needs_resize(&self) -> bool {
        self.width.is_some() || self.height.is_some() || self.background.is_some()
    }

    /// File name safe key: the JSON form with every non-alphanumeric
    /// character replaced by `_`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("#112233", Some([0x11, 0x22, 0x33]))]
    #[case("112233", Some([0x11, 0x22, 0x33]))]
    #[case("#FFaa00", Some([0xff, 0xaa, 0x00]))]
    #[case("#12345", None)]
    #[case("1234567", None)]
    #[case("##112233", None)]
    #[case("#11223g", None)]
    #[case("", None)]
    #[case("+12345", None)]
    fn test_rgb_parse(#[case] input: &str, #[case] expected: Option<[u8; 3]>) {
        assert_eq!(Rgb::parse(input).map(|c| c.0), expected);
    }

    #[test]
    fn test_default_fit_is_contain() {
        let opts: TransformOptions = serde_json::from_str(r#"{"width":10}"#).unwrap();
        assert_eq!(opts.fit_mode, FitMode::Contain);
        assert_eq!(opts.normalize(1600).fit, FitMode::Contain);
    }

    #[test]
    fn test_normalize_clamps_and_drops_bad_colour() {
        let opts = TransformOptions {
            width: Some(5000),
            height: Some(0),
            background_color: Some("red".to_string()),
            fit_mode: FitMode::Cover,
        };
        let norm = opts.normalize(1600);
        assert_eq!(norm.width, Some(1600));
        assert_eq!(norm.height, None);
        assert_eq!(norm.background, None);
        assert!(norm.needs_resize());
    }

    #[test]
    fn test_zero_sizes_are_absent() {
        let opts = TransformOptions {
            width: Some(0),
            height: Some(0),
            ..Default::default()
        };
        let norm = opts.normalize(1600);
        assert_eq!(norm, TransformOptions::default().normalize(1600));
        assert!(!norm.needs_resize());
    }

    #[test]
    fn test_empty_options_need_no_resize() {
        assert!(!TransformOptions::default().normalize(1600).needs_resize());
    }

    #[test]
    fn test_background_alone_needs_resize() {
        let opts = TransformOptions {
            background_color: Some("000000".to_string()),
            ..Default::default()
        };
        assert!(opts.normalize(1600).needs_resize());
    }

    #[test]
    fn test_cache_key_shape() {
        let opts = TransformOptions {
            width: Some(5),
            height: None,
            background_color: Some("#AbCdEf".to_string()),
            fit_mode: FitMode::Fill,
        };
        assert_eq!(
            opts.normalize(1600).cache_key(),
            "__width__5__height__null__background___abcdef___fit___fill__"
        );
    }

    #[test]
    fn test_equivalent_requests_share_a_key() {
        let a = TransformOptions {
            width: Some(9999),
            background_color: Some("#00ff00".to_string()),
            ..Default::default()
        };
        let b = TransformOptions {
            width: Some(1600),
            background_color: Some("00FF00".to_string()),
            ..Default::default()
        };
        assert_eq!(a.normalize(1600).cache_key(), b.normalize(1600).cache_key());
    }

    #[rstest]
    #[case("cover", FitMode::Cover)]
    #[case("CONTAIN", FitMode::Contain)]
    #[case("fill", FitMode::Fill)]
    #[case("inside", FitMode::Inside)]
    #[case("outside", FitMode::Outside)]
    fn test_fit_mode_from_str(#[case] input: &str, #[case] expected: FitMode) {
        assert_eq!(input.parse::<FitMode>().unwrap(), expected);
    }

    #[test]
    fn test_fit_mode_from_str_rejects_unknown() {
        assert!("stretch".parse::<FitMode>().is_err());
    }
}
