//! Property-based tests for option normalization and colour parsing.

use proptest::prelude::*;

use super::options::{FitMode, Rgb, TransformOptions};

fn fit_mode() -> impl Strategy<Value = FitMode> {
    prop_oneof![
        Just(FitMode::Cover),
        Just(FitMode::Contain),
        Just(FitMode::Fill),
        Just(FitMode::Inside),
        Just(FitMode::Outside),
    ]
}

fn options() -> impl Strategy<Value = TransformOptions> {
    (
        proptest::option::of(any::<u32>()),
        proptest::option::of(any::<u32>()),
        proptest::option::of(".{0,10}"),
        fit_mode(),
    )
        .prop_map(|(width, height, background_color, fit_mode)| TransformOptions {
            width,
            height,
            background_color,
            fit_mode,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Normalized sizes always fall within `[1, max]`; zero means absent.
    #[test]
    fn prop_sizes_are_clamped(opts in options(), max in 1u32..5000) {
        let norm = opts.normalize(max);
        for side in [norm.width, norm.height].into_iter().flatten() {
            prop_assert!((1..=max).contains(&side));
        }
        prop_assert_eq!(norm.width.is_some(), opts.width.is_some_and(|w| w > 0));
        prop_assert_eq!(norm.height.is_some(), opts.height.is_some_and(|h| h > 0));
    }

    /// Cache keys only contain file name safe characters.
    #[test]
    fn prop_cache_key_is_file_name_safe(opts in options(), max in 1u32..5000) {
        let key = opts.normalize(max).cache_key();
        prop_assert!(!key.is_empty());
        prop_assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    /// Normalizing twice changes nothing.
    #[test]
    fn prop_normalize_is_idempotent(opts in options(), max in 1u32..5000) {
        let once = opts.normalize(max);
        let again = TransformOptions {
            width: once.width,
            height: once.height,
            background_color: once.background.map(|c| c.to_string()),
            fit_mode: once.fit,
        }
        .normalize(max);
        prop_assert_eq!(once, again);
    }

    /// Six hex digits parse with or without `#`, to the same colour.
    #[test]
    fn prop_hex_colour_parses(hex in "[0-9a-fA-F]{6}") {
        let plain = Rgb::parse(&hex);
        prop_assert!(plain.is_some());
        prop_assert_eq!(plain, Rgb::parse(&format!("#{hex}")));
        prop_assert_eq!(plain.map(|c| c.to_string()), Some(hex.to_lowercase()));
    }

    /// Any other length is ignored.
    #[test]
    fn prop_wrong_length_colour_ignored(hex in "[0-9a-f]{0,12}") {
        prop_assume!(hex.len() != 6);
        prop_assert!(Rgb::parse(&hex).is_none());
        let prefixed = format!("#{hex}");
        prop_assert!(Rgb::parse(&prefixed).is_none());
    }
}
