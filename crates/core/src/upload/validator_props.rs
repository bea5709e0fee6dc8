//! Property-based tests for upload validation.

use proptest::prelude::*;

use super::validator::{UploadValidator, looks_textual};

fn validator() -> UploadValidator {
    UploadValidator::new(["txt", "png", "doc"], u64::MAX)
}

/// Lowercase text that no binary signature starts with.
fn plain_text() -> impl Strategy<Value = String> {
    "[a-e ]{0,200}"
}

/// Case variations of an allow-listed text extension.
fn txt_extension() -> impl Strategy<Value = String> {
    prop_oneof![Just("txt"), Just("TXT"), Just("Txt"), Just("tXt")].prop_map(String::from)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Textual content is admitted whenever its extension is allow-listed.
    #[test]
    fn prop_text_with_allowed_extension_accepted(
        stem in "[a-z0-9_-]{1,20}",
        ext in txt_extension(),
        body in plain_text(),
    ) {
        let name = format!("{stem}.{ext}");
        prop_assert!(validator().check(&name, body.as_bytes()).is_ok());
    }

    /// Textual content is rejected whenever its extension is not allow-listed.
    #[test]
    fn prop_text_with_other_extension_rejected(
        stem in "[a-z0-9_-]{1,20}",
        ext in "(sh|exe|bat|js|html|csv)",
        body in plain_text(),
    ) {
        let name = format!("{stem}.{ext}");
        prop_assert!(validator().check(&name, body.as_bytes()).is_err());
    }

    /// Unidentified binary content never passes on its name alone,
    /// except for the legacy office formats.
    #[test]
    fn prop_unknown_binary_rejected(
        stem in "[a-z0-9]{1,20}",
        ext in "(txt|png|bin)",
        tail in prop::collection::vec(b'a'..=b'e', 1..100),
    ) {
        let mut head = vec![0u8];
        head.extend(tail);
        let name = format!("{stem}.{ext}");
        prop_assert!(validator().check(&name, &head).is_err());
        let legacy = format!("{stem}.doc");
        prop_assert!(validator().check(&legacy, &head).is_ok());
    }

    /// Any valid UTF-8 without NUL counts as text, even when cut mid-character.
    #[test]
    fn prop_truncated_utf8_is_textual(text in "\\PC{1,50}", cut in 1usize..4) {
        let bytes = text.as_bytes();
        prop_assert!(looks_textual(bytes));
        let end = bytes.len().saturating_sub(cut);
        prop_assert!(looks_textual(&bytes[..end]));
    }
}
