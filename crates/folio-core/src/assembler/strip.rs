use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::StripMode;

/// Long runs of the base64 alphabet (optionally padded) or an inline PNG marker.
fn base64_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:[A-Za-z0-9+/]{40,}={0,2}|iVBORw0KGgo[^"]+)"#)
            .unwrap_or_else(|e| panic!("base64 pattern: {e}"))
    })
}

pub fn contains_base64(text: &str) -> bool {
    base64_pattern().is_match(text)
}

/// Remove base64-looking artifacts from `text` according to `mode`.
///
/// `Recursive` repeats the removal until no match is left; each pass strictly
/// shrinks the string, so the loop terminates.
pub fn strip_base64(text: &str, mode: StripMode) -> Cow<'_, str> {
    match mode {
        StripMode::Off => Cow::Borrowed(text),
        StripMode::Single => base64_pattern().replace_all(text, ""),
        StripMode::Recursive => {
            let mut out = Cow::Borrowed(text);
            while base64_pattern().is_match(&out) {
                out = Cow::Owned(base64_pattern().replace_all(&out, "").into_owned());
            }
            out
        }
    }
}
