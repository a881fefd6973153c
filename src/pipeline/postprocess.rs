//! Post-processing: recover the JSON object from a model reply.
//!
//! Even when asked for "only JSON", chat models wrap the object in
//! ```` ```json ```` fences, prepend a sentence ("Here is the extracted
//! data:") or append a remark. These rules peel that off without touching
//! the object itself:
//!
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip an outer code fence, with or without a language tag
//! 3. Keep the span from the first `{` to the last `}`

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Return the JSON object embedded in `reply`, if there is one.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let s = reply.trim_matches(|c: char| c.is_whitespace() || is_invisible(c));
    let s = match RE_OUTER_FENCES.captures(s) {
        Some(caps) => caps.get(1).map_or(s, |m| m.as_str()),
        None => s,
    };
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
    )
}
