//! Exec output sanitizing
//!
//! Output captured from a TTY exec session carries shell control sequences. Only
//! printable ASCII plus line breaks is handed back to callers.

use once_cell::sync::Lazy;
use regex::Regex;

/// Everything outside `0x20..=0x7E`, `\n` and `\r`
static NON_PRINTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\x20-\x7E\n\r]").expect("static pattern is valid"));

/// Reduce raw exec output to printable text.
///
/// Undecodable byte sequences are dropped. Never fails; empty input yields an
/// empty string.
pub fn sanitize(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }

    // Invalid sequences become U+FFFD here and are stripped with the rest
    let decoded = String::from_utf8_lossy(raw);
    NON_PRINTABLE.replace_all(&decoded, "").into_owned()
}
