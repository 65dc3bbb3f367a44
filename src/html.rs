// src/html.rs
//! HTML-to-plain-text conversion for issue descriptions.
//!
//! Feed bodies are frequently HTML fragments; Jira descriptions want plain
//! text. A body that contains no markup passes through unchanged.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Convert an HTML fragment to plain text: break tags become newlines,
/// remaining tags are stripped, entities are decoded, whitespace is
/// collapsed per line and blank runs are reduced to a single empty line.
pub fn to_text(html: &str) -> String {
    // Tags that end a visual line or block
    static RE_BREAKS: OnceCell<Regex> = OnceCell::new();
    let re_breaks = RE_BREAKS.get_or_init(|| {
        Regex::new(r"(?i)<\s*(?:br\s*/?|/p|/li|/tr|/h[1-6]|/div|/blockquote)\s*>").unwrap()
    });
    let mut out = re_breaks.replace_all(html, "\n").to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // Decode after stripping so encoded angle brackets stay literal text
    out = html_escape::decode_html_entities(&out).to_string();

    static RE_SPACES: OnceCell<Regex> = OnceCell::new();
    let re_spaces = RE_SPACES.get_or_init(|| Regex::new(r"[ \t]+").unwrap());
    let mut lines: Vec<String> = Vec::new();
    let mut blank_pending = false;
    for line in out.lines() {
        let line = re_spaces.replace_all(line.trim(), " ").to_string();
        if line.is_empty() {
            blank_pending = !lines.is_empty();
            continue;
        }
        if blank_pending {
            lines.push(String::new());
            blank_pending = false;
        }
        lines.push(line);
    }
    lines.join("\n")
}
