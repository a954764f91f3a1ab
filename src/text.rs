//! Small text helpers shared by the transformer and the reconciler.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum URL key length.
pub const SLUG_MAX_LEN: usize = 100;

/// Characters kept for an auto-generated meta description.
pub const EXCERPT_LEN: usize = 160;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("static tag regex"));
static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static slug regex"));

/// Remove HTML tags and comments, leaving text and entities as they are.
pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// URL key from arbitrary text: ASCII-lowercased, every run of characters
/// outside `[a-z0-9]` collapsed to one hyphen, hyphens trimmed at both ends,
/// cut to [`SLUG_MAX_LEN`] and re-trimmed.
pub fn slugify(input: &str) -> String {
    let lowered = input.to_ascii_lowercase();
    let replaced = NON_ALNUM_RE.replace_all(&lowered, "-");
    let mut slug = replaced.trim_matches('-').to_string();
    if slug.len() > SLUG_MAX_LEN {
        // Only ASCII remains after replacement, so byte truncation is safe.
        slug.truncate(SLUG_MAX_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}

/// First [`EXCERPT_LEN`] characters of the tag-stripped content.
pub fn excerpt(content: &str) -> String {
    strip_tags(content).chars().take(EXCERPT_LEN).collect()
}

/// Fixed two-decimal rendering; `grouped` adds thousands separators.
pub fn format_price(value: f64, grouped: bool) -> String {
    let fixed = format!("{:.2}", value.abs());
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    if !grouped {
        return format!("{}{}", sign, fixed);
    }
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped_int = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped_int.push(',');
        }
        grouped_int.push(ch);
    }
    format!("{}{}.{}", sign, grouped_int, frac_part)
}

/// Render an optional number without trailing zeros (`1.5`, `2`).
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}
