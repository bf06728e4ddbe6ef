//! HTML and Markdown stripping. Regex passes, applied in a fixed order;
//! each pass is idempotent on its own output.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").unwrap());

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*```[^\n]*$").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").unwrap());
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}>\s?").unwrap());
static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}(?:[-*_]\s*){3,}$").unwrap());
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d{1,3}\.)\s+").unwrap());
static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\|?[\s:|-]+\|[\s:|-]*$").unwrap());
// Longest marker first so `***bold italic***` unwraps in one pass.
static EMPHASIS: LazyLock<[Regex; 6]> = LazyLock::new(|| {
    [
        Regex::new(r"\*{3}([^*\n]+)\*{3}").unwrap(),
        Regex::new(r"\*{2}([^*\n]+)\*{2}").unwrap(),
        Regex::new(r"\*([^*\n]+)\*").unwrap(),
        Regex::new(r"_{3}([^_\n]+)_{3}").unwrap(),
        Regex::new(r"_{2}([^_\n]+)_{2}").unwrap(),
        Regex::new(r"_([^_\n]+)_").unwrap(),
    ]
});

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Replace HTML tags with a space so adjacent words don't glue together.
pub fn strip_html_tags(text: &str) -> String {
    HTML_TAG.replace_all(text, " ").into_owned()
}

/// Decode the common named entities plus numeric character references.
pub fn decode_entities(text: &str) -> String {
    let decoded = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    // Named entities, most common set. `&amp;` last so freshly produced
    // ampersands don't re-decode.
    decoded
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Strip Markdown structure, keeping the visible text: headers, emphasis,
/// links, code spans/fences, lists, blockquotes, rules, tables.
pub fn strip_markdown(text: &str) -> String {
    let mut out = FENCE_LINE.replace_all(text, "").into_owned();
    out = INLINE_CODE.replace_all(&out, "$1").into_owned();
    out = IMAGE.replace_all(&out, "$1").into_owned();
    out = LINK.replace_all(&out, "$1").into_owned();
    out = HEADER.replace_all(&out, "").into_owned();
    out = BLOCKQUOTE.replace_all(&out, "").into_owned();
    out = HORIZONTAL_RULE.replace_all(&out, "").into_owned();
    out = LIST_MARKER.replace_all(&out, "").into_owned();
    out = TABLE_SEPARATOR.replace_all(&out, "").into_owned();
    for emphasis in EMPHASIS.iter() {
        out = emphasis.replace_all(&out, "$1").into_owned();
    }
    out.replace('|', " ")
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Drop everything that isn't alphanumeric or whitespace.
pub fn strip_special_chars(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}
