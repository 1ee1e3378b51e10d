//! Per-type value rules.
//!
//! Every rule is pure and total, and idempotent: applying it to its own
//! output returns that output unchanged. Escaping rules leave character
//! references already in the input alone, which is what makes a stored
//! (escaped) value survive another render/sanitize pass intact.

use std::borrow::Cow;
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::EngineConfig;

static CHAR_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:[a-zA-Z][a-zA-Z0-9]{1,31}|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});")
        .expect("character reference pattern is valid")
});

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("script/style pattern is valid")
});

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[a-zA-Z!?/][^>]*>").expect("tag pattern is valid"));

static PERCENT_OCTET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[a-fA-F0-9]{2}").expect("octet pattern is valid"));

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Apply `encode` to every stretch of `input` between character references.
fn escape_preserving_refs(input: &str, encode: fn(&str) -> Cow<'_, str>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for m in CHAR_REF.find_iter(input) {
        out.push_str(&encode(&input[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&encode(&input[last..]));
    out
}

/// HTML-escape for display: `& < > " '`. Existing character references are
/// kept as they are.
pub fn escape_html(input: &str) -> String {
    escape_preserving_refs(input, html_escape::encode_quoted_attribute::<str>)
}

/// HTML-escape keeping line structure; line endings normalize to `\n`.
pub fn escape_textarea(input: &str) -> String {
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    escape_html(&normalized)
}

fn is_url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || !c.is_ascii() || "-~+_.?#=!&;,/:%@$|*'()[]".contains(c)
}

/// Normalize a URL, or return `""` when it can't be made safe.
///
/// Disallowed characters are dropped and spaces become `%20`. Relative
/// references (`/path`, `#frag`, `?query`) pass through. A reference
/// without a scheme gets `http://`. Anything whose scheme is not in the
/// configured `url_schemes`, or that doesn't parse as a URL, is rejected.
pub fn sanitize_url(input: &str, config: &EngineConfig) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let filtered: String = trimmed
        .replace(' ', "%20")
        .chars()
        .filter(|&c| is_url_char(c))
        .collect();
    let filtered = filtered.trim();
    if filtered.is_empty() {
        return String::new();
    }

    if filtered.starts_with(['/', '#', '?']) {
        return filtered.to_string();
    }

    let scheme_end = filtered
        .find([':', '/', '?', '#'])
        .filter(|&i| filtered[i..].starts_with(':'));

    let candidate = match scheme_end {
        Some(end) => {
            let scheme = &filtered[..end];
            if !config.allows_scheme(scheme) {
                return String::new();
            }
            filtered.to_string()
        }
        None => format!("http://{filtered}"),
    };

    match url::Url::parse(&candidate) {
        Ok(_) => candidate,
        Err(_) => String::new(),
    }
}

/// Non-negative integer from the leading digits of a value. Negative numbers
/// take their absolute value; anything non-numeric is 0.
pub fn absint(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(i) = n.as_i64() {
                i.unsigned_abs()
            } else {
                // saturating float-to-int conversion
                n.as_f64().map(|f| f.abs().trunc() as u64).unwrap_or(0)
            }
        }
        Value::String(s) => leading_int(s),
        Value::Bool(b) => u64::from(*b),
        Value::Null | Value::Array(_) | Value::Object(_) => 0,
    }
}

fn leading_int(s: &str) -> u64 {
    let s = s.trim_start();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, b| {
            acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
        })
}

/// Lowercase key token of `[a-z0-9_-]`; everything else is dropped.
pub fn sanitize_key(input: &str) -> String {
    input
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Generic single-line text: drop script and style blocks, strip tags,
/// replace control characters, drop percent-encoded octets and collapse
/// whitespace.
pub fn sanitize_text_field(input: &str) -> String {
    let mut text = SCRIPT_OR_STYLE.replace_all(input, "").into_owned();

    loop {
        let stripped = TAG.replace_all(&text, "");
        if stripped == text {
            break;
        }
        text = stripped.into_owned();
    }
    text = text.replace('<', "&lt;");

    text = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    loop {
        let stripped = PERCENT_OCTET.replace_all(&text, "");
        if stripped == text {
            break;
        }
        text = stripped.into_owned();
    }

    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

/// String form of a scalar as a form would submit it.
pub(crate) fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(true) => Some(Cow::Borrowed("1")),
        Value::Bool(false) | Value::Null => Some(Cow::Borrowed("")),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Apply a string rule to a value: scalars directly, sequences element-wise,
/// mappings collapse to `""`.
pub fn map_text(value: &Value, rule: impl Fn(&str) -> String + Copy) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| map_text(v, rule)).collect()),
        other => Value::String(scalar_text(other).map(|s| rule(&s)).unwrap_or_default()),
    }
}

/// Key list for multi-valued selects. A scalar counts as a one-element list;
/// empty keys are dropped.
pub fn key_list(value: &Value) -> Value {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            // `tags[0]`-style submissions can arrive as an index-keyed mapping
            let ordered: BTreeMap<u64, &Value> = map
                .iter()
                .filter_map(|(k, v)| k.parse::<u64>().ok().map(|i| (i, v)))
                .collect();
            ordered.into_values().collect()
        }
        other => vec![other],
    };
    Value::Array(
        items
            .into_iter()
            .filter_map(scalar_text)
            .map(|s| sanitize_key(&s))
            .filter(|k| !k.is_empty())
            .map(Value::String)
            .collect(),
    )
}
