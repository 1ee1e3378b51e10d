//! Allow-list HTML filter for rich text (Editor) values.
//!
//! Input is parsed as an HTML fragment with `scraper`. The tree is then
//! written back out keeping only the allowed tags and attributes below:
//! disallowed elements are unwrapped (their children kept), script-like
//! elements are removed with their content, and comments are dropped. Text
//! and attribute values are re-escaped from their decoded form. The output
//! of [`filter_html`] is a fixed point of it.

use html_escape::{encode_quoted_attribute, encode_text};
use scraper::{ElementRef, Html, Node};

use crate::config::EngineConfig;
use crate::rules::sanitize_url;

/// Attributes allowed on every allowed tag.
const GLOBAL_ATTRS: &[&str] = &["class", "id", "title", "dir", "lang"];

/// Attributes whose value is a URL.
const URL_ATTRS: &[&str] = &["href", "src", "cite"];

/// Tags that never take a closing tag.
const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Elements removed together with everything inside them.
const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "template", "noscript", "textarea", "title",
    "head",
];

/// Parser fix-ups (auto-closed paragraphs, the newline after `<pre>`) can
/// make a filtered fragment parse differently; re-filter until stable.
const MAX_PASSES: usize = 4;

/// Allowed tags and their tag-specific attributes.
const ALLOWED_TAGS: &[(&str, &[&str])] = &[
    ("a", &["href", "target", "rel"]),
    ("abbr", &[]),
    ("b", &[]),
    ("blockquote", &["cite"]),
    ("br", &[]),
    ("caption", &[]),
    ("code", &[]),
    ("del", &["datetime"]),
    ("div", &[]),
    ("em", &[]),
    ("figcaption", &[]),
    ("figure", &[]),
    ("h1", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("hr", &[]),
    ("i", &[]),
    ("img", &["src", "alt", "width", "height"]),
    ("ins", &["datetime"]),
    ("li", &[]),
    ("ol", &["start", "reversed"]),
    ("p", &[]),
    ("pre", &[]),
    ("q", &["cite"]),
    ("s", &[]),
    ("span", &[]),
    ("strong", &[]),
    ("sub", &[]),
    ("sup", &[]),
    ("table", &[]),
    ("tbody", &[]),
    ("td", &["colspan", "rowspan"]),
    ("tfoot", &[]),
    ("th", &["colspan", "rowspan", "scope"]),
    ("thead", &[]),
    ("tr", &[]),
    ("u", &[]),
    ("ul", &[]),
];

fn tag_attrs(name: &str) -> Option<&'static [&'static str]> {
    ALLOWED_TAGS
        .iter()
        .find(|(tag, _)| *tag == name)
        .map(|(_, attrs)| *attrs)
}

/// Whether `name` (lowercase) survives the filter.
pub fn is_allowed_tag(name: &str) -> bool {
    tag_attrs(name).is_some()
}

/// Filter rich text down to the allowed HTML subset.
pub fn filter_html(input: &str, config: &EngineConfig) -> String {
    let mut out = filter_once(input, config);
    for _ in 1..MAX_PASSES {
        let next = filter_once(&out, config);
        if next == out {
            break;
        }
        out = next;
    }
    out
}

fn filter_once(input: &str, config: &EngineConfig) -> String {
    let fragment = Html::parse_fragment(input);
    let mut out = String::with_capacity(input.len());
    write_children(fragment.root_element(), config, &mut out);
    out
}

fn write_children(parent: ElementRef<'_>, config: &EngineConfig, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&encode_text(&**text)),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(element, config, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, config: &EngineConfig, out: &mut String) {
    let name = element.value().name();
    if DROPPED_WITH_CONTENT.contains(&name) {
        return;
    }
    let Some(allowed) = tag_attrs(name) else {
        write_children(element, config, out);
        return;
    };

    out.push('<');
    out.push_str(name);
    for attr in allowed.iter().chain(GLOBAL_ATTRS) {
        let Some(raw) = element.value().attr(attr) else {
            continue;
        };
        let value = if URL_ATTRS.contains(attr) {
            let url = sanitize_url(raw, config);
            if url.is_empty() {
                continue;
            }
            url
        } else {
            raw.to_string()
        };
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&encode_quoted_attribute(&value));
        out.push('"');
    }
    out.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }
    write_children(element, config, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}
