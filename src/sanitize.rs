//! Comment content sanitizing.
//!
//! Comments keep a small set of formatting tags. Everything executable is
//! dropped before the content is persisted: script and style blocks with
//! their bodies, embedding tags, event-handler attributes and script URLs.
//! Angle brackets outside a rebuilt tag are escaped, so text left around a
//! removed tag can never close up into a new one.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Content sanitizer collaborator.
pub trait Sanitizer {
    fn clean(&self, raw: &str) -> String;
}

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "em", "i", "li", "ol", "p", "pre", "strong", "u", "ul",
];

const SAFE_URL_PREFIXES: &[&str] = &["http://", "https://", "mailto:", "/", "#"];

struct Patterns {
    blocks: Regex,
    tags: Regex,
    href: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        blocks: Regex::new(r"(?is)<\s*(script|style)\b[^>]*>.*?<\s*/\s*(script|style)\s*>").unwrap(),
        tags: Regex::new(r"(?is)<\s*(/?)\s*([a-z][a-z0-9]*)\b([^>]*)>").unwrap(),
        href: Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap(),
    })
}

fn push_escaped(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn is_safe_url(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    SAFE_URL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Keeps a limited markup vocabulary and strips attributes from it, except a
/// safe `href` on links.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupSanitizer;

impl MarkupSanitizer {
    fn rebuild_tag(caps: &Captures<'_>) -> String {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return String::new();
        }
        if closing {
            return format!("</{name}>");
        }
        if name == "a" {
            let href = patterns().href.captures(&caps[3]).and_then(|h| {
                h.get(1)
                    .or_else(|| h.get(2))
                    .or_else(|| h.get(3))
                    .map(|m| m.as_str().to_string())
            });
            if let Some(url) = href.filter(|u| is_safe_url(u)) {
                let url = url.replace('"', "&quot;").replace('<', "&lt;");
                return format!("<a href=\"{url}\">");
            }
        }
        format!("<{name}>")
    }
}

impl Sanitizer for MarkupSanitizer {
    fn clean(&self, raw: &str) -> String {
        let p = patterns();
        let text = p.blocks.replace_all(raw, "");
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in p.tags.captures_iter(&text) {
            let Some(tag) = caps.get(0) else { continue };
            push_escaped(&text[last..tag.start()], &mut out);
            out.push_str(&Self::rebuild_tag(&caps));
            last = tag.end();
        }
        push_escaped(&text[last..], &mut out);
        out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("plain text", "plain text")]
    #[case("<b>bold</b> move", "<b>bold</b> move")]
    #[case("hi<script>alert('x')</script>there", "hithere")]
    #[case("<SCRIPT type=\"text/javascript\">evil()</SCRIPT>ok", "ok")]
    #[case("<style>body{display:none}</style>styled", "styled")]
    #[case("<img src=x onerror=alert(1)>image", "image")]
    #[case("<p onclick=\"steal()\">para</p>", "<p>para</p>")]
    #[case("<iframe src=\"https://evil\"></iframe>frame", "frame")]
    #[case(
        "<a href=\"https://example.com\" onmouseover=\"x()\">link</a>",
        "<a href=\"https://example.com\">link</a>"
    )]
    #[case("<a href=\"javascript:alert(1)\">link</a>", "<a>link</a>")]
    #[case("<<x>script>alert(1)<<x>/script>", "&lt;script&gt;alert(1)&lt;/script&gt;")]
    #[case("<<x>img src=x onerror=alert(1)>", "&lt;img src=x onerror=alert(1)&gt;")]
    #[case("<scr<script></script>ipt>alert(1)", "alert(1)")]
    #[case("1 < 2 > 0", "1 &lt; 2 &gt; 0")]
    fn test_clean(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(MarkupSanitizer.clean(raw), expected);
    }
}
