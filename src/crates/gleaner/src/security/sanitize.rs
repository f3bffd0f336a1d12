//! Content sanitization for retrieved and crawled text.
//!
//! Strips active content (scripts, event handlers, dangerous URIs), hidden
//! text tricks (zero-width characters, CSS hiding), and normalizes
//! whitespace. Unicode is NOT normalized (no NFKC); only invisible
//! characters are removed.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Content type hint for sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Text,
}

fn invisible_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            "[\u{200b}-\u{200d}\u{2060}-\u{2064}\u{feff}\u{00ad}\u{034f}\u{061c}\
             \u{115f}\u{1160}\u{17b4}\u{17b5}\u{180e}\u{2000}-\u{200f}\u{2028}-\u{202f}\
             \u{205f}\u{206a}-\u{206f}]",
        )
        .expect("hard-coded regex")
    })
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)<(?:script|style|iframe|object|embed|form)[^>]*>.*?</(?:script|style|iframe|object|embed|form)>",
        )
        .expect("hard-coded regex")
    })
}

fn html_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("hard-coded regex"))
}

fn dangerous_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:data|javascript|vbscript):[^\s\)\]"]*"#).expect("hard-coded regex")
    })
}

fn event_handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\s+on\w+\s*=\s*["'][^"']*["']"#).expect("hard-coded regex")
    })
}

fn hidden_css_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)display\s*:\s*none|visibility\s*:\s*hidden|font-size\s*:\s*0|height\s*:\s*0|width\s*:\s*0|opacity\s*:\s*0|position\s*:\s*absolute\s*;\s*left\s*:\s*-9999",
        )
        .expect("hard-coded regex")
    })
}

fn style_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)style\s*=\s*["']([^"']*)["']"#).expect("hard-coded regex")
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("hard-coded regex"))
}

/// Remove zero-width and invisible Unicode characters.
pub fn strip_invisible(text: &str) -> String {
    invisible_re().replace_all(text, "").into_owned()
}

/// Remove script/style/iframe/object/embed/form tags and their content.
pub fn strip_scripts_and_style(html: &str) -> String {
    script_style_re().replace_all(html, " ").into_owned()
}

/// Remove HTML comments.
pub fn strip_html_comments(html: &str) -> String {
    html_comment_re().replace_all(html, " ").into_owned()
}

/// Neutralize data:, javascript:, vbscript: URIs.
pub fn strip_dangerous_uris(text: &str) -> String {
    dangerous_uri_re().replace_all(text, " [removed]").into_owned()
}

/// Remove on* event handler attributes.
pub fn strip_event_handlers(html: &str) -> String {
    event_handler_re().replace_all(html, "").into_owned()
}

/// Elide style attributes that hide content (display:none and friends).
pub fn strip_hidden_css(html: &str) -> String {
    style_attr_re()
        .replace_all(html, |caps: &regex::Captures| {
            if hidden_css_re().is_match(&caps[1]) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Sanitize retrieved content: strip scripts, hidden text, dangerous URIs,
/// normalize whitespace, truncate to `max_length`.
pub fn sanitize_content(content: &str, content_type: ContentType, max_length: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let mut out = if content.chars().count() > max_length {
        debug!(max_length, "Content truncated");
        let truncated: String = content.chars().take(max_length).collect();
        format!("{}...", truncated)
    } else {
        content.to_string()
    };

    out = strip_invisible(&out);

    if content_type == ContentType::Html {
        out = strip_scripts_and_style(&out);
        out = strip_html_comments(&out);
        out = strip_event_handlers(&out);
        out = strip_hidden_css(&out);
    }

    out = strip_dangerous_uris(&out);
    whitespace_re().replace_all(&out, " ").trim().to_string()
}

/// Sanitize text before sending it to a model: strips invisible characters
/// and dangerous URIs, truncates. Use together with
/// [`crate::security::wrap_untrusted_content`].
pub fn sanitize_for_llm(text: &str, max_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = strip_invisible(text);
    out = strip_dangerous_uris(&out);
    if out.chars().count() > max_length {
        let truncated: String = out.chars().take(max_length).collect();
        out = format!("{}...", truncated);
    }
    out.trim().to_string()
}
