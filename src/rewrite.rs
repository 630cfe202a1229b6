//! Body rewriting
//!
//! HTML goes through a streaming tokenizer (`lol_html`) and is rewritten per
//! element and attribute, so markup inside comments, scripts or unusual
//! quoting is left alone. CSS only needs its `url(...)` references fixed,
//! which a single regex handles.

use std::cell::Cell;
use std::sync::LazyLock;

use lol_html::errors::RewritingError;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use regex::{Captures, Regex};

use crate::model::RewriteContext;

/// Attributes whose root-relative values are made absolute
pub const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "poster", "data"];

/// Attributes whose protocol-relative values are pinned to https
pub const PROTOCOL_RELATIVE_ATTRIBUTES: &[&str] = &["href", "src"];

/// Script appended to every relayed document
///
/// Link clicks are caught in the capture phase and reported to the parent
/// frame as `{ type: 'navigate', url }` instead of navigating the iframe.
pub const CLICK_INTERCEPTOR: &str = r#"
    <script>
      document.addEventListener('click', function(e) {
        const link = e.target.closest('a');
        if (link && link.href && !link.href.startsWith('javascript:')) {
          e.preventDefault();
          window.parent.postMessage({ type: 'navigate', url: link.href }, '*');
        }
      }, true);
    </script>
  "#;

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(['"]?)(/[^'"\s)]*)(['"]?)\s*\)"#).expect("CSS url() pattern is valid")
});

/// Rewrites an HTML document so it works from inside the relay's iframe
///
/// Steps, in order:
/// 1. `<base href="{origin}/" target="_self">` is added as the first child of
///    `<head>` unless the document already has a `<base>`
/// 2. `href`/`src` values starting with `//` are pinned to `https:`
/// 3. root-relative values of [`URL_ATTRIBUTES`] are prefixed with the origin
/// 4. root-relative `srcset` candidates are prefixed with the origin
/// 5. `<meta http-equiv="Content-Security-Policy">` tags are dropped
/// 6. [`CLICK_INTERCEPTOR`] goes in before `</body>`, or at the end
///
/// The interceptor is inserted after the tokenizer pass, so none of the
/// URL rules ever touch it.
pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> Result<String, RewritingError> {
    let base_tag = format!(r#"<base href="{}/" target="_self">"#, ctx.origin());
    let base_done = Cell::new(has_base_tag(html)?);

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("head", |el| {
                    if !base_done.replace(true) {
                        el.prepend(&base_tag, ContentType::Html);
                    }
                    Ok(())
                }),
                element!("meta[http-equiv]", |el| {
                    let is_csp = el
                        .get_attribute("http-equiv")
                        .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-security-policy"));
                    if is_csp {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("*", |el| {
                    for name in URL_ATTRIBUTES.iter().copied().chain(["srcset"]) {
                        let Some(value) = el.get_attribute(name) else {
                            continue;
                        };
                        if let Some(rewritten) = rewrite_attribute(name, &value, ctx) {
                            el.set_attribute(name, &rewritten)?;
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;

    Ok(inject_click_interceptor(&rewritten))
}

/// `true` when the document has a `<base>` element anywhere
fn has_base_tag(html: &str) -> Result<bool, RewritingError> {
    let found = Cell::new(false);
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("base", |_el| {
                found.set(true);
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )?;
    Ok(found.get())
}

/// New value for a URL-carrying attribute, or `None` to leave it as is
pub fn rewrite_attribute(name: &str, value: &str, ctx: &RewriteContext) -> Option<String> {
    if name.eq_ignore_ascii_case("srcset") {
        let rewritten = rewrite_srcset(value, ctx);
        return (rewritten != value).then_some(rewritten);
    }

    let is_protocol_relative_attr = PROTOCOL_RELATIVE_ATTRIBUTES
        .iter()
        .any(|attr| attr.eq_ignore_ascii_case(name));
    if is_protocol_relative_attr && value.starts_with("//") {
        return Some(format!("https:{value}"));
    }

    let is_url_attr = URL_ATTRIBUTES.iter().any(|attr| attr.eq_ignore_ascii_case(name));
    if is_url_attr {
        return ctx.absolutize(value);
    }

    None
}

/// Prefixes root-relative `srcset` candidates with the origin
///
/// Candidates are split the way browsers split them: the URL runs up to the
/// first whitespace (so `data:` URLs may contain commas) and descriptors run
/// up to the next comma. The result is re-joined with `", "`.
pub fn rewrite_srcset(srcset: &str, ctx: &RewriteContext) -> String {
    let mut candidates: Vec<String> = Vec::new();
    let mut rest = srcset;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let (raw_url, after) = rest.split_at(url_end);

        // A URL directly followed by a comma has no descriptors
        let (url, descriptors, remainder) = if raw_url.ends_with(',') {
            (raw_url.trim_end_matches(','), "", after)
        } else {
            let desc_end = after.find(',').unwrap_or(after.len());
            (raw_url, after[..desc_end].trim(), &after[desc_end..])
        };
        rest = remainder;

        let url = ctx.absolutize(url).unwrap_or_else(|| url.to_string());
        if descriptors.is_empty() {
            candidates.push(url);
        } else {
            candidates.push(format!("{url} {descriptors}"));
        }
    }

    candidates.join(", ")
}

/// Places [`CLICK_INTERCEPTOR`] before the last `</body>`, or appends it
pub fn inject_click_interceptor(html: &str) -> String {
    let lowered = html.to_ascii_lowercase();
    let close_body = lowered.rmatch_indices("</body").map(|(pos, _)| pos).find(|&pos| {
        matches!(
            lowered.as_bytes().get(pos + "</body".len()).copied(),
            Some(b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
        )
    });

    match close_body {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + CLICK_INTERCEPTOR.len());
            out.push_str(&html[..pos]);
            out.push_str(CLICK_INTERCEPTOR);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{CLICK_INTERCEPTOR}"),
    }
}

/// Makes root-relative `url(...)` references in a stylesheet absolute
///
/// Quote style is kept; protocol-relative and absolute URLs are untouched.
pub fn rewrite_css(css: &str, ctx: &RewriteContext) -> String {
    CSS_URL
        .replace_all(css, |caps: &Captures| {
            let quote = &caps[1];
            match ctx.absolutize(&caps[2]) {
                Some(absolute) => format!("url({quote}{absolute}{quote})"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
