//! CSS inlining for email clients (production only).
//!
//! Many email clients strip `<style>` blocks or ignore class selectors, so a
//! production build moves every non-media CSS declaration into the matching
//! elements' `style` attributes. Media-query rules cannot be flattened into
//! inline styles; they are extracted from the compiled CSS and re-injected as
//! a `<style>` block wherever a page carries the literal
//! `<!-- <style> -->` marker. The result is minified.

use crate::compiler::collect_html_files;
use crate::config::SiteConfig;
use crate::log;
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::fs;

/// Marker replaced with the media-query `<style>` block.
pub const STYLE_PLACEHOLDER: &str = "<!-- <style> -->";

/// Inline the compiled CSS into every output HTML file.
///
/// No-op outside production mode: development preview serves the raw HTML
/// and stylesheet untouched. Returns the number of files processed.
pub fn inline_output(config: &SiteConfig) -> Result<usize> {
    if !config.build.production {
        log!("inline"; "skipped (development mode)");
        return Ok(0);
    }

    let css_path = config.build.output.join(&config.build.styles.output);
    let css = fs::read_to_string(&css_path)
        .with_context(|| format!("Failed to read {}", css_path.display()))?;
    let (media_css, inline_css) = extract_media_css(&css);

    let files = collect_html_files(&config.build.output);
    files.par_iter().try_for_each(|path| {
        let html = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let result = inline_html(&html, &inline_css, &media_css, config.build.minify)
            .with_context(|| format!("Failed to inline {}", path.display()))?;
        fs::write(path, result).with_context(|| format!("Failed to write {}", path.display()))
    })?;

    log!("inline"; "inlined css into {} files", files.len());
    Ok(files.len())
}

/// Inline one HTML document.
///
/// Non-media declarations are merged into matching elements' `style`
/// attributes (an existing `style` attribute wins on conflict); the marker,
/// if present, becomes a `<style>` block carrying the media-query CSS.
pub fn inline_html(html: &str, inline_css: &str, media_css: &str, minify: bool) -> Result<String> {
    let inliner = css_inline::CSSInliner::options()
        .inline_style_tags(false)
        .extra_css(Some(inline_css.into()))
        .build();
    let inlined = inliner
        .inline(html)
        .map_err(|err| anyhow!("css inlining failed: {err}"))?;

    // Marker absent: injection is a no-op, the rest still applies.
    let injected = if inlined.contains(STYLE_PLACEHOLDER) {
        inlined.replace(STYLE_PLACEHOLDER, &format!("<style>{media_css}</style>"))
    } else {
        inlined
    };

    if minify {
        Ok(String::from_utf8(minify_html(injected.as_bytes()))?)
    } else {
        Ok(injected)
    }
}

/// Minify HTML content using the `minify_html` crate.
fn minify_html(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    minify_html::minify(html, &cfg)
}

/// Split a stylesheet into its `@media` blocks and everything else.
///
/// Returns `(media_css, inline_css)`: the former is every top-level `@media`
/// rule concatenated in source order, the latter is the remaining rules —
/// the set eligible for inlining. The scanner is brace-matching and aware of
/// comments and quoted strings; it never fails on malformed CSS, it just
/// stops classifying at the end of input.
pub fn extract_media_css(css: &str) -> (String, String) {
    let mut media = String::new();
    let mut rest = String::new();
    let bytes = css.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // comments belong to the surrounding set verbatim
        if bytes[i..].starts_with(b"/*") {
            let end = find_from(css, i + 2, "*/").map_or(css.len(), |p| p + 2);
            rest.push_str(&css[i..end]);
            i = end;
            continue;
        }

        if css[i..].starts_with("@media") {
            let end = block_end(css, i);
            media.push_str(css[i..end].trim_end());
            media.push('\n');
            i = end;
            continue;
        }

        // quoted strings belong to the surrounding set verbatim, so an
        // "@media" inside one never starts a block
        if bytes[i] == b'"' || bytes[i] == b'\'' {
            let end = string_end(bytes, i);
            rest.push_str(&css[i..end]);
            i = end;
            continue;
        }

        rest.push(css[i..].chars().next().unwrap_or('\0'));
        i += css[i..].chars().next().map_or(1, char::len_utf8);
    }

    (media.trim().to_string(), rest.trim().to_string())
}

/// Find the end (exclusive) of the block starting at `start`.
///
/// Scans to the brace matching the first `{`, skipping strings and comments.
/// Unbalanced input yields the end of the string.
fn block_end(css: &str, start: usize) -> usize {
    let bytes = css.as_bytes();
    let mut depth = 0usize;
    let mut seen_open = false;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes[i..].starts_with(b"/*") => {
                i = find_from(css, i + 2, "*/").map_or(css.len(), |p| p + 2);
                continue;
            }
            b'"' | b'\'' => {
                i = string_end(bytes, i);
                continue;
            }
            b'{' => {
                depth += 1;
                seen_open = true;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if seen_open && depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    css.len()
}

/// End (exclusive) of the quoted string starting at `start`, honoring
/// backslash escapes. Unterminated strings run to the end of input.
fn string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() && bytes[i] != quote {
        i += if bytes[i] == b'\\' { 2 } else { 1 };
    }
    (i + 1).min(bytes.len())
}

/// Byte offset of `needle` in `haystack` at or after `from`.
fn find_from(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    haystack
        .get(from..)
        .and_then(|s| s.find(needle))
        .map(|p| p + from)
}
