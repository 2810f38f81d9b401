//! HTML entity decoding.
//!
//! Email templates frequently arrive with character references
//! (`&copy;`, `&#8212;`, …) that render fine in browsers but trip up some
//! email clients and diff tooling. After page compilation every output HTML
//! file is rewritten with all entities resolved to literal characters.
//! The decoder is permissive: malformed sequences pass through untouched.

use crate::compiler::collect_html_files;
use crate::config::SiteConfig;
use crate::log;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs;

/// Decode entities in every HTML file under the output tree, in place.
///
/// Returns the number of files actually rewritten.
pub fn decode_output(config: &SiteConfig) -> Result<usize> {
    let mut changed = 0;

    for path in collect_html_files(&config.build.output) {
        let html = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if let Cow::Owned(decoded) = decode_entities(&html) {
            fs::write(&path, decoded)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            changed += 1;
        }
    }

    log!("decode"; "decoded entities in {changed} files");
    Ok(changed)
}

/// Resolve every named/numeric character reference to its literal character.
///
/// Already-literal text is returned borrowed and unchanged.
pub fn decode_entities(html: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(html)
}
