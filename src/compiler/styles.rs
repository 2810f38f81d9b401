//! Sass compilation.
//!
//! One entry stylesheet (which imports the rest of the style tree, including
//! any vendored email framework on `load_paths`) compiles to a single CSS
//! file in the output tree. Development builds emit expanded CSS for
//! debugging; production builds emit compressed CSS.
//!
//! On a compile error the previous CSS output is left untouched — the file is
//! only written after a successful compile — so watch mode can keep serving
//! the last good stylesheet.

use crate::config::SiteConfig;
use crate::log;
use anyhow::{Context, Result, anyhow};
use grass::OutputStyle;
use std::fs;
use std::path::PathBuf;

/// Compile the stylesheet entry point into the output tree.
///
/// Returns the path of the written CSS file. The error message of a failed
/// compile carries the Sass compiler's file/line diagnostics.
pub fn compile_styles(config: &SiteConfig) -> Result<PathBuf> {
    let entry = &config.build.styles.entry;

    let style = if config.build.production {
        OutputStyle::Compressed
    } else {
        OutputStyle::Expanded
    };

    let mut options = grass::Options::default().style(style);
    for path in &config.build.styles.load_paths {
        options = options.load_path(path);
    }

    let css = grass::from_path(entry, &options)
        .map_err(|err| anyhow!("sass compile failed:\n{err}"))?;

    let out_path = config.build.output.join(&config.build.styles.output);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&out_path, &css)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    log!("styles"; "{} -> {}", entry.display(), out_path.display());
    Ok(out_path)
}
