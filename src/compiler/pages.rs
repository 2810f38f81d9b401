//! Page compilation: templates in, flat HTML out.
//!
//! Layouts and partials are parsed once into a [`tera::Tera`] instance — the
//! template cache. Pages render in two stages: the page body first (so
//! `{% include "partials/…" %}` resolves), then the chosen layout with the
//! body bound to `body`. The cache never watches the filesystem; callers
//! invalidate it explicitly with [`PageCompiler::refresh`] when a layout or
//! partial changes on disk.

use crate::compiler::collect_all_files;
use crate::config::SiteConfig;
use crate::log;
use anyhow::Result;
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tera::Tera;
use thiserror::Error;

/// Page compilation errors. Every variant names the offending page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("page `{page}` references missing layout `{layout}`")]
    MissingLayout { page: PathBuf, layout: String },

    #[error("failed to render page `{page}`: {source}")]
    Render {
        page: PathBuf,
        #[source]
        source: tera::Error,
    },

    #[error("failed to load templates from `{dir}`: {source}")]
    LoadTemplates {
        dir: PathBuf,
        #[source]
        source: tera::Error,
    },
}

/// Renders page templates against cached layouts and partials.
pub struct PageCompiler {
    tera: Tera,
}

impl PageCompiler {
    /// Parse all layouts and partials from disk.
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Ok(Self {
            tera: load_templates(config)?,
        })
    }

    /// Drop the template cache and re-read layouts/partials from disk.
    ///
    /// Required after out-of-process edits to layout or partial files; the
    /// cache does not observe the filesystem on its own.
    pub fn refresh(&mut self, config: &SiteConfig) -> Result<()> {
        self.tera = load_templates(config)?;
        Ok(())
    }

    /// Compile every page template into the output tree.
    ///
    /// Returns the number of pages written. Any page failure aborts with an
    /// error naming that page; no partial file is left behind for it.
    pub fn compile_all(&self, config: &SiteConfig) -> Result<usize> {
        let pages = collect_all_files(&config.build.pages);

        pages
            .par_iter()
            .try_for_each(|path| self.compile_page(path, config).map(|_| ()))?;

        log!("pages"; "compiled {} pages", pages.len());
        Ok(pages.len())
    }

    /// Compile a single page template. Returns the written output path.
    pub fn compile_page(&self, path: &Path, config: &SiteConfig) -> Result<PathBuf> {
        let rel = path
            .strip_prefix(&config.build.pages)
            .unwrap_or(path)
            .to_path_buf();
        let source = fs::read_to_string(path)?;
        let (layout, body) = split_front_matter(&source, &config.build.default_layout);

        let html = self.render_page(&rel, layout, body)?;

        let out_path = config.build.output.join(rel.with_extension("html"));
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, html)?;

        Ok(out_path)
    }

    /// Render a page body, then wrap it in its layout.
    fn render_page(&self, page: &Path, layout: &str, body: &str) -> Result<String> {
        // Pages get a private clone so includes resolve against the cache
        // without mutating it.
        let mut tera = self.tera.clone();
        let page_name = format!("pages/{}", page.display());
        tera.add_raw_template(&page_name, body)
            .map_err(|source| PageError::Render {
                page: page.to_path_buf(),
                source,
            })?;

        let body_html = tera
            .render(&page_name, &tera::Context::new())
            .map_err(|source| PageError::Render {
                page: page.to_path_buf(),
                source,
            })?;

        // A page that extends a layout itself needs no wrapping.
        if body.contains("{% extends") {
            return Ok(body_html);
        }

        let layout_name = format!("layouts/{layout}.html");
        if !self.tera.get_template_names().any(|n| n == layout_name) {
            return Err(PageError::MissingLayout {
                page: page.to_path_buf(),
                layout: layout.to_string(),
            }
            .into());
        }

        let mut context = tera::Context::new();
        context.insert("body", &body_html);
        let html = tera
            .render(&layout_name, &context)
            .map_err(|source| PageError::Render {
                page: page.to_path_buf(),
                source,
            })?;

        Ok(html)
    }
}

/// Load layouts and partials into a fresh Tera instance.
///
/// Templates are registered as `layouts/<rel>` and `partials/<rel>` so pages
/// reference them by stable, directory-prefixed names.
fn load_templates(config: &SiteConfig) -> Result<Tera> {
    let mut tera = Tera::default();

    for (prefix, dir) in [
        ("layouts", &config.build.layouts),
        ("partials", &config.build.partials),
    ] {
        for path in collect_all_files(dir) {
            let rel = path.strip_prefix(dir).unwrap_or(&path);
            let name = format!("{prefix}/{}", rel.display());
            tera.add_template_file(&path, Some(&name))
                .map_err(|source| PageError::LoadTemplates {
                    dir: dir.clone(),
                    source,
                })?;
        }
    }

    Ok(tera)
}

/// Split an optional `---\nlayout: name\n---` front-matter block.
///
/// Returns the layout name (or the default) and the template body.
fn split_front_matter<'a>(source: &'a str, default_layout: &'a str) -> (&'a str, &'a str) {
    let Some(rest) = source.strip_prefix("---") else {
        return (default_layout, source);
    };
    let Some((matter, body)) = rest.split_once("\n---") else {
        return (default_layout, source);
    };

    let layout = matter
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "layout")
        .map_or(default_layout, |(_, value)| value.trim());

    (layout, body.trim_start_matches(['\r', '\n']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site(dir: &TempDir) -> SiteConfig {
        let root = dir.path();
        for sub in ["pages", "layouts", "partials", "dist"] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        fs::write(
            root.join("layouts/default.html"),
            "<html><body>{{ body | safe }}</body></html>",
        )
        .unwrap();

        let mut config = SiteConfig::default();
        config.build.pages = root.join("pages");
        config.build.layouts = root.join("layouts");
        config.build.partials = root.join("partials");
        config.build.output = root.join("dist");
        config
    }

    #[test]
    fn test_output_count_matches_page_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(dir.path().join("pages/a.html"), "<p>A</p>").unwrap();
        fs::write(dir.path().join("pages/b.html"), "<p>B</p>").unwrap();
        fs::create_dir_all(dir.path().join("pages/nested")).unwrap();
        fs::write(dir.path().join("pages/nested/c.html"), "<p>C</p>").unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        let count = compiler.compile_all(&config).unwrap();

        assert_eq!(count, 3);
        assert!(config.build.output.join("a.html").is_file());
        assert!(config.build.output.join("b.html").is_file());
        // nested pages mirror their relative path
        assert!(config.build.output.join("nested/c.html").is_file());
    }

    #[test]
    fn test_extension_normalized_to_html() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(dir.path().join("pages/letter.htm"), "<p>Hi</p>").unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        compiler.compile_all(&config).unwrap();

        assert!(config.build.output.join("letter.html").is_file());
    }

    #[test]
    fn test_layout_wraps_body() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(dir.path().join("pages/index.html"), "<p>Hello</p>").unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        compiler.compile_all(&config).unwrap();

        let html = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        assert_eq!(html, "<html><body><p>Hello</p></body></html>");
    }

    #[test]
    fn test_front_matter_selects_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(
            dir.path().join("layouts/bare.html"),
            "<main>{{ body | safe }}</main>",
        )
        .unwrap();
        fs::write(
            dir.path().join("pages/index.html"),
            "---\nlayout: bare\n---\n<p>Hello</p>",
        )
        .unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        compiler.compile_all(&config).unwrap();

        let html = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        assert_eq!(html, "<main><p>Hello</p></main>");
    }

    #[test]
    fn test_partials_resolve_in_pages() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(dir.path().join("partials/header.html"), "<h1>Head</h1>").unwrap();
        fs::write(
            dir.path().join("pages/index.html"),
            r#"{% include "partials/header.html" %}<p>Body</p>"#,
        )
        .unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        compiler.compile_all(&config).unwrap();

        let html = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        assert!(html.contains("<h1>Head</h1><p>Body</p>"));
    }

    #[test]
    fn test_missing_layout_names_page_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(
            dir.path().join("pages/broken.html"),
            "---\nlayout: nope\n---\n<p>x</p>",
        )
        .unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        let err = compiler.compile_all(&config).unwrap_err();

        assert!(err.to_string().contains("broken.html"));
        assert!(err.to_string().contains("nope"));
        assert!(!config.build.output.join("broken.html").exists());
    }

    #[test]
    fn test_missing_partial_names_page() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(
            dir.path().join("pages/broken.html"),
            r#"{% include "partials/ghost.html" %}"#,
        )
        .unwrap();

        let compiler = PageCompiler::new(&config).unwrap();
        let err = compiler.compile_all(&config).unwrap_err();

        assert!(err.to_string().contains("broken.html"));
        assert!(!config.build.output.join("broken.html").exists());
    }

    #[test]
    fn test_refresh_picks_up_edited_partial() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir);
        fs::write(dir.path().join("partials/note.html"), "old").unwrap();
        fs::write(
            dir.path().join("pages/index.html"),
            r#"{% include "partials/note.html" %}"#,
        )
        .unwrap();

        let mut compiler = PageCompiler::new(&config).unwrap();
        compiler.compile_all(&config).unwrap();
        let first = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        assert!(first.contains("old"));

        // edit on disk, then invalidate the cache
        fs::write(dir.path().join("partials/note.html"), "new").unwrap();
        compiler.refresh(&config).unwrap();
        compiler.compile_all(&config).unwrap();

        let second = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        assert!(second.contains("new"));
    }

    #[test]
    fn test_split_front_matter() {
        assert_eq!(
            split_front_matter("---\nlayout: x\n---\nbody", "default"),
            ("x", "body")
        );
        assert_eq!(
            split_front_matter("no matter here", "default"),
            ("default", "no matter here")
        );
        // unterminated front matter treated as plain body
        assert_eq!(
            split_front_matter("---\nlayout: x\nbody", "default"),
            ("default", "---\nlayout: x\nbody")
        );
    }
}
