//! Site building orchestration.
//!
//! [`BuildContext`] owns the page compiler (and with it the template cache)
//! and dispatches [`Task`]s from a [`TaskGraph`] to the individual
//! compilers. A full build runs `clean → pages → decode → styles → images →
//! inline`; watch mode reuses the same dispatcher for its per-trigger chains.

use crate::{
    compiler::{decode, images, inline, pages::PageCompiler, styles},
    config::SiteConfig,
    log,
    tasks::{Task, TaskGraph},
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;

/// Shared state threaded through every task execution.
pub struct BuildContext {
    pub config: &'static SiteConfig,
    /// Page compiler and its template cache. Watch pipelines on separate
    /// threads share it, hence the lock.
    pages: Mutex<PageCompiler>,
}

impl BuildContext {
    pub fn new(config: &'static SiteConfig) -> Result<Self> {
        Ok(Self {
            config,
            pages: Mutex::new(PageCompiler::new(config)?),
        })
    }

    /// Execute a task graph in dependency order.
    ///
    /// Each task completes fully (files flushed) before the next starts;
    /// later tasks read what earlier ones wrote.
    pub fn run(&self, graph: &TaskGraph) -> Result<()> {
        for task in graph.execution_order()? {
            self.run_task(task)
                .with_context(|| format!("task `{task}` failed"))?;
        }
        Ok(())
    }

    /// Dispatch a single named task.
    fn run_task(&self, task: Task) -> Result<()> {
        match task {
            Task::Clean => clean_output(self.config),
            Task::Refresh => self.pages.lock().refresh(self.config),
            Task::Pages => self.pages.lock().compile_all(self.config).map(|_| ()),
            Task::Decode => decode::decode_output(self.config).map(|_| ()),
            Task::Styles => styles::compile_styles(self.config).map(|_| ()),
            Task::Images => images::process_images(self.config).map(|_| ()),
            Task::Inline => inline::inline_output(self.config).map(|_| ()),
        }
    }
}

/// Build the entire site from scratch.
pub fn build_site(ctx: &BuildContext) -> Result<()> {
    ctx.run(&TaskGraph::full_build())?;
    log!("build"; "done");
    Ok(())
}

/// Delete and recreate the output directory.
fn clean_output(config: &SiteConfig) -> Result<()> {
    let output = &config.build.output;
    if output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear output directory: {}", output.display()))?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn leak(config: SiteConfig) -> &'static SiteConfig {
        Box::leak(Box::new(config))
    }

    fn site(dir: &TempDir, production: bool) -> &'static SiteConfig {
        let root = dir.path();
        for sub in [
            "src/pages",
            "src/layouts",
            "src/partials",
            "src/assets/scss",
            "src/assets/img",
        ] {
            fs::create_dir_all(root.join(sub)).unwrap();
        }
        fs::write(
            root.join("src/layouts/default.html"),
            "<html><body>{{ body | safe }}<!-- <style> --></body></html>",
        )
        .unwrap();
        fs::write(
            root.join("src/pages/index.html"),
            "<div class=\"btn\">Hi &amp; bye</div>",
        )
        .unwrap();
        fs::write(
            root.join("src/assets/scss/app.scss"),
            "@media (max-width:480px){.btn{width:100%}} .btn{color:red}",
        )
        .unwrap();

        let mut config = SiteConfig::default();
        config.build.pages = root.join("src/pages");
        config.build.layouts = root.join("src/layouts");
        config.build.partials = root.join("src/partials");
        config.build.images = root.join("src/assets/img");
        config.build.output = root.join("dist");
        config.build.styles.entry = root.join("src/assets/scss/app.scss");
        config.build.production = production;
        leak(config)
    }

    fn tree_snapshot(root: &Path) -> Vec<(std::path::PathBuf, Vec<u8>)> {
        crate::compiler::collect_all_files(root)
            .into_iter()
            .map(|p| {
                let data = fs::read(&p).unwrap();
                (p.strip_prefix(root).unwrap().to_path_buf(), data)
            })
            .collect()
    }

    #[test]
    fn test_development_build_leaves_raw_html() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir, false);

        let ctx = BuildContext::new(config).unwrap();
        build_site(&ctx).unwrap();

        let html = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        // entities decoded, but no inlining in dev mode
        assert!(html.contains("Hi & bye"));
        assert!(html.contains(inline::STYLE_PLACEHOLDER));
        assert!(!html.contains("style=\"color"));
        assert!(config.build.output.join("css/app.css").is_file());
    }

    #[test]
    fn test_production_build_inlines_and_injects_media_css() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir, true);

        let ctx = BuildContext::new(config).unwrap();
        build_site(&ctx).unwrap();

        let html = fs::read_to_string(config.build.output.join("index.html")).unwrap();
        assert!(html.contains("color:red") || html.contains("color: red"));
        assert!(html.contains("@media"));
        assert!(!html.contains(inline::STYLE_PLACEHOLDER));
    }

    #[test]
    fn test_clean_removes_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir, false);
        fs::create_dir_all(&config.build.output).unwrap();
        fs::write(config.build.output.join("stale.html"), "old").unwrap();

        let ctx = BuildContext::new(config).unwrap();
        build_site(&ctx).unwrap();

        assert!(!config.build.output.join("stale.html").exists());
        assert!(config.build.output.join("index.html").is_file());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir, true);

        let ctx = BuildContext::new(config).unwrap();
        build_site(&ctx).unwrap();
        let first = tree_snapshot(&config.build.output);

        fs::remove_dir_all(&config.build.output).unwrap();
        build_site(&ctx).unwrap();
        let second = tree_snapshot(&config.build.output);

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_layout_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(&dir, false);
        fs::write(
            config.build.pages.join("broken.html"),
            "---\nlayout: ghost\n---\nx",
        )
        .unwrap();

        let ctx = BuildContext::new(config).unwrap();
        let err = build_site(&ctx).unwrap_err();

        assert!(format!("{err:#}").contains("broken.html"));
    }
}
