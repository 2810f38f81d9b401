//! File system watcher for live rebuild.
//!
//! Monitors the page, layout/partial, stylesheet and image directories and
//! re-runs the minimal pipeline for whatever changed:
//!
//! | trigger           | pipeline                                       |
//! |-------------------|------------------------------------------------|
//! | pages             | pages → decode → inline → reload               |
//! | layouts/partials  | refresh → pages → decode → inline → reload     |
//! | styles            | styles → pages → decode → inline → reload      |
//! | images            | images → reload                                |
//!
//! Each category gets its own worker thread fed by an mpsc channel: a
//! pipeline runs to completion before its category accepts the next batch,
//! and triggers landing mid-build queue up (and coalesce) instead of
//! interrupting. Different categories may rebuild concurrently, but the
//! three HTML-writing pipelines share output files, so those serialize on a
//! common lock; the image pipeline writes a disjoint subtree and runs free.

use crate::{
    build::BuildContext,
    config::SiteConfig,
    log,
    reload::ReloadHub,
    tasks::{Task, TaskGraph},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::{
    env,
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Watch Categories
// =============================================================================

/// A watched source category with its own rebuild pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchCategory {
    Pages,
    Layouts,
    Styles,
    Images,
}

impl WatchCategory {
    pub const ALL: [Self; 4] = [Self::Pages, Self::Layouts, Self::Styles, Self::Images];

    /// Short name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pages => "pages",
            Self::Layouts => "layouts",
            Self::Styles => "styles",
            Self::Images => "images",
        }
    }

    /// Source directories belonging to this category.
    pub fn paths(self, config: &SiteConfig) -> Vec<PathBuf> {
        match self {
            Self::Pages => vec![config.build.pages.clone()],
            Self::Layouts => vec![config.build.layouts.clone(), config.build.partials.clone()],
            Self::Styles => config
                .build
                .styles
                .entry
                .parent()
                .map(Path::to_path_buf)
                .into_iter()
                .collect(),
            Self::Images => vec![config.build.images.clone()],
        }
    }

    /// The rebuild pipeline triggered by changes in this category.
    pub fn pipeline(self) -> TaskGraph {
        match self {
            Self::Pages => TaskGraph::chain(&[Task::Pages, Task::Decode, Task::Inline]),
            Self::Layouts => TaskGraph::chain(&[
                Task::Refresh,
                Task::Pages,
                Task::Decode,
                Task::Inline,
            ]),
            Self::Styles => TaskGraph::chain(&[
                Task::Styles,
                Task::Pages,
                Task::Decode,
                Task::Inline,
            ]),
            Self::Images => TaskGraph::chain(&[Task::Images]),
        }
    }

    /// Whether this category's pipeline rewrites the shared output HTML.
    const fn writes_html(self) -> bool {
        !matches!(self, Self::Images)
    }
}

/// Map a changed path to its watch category, if any.
pub fn categorize_path(path: &Path, config: &SiteConfig) -> Option<WatchCategory> {
    let path = normalize_path(path);
    WatchCategory::ALL
        .into_iter()
        .find(|cat| cat.paths(config).iter().any(|dir| path.starts_with(dir)))
}

/// Normalize a path to absolute form for reliable comparison.
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events before dispatching a rebuild.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Workers
// =============================================================================

/// Per-category rebuild queue: one worker thread, one trigger channel.
struct Worker {
    category: WatchCategory,
    trigger: mpsc::Sender<()>,
}

fn spawn_workers(
    ctx: &Arc<BuildContext>,
    reload: &Arc<ReloadHub>,
    html_lock: &Arc<Mutex<()>>,
) -> Vec<Worker> {
    WatchCategory::ALL
        .into_iter()
        .map(|category| {
            let (trigger, rx) = mpsc::channel::<()>();
            let ctx = Arc::clone(ctx);
            let reload = Arc::clone(reload);
            let html_lock = Arc::clone(html_lock);

            thread::spawn(move || {
                while rx.recv().is_ok() {
                    // coalesce triggers that queued up during the last run
                    while rx.try_recv().is_ok() {}

                    let _guard = category.writes_html().then(|| html_lock.lock());
                    log!("watch"; "{} changed, rebuilding...", category.name());

                    match ctx.run(&category.pipeline()) {
                        Ok(()) => reload.notify(),
                        Err(err) => log!("watch"; "{} rebuild failed: {err:#}", category.name()),
                    }
                }
            });

            Worker { category, trigger }
        })
        .collect()
}

// =============================================================================
// Watcher Setup & Event Loop
// =============================================================================

fn setup_watchers(watcher: &mut impl Watcher, config: &SiteConfig) -> Result<()> {
    let mut watched = Vec::new();

    for cat in WatchCategory::ALL {
        for path in cat.paths(config) {
            if path.exists() {
                watcher
                    .watch(&path, RecursiveMode::Recursive)
                    .with_context(|| {
                        format!("Failed to watch {}: {}", cat.name(), path.display())
                    })?;
                watched.push(format!("{}/", path.display()));
            }
        }
    }

    log!("watch"; "watching: {}", watched.join(", "));
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(
    config: &'static SiteConfig,
    ctx: Arc<BuildContext>,
    reload: Arc<ReloadHub>,
) -> Result<()> {
    if !config.serve.watch {
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, config)?;

    let html_lock = Arc::new(Mutex::new(()));
    let workers = spawn_workers(&ctx, &reload, &html_lock);

    let mut debouncer = Debouncer::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                dispatch_changes(&debouncer.take(), config, &workers);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
            // Other cases: irrelevant events, timeout without ready, etc.
            _ => {}
        }
    }

    Ok(())
}

/// Queue a rebuild on every category touched by the changed paths.
fn dispatch_changes(paths: &[PathBuf], config: &SiteConfig, workers: &[Worker]) {
    let mut triggered = FxHashSet::default();
    for path in paths {
        if let Some(cat) = categorize_path(path, config) {
            triggered.insert(cat);
        }
    }

    for worker in workers {
        if triggered.contains(&worker.category) {
            worker.trigger.send(()).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn site() -> (tempfile::TempDir, SiteConfig) {
        let dir = tempfile::tempdir().unwrap();
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

        let mut config = SiteConfig::default();
        config.build.pages = root.join("src/pages");
        config.build.layouts = root.join("src/layouts");
        config.build.partials = root.join("src/partials");
        config.build.images = root.join("src/assets/img");
        config.build.output = root.join("dist");
        config.build.styles.entry = root.join("src/assets/scss/app.scss");
        (dir, config)
    }

    #[test]
    fn test_categorize_paths() {
        let (dir, config) = site();
        let root = dir.path();

        assert_eq!(
            categorize_path(&root.join("src/pages/letter.html"), &config),
            Some(WatchCategory::Pages)
        );
        assert_eq!(
            categorize_path(&root.join("src/layouts/default.html"), &config),
            Some(WatchCategory::Layouts)
        );
        // partials share the layouts pipeline
        assert_eq!(
            categorize_path(&root.join("src/partials/header.html"), &config),
            Some(WatchCategory::Layouts)
        );
        assert_eq!(
            categorize_path(&root.join("src/assets/scss/_settings.scss"), &config),
            Some(WatchCategory::Styles)
        );
        assert_eq!(
            categorize_path(&root.join("src/assets/img/logo.png"), &config),
            Some(WatchCategory::Images)
        );
        assert_eq!(categorize_path(&root.join("README.md"), &config), None);
    }

    #[test]
    fn test_pipelines_match_trigger_table() {
        assert_eq!(
            WatchCategory::Pages.pipeline().execution_order().unwrap(),
            vec![Task::Pages, Task::Decode, Task::Inline]
        );
        assert_eq!(
            WatchCategory::Layouts.pipeline().execution_order().unwrap(),
            vec![Task::Refresh, Task::Pages, Task::Decode, Task::Inline]
        );
        assert_eq!(
            WatchCategory::Styles.pipeline().execution_order().unwrap(),
            vec![Task::Styles, Task::Pages, Task::Decode, Task::Inline]
        );
        assert_eq!(
            WatchCategory::Images.pipeline().execution_order().unwrap(),
            vec![Task::Images]
        );
    }

    #[test]
    fn test_only_image_pipeline_skips_html_lock() {
        assert!(WatchCategory::Pages.writes_html());
        assert!(WatchCategory::Layouts.writes_html());
        assert!(WatchCategory::Styles.writes_html());
        assert!(!WatchCategory::Images.writes_html());
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("a.swp")));
        assert!(is_temp_file(Path::new("a.html~")));
        assert!(is_temp_file(Path::new(".hidden")));
        assert!(!is_temp_file(Path::new("letter.html")));
    }

    #[test]
    fn test_debouncer_batches_events() {
        let mut debouncer = Debouncer::new();
        assert!(!debouncer.ready());

        debouncer.add(Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/a.html")));
        debouncer.add(Event::new(EventKind::Modify(notify::event::ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/a.html")));

        // within the debounce window, not ready yet
        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_millis(DEBOUNCE_MS));

        // duplicate paths collapse
        let taken = debouncer.take();
        assert_eq!(taken.len(), 1);
        assert!(debouncer.take().is_empty());
    }
}
