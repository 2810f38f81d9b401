//! Build task graph.
//!
//! Every build is a directed acyclic graph of named steps. The full build is
//! `clean → pages → decode → styles → images → inline`; watch mode dispatches
//! shorter per-trigger chains through the same runner, so step ordering is
//! testable in isolation from the compilers themselves.

use std::fmt;
use thiserror::Error;

/// A named build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Delete and recreate the output directory
    Clean,
    /// Invalidate the template cache (layouts/partials changed)
    Refresh,
    /// Render page templates to flat HTML
    Pages,
    /// Decode HTML entities in the output tree
    Decode,
    /// Compile Sass to one CSS file
    Styles,
    /// Compress and mirror image assets
    Images,
    /// Inline CSS into HTML and minify (production only)
    Inline,
}

impl Task {
    /// Short name used as the log prefix.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Refresh => "refresh",
            Self::Pages => "pages",
            Self::Decode => "decode",
            Self::Styles => "styles",
            Self::Images => "images",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Task graph errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("task graph has a cycle involving: {0}")]
    Cycle(String),
}

/// A set of tasks plus ordering edges, executed via topological sort.
///
/// Later steps read files written by earlier ones, so the runner completes
/// each task fully before starting the next. The sort is deterministic:
/// among ready tasks, insertion order wins.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    /// (before, after) pairs
    edges: Vec<(Task, Task)>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task without dependencies. No-op if already present.
    pub fn add_task(&mut self, task: Task) {
        if !self.tasks.contains(&task) {
            self.tasks.push(task);
        }
    }

    /// Require `before` to complete before `after` starts.
    ///
    /// Both tasks are added to the graph if missing.
    pub fn add_dep(&mut self, before: Task, after: Task) {
        self.add_task(before);
        self.add_task(after);
        if !self.edges.contains(&(before, after)) {
            self.edges.push((before, after));
        }
    }

    /// Build a linear graph running `tasks` strictly in the given order.
    pub fn chain(tasks: &[Task]) -> Self {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_task(*task);
        }
        for pair in tasks.windows(2) {
            graph.add_dep(pair[0], pair[1]);
        }
        graph
    }

    /// The full one-shot build.
    pub fn full_build() -> Self {
        Self::chain(&[
            Task::Clean,
            Task::Pages,
            Task::Decode,
            Task::Styles,
            Task::Images,
            Task::Inline,
        ])
    }

    /// Compute a deterministic execution order (Kahn's algorithm).
    ///
    /// Among tasks whose dependencies are satisfied, insertion order decides.
    /// Fails if the graph contains a cycle.
    pub fn execution_order(&self) -> Result<Vec<Task>, GraphError> {
        let mut order = Vec::with_capacity(self.tasks.len());
        let mut remaining = self.tasks.clone();

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|task| {
                self.edges
                    .iter()
                    .all(|(before, after)| after != task || !remaining.contains(before))
            });

            match ready {
                Some(idx) => order.push(remaining.remove(idx)),
                None => {
                    let names: Vec<_> = remaining.iter().map(|t| t.name()).collect();
                    return Err(GraphError::Cycle(names.join(", ")));
                }
            }
        }

        Ok(order)
    }
}
