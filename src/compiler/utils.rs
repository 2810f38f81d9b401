use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files to ignore during directory traversal
pub const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Collect all files from a directory recursively.
///
/// Returns paths sorted for deterministic processing order.
pub fn collect_all_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name) && !name.starts_with('.')
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Collect all `.html` files under a directory recursively.
pub fn collect_html_files(dir: &Path) -> Vec<PathBuf> {
    collect_all_files(dir)
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "html"))
        .collect()
}
