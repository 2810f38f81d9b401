//! Site initialization module.
//!
//! Creates new site structure with default configuration and starter files.

use crate::{config::SiteConfig, log};
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Files to write ignore patterns to
const IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

/// Default config filename
const CONFIG_FILE: &str = "letterpress.toml";

/// Default site directory structure
const SITE_DIRS: &[&str] = &[
    "src/pages",
    "src/layouts",
    "src/partials",
    "src/assets/scss",
    "src/assets/img",
];

const DEFAULT_LAYOUT: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width">
    <title>Email</title>
    <!-- <style> -->
  </head>
  <body>
    {{ body | safe }}
  </body>
</html>
"#;

const SAMPLE_PAGE: &str = r#"---
layout: default
---
{% include "partials/header.html" %}
<table class="body">
  <tr>
    <td class="container">
      <h1>Hello from your new email project</h1>
      <p>Edit <code>src/pages/index.html</code> to get started.</p>
    </td>
  </tr>
</table>
"#;

const SAMPLE_PARTIAL: &str = "<span class=\"preheader\"></span>\n";

const SAMPLE_STYLES: &str = r#"body {
  margin: 0;
  background: #f3f3f3;
}

.container {
  width: 580px;
  margin: 0 auto;
}

@media only screen and (max-width: 596px) {
  .container {
    width: 95% !important;
  }
}
"#;

/// Create a new site with default structure
pub fn new_site(config: &'static SiteConfig, has_name: bool) -> Result<()> {
    let root = config.get_root();

    // Safety check: if no name was provided (init in current dir),
    // the directory must be completely empty
    if !has_name && !is_dir_empty(root)? {
        bail!(
            "Current directory is not empty. Use `letterpress init <SITE_NAME>` to create in a subdirectory."
        );
    }

    init_site_structure(root)?;
    init_default_config(root)?;
    init_starter_files(root)?;
    init_ignored_files(root, &[config.build.output.as_path()])?;

    log!("init"; "created new site at {}", root.display());
    Ok(())
}

/// Check if a directory is completely empty
fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Write default configuration file
fn init_default_config(root: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&SiteConfig::default())?;
    fs::write(root.join(CONFIG_FILE), content)?;
    Ok(())
}

/// Create site directory structure
fn init_site_structure(root: &Path) -> Result<()> {
    for dir in SITE_DIRS {
        let path = root.join(dir);
        if path.exists() {
            bail!(
                "Path `{}` already exists. Try `letterpress init <SITE_NAME>` instead.",
                path.display()
            );
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

/// Write the starter layout, page, partial and stylesheet
fn init_starter_files(root: &Path) -> Result<()> {
    let files = [
        ("src/layouts/default.html", DEFAULT_LAYOUT),
        ("src/pages/index.html", SAMPLE_PAGE),
        ("src/partials/header.html", SAMPLE_PARTIAL),
        ("src/assets/scss/app.scss", SAMPLE_STYLES),
    ];

    for (rel, content) in files {
        let path = root.join(rel);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Initialize .gitignore and .ignore files with specified paths
fn init_ignored_files(root: &Path, paths: &[&Path]) -> Result<()> {
    let content = paths
        .iter()
        .filter_map(|p| p.to_str())
        .collect::<Vec<_>>()
        .join("\n");

    for filename in IGNORE_FILES {
        let path = root.join(filename);
        if !path.exists() {
            fs::write(&path, &content)?;
        }
    }

    Ok(())
}
