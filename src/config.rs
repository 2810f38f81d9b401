//! Site configuration management.
//!
//! Handles loading, parsing, and validating the `letterpress.toml`
//! configuration file, and applying CLI overrides on top of it.

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default values for serde deserialization
pub mod config_defaults {
    pub fn r#true() -> bool {
        true
    }

    pub fn r#false() -> bool {
        false
    }

    pub mod build {
        use std::path::PathBuf;

        pub fn root() -> Option<PathBuf> {
            None
        }
        pub fn pages() -> PathBuf {
            "src/pages".into()
        }
        pub fn layouts() -> PathBuf {
            "src/layouts".into()
        }
        pub fn partials() -> PathBuf {
            "src/partials".into()
        }
        pub fn images() -> PathBuf {
            "src/assets/img".into()
        }
        pub fn images_out() -> PathBuf {
            "assets/img".into()
        }
        pub fn output() -> PathBuf {
            "dist".into()
        }
        pub fn default_layout() -> String {
            "default".into()
        }

        pub mod styles {
            use std::path::PathBuf;

            pub fn entry() -> PathBuf {
                "src/assets/scss/app.scss".into()
            }
            pub fn load_paths() -> Vec<PathBuf> {
                vec![]
            }
            pub fn output() -> PathBuf {
                "css/app.css".into()
            }
        }
    }

    pub mod serve {
        pub fn interface() -> String {
            "127.0.0.1".into()
        }
        pub fn port() -> u16 {
            8000
        }
        pub fn reload_port() -> u16 {
            0
        }
        pub fn index() -> String {
            "index.html".into()
        }
    }
}

/// `[build]` section in letterpress.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Root directory path
    #[serde(
        default = "config_defaults::build::root",
        skip_serializing_if = "Option::is_none"
    )]
    #[educe(Default = config_defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Page templates directory (relative to root)
    #[serde(default = "config_defaults::build::pages")]
    #[educe(Default = config_defaults::build::pages())]
    pub pages: PathBuf,

    /// Layout templates directory (relative to root)
    #[serde(default = "config_defaults::build::layouts")]
    #[educe(Default = config_defaults::build::layouts())]
    pub layouts: PathBuf,

    /// Partial templates directory (relative to root)
    #[serde(default = "config_defaults::build::partials")]
    #[educe(Default = config_defaults::build::partials())]
    pub partials: PathBuf,

    /// Image assets directory (relative to root)
    #[serde(default = "config_defaults::build::images")]
    #[educe(Default = config_defaults::build::images())]
    pub images: PathBuf,

    /// Processed images destination (relative to output)
    #[serde(default = "config_defaults::build::images_out")]
    #[educe(Default = config_defaults::build::images_out())]
    pub images_out: PathBuf,

    /// Output directory path (relative to root)
    #[serde(default = "config_defaults::build::output")]
    #[educe(Default = config_defaults::build::output())]
    pub output: PathBuf,

    /// Production mode: inline CSS into HTML and minify the result
    #[serde(default = "config_defaults::r#false")]
    #[educe(Default = false)]
    pub production: bool,

    /// Minify inlined HTML output (effective in production only)
    #[serde(default = "config_defaults::r#true")]
    #[educe(Default = true)]
    pub minify: bool,

    /// Layout applied to pages that don't name one
    #[serde(default = "config_defaults::build::default_layout")]
    #[educe(Default = config_defaults::build::default_layout())]
    pub default_layout: String,

    /// Stylesheet compilation settings
    #[serde(default)]
    pub styles: StylesConfig,
}

/// `[build.styles]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct StylesConfig {
    /// Root stylesheet entry point (relative to root)
    #[serde(default = "config_defaults::build::styles::entry")]
    #[educe(Default = config_defaults::build::styles::entry())]
    pub entry: PathBuf,

    /// Extra Sass import roots, e.g. a vendored email framework
    #[serde(default = "config_defaults::build::styles::load_paths")]
    #[educe(Default = config_defaults::build::styles::load_paths())]
    pub load_paths: Vec<PathBuf>,

    /// Compiled CSS destination (relative to output)
    #[serde(default = "config_defaults::build::styles::output")]
    #[educe(Default = config_defaults::build::styles::output())]
    pub output: PathBuf,
}

/// `[serve]` section in letterpress.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind (e.g.: "127.0.0.1", "0.0.0.0")
    #[serde(default = "config_defaults::serve::interface")]
    #[educe(Default = config_defaults::serve::interface())]
    pub interface: String,

    /// Port number to listen on
    #[serde(default = "config_defaults::serve::port")]
    #[educe(Default = config_defaults::serve::port())]
    pub port: u16,

    /// Port for the live-reload websocket (0 = HTTP port + 1)
    #[serde(default = "config_defaults::serve::reload_port")]
    #[educe(Default = config_defaults::serve::reload_port())]
    pub reload_port: u16,

    /// Enable file watching for live reload
    #[serde(default = "config_defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,

    /// Default index document served at the site root
    #[serde(default = "config_defaults::serve::index")]
    #[educe(Default = config_defaults::serve::index())]
    pub index: String,
}

/// Root configuration structure representing letterpress.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Path the config was loaded from
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf());
    }

    /// Port to run the live-reload websocket on
    pub fn reload_port(&self) -> u16 {
        if self.serve.reload_port == 0 {
            self.serve.port.saturating_add(1)
        } else {
            self.serve.reload_port
        }
    }

    /// Update configuration with CLI arguments.
    ///
    /// Re-roots all paths against the (absolutized) project root so that
    /// watcher events, which arrive absolute, compare cleanly against them.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());
        let root = absolutize(&root);
        self.update_path_with_root(&root);

        if let Some(args) = cli.build_args() {
            if args.production {
                self.build.production = true;
            }
            Self::update_option(&mut self.build.minify, args.minify.as_ref());
        }

        match &cli.command {
            Commands::Init { name: Some(name) } => {
                let new_root = root.join(name);
                self.update_path_with_root(&new_root);
            }
            Commands::Serve {
                interface,
                port,
                watch,
                ..
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            _ => {}
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory
    pub(crate) fn update_path_with_root(&mut self, root: &Path) {
        self.set_root(root);

        self.build.pages = root.join(&self.build.pages);
        self.build.layouts = root.join(&self.build.layouts);
        self.build.partials = root.join(&self.build.partials);
        self.build.images = root.join(&self.build.images);
        self.build.output = root.join(&self.build.output);
        self.build.styles.entry = root.join(&self.build.styles.entry);
        self.build.styles.load_paths = self
            .build
            .styles
            .load_paths
            .iter()
            .map(|p| if p.is_relative() { root.join(p) } else { p.clone() })
            .collect();
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        for (field, path) in [
            ("[build.pages]", &self.build.pages),
            ("[build.layouts]", &self.build.layouts),
            ("[build.styles.entry]", &self.build.styles.entry),
        ] {
            if !path.exists() {
                bail!(ConfigError::Validation(format!(
                    "{field} not found: {}",
                    path.display()
                )));
            }
        }

        if self.build.styles.entry.is_dir() {
            bail!(ConfigError::Validation(
                "[build.styles.entry] is not a file".into()
            ));
        }

        self.serve
            .interface
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("[serve.interface] is not an IP address: {}", self.serve.interface))?;

        Ok(())
    }
}

/// Make a path absolute without requiring it to exist.
fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}
