//! Build pipeline components.
//!
//! Each submodule wraps one external collaborator: `pages` drives the
//! template engine, `styles` the Sass compiler, `images` the image codecs,
//! `decode` the entity decoder and `inline` the CSS inliner + HTML minifier.
//! Sequencing lives in [`crate::tasks`] and [`crate::build`].

pub mod decode;
pub mod images;
pub mod inline;
pub mod pages;
pub mod styles;
mod utils;

pub use utils::{collect_all_files, collect_html_files};
