//! Image processing: mirror the asset tree into the output, compressed.
//!
//! Compression is lossless per format: PNGs are re-encoded at maximum
//! compression and kept only when the result is actually smaller; every
//! other format is copied byte-for-byte. A file that fails to decode is
//! copied unchanged with a warning — a corrupt image never aborts a build.

use crate::compiler::collect_all_files;
use crate::config::SiteConfig;
use crate::log;
use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Process every file under the image directory into the output tree.
///
/// Returns the number of files written. A missing image directory is not an
/// error; there is simply nothing to do.
pub fn process_images(config: &SiteConfig) -> Result<usize> {
    let src_root = &config.build.images;
    if !src_root.is_dir() {
        return Ok(0);
    }

    let out_root = config.build.output.join(&config.build.images_out);
    let files = collect_all_files(src_root);

    files.par_iter().try_for_each(|path| {
        let rel = path.strip_prefix(src_root).unwrap_or(path);
        let dst = out_root.join(rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        process_image(path, &dst)
    })?;

    log!("images"; "processed {} images", files.len());
    Ok(files.len())
}

/// Compress one image into `dst`, falling back to a plain copy.
fn process_image(src: &Path, dst: &Path) -> Result<()> {
    let data = fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;

    let output = match src.extension().and_then(|e| e.to_str()) {
        Some("png") => match recompress_png(&data) {
            Ok(encoded) if encoded.len() < data.len() => encoded,
            Ok(_) => data,
            Err(err) => {
                log!("warn"; "skipping compression for {}: {err}", src.display());
                data
            }
        },
        // JPEG/GIF re-encoding is not lossless; pass through unchanged.
        _ => data,
    };

    fs::write(dst, output).with_context(|| format!("Failed to write {}", dst.display()))?;
    Ok(())
}

/// Losslessly re-encode a PNG at maximum compression.
fn recompress_png(data: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)?;
    let mut encoded = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        &mut encoded,
        CompressionType::Best,
        FilterType::Adaptive,
    );
    img.write_with_encoder(encoder)?;
    Ok(encoded)
}
