//! Still-image conversion: PNG/JPEG to character art, one file or a folder.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::Result;
use crate::frame::{Frame, FrameRenderer};
use crate::metadata::fit_within;
use crate::Progress;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Whether `path` has an image extension this converter reads.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Load `path` as 8-bit luminance, shrunk to fit `max_chars_wide / 2` by
/// `max_rows` pixels. Each pixel renders as two characters, so the result is
/// at most `max_chars_wide` characters across. Small images are not enlarged.
pub fn load_frame(path: &Path, max_chars_wide: u32, max_rows: u32) -> Result<Frame> {
    let img = image::open(path)?.to_luma8();
    let (w, h) = img.dimensions();
    let (tw, th) = fit_within(
        w as usize,
        h as usize,
        (max_chars_wide / 2).max(1) as usize,
        max_rows.max(1) as usize,
    );
    let img = if (tw, th) != (w as usize, h as usize) {
        image::imageops::resize(&img, tw as u32, th as u32, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };
    let (w, h) = img.dimensions();
    Frame::new(w as usize, h as usize, img.into_raw())
}

/// Render `path` to a string, exactly as it would be written to disk.
pub fn image_to_string(path: &Path, max_chars_wide: u32, max_rows: u32) -> Result<String> {
    let frame = load_frame(path, max_chars_wide, max_rows)?;
    Ok(FrameRenderer::new().render_to_string(&frame))
}

/// Output path for an image: same place, `.txt` extension.
pub fn text_path_for(image: &Path) -> PathBuf {
    image.with_extension("txt")
}

/// Convert one image and write the text next to it. Returns the written path.
pub fn convert_image(path: &Path, max_chars_wide: u32, max_rows: u32) -> Result<PathBuf> {
    let frame = load_frame(path, max_chars_wide, max_rows)?;
    let out = text_path_for(path);
    let mut w = BufWriter::new(fs::File::create(&out)?);
    FrameRenderer::new().write_to(&frame, &mut w)?;
    w.flush()?;
    tracing::debug!(input = %path.display(), output = %out.display(), "converted image");
    Ok(out)
}

/// Images directly inside `dir` (not recursive), sorted.
pub fn find_images(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_image_path(p))
        .collect();
    images.sort();
    images
}

/// Convert every image in `dir` in parallel, reporting progress after each one.
/// Returns the written text files in input order.
pub fn convert_directory<F>(dir: &Path, max_chars_wide: u32, max_rows: u32, progress_callback: F) -> Result<Vec<PathBuf>>
where
    F: Fn(Progress) + Send + Sync,
{
    let images = find_images(dir);
    let total = images.len();
    let completed = AtomicUsize::new(0);

    progress_callback(Progress::converting_images(0, total));

    let written = images
        .par_iter()
        .map(|img| {
            let out = convert_image(img, max_chars_wide, max_rows)?;
            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress_callback(Progress::converting_images(current, total));
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;

    progress_callback(Progress::complete(total));
    Ok(written)
}
