//! CBZ archive reading: page listing, extraction and cover selection.
//!
//! Every call reopens and re-parses the archive; archives are read rarely
//! (once per page view) and re-reading the zip directory is cheap next to
//! the image decode that follows.

use crate::error::{AppError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// File extensions treated as comic pages.
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

/// Check if an entry name has an image extension.
fn is_image_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Sorted list of image entry names in the archive.
///
/// Directory entries, non-image files and macOS `__MACOSX` metadata are
/// excluded. The lexicographic order of the surviving names is the page
/// order: page 0 is the first entry.
fn image_entries(archive: &ZipArchive<File>) -> Vec<String> {
    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .filter(|name| !name.contains("__MACOSX"))
        .filter(|name| is_image_entry(name))
        .map(String::from)
        .collect();

    entries.sort();
    entries
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    Ok(ZipArchive::new(file)?)
}

/// List image entry names in page order.
pub fn list_image_entries(path: &Path) -> Result<Vec<String>> {
    let archive = open(path)?;
    Ok(image_entries(&archive))
}

/// MIME type for an entry, derived purely from its file extension.
pub fn mime_for_entry(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

/// Read the raw bytes of the page at `page_index`, with its MIME type.
pub fn read_page(path: &Path, page_index: usize) -> Result<(Vec<u8>, &'static str)> {
    let mut archive = open(path)?;
    let entries = image_entries(&archive);

    let name = entries
        .get(page_index)
        .ok_or(AppError::OutOfRange(page_index))?;

    let mut data = Vec::new();
    archive.by_name(name)?.read_to_end(&mut data)?;

    Ok((data, mime_for_entry(name)))
}

/// Read the raw bytes of the cover image (always page 0).
pub fn cover_image(path: &Path) -> Result<Vec<u8>> {
    let mut archive = open(path)?;
    let entries = image_entries(&archive);

    let name = entries
        .first()
        .ok_or_else(|| AppError::NoImages(path.display().to_string()))?;

    let mut data = Vec::new();
    archive.by_name(name)?.read_to_end(&mut data)?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_entry() {
        assert!(is_image_entry("page001.jpg"));
        assert!(is_image_entry("Cover.PNG"));
        assert!(is_image_entry("dir/page.webp"));
        assert!(is_image_entry("anim.gif"));
        assert!(!is_image_entry("readme.txt"));
        assert!(!is_image_entry("ComicInfo.xml"));
        assert!(!is_image_entry("pagejpg"));
    }

    #[test]
    fn test_mime_for_entry() {
        assert_eq!(mime_for_entry("a.png"), "image/png");
        assert_eq!(mime_for_entry("a.WEBP"), "image/webp");
        assert_eq!(mime_for_entry("a.gif"), "image/gif");
        assert_eq!(mime_for_entry("a.jpg"), "image/jpeg");
        assert_eq!(mime_for_entry("a.jpeg"), "image/jpeg");
    }
}
