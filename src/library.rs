//! Library scanning and catalog ingest.

use crate::archive;
use crate::db::{Database, NewVolume};
use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extension of library archives.
const ARCHIVE_EXTENSION: &str = "cbz";

/// Cover thumbnail dimensions (cover-crop fill).
const THUMB_WIDTH: u32 = 300;
const THUMB_HEIGHT: u32 = 400;
const THUMB_QUALITY: u8 = 85;

/// Aggregate counts of one scan pass.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Archive files discovered across all library paths.
    pub found: usize,
    /// Volumes newly created in the catalog.
    pub created: usize,
    /// Volumes that already existed and got their thumbnail refreshed.
    pub updated_thumbs: usize,
}

/// Library scanner: walks configured roots and upserts the catalog.
pub struct Scanner {
    db: Database,
    thumbnails_dir: PathBuf,
}

impl Scanner {
    /// Create a new scanner writing thumbnails to `thumbnails_dir`.
    pub fn new(db: Database, thumbnails_dir: PathBuf) -> Self {
        Self { db, thumbnails_dir }
    }

    /// Run a single synchronous scan pass over all library paths.
    ///
    /// A traversal failure (missing or unreadable library root) aborts the
    /// whole scan. A failure on an individual archive (corrupt zip, no
    /// images) is logged and the file is skipped until the next scan.
    pub fn scan(&self) -> Result<ScanReport> {
        let library_paths = self.db.list_library_paths()?;
        let mut report = ScanReport::default();

        for library_path in library_paths {
            let root = Path::new(&library_path.path);
            let archives = collect_archives(root)?;

            tracing::info!(
                path = %library_path.path,
                archives = archives.len(),
                "Scanning library path"
            );
            report.found += archives.len();

            for archive_path in archives {
                let title = archive_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Unknown")
                    .to_string();

                let thumbnail_path = match self.generate_thumbnail(&archive_path) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(
                            path = %archive_path.display(),
                            error = %e,
                            "Skipping archive, thumbnail generation failed"
                        );
                        continue;
                    }
                };

                let volume = self.db.upsert_volume(&NewVolume {
                    title,
                    file_path: archive_path.to_string_lossy().to_string(),
                    thumbnail_path: thumbnail_path.to_string_lossy().to_string(),
                    library_path_id: library_path.id,
                })?;

                if volume.created_at == volume.updated_at {
                    report.created += 1;
                } else {
                    report.updated_thumbs += 1;
                }
            }
        }

        tracing::info!(
            found = report.found,
            created = report.created,
            updated = report.updated_thumbs,
            "Library scan complete"
        );
        Ok(report)
    }

    /// Generate the cover thumbnail for an archive.
    ///
    /// The thumbnail file name is derived from the archive's base name, so
    /// two archives with the same base name in different directories share
    /// one thumbnail file.
    fn generate_thumbnail(&self, archive_path: &Path) -> Result<PathBuf> {
        let cover = archive::cover_image(archive_path)?;
        let img = image::load_from_memory(&cover)?;
        let thumb = img
            .resize_to_fill(THUMB_WIDTH, THUMB_HEIGHT, FilterType::Lanczos3)
            .into_rgb8();

        std::fs::create_dir_all(&self.thumbnails_dir)?;

        let base = archive_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("volume");
        let out_path = self.thumbnails_dir.join(format!("{}.jpg", base));

        let writer = BufWriter::new(File::create(&out_path)?);
        let encoder = JpegEncoder::new_with_quality(writer, THUMB_QUALITY);
        thumb.write_with_encoder(encoder)?;

        Ok(out_path)
    }
}

/// Collect all archive files under `root`, in deterministic order.
///
/// Symlinks are followed; walkdir's ancestor check turns a symlink cycle
/// into a traversal error instead of an endless walk.
pub fn collect_archives(root: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_archive = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION));
        if is_archive {
            archives.push(entry.into_path());
        }
    }

    Ok(archives)
}
