//! Image source loading
//!
//! Validates image sources (http/https URLs or local files) into
//! [`ImageRef`]s with deterministic ids, and discovers images in folders.

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{ImageRef, SourceKind};
use pvac_common::uuid_utils;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Raster image extensions accepted as input (lower-case, no dot)
pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp", "gif"];

/// True for http/https URLs with a host
pub fn is_url(source: &str) -> bool {
    Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// True when the path's extension is a supported image type
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand a leading `~` to the home directory
fn expand_home(source: &str) -> PathBuf {
    if let Some(rest) = source.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(source)
}

/// Normalize and validate a list of image sources
///
/// Entries that are empty, missing, or not a supported image type are
/// skipped with a warning. URL extensions are checked on the URL path, so
/// query strings do not hide the file type.
///
/// # Errors
/// `InvalidInput` when `sources` is empty or nothing valid remains.
pub fn load_images<S: AsRef<str>>(sources: &[S]) -> AnalysisResult<Vec<ImageRef>> {
    if sources.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "image sources must be a non-empty list of URLs or file paths".to_string(),
        ));
    }

    let mut images = Vec::new();

    for raw in sources {
        let source = raw.as_ref().trim();
        if source.is_empty() {
            warn!("Skipping empty source string");
            continue;
        }

        if is_url(source) {
            let url_path = Url::parse(source)
                .map(|u| u.path().to_string())
                .unwrap_or_default();
            if !has_image_extension(Path::new(&url_path)) {
                warn!("Skipping URL with unsupported extension: {}", source);
                continue;
            }
            images.push(ImageRef {
                id: uuid_utils::source_id(source).to_string(),
                source: source.to_string(),
                kind: SourceKind::Url,
            });
            continue;
        }

        let path = expand_home(source);
        if !path.is_file() {
            warn!("Skipping missing local path: {}", source);
            continue;
        }
        if !has_image_extension(&path) {
            warn!("Skipping local file with unsupported extension: {}", source);
            continue;
        }

        let resolved = path.canonicalize()?.to_string_lossy().into_owned();
        images.push(ImageRef {
            id: uuid_utils::source_id(&resolved).to_string(),
            source: resolved,
            kind: SourceKind::Local,
        });
    }

    if images.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "no valid image sources after validation".to_string(),
        ));
    }

    debug!("Loaded {} of {} image sources", images.len(), sources.len());
    Ok(images)
}

/// List image files in `dir`, sorted by path
///
/// Hidden files are skipped. Only the top level is scanned unless
/// `recursive` is set.
pub fn list_images_in_folder(dir: &Path, recursive: bool) -> AnalysisResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(AnalysisError::InvalidInput(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).max_depth(max_depth).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                continue;
            }
        };

        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_file() && !hidden && has_image_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!("Found {} images in {}", files.len(), dir.display());
    Ok(files)
}

/// MIME type for image bytes, sniffed from magic bytes, else by extension
pub fn image_mime_type(bytes: &[u8], name: &str) -> &'static str {
    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() == infer::MatcherType::Image {
            return kind.mime_type();
        }
    }

    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/a.jpg"));
        assert!(is_url("http://example.com/a.png"));
        assert!(!is_url("ftp://example.com/a.png"));
        assert!(!is_url("/tmp/a.png"));
        assert!(!is_url("https://"));
    }

    #[test]
    fn test_load_images_urls_deterministic_ids() {
        let sources = ["https://example.com/p/1.JPG?size=large", "https://example.com/p/readme.txt"];
        let first = load_images(&sources).unwrap();
        let second = load_images(&sources).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, SourceKind::Url);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_load_images_local_files() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("front.png");
        let notes = dir.path().join("notes.txt");
        fs::write(&image, b"png").unwrap();
        fs::write(&notes, b"text").unwrap();

        let sources = vec![
            image.to_string_lossy().into_owned(),
            notes.to_string_lossy().into_owned(),
            dir.path().join("missing.jpg").to_string_lossy().into_owned(),
            "   ".to_string(),
        ];
        let images = load_images(&sources).unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].kind, SourceKind::Local);
        assert!(images[0].source.ends_with("front.png"));
    }

    #[test]
    fn test_load_images_errors() {
        let empty: [&str; 0] = [];
        assert!(matches!(load_images(&empty), Err(AnalysisError::InvalidInput(_))));
        assert!(matches!(
            load_images(&["/definitely/not/here.jpg"]),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_list_images_in_folder() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(dir.path().join("a.webp"), b"x").unwrap();
        fs::write(dir.path().join(".hidden.png"), b"x").unwrap();
        fs::write(dir.path().join("doc.pdf"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.png"), b"x").unwrap();

        let flat = list_images_in_folder(dir.path(), false).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.webp", "b.jpg"]);

        let deep = list_images_in_folder(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_image_mime_type() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(image_mime_type(&png_magic, "photo.jpg"), "image/png");
        assert_eq!(image_mime_type(b"????", "photo.webp"), "image/webp");
        assert_eq!(image_mime_type(b"????", "photo"), "image/jpeg");
    }
}
