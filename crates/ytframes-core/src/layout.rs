use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Name of the image subdirectory inside a working directory.
pub const IMAGES_DIR: &str = "Images";

/// The per-job working directory and its image subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    pub root: PathBuf,
    pub images: PathBuf,
}

impl WorkDir {
    /// Final path component of `root`, used as the media file stem.
    pub fn name(&self) -> &str {
        self.root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video")
    }
}

/// Replace every non-ASCII character and every space with `_`.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii() && c != ' ' { c } else { '_' })
        .collect()
}

/// Create `<base>/<sanitized title>/Images`, or `<base>/<uuid>/Images` when no
/// usable title is available. Existing directories and their contents are left
/// untouched.
pub fn allocate(base: &Path, title: Option<&str>) -> Result<WorkDir> {
    let name = match title.map(sanitize_title).filter(|t| is_usable_name(t)) {
        Some(name) => name,
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            debug!("No usable title, using {} as directory name", id);
            id
        }
    };

    let root = base.join(&name);
    let images = root.join(IMAGES_DIR);
    fs::create_dir_all(&images)?;
    info!("Working directory: {}", root.display());

    Ok(WorkDir { root, images })
}

// Sanitizing keeps ASCII punctuation, so a title made only of dots or slashes
// would escape `base` or name it; treat those like a missing title.
fn is_usable_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name.chars().any(|c| c != '.')
}

/// The single regular file directly inside `dir`.
///
/// Subdirectories (such as `Images`) are ignored. Zero files or more than one
/// file are errors; names are never merged into a guessed path.
pub fn resolve_media_file(dir: &Path) -> Result<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    match files.len() {
        0 => Err(Error::NoMediaFileFound { dir: dir.to_path_buf() }),
        1 => Ok(files.remove(0)),
        _ => Err(Error::AmbiguousMediaFile {
            dir: dir.to_path_buf(),
            candidates: files,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_replaces_spaces_and_non_ascii() {
        assert_eq!(sanitize_title("My Video: Part 1"), "My_Video:_Part_1");
        assert_eq!(sanitize_title("Café día"), "Caf__d_a");
        assert_eq!(sanitize_title("already_safe-123"), "already_safe-123");
    }

    #[test]
    fn test_sanitize_all_non_ascii_gives_equal_length_underscores() {
        for title in ["日本語の動画", "Ωμέγα", "🎬🎥"] {
            let out = sanitize_title(title);
            assert_eq!(out.len(), title.chars().count());
            assert!(out.chars().all(|c| c == '_'));
        }
    }

    #[test]
    fn test_sanitized_output_is_ascii_without_spaces() {
        let out = sanitize_title("  mixed ñ text \t with ü tabs ");
        assert!(out.is_ascii());
        assert!(!out.contains(' '));
    }

    #[test]
    fn test_allocate_creates_both_directories() {
        let dir = tempdir().unwrap();
        let work = allocate(dir.path(), Some("Big Buck Bunny")).unwrap();
        assert_eq!(work.root, dir.path().join("Big_Buck_Bunny"));
        assert_eq!(work.images, work.root.join("Images"));
        assert!(work.images.is_dir());
        assert_eq!(work.name(), "Big_Buck_Bunny");
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let dir = tempdir().unwrap();
        let first = allocate(dir.path(), Some("clip")).unwrap();
        let keep = first.images.join("frame_0.jpg");
        fs::write(&keep, b"x").unwrap();

        let second = allocate(dir.path(), Some("clip")).unwrap();
        assert_eq!(first, second);
        assert!(keep.exists());
    }

    #[test]
    fn test_allocate_falls_back_to_uuid() {
        let dir = tempdir().unwrap();
        let a = allocate(dir.path(), None).unwrap();
        let b = allocate(dir.path(), Some("")).unwrap();
        let c = allocate(dir.path(), Some("..")).unwrap();
        assert_ne!(a.root, b.root);
        for work in [&a, &b, &c] {
            assert!(uuid::Uuid::parse_str(work.name()).is_ok(), "{}", work.name());
            assert!(work.images.is_dir());
        }
    }

    #[test]
    fn test_resolve_single_file_ignores_directories() {
        let dir = tempdir().unwrap();
        let work = allocate(dir.path(), Some("one")).unwrap();
        fs::write(work.root.join("one.webm"), b"data").unwrap();
        fs::write(work.images.join("frame_0.jpg"), b"img").unwrap();

        let media = resolve_media_file(&work.root).unwrap();
        assert_eq!(media, work.root.join("one.webm"));
    }

    #[test]
    fn test_resolve_rejects_empty_and_multiple() {
        let dir = tempdir().unwrap();
        let work = allocate(dir.path(), Some("many")).unwrap();
        assert!(matches!(
            resolve_media_file(&work.root),
            Err(Error::NoMediaFileFound { .. })
        ));

        fs::write(work.root.join("a.mp4"), b"a").unwrap();
        fs::write(work.root.join("b.mp4"), b"b").unwrap();
        match resolve_media_file(&work.root) {
            Err(Error::AmbiguousMediaFile { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous error, got {other:?}"),
        }
    }
}
