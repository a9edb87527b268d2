use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Executable names or paths for the external tools the pipeline drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub yt_dlp: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            yt_dlp: PathBuf::from("yt-dlp"),
        }
    }
}

/// Resolved, existing executables.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub yt_dlp: PathBuf,
}

impl Toolchain {
    /// Resolve every tool up front so a missing one is reported before any
    /// download starts.
    pub fn locate(paths: &ToolPaths) -> Result<Self> {
        Ok(Self {
            ffmpeg: locate_tool(&paths.ffmpeg)?,
            ffprobe: locate_tool(&paths.ffprobe)?,
            yt_dlp: locate_tool(&paths.yt_dlp)?,
        })
    }
}

/// Resolve a bare command name through `PATH`; anything with a directory
/// component must point at an existing file.
pub fn locate_tool(tool: &Path) -> Result<PathBuf> {
    let missing = || Error::MissingPrerequisite {
        tool: tool.display().to_string(),
    };

    let resolved = if tool.components().count() > 1 {
        if tool.is_file() {
            tool.to_path_buf()
        } else {
            return Err(missing());
        }
    } else {
        which::which(tool).map_err(|_| missing())?
    };

    debug!("Found {} at {}", tool.display(), resolved.display());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_bare_name() {
        let err = locate_tool(Path::new("ytframes-definitely-not-installed")).unwrap_err();
        match err {
            Error::MissingPrerequisite { tool } => assert_eq!(tool, "ytframes-definitely-not-installed"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("ffmpeg");
        assert!(matches!(locate_tool(&tool), Err(Error::MissingPrerequisite { .. })));

        std::fs::write(&tool, b"#!/bin/sh\n").unwrap();
        assert_eq!(locate_tool(&tool).unwrap(), tool);
    }

    #[test]
    fn test_toolchain_reports_first_missing_tool() {
        let paths = ToolPaths {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ..ToolPaths::default()
        };
        match Toolchain::locate(&paths) {
            Err(Error::MissingPrerequisite { tool }) => assert_eq!(tool, "/nonexistent/ffmpeg"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
