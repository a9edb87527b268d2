use std::path::PathBuf;

use crate::cancel::CancelledError;

/// Errors surfaced by the fetch-and-sample pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("could not fetch video: {0}")]
    FetchFailed(String),

    #[error("required tool `{tool}` was not found; install it or point to it explicitly")]
    MissingPrerequisite { tool: String },

    #[error("no media file found in {}", .dir.display())]
    NoMediaFileFound { dir: PathBuf },

    #[error("expected exactly one media file in {}, found {}: {}", .dir.display(), .candidates.len(), join_names(.candidates))]
    AmbiguousMediaFile { dir: PathBuf, candidates: Vec<PathBuf> },

    #[error("image directory {} does not exist", .0.display())]
    ImagesDirMissing(PathBuf),

    #[error("could not decode frames: {0}")]
    Decode(String),

    #[error("interrupted by user")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not write image: {0}")]
    Image(#[from] image::ImageError),
}

impl From<CancelledError> for Error {
    fn from(_: CancelledError) -> Self {
        Error::Interrupted
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_names(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_file_names() {
        let err = Error::AmbiguousMediaFile {
            dir: PathBuf::from("/tmp/job"),
            candidates: vec![PathBuf::from("/tmp/job/a.mp4"), PathBuf::from("/tmp/job/b.webm")],
        };
        let msg = err.to_string();
        assert!(msg.contains("found 2"));
        assert!(msg.contains("a.mp4, b.webm"));
    }

    #[test]
    fn test_cancelled_maps_to_interrupted() {
        let err: Error = CancelledError.into();
        assert!(matches!(err, Error::Interrupted));
    }
}
