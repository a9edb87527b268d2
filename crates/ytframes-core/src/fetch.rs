use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::layout::{self, WorkDir};
use crate::timecode::TimeWindow;

/// Format code requested in trimmed mode: a progressive mp4 rendition that
/// ffmpeg can cut with stream copy.
pub const TRIM_FORMAT: &str = "18";

/// Container produced by a trimmed fetch, so its path is known in advance.
pub const TRIM_EXTENSION: &str = "mp4";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, Like Gecko) Chrome/48.0.2564.82 Safari/537.36 Edge/14.14316";

/// Which rendition to download when no time window is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Best,
    Worst,
}

impl Quality {
    pub fn as_format(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::Worst => "worst",
        }
    }
}

/// What to fetch for one job.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub quality: Quality,
    pub window: Option<TimeWindow>,
}

/// Places exactly one media file for a URL inside a working directory.
pub trait VideoSource {
    /// Display title of the video, if the source reports one.
    fn probe_title(&self, url: &str) -> Result<Option<String>>;

    /// Download into `work_dir.root` and return the media file path.
    fn fetch(&self, request: &FetchRequest<'_>, work_dir: &WorkDir) -> Result<PathBuf>;
}

/// Subset of the `--dump-single-json` metadata that is used here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// [`VideoSource`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn run(&self, args: &[OsString]) -> Result<Output> {
        debug!("Running {} {:?}", self.program.display(), args);
        Command::new(&self.program).args(args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::MissingPrerequisite {
                    tool: self.program.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })
    }
}

impl VideoSource for YtDlp {
    fn probe_title(&self, url: &str) -> Result<Option<String>> {
        let args = Vec::from(
            [
                "--dump-single-json",
                "--skip-download",
                "--no-playlist",
                "--no-warnings",
                url,
            ]
            .map(OsString::from),
        );

        let output = self.run(&args)?;
        log_stream("yt-dlp", &output.stderr);
        if !output.status.success() {
            return Err(Error::FetchFailed(failure_reason(&output)));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::FetchFailed(format!("unreadable video metadata: {e}")))?;
        debug!("Video id {:?}, duration {:?}s", info.id, info.duration);
        Ok(info.title.filter(|t| !t.trim().is_empty()))
    }

    fn fetch(&self, request: &FetchRequest<'_>, work_dir: &WorkDir) -> Result<PathBuf> {
        let args = fetch_args(request, work_dir);
        match request.window {
            Some(w) => info!("Downloading {} from {} to {}", request.url, w.start(), w.end()),
            None => info!("Downloading {} ({})", request.url, request.quality.as_format()),
        }

        let output = self.run(&args)?;
        log_stream("yt-dlp", &output.stdout);
        log_stream("yt-dlp", &output.stderr);

        if !output.status.success() {
            let reason = failure_reason(&output);
            return Err(Error::FetchFailed(if request.window.is_some() {
                format!("could not download the requested time window: {reason}")
            } else {
                reason
            }));
        }

        if request.window.is_some() {
            let media = trimmed_media_path(work_dir);
            if !media.is_file() {
                return Err(Error::NoMediaFileFound { dir: work_dir.root.clone() });
            }
            Ok(media)
        } else {
            layout::resolve_media_file(&work_dir.root)
        }
    }
}

/// Command line for a fetch; trimmed mode when the request carries a window.
pub fn fetch_args(request: &FetchRequest<'_>, work_dir: &WorkDir) -> Vec<OsString> {
    // A rerun into the same directory must replace a partial or stale download.
    let mut args: Vec<OsString> = vec!["--no-playlist".into(), "--force-overwrites".into()];

    match request.window {
        Some(window) => {
            let cut = format!(
                "ffmpeg_i:-ss {} -to {} -user_agent \"{}\"",
                window.start(),
                window.end(),
                USER_AGENT
            );
            args.extend(
                ["-f", TRIM_FORMAT, "--downloader", "ffmpeg", "--external-downloader-args"]
                    .map(OsString::from),
            );
            args.push(cut.into());
        }
        None => {
            args.push("-f".into());
            args.push(request.quality.as_format().into());
        }
    }

    args.push("--restrict-filenames".into());
    args.push("--output".into());
    args.push(output_template(work_dir).into_os_string());
    args.push(request.url.into());
    args
}

/// `<root>/<name>.%(ext)s`, with `%` in the name escaped for the template.
fn output_template(work_dir: &WorkDir) -> PathBuf {
    let stem = work_dir.name().replace('%', "%%");
    work_dir.root.join(format!("{stem}.%(ext)s"))
}

/// Where a trimmed fetch leaves its file.
pub fn trimmed_media_path(work_dir: &WorkDir) -> PathBuf {
    work_dir.root.join(format!("{}.{}", work_dir.name(), TRIM_EXTENSION))
}

fn failure_reason(output: &Output) -> String {
    last_line(&output.stderr)
        .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status))
}

fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

pub(crate) fn log_stream(tool: &str, bytes: &[u8]) {
    for line in String::from_utf8_lossy(bytes).lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "ytframes::tool", "{tool}: {line}");
    }
}
