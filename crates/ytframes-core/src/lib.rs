pub mod cancel;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod sampler;
pub mod sampling;
pub mod timecode;
pub mod tools;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use cancel::{CancellationToken, CancelledError};
pub use decode::{FfmpegDecoder, FrameDecoder};
pub use error::{Error, Result};
pub use fetch::{FetchRequest, Quality, VideoSource, YtDlp};
pub use layout::WorkDir;
pub use sampling::{ImageFormat, SamplingInterval};
pub use timecode::{TimeWindow, Timecode};
pub use tools::{ToolPaths, Toolchain};

fn default_output() -> PathBuf {
    PathBuf::from(".")
}

/// Everything one extraction run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub url: String,
    /// Directory under which the per-video working directory is created.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub interval: SamplingInterval,
    #[serde(default)]
    pub window: Option<TimeWindow>,
    #[serde(default)]
    pub format: ImageFormat,
    /// Delete the downloaded video once its frames are written.
    #[serde(default)]
    pub remove_media: bool,
    #[serde(default)]
    pub tools: ToolPaths,
}

impl ExtractOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output: default_output(),
            quality: Quality::default(),
            interval: SamplingInterval::default(),
            window: None,
            format: ImageFormat::default(),
            remove_media: false,
            tools: ToolPaths::default(),
        }
    }
}

/// State of the job being run: where it lives and what it was asked to do.
#[derive(Debug, Clone)]
pub struct Job {
    pub url: String,
    pub work_dir: WorkDir,
    pub quality: Quality,
    pub interval: SamplingInterval,
    pub window: Option<TimeWindow>,
}

impl Job {
    fn fetch_request(&self) -> FetchRequest<'_> {
        FetchRequest {
            url: &self.url,
            quality: self.quality,
            window: self.window,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResult {
    pub work_dir: PathBuf,
    pub images_dir: PathBuf,
    /// `None` when the video was removed after sampling.
    pub media_file: Option<PathBuf>,
    pub frames_decoded: u64,
    pub frames_written: u64,
    pub source_fps: f64,
}

/// Control options for a run.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Cancellation scope shared by the fetch and sample stages.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn check(&self) -> Result<()> {
        if let Some(ref token) = self.cancel_token {
            token.check()?;
        }
        Ok(())
    }
}

/// Progress sink: `(stage, current, total, message)`. `total` is 0 when unknown.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter — emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    min_interval: Duration,
    last_emit: std::sync::Mutex<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self::with_interval(inner, Duration::from_millis(200))
    }

    /// Forward every report.
    pub fn unthrottled(inner: &'a ProgressCallback<'a>) -> Self {
        Self::with_interval(inner, Duration::ZERO)
    }

    fn with_interval(inner: &'a ProgressCallback<'a>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_emit: std::sync::Mutex::new(None),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done && !self.min_interval.is_zero() {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.is_some_and(|t| t.elapsed() < self.min_interval) {
                return;
            }
            *last = Some(Instant::now());
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Run fetch then sample with the production `yt-dlp` and `ffmpeg` tools.
pub fn process(
    options: &ExtractOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback<'_>,
) -> Result<ExtractResult> {
    let tools = Toolchain::locate(&options.tools)?;
    let source = YtDlp::new(&tools.yt_dlp);
    let decoder = FfmpegDecoder::new(&tools.ffmpeg, &tools.ffprobe);
    run(options, &source, &decoder, control, progress_callback)
}

/// Run the two-stage pipeline with explicit collaborators.
///
/// The decoder is only opened after the source produced exactly one media
/// file. Nothing is cleaned up on failure or cancellation.
pub fn run<S, D>(
    options: &ExtractOptions,
    source: &S,
    decoder: &D,
    control: &ProcessControl,
    progress_callback: &ProgressCallback<'_>,
) -> Result<ExtractResult>
where
    S: VideoSource + ?Sized,
    D: FrameDecoder,
{
    let tp = ThrottledProgress::new(progress_callback);
    control.check()?;

    // Stage 1: name and create the working directory
    tp.report("probe", 0, 1, &options.url);
    let title = match source.probe_title(&options.url) {
        Ok(title) => title,
        Err(e) => {
            warn!("Could not read video title ({}), using a random directory name", e);
            None
        }
    };
    control.check()?;
    if let Some(ref t) = title {
        info!("Video title: {}", t);
    }

    let work_dir = layout::allocate(&options.output, title.as_deref())?;
    let job = Job {
        url: options.url.clone(),
        work_dir,
        quality: options.quality,
        interval: options.interval,
        window: options.window,
    };

    // Stage 2: fetch
    tp.report("fetch", 0, 1, &job.url);
    let fetched = source.fetch(&job.fetch_request(), &job.work_dir);
    // Child tools see the same Ctrl-C and usually fail; report the interrupt instead.
    control.check()?;
    let media = fetched?;
    tp.report("fetch", 1, 1, &media.display().to_string());

    // Stage 3: sample
    let sampled = sampler::sample_frames(
        decoder,
        &media,
        &job.work_dir.images,
        job.interval,
        options.format,
        &tp,
        control.cancel_token.as_ref(),
    );
    // ffmpeg dies mid-frame on the same Ctrl-C; the interrupt wins over the decode error.
    control.check()?;
    let report = sampled?;

    let media_file = if options.remove_media {
        std::fs::remove_file(&media)?;
        info!("Removed {}", media.display());
        None
    } else {
        Some(media)
    };

    Ok(ExtractResult {
        work_dir: job.work_dir.root,
        images_dir: job.work_dir.images,
        media_file,
        frames_decoded: report.frames_decoded,
        frames_written: report.frames_written,
        source_fps: report.source_fps,
    })
}
