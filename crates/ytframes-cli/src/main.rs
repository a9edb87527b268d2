use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use ytframes_core::{
    CancellationToken, Error, ExtractOptions, ImageFormat, ProcessControl, Quality, SamplingInterval,
    TimeWindow, Timecode, ToolPaths,
};

#[derive(Parser, Debug)]
#[command(name = "ytframes", version, about = "Download a video and save every Nth frame as an image")]
struct Cli {
    /// Video URL
    url: String,

    /// Download the lowest quality rendition (smaller file)
    #[arg(short, long)]
    small: bool,

    /// Capture one image every N decoded frames
    #[arg(short = 'f', value_name = "N", default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    interval: u32,

    /// Start of the time window to download (HH:MM:SS)
    #[arg(long, value_parser = parse_timecode, requires = "end_time")]
    start_time: Option<Timecode>,

    /// End of the time window to download (HH:MM:SS)
    #[arg(long, value_parser = parse_timecode, requires = "start_time")]
    end_time: Option<Timecode>,

    /// Directory in which the video's working directory is created
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Image format for captured frames
    #[arg(long, value_enum, default_value = "jpg")]
    format: ImageFormat,

    /// Remove the downloaded video after extracting frames
    #[arg(long)]
    rm: bool,

    /// ffmpeg executable
    #[arg(long, env = "YTFRAMES_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe executable
    #[arg(long, env = "YTFRAMES_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// yt-dlp executable
    #[arg(long = "yt-dlp", env = "YTFRAMES_YT_DLP", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_timecode(s: &str) -> Result<Timecode, String> {
    s.parse::<Timecode>().map_err(|e| e.to_string())
}

impl Cli {
    /// Turn parsed arguments into run options. Fails on a reversed window, so
    /// like every argument error it happens before anything touches disk.
    fn into_options(self) -> Result<ExtractOptions, Error> {
        let window = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(TimeWindow::new(start, end)?),
            _ => None,
        };

        Ok(ExtractOptions {
            url: self.url,
            output: self.output,
            quality: if self.small { Quality::Worst } else { Quality::Best },
            interval: SamplingInterval::new(self.interval)?,
            window,
            format: self.format,
            remove_media: self.rm,
            tools: ToolPaths {
                ffmpeg: self.ffmpeg,
                ffprobe: self.ffprobe,
                yt_dlp: self.yt_dlp,
            },
        })
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidArgument(_)) => 2,
        Some(Error::Interrupted) => 130,
        _ => 1,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let t_total = std::time::Instant::now();
    let options = cli.into_options()?;
    tracing::debug!(?options, "Parsed options");

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("Error registering Ctrl-C handler")?;
    let control = ProcessControl::new().with_cancel_token(token);

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{prefix}] {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    let callback = |stage: &str, current: u64, total: u64, message: &str| {
        bar.set_prefix(stage.to_string());
        bar.set_length(total);
        bar.set_position(current);
        bar.set_message(message.to_string());
        bar.tick();
    };

    let result = ytframes_core::process(&options, &control, &callback);
    bar.finish_and_clear();
    let result = result?;

    eprintln!(
        "Done! {} of {} frames written to {} ({:.2}s)",
        result.frames_written,
        result.frames_decoded,
        result.images_dir.display(),
        t_total.elapsed().as_secs_f64()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}
