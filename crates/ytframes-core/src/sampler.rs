use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::decode::{Frame, FrameDecoder, FrameStream};
use crate::error::{Error, Result};
use crate::sampling::{frame_file_name, ImageFormat, SamplingInterval};
use crate::ThrottledProgress;

/// Outcome of one sampling pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    pub frames_decoded: u64,
    pub frames_written: u64,
    pub source_fps: f64,
}

/// Decode `media` and write every `interval`-th frame into `images_dir` as
/// `frame_<decode index>.<ext>`.
///
/// Frames written before an error or cancellation stay on disk.
pub fn sample_frames<D: FrameDecoder>(
    decoder: &D,
    media: &Path,
    images_dir: &Path,
    interval: SamplingInterval,
    format: ImageFormat,
    progress: &ThrottledProgress,
    cancel_token: Option<&CancellationToken>,
) -> Result<SampleReport> {
    if !images_dir.is_dir() {
        return Err(Error::ImagesDirMissing(images_dir.to_path_buf()));
    }

    let mut stream = decoder.open(media)?;
    let total = stream.info().frame_count.unwrap_or(0);
    let mut report = SampleReport {
        source_fps: stream.info().fps,
        ..SampleReport::default()
    };

    let mut count: u64 = 0;
    loop {
        if let Some(token) = cancel_token {
            token.check()?;
        }
        let Some(frame) = stream.next_frame()? else {
            break;
        };

        if interval.captures(count) {
            let name = frame_file_name(count, format);
            write_frame(frame, &images_dir.join(&name), format)?;
            report.frames_written += 1;
            progress.report("sample", count, total, &name);
        }
        count += 1;
    }
    report.frames_decoded = count;

    info!(
        "Wrote {} of {} decoded frames to {}",
        report.frames_written,
        report.frames_decoded,
        images_dir.display()
    );
    Ok(report)
}

fn write_frame(frame: Frame, path: &Path, format: ImageFormat) -> Result<()> {
    let Frame { width, height, rgb } = frame;
    let len = rgb.len();
    let img = image::RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        Error::Decode(format!("frame buffer of {len} bytes does not match {width}x{height}"))
    })?;
    img.save_with_format(path, format.encoder())?;
    debug!("Wrote {}", path.display());
    Ok(())
}
