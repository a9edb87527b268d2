use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fetch::log_stream;

/// One decoded frame as packed RGB8.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Properties of the video stream being decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal frames per second (0.0 when the container does not say).
    pub fps: f64,
    /// Total frames, when the container reports it.
    pub frame_count: Option<u64>,
}

/// A source of frames in decode order.
pub trait FrameStream {
    fn info(&self) -> &StreamInfo;

    /// The next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens a media file for frame-by-frame decoding.
pub trait FrameDecoder {
    type Stream: FrameStream;

    fn open(&self, media: &Path) -> Result<Self::Stream>;
}

/// [`FrameDecoder`] that probes with `ffprobe` and pipes raw RGB frames out of
/// `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Read stream dimensions, frame rate and frame count.
    pub fn probe(&self, media: &Path) -> Result<StreamInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
                "-of",
                "json",
            ])
            .arg(media)
            .output()
            .map_err(|e| spawn_error(&self.ffprobe, e))?;

        log_stream("ffprobe", &output.stderr);
        if !output.status.success() {
            return Err(Error::Decode(format!(
                "ffprobe could not read {} ({})",
                media.display(),
                output.status
            )));
        }
        parse_probe(&output.stdout)
    }
}

impl FrameDecoder for FfmpegDecoder {
    type Stream = FfmpegStream;

    fn open(&self, media: &Path) -> Result<FfmpegStream> {
        let info = self.probe(media)?;
        info!(
            "Decoding {} ({}x{}, {:.2} fps, {} frames)",
            media.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        // -noautorotate keeps the output size equal to the probed stream size.
        let mut child = Command::new(&self.ffmpeg)
            .args(["-nostdin", "-v", "error", "-noautorotate", "-i"])
            .arg(media)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.ffmpeg, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Decode("ffmpeg stdout was not captured".into()))?;
        let stderr_drain = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        Ok(FfmpegStream {
            info,
            child,
            stdout: BufReader::new(stdout),
            stderr_drain,
            finished: false,
        })
    }
}

/// Running `ffmpeg` child producing raw frames on stdout.
pub struct FfmpegStream {
    info: StreamInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_drain: Option<JoinHandle<Vec<u8>>>,
    finished: bool,
}

impl FfmpegStream {
    /// Reap the child; its exit status decides whether decoding succeeded.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr_drain
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        log_stream("ffmpeg", &stderr);

        if status.success() {
            Ok(())
        } else {
            let detail = String::from_utf8_lossy(&stderr)
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("ffmpeg exited with {status}"));
            Err(Error::Decode(detail))
        }
    }
}

impl FrameStream for FfmpegStream {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let frame = read_frame(&mut self.stdout, self.info.width, self.info.height);
        match frame {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                self.finish()?;
                Ok(None)
            }
            Err(e) => {
                // A failed ffmpeg explains a short read better than the read does.
                self.finish()?;
                Err(e)
            }
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Stopping ffmpeg before end of stream");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Read one `width * height` RGB8 frame. A clean end of input yields `None`;
/// input that ends partway through a frame is an error.
pub fn read_frame(reader: &mut impl Read, width: u32, height: u32) -> Result<Option<Frame>> {
    let len = width as usize * height as usize * 3;
    let mut rgb = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut rgb[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 => Ok(None),
        n if n == len => Ok(Some(Frame { width, height, rgb })),
        n => Err(Error::Decode(format!("truncated frame: got {n} of {len} bytes"))),
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

fn parse_probe(json: &[u8]) -> Result<StreamInfo> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::Decode(format!("unreadable ffprobe output: {e}")))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::Decode("media file has no video stream".into()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::Decode("video stream has no frame size".into())),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or_else(|| {
            warn!("Frame rate unknown");
            0.0
        });
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|&n| n > 0);

    Ok(StreamInfo { width, height, fps, frame_count })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn spawn_error(program: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::MissingPrerequisite {
            tool: program.display().to_string(),
        }
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe() {
        let json = br#"{"programs":[],"streams":[{"width":640,"height":360,
            "r_frame_rate":"30/1","avg_frame_rate":"30/1","nb_frames":"300"}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info, StreamInfo { width: 640, height: 360, fps: 30.0, frame_count: Some(300) });
    }

    #[test]
    fn test_parse_probe_falls_back_to_r_frame_rate() {
        let json = br#"{"streams":[{"width":2,"height":2,"avg_frame_rate":"0/0","r_frame_rate":"24/1"}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.fps, 24.0);
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        assert!(matches!(parse_probe(br#"{"streams":[]}"#), Err(Error::Decode(_))));
        assert!(matches!(parse_probe(br#"{}"#), Err(Error::Decode(_))));
    }

    #[test]
    fn test_read_frames_until_clean_eof() {
        let bytes: Vec<u8> = (0..24).collect();
        let mut reader = Cursor::new(bytes);
        let first = read_frame(&mut reader, 2, 2).unwrap().unwrap();
        assert_eq!(first.rgb, (0..12).collect::<Vec<u8>>());
        let second = read_frame(&mut reader, 2, 2).unwrap().unwrap();
        assert_eq!(second.rgb[0], 12);
        assert!(read_frame(&mut reader, 2, 2).unwrap().is_none());
    }

    #[test]
    fn test_read_truncated_frame_is_error() {
        let mut reader = Cursor::new(vec![0u8; 5]);
        assert!(matches!(read_frame(&mut reader, 2, 2), Err(Error::Decode(_))));
    }
}
