//! The frame selection rule shared by the sampler and its callers.
//!
//! A sampling interval `N` means "keep every Nth decoded frame": decoded frame
//! `count` (zero-based) is captured iff `count % N == 0`. Captured images keep
//! their decode index in the file name, so indices are sparse (`0, N, 2N, ...`).
//! `N` is never treated as a frames-per-second value.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default stride: one image per 30 decoded frames.
pub const DEFAULT_INTERVAL: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SamplingInterval(NonZeroU32);

impl SamplingInterval {
    pub fn new(n: u32) -> Result<Self, Error> {
        NonZeroU32::new(n)
            .map(Self)
            .ok_or_else(|| Error::InvalidArgument("sampling interval must be a positive integer".into()))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Whether the frame at decode index `count` is written out.
    pub fn captures(&self, count: u64) -> bool {
        count % u64::from(self.get()) == 0
    }

    /// Number of images produced from `decoded` frames: `ceil(decoded / N)`.
    pub fn expected_captures(&self, decoded: u64) -> u64 {
        decoded.div_ceil(u64::from(self.get()))
    }

    /// Decode indices that are captured out of `decoded` frames.
    pub fn captured_indices(&self, decoded: u64) -> impl Iterator<Item = u64> {
        (0..decoded).step_by(self.get() as usize)
    }
}

impl Default for SamplingInterval {
    fn default() -> Self {
        Self(NonZeroU32::new(DEFAULT_INTERVAL).unwrap_or(NonZeroU32::MIN))
    }
}

impl TryFrom<u32> for SamplingInterval {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SamplingInterval> for u32 {
    fn from(value: SamplingInterval) -> Self {
        value.get()
    }
}

impl fmt::Display for SamplingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Still-image encoding used for captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub(crate) fn encoder(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// `frame_<count>.<ext>`, where `count` is the zero-based decode index.
pub fn frame_file_name(count: u64, format: ImageFormat) -> String {
    format!("frame_{}.{}", count, format.extension())
}
