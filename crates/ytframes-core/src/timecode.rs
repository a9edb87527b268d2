use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::Error;

static TIMECODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}):([0-5]\d):([0-5]\d)$").unwrap());

/// A wall-clock offset into a video, written `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timecode {
    seconds: u32,
}

impl Timecode {
    pub fn from_seconds(seconds: u32) -> Self {
        Self { seconds }
    }

    pub fn as_seconds(&self) -> u32 {
        self.seconds
    }
}

impl FromStr for Timecode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TIMECODE_RE.captures(s.trim()).ok_or_else(|| {
            Error::InvalidArgument(format!("timecode `{s}` is not in HH:MM:SS format"))
        })?;
        // The regex guarantees every group is a short run of digits.
        let field = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
        Ok(Self::from_seconds(field(1) * 3600 + field(2) * 60 + field(3)))
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.seconds / 3600;
        let m = (self.seconds % 3600) / 60;
        let s = self.seconds % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

impl TryFrom<String> for Timecode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timecode> for String {
    fn from(value: Timecode) -> Self {
        value.to_string()
    }
}

/// A `[start, end)` window of a video to keep when fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: Timecode,
    end: Timecode,
}

impl TimeWindow {
    pub fn new(start: Timecode, end: Timecode) -> Result<Self, Error> {
        if start >= end {
            return Err(Error::InvalidArgument(format!(
                "start time {start} must be before end time {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Timecode {
        self.start
    }

    pub fn end(&self) -> Timecode {
        self.end
    }

    pub fn duration_seconds(&self) -> u32 {
        self.end.as_seconds() - self.start.as_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timecode() {
        let tc: Timecode = "01:02:03".parse().unwrap();
        assert_eq!(tc.as_seconds(), 3723);
        assert_eq!(tc.to_string(), "01:02:03");
        assert_eq!("00:00:05".parse::<Timecode>().unwrap().as_seconds(), 5);
    }

    #[test]
    fn test_reject_malformed_timecodes() {
        for bad in ["5", "0:00:05", "00:60:00", "00:00:61", "aa:bb:cc", "00:00:05.5", ""] {
            assert!(
                matches!(bad.parse::<Timecode>(), Err(Error::InvalidArgument(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_window_requires_start_before_end() {
        let start: Timecode = "00:00:05".parse().unwrap();
        let end: Timecode = "00:00:10".parse().unwrap();
        let window = TimeWindow::new(start, end).unwrap();
        assert_eq!(window.duration_seconds(), 5);

        assert!(TimeWindow::new(end, start).is_err());
        assert!(TimeWindow::new(start, start).is_err());
    }

    #[test]
    fn test_timecode_serde_as_string() {
        let tc = Timecode::from_seconds(65);
        let json = serde_json::to_string(&tc).unwrap();
        assert_eq!(json, "\"00:01:05\"");
        let back: Timecode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tc);
        assert!(serde_json::from_str::<Timecode>("\"1:05\"").is_err());
    }
}
