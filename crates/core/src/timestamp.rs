//! Millisecond time offsets and their text representations.
//!
//! Three representations are in play: subtitle time (`HH:MM:SS,mmm`, used in
//! every persisted artifact), float seconds (what a video element seeks to),
//! and clock strings (`MM:SS` / `HH:MM:SS`, for display).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    error::{KeyMomentsError, Result},
    types::{Transcript, TranscriptSegment},
};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// A non-negative offset from the start of the video, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeOffset(u64);

impl TimeOffset {
    pub const ZERO: TimeOffset = TimeOffset(0);

    pub const fn from_millis(ms: u64) -> Self {
        TimeOffset(ms)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whisper reports segment bounds in centiseconds.
    pub const fn from_centis(cs: u64) -> Self {
        TimeOffset(cs * 10)
    }

    /// Round float seconds to the nearest millisecond.
    pub fn from_seconds(seconds: f64) -> Result<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(KeyMomentsError::Range {
                value: seconds.to_string(),
            });
        }
        let ms = (seconds * MS_PER_SECOND as f64).round();
        if ms >= u64::MAX as f64 {
            return Err(KeyMomentsError::Range {
                value: seconds.to_string(),
            });
        }
        Ok(TimeOffset(ms as u64))
    }

    pub fn to_seconds(&self) -> f64 {
        self.0 as f64 / MS_PER_SECOND as f64
    }

    /// Parse `HH:MM:SS,mmm`.
    ///
    /// Hours take at least two digits and carry no leading zero beyond the
    /// padding, so that [`TimeOffset::to_subtitle_time`] reproduces the input
    /// exactly.
    pub fn parse_subtitle_time(s: &str) -> Result<Self> {
        let invalid = || KeyMomentsError::Format {
            input: s.to_string(),
        };

        let (clock, millis) = s.split_once(',').ok_or_else(invalid)?;
        let mut parts = clock.split(':');
        let (Some(hours), Some(minutes), Some(seconds), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if hours.len() < 2 || (hours.len() > 2 && hours.starts_with('0')) {
            return Err(invalid());
        }
        if minutes.len() != 2 || seconds.len() != 2 || millis.len() != 3 {
            return Err(invalid());
        }

        let hours = parse_digits(hours).ok_or_else(invalid)?;
        let minutes = parse_digits(minutes).ok_or_else(invalid)?;
        let seconds = parse_digits(seconds).ok_or_else(invalid)?;
        let millis = parse_digits(millis).ok_or_else(invalid)?;

        if minutes >= 60 || seconds >= 60 {
            return Err(invalid());
        }

        hours
            .checked_mul(MS_PER_HOUR)
            .and_then(|ms| ms.checked_add(minutes * MS_PER_MINUTE))
            .and_then(|ms| ms.checked_add(seconds * MS_PER_SECOND))
            .and_then(|ms| ms.checked_add(millis))
            .map(TimeOffset)
            .ok_or_else(invalid)
    }

    pub fn to_subtitle_time(&self) -> String {
        let (h, m, s, ms) = self.components();
        format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
    }

    /// `MM:SS` below one hour, `HH:MM:SS` from there on. Milliseconds are
    /// truncated.
    pub fn to_clock_string(&self) -> String {
        let (h, m, s, _) = self.components();
        if h > 0 {
            format!("{:02}:{:02}:{:02}", h, m, s)
        } else {
            format!("{:02}:{:02}", m, s)
        }
    }

    /// Shift by a signed number of milliseconds.
    pub fn checked_offset(&self, delta_ms: i64) -> Result<Self> {
        let shifted = self.0 as i128 + delta_ms as i128;
        if shifted < 0 || shifted > u64::MAX as i128 {
            return Err(KeyMomentsError::Range {
                value: format!("{} ms {:+} ms", self.0, delta_ms),
            });
        }
        Ok(TimeOffset(shifted as u64))
    }

    /// Start of the `width_ms` bucket containing this offset.
    pub fn bucket(&self, width_ms: u64) -> Self {
        if width_ms == 0 {
            return *self;
        }
        TimeOffset(self.0 - self.0 % width_ms)
    }

    fn components(&self) -> (u64, u64, u64, u64) {
        (
            self.0 / MS_PER_HOUR,
            (self.0 % MS_PER_HOUR) / MS_PER_MINUTE,
            (self.0 % MS_PER_MINUTE) / MS_PER_SECOND,
            self.0 % MS_PER_SECOND,
        )
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for TimeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_subtitle_time())
    }
}

impl FromStr for TimeOffset {
    type Err = KeyMomentsError;

    fn from_str(s: &str) -> Result<Self> {
        TimeOffset::parse_subtitle_time(s)
    }
}

impl Serialize for TimeOffset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_subtitle_time())
    }
}

impl<'de> Deserialize<'de> for TimeOffset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeOffset::parse_subtitle_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// The last segment starting at or before `at`, found by binary search.
pub fn nearest_segment(transcript: &Transcript, at: TimeOffset) -> Option<&TranscriptSegment> {
    let idx = transcript
        .segments
        .partition_point(|segment| segment.start <= at);
    idx.checked_sub(1).map(|i| &transcript.segments[i])
}
