//! Best-effort parsing of the ffprobe banner.
//!
//! `ffprobe -hide_banner <file>` prints a human-readable description of the
//! container and its streams. Each field is matched independently; a field
//! that cannot be found stays `None` instead of failing the whole parse.

use std::sync::LazyLock;

use fc_core::FixedSeconds;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2})\.(\d{2})").expect("valid regex")
});

static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?) fps").expect("valid regex"));

static DIMENSIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3,4})x(\d{3,4})\b").expect("valid regex"));

static CODEC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Video:\s*([A-Za-z0-9_]+)").expect("valid regex"));

/// Container and primary video stream properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration: Option<FixedSeconds>,
    /// Rounded to the nearest whole frame per second.
    pub frame_rate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub file_size: u64,
}

/// Parse ffprobe banner text. Line-oriented; the first match of each field
/// wins, and stream fields are only read from `Video:` lines.
pub fn parse_banner(text: &str) -> VideoMetadata {
    let mut meta = VideoMetadata::default();

    for line in text.lines() {
        if meta.duration.is_none() {
            if let Some(c) = DURATION_RE.captures(line) {
                let field = |i: usize| c[i].parse::<i64>().unwrap_or(0);
                meta.duration = Some(FixedSeconds::from_clock(field(1), field(2), field(3), field(4)));
            }
        }

        if !line.contains("Video:") {
            continue;
        }

        if meta.codec.is_none() {
            meta.codec = CODEC_RE.captures(line).map(|c| c[1].to_string());
        }
        if meta.width.is_none() {
            if let Some(c) = DIMENSIONS_RE.captures(line) {
                meta.width = c[1].parse().ok();
                meta.height = c[2].parse().ok();
            }
        }
        if meta.frame_rate.is_none() {
            meta.frame_rate = FPS_RE
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok())
                .map(|fps| fps.round() as u32);
        }
    }

    meta
}

/// Parse the single-value duration printed by
/// `ffprobe -show_entries format=duration -of default=noprint_wrappers=1:nokey=1`.
pub fn parse_duration_value(text: &str) -> Option<f64> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite())
}
