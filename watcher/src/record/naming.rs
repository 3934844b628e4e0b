use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

pub const FEED_FILE: &str = "feed.mp4";
pub const DELTA_FILE: &str = "delta.mp4";
pub const MASK_FILE: &str = "mask.mp4";

fn fmt_ts(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

fn date_str(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y-%m-%d").to_string()
}

/// Directory for one clip, named after the session start.
/// e.g. "videos/2026-02-18/20260218T093000000Z/"
pub fn clip_dir(base: &Path, started_at_ms: i64) -> PathBuf {
    base.join(date_str(started_at_ms))
        .join(fmt_ts(started_at_ms))
}
