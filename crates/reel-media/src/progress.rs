//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress snapshot from FFmpeg's `-progress` key/value stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number (0 for audio-only outputs)
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Set on the final `progress=end` block
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fold one `key=value` line into the snapshot.
    ///
    /// Returns a copy at every `progress=` line, which terminates a block.
    /// Anything that is not a progress key is ignored.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;

        match key {
            // out_time_ms is actually microseconds in every FFmpeg release
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }

        None
    }

    /// Progress percentage given the source duration, clamped to 0-100.
    pub fn percent_of(&self, total_duration_ms: i64) -> u8 {
        if self.is_complete {
            return 100;
        }
        if total_duration_ms <= 0 {
            return 0;
        }
        let pct = (self.out_time_ms as f64 / total_duration_ms as f64) * 100.0;
        pct.clamp(0.0, 100.0) as u8
    }
}

/// True for lines belonging to the `-progress` stream rather than diagnostics.
pub(crate) fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame", "fps", "stream_", "bitrate", "total_size", "out_time", "dup_frames",
        "drop_frames", "speed", "progress",
    ];
    match line.split_once('=') {
        Some((key, _)) => KEYS.iter().any(|k| key.starts_with(k)),
        None => false,
    }
}
