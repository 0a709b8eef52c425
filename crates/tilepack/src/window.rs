//! Live sliding-window cleanup.

use std::io::ErrorKind;

use tracing::warn;

use crate::types::{SegmentInfo, TrackId};

/// Deletes media segments that have fallen out of the live window.
///
/// After segment `n` closes, segment `n - window_size - extra_window_size`
/// is removed for every track. Deletion is best effort: files already gone
/// are ignored.
pub struct LiveWindowJanitor {
    seg_info: SegmentInfo,
    track_ids: Vec<TrackId>,
}

impl LiveWindowJanitor {
    pub fn new(seg_info: SegmentInfo, track_ids: Vec<TrackId>) -> Self {
        Self {
            seg_info,
            track_ids,
        }
    }

    /// Runs the cleanup step for the newest closed segment.
    pub fn collect(&self, seg_num: u64) {
        if self.seg_info.window_size == 0 || self.seg_info.extra_window_size == 0 {
            return;
        }

        let keep = (self.seg_info.window_size + self.seg_info.extra_window_size) as u64;
        let Some(remove_idx) = seg_num.checked_sub(keep).filter(|&idx| idx > 0) else {
            return;
        };

        for &track_id in &self.track_ids {
            let path = self.seg_info.media_seg_name(track_id, remove_idx);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("failed to remove expired segment {path}: {e}");
                }
            }
        }
    }
}
