//! MPD writer seam.
//!
//! Manifest generation lives outside this crate. The orchestrator builds an
//! [`MpdContext`] snapshot after the track builders ran, asks the caller's
//! [`MpdWriterFactory`] for a writer, and drives it: `update_mpd` while live,
//! `write_mpd` once on the final frame of a static run.

use crate::{
    error::TilepackResult,
    meta::CodedMeta,
    types::{Projection, Rational, SegmentInfo, TrackId},
};

/// Snapshot of one track as the MPD writer sees it.
#[derive(Debug, Clone)]
pub struct MpdTrackEntry {
    pub track_id: TrackId,
    pub meta: CodedMeta,
    pub quality_rank: u8,
}

/// Everything the MPD writer needs about a segmentation run.
#[derive(Debug, Clone)]
pub struct MpdContext {
    pub tile_tracks: Vec<MpdTrackEntry>,
    pub extractor_tracks: Vec<MpdTrackEntry>,
    pub seg_info: SegmentInfo,
    pub projection: Projection,
    pub frame_rate: Rational,
}

pub trait MpdWriter: Send {
    fn initialize(&mut self) -> TilepackResult<()>;

    /// Refreshes a live manifest after `seg_num` segments / `frames_num`
    /// frames.
    fn update_mpd(&mut self, seg_num: u64, frames_num: u64) -> TilepackResult<()>;

    /// Writes the static manifest once the stream ended.
    fn write_mpd(&mut self, frames_num: u64) -> TilepackResult<()>;
}

pub trait MpdWriterFactory {
    fn create_writer(&self, context: MpdContext) -> TilepackResult<Box<dyn MpdWriter>>;
}
