//! Segment-writer seam.
//!
//! The low-level ISO-BMFF writer lives outside this crate; it is reached
//! through [`InitSegmenter`] / [`Segmenter`], constructed by a caller-provided
//! [`SegmenterFactory`] from the configs assembled by the track builders.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{
    error::TilepackResult,
    meta::CodedMeta,
    types::{Rational, TrackId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    None,
    Omaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMeta {
    pub track_id: TrackId,
    pub timescale: Rational,
    pub r#type: MediaType,
}

/// Per-track entry of an init segment, including track references
/// (`scal` for extractor tracks).
#[derive(Debug, Clone)]
pub struct TrackConfig {
    pub meta: TrackMeta,
    pub track_references: BTreeMap<String, Vec<TrackId>>,
}

impl TrackConfig {
    pub fn new(meta: TrackMeta) -> Self {
        Self {
            meta,
            track_references: BTreeMap::new(),
        }
    }
}

/// Configuration of one init segment.
#[derive(Debug, Clone)]
pub struct InitSegConfig {
    pub tracks: BTreeMap<TrackId, TrackConfig>,
    pub fragmented: bool,
    pub write_to_bitstream: bool,
    pub packed_sub_pictures: bool,
    pub mode: OperatingMode,
    pub stream_ids: Vec<TrackId>,
    pub init_seg_name: String,
}

/// Configuration of one media-segment writer.
#[derive(Debug, Clone)]
pub struct GeneralSegConfig {
    pub sgt_duration: Rational,
    /// Sub-segment duration; equal to `sgt_duration` (no sub-segmentation).
    pub subsgt_duration: Rational,
    pub need_check_idr: bool,
    pub tracks: BTreeMap<TrackId, TrackMeta>,
    pub use_separated_sidx: bool,
    pub stream_ids: Vec<TrackId>,
    pub base_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Tile { stream_idx: u8, tile_idx: u32 },
    Extractor { extractor_idx: u8 },
}

/// Per-track segmentation state handed to the segment writer.
///
/// `sample` carries the coded payload of the current frame: the tile slice
/// NALU for a tile track, the constructed extractor sample for an extractor
/// track. It is empty on the EOS flush call.
#[derive(Debug, Clone)]
pub struct TrackSegmentCtx {
    pub kind: TrackKind,
    pub track_id: TrackId,
    pub init_cfg: InitSegConfig,
    pub seg_cfg: GeneralSegConfig,
    pub coded_meta: CodedMeta,
    pub quality_rank: u8,
    pub sample: Bytes,
    /// Per-segment `projSEI || rwpkSEI` prefix of an extractor track. Taken
    /// (moved) out on the first frame of each segment, rebuilt on close.
    pub extractor_nalu: Option<Bytes>,
}

/// Writes the init segment of one track.
///
/// `all_tile_tracks` is the coded-meta snapshot of every tile track built in
/// the same run, keyed by track id; extractor init segments resolve their
/// `scal` references against it.
pub trait InitSegmenter: Send {
    fn generate_init_segment(
        &mut self,
        ctx: &TrackSegmentCtx,
        all_tile_tracks: &BTreeMap<TrackId, CodedMeta>,
    ) -> TilepackResult<()>;
}

/// Writes media segments for one track, one coded frame at a time.
///
/// A call with `ctx.coded_meta.is_eos == true` is a flush: the writer must
/// close the open segment and append no sample data.
pub trait Segmenter: Send {
    fn segment_data(&mut self, ctx: &mut TrackSegmentCtx) -> TilepackResult<()>;

    /// Number of segments closed so far; the index of the newest emitted
    /// `{base}.{n}.mp4` file.
    fn segments_num(&self) -> u64;
}

/// Builds writer instances from track configs.
pub trait SegmenterFactory: Send + Sync {
    fn create_init_segmenter(
        &self,
        config: &InitSegConfig,
    ) -> TilepackResult<Box<dyn InitSegmenter>>;

    fn create_segmenter(
        &self,
        config: &GeneralSegConfig,
        with_idr_boundary: bool,
    ) -> TilepackResult<Box<dyn Segmenter>>;
}

/// One built track: its segmentation context plus the writers bound to it.
pub struct TrackEntry {
    pub ctx: TrackSegmentCtx,
    pub init_segmenter: Box<dyn InitSegmenter>,
    pub segmenter: Box<dyn Segmenter>,
}

impl TrackEntry {
    /// Writes one frame and advances the presentation counters.
    pub fn write_frame(&mut self, frame_rate: Rational) -> TilepackResult<()> {
        self.segmenter.segment_data(&mut self.ctx)?;

        let meta = &mut self.ctx.coded_meta;
        meta.pres_index += 1;
        meta.coding_index += 1;
        meta.pres_time.num += 1000 / (frame_rate.num / frame_rate.den);
        meta.pres_time.den = 1000;

        Ok(())
    }
}
