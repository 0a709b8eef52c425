//! Extractor tracks.
//!
//! An extractor track describes how a chosen subset of tile tracks merges
//! back into one decodable HEVC bitstream. The per-frame extractor samples
//! themselves are built by an external collaborator behind
//! [`ExtractorSampleBuilder`]; this module keeps the track state the
//! segmentation loop needs: merge layout, merged headers, packing/coverage of
//! the merged picture, the per-segment SEI prefix, and the tick gate that
//! synchronizes the track's worker thread with the orchestrator.

use std::{collections::BTreeMap, sync::Arc};

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};

use crate::{
    error::TilepackResult,
    omaf::{ContentCoverage, PicResolution, RegionWisePacking},
    stream::TileNaluScratch,
    types::TrackId,
};

/// Reference to one tile of one input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRef {
    pub stream_idx: u8,
    pub orig_tile_idx: u32,
}

/// Tile-merge layout: tile references grouped into picture columns, in the
/// order they appear in the merged picture.
#[derive(Debug, Clone, Default)]
pub struct TilesMergeDirection {
    pub cols: Vec<Vec<TileRef>>,
}

impl TilesMergeDirection {
    pub fn tile_refs(&self) -> impl Iterator<Item = &TileRef> {
        self.cols.iter().flatten()
    }
}

/// Builds one frame's extractor sample from the referenced tile slices,
/// given in merge-layout order (external collaborator).
pub trait ExtractorSampleBuilder: Send {
    fn construct_extractors(&mut self, tile_slices: &[Bytes]) -> TilepackResult<Bytes>;
}

/// Caller-provided description of one extractor track.
pub struct ExtractorTrackConfig {
    pub merge_layout: TilesMergeDirection,
    /// Merged decoder configuration of the assembled bitstream.
    pub vps: Bytes,
    pub sps: Bytes,
    pub pps: Bytes,
    /// Packing of the merged picture (multi-region).
    pub rwpk: RegionWisePacking,
    /// Spherical coverage of the merged picture.
    pub covi: ContentCoverage,
    /// Source picture resolutions contributing to this track, highest
    /// quality first.
    pub pic_res_list: Vec<PicResolution>,
    pub proj_sei: Bytes,
    pub rwpk_sei: Bytes,
    pub sample_builder: Box<dyn ExtractorSampleBuilder>,
}

/// Ordered set of extractor tracks, keyed by extractor index.
pub type ExtractorTrackSet = BTreeMap<u8, ExtractorTrackConfig>;

/// Resolved source of one referenced tile slice.
pub(crate) struct TileSliceSource {
    pub scratch: TileNaluScratch,
    pub tile_idx: usize,
}

/// Runtime state of one extractor track, owned by its worker thread after
/// spawn.
pub struct ExtractorTrack {
    extractor_idx: u8,
    proj_sei: Bytes,
    rwpk_sei: Bytes,
    sample_builder: Box<dyn ExtractorSampleBuilder>,
    tile_sources: Vec<TileSliceSource>,
    /// NALUs owned by the open segment, freed when it closes.
    curr_seg_nalus: Vec<Bytes>,
    processed_frames: u64,
}

impl ExtractorTrack {
    pub(crate) fn new(
        extractor_idx: u8,
        proj_sei: Bytes,
        rwpk_sei: Bytes,
        sample_builder: Box<dyn ExtractorSampleBuilder>,
        tile_sources: Vec<TileSliceSource>,
    ) -> Self {
        Self {
            extractor_idx,
            proj_sei,
            rwpk_sei,
            sample_builder,
            tile_sources,
            curr_seg_nalus: Vec::new(),
            processed_frames: 0,
        }
    }

    pub fn extractor_idx(&self) -> u8 {
        self.extractor_idx
    }

    /// Builds this frame's extractor sample from the referenced tile slices.
    pub(crate) fn construct_extractors(&mut self) -> TilepackResult<Bytes> {
        let slices: Vec<Bytes> = self
            .tile_sources
            .iter()
            .map(|source| {
                source
                    .scratch
                    .read()
                    .get(source.tile_idx)
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();

        self.sample_builder.construct_extractors(&slices)
    }

    /// `projSEI || rwpkSEI` — the prefix installed once per segment.
    pub(crate) fn build_sei_prefix(&self) -> Bytes {
        let mut prefix = BytesMut::with_capacity(self.proj_sei.len() + self.rwpk_sei.len());
        prefix.extend_from_slice(&self.proj_sei);
        prefix.extend_from_slice(&self.rwpk_sei);
        prefix.freeze()
    }

    /// Takes ownership of a NALU for the lifetime of the open segment.
    pub(crate) fn add_extractors_nalu_to_seg(&mut self, nalu: Bytes) {
        self.curr_seg_nalus.push(nalu);
    }

    /// Frees the NALUs of the segment that just closed.
    pub(crate) fn destroy_curr_seg_nalus(&mut self) {
        self.curr_seg_nalus.clear();
    }

    pub(crate) fn increase_processed_frm_num(&mut self) {
        self.processed_frames += 1;
    }

    pub(crate) fn processed_frm_num(&self) -> u64 {
        self.processed_frames
    }
}

/// Per-tick payload published by the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TickState {
    /// 1-based tick number; frames published so far.
    pub tick: u64,
    pub is_key_frame: bool,
    pub is_eos: bool,
    /// Set on abnormal termination; workers exit without processing.
    pub shutdown: bool,
}

/// Condvar-backed replacement for the frames-ready / processed-frames
/// spin-wait pair.
///
/// The orchestrator publishes a tick after all tile-track segments of the
/// tick are written; the worker parks until the tick it needs is published,
/// services its extractor tracks, then reports the tick processed. Writes
/// made before [`TickGate::publish`] are visible to a worker woken by
/// [`TickGate::wait_published`].
#[derive(Default)]
pub(crate) struct TickGate {
    published: Mutex<TickState>,
    published_cv: Condvar,
    processed: Mutex<u64>,
    processed_cv: Condvar,
}

impl TickGate {
    /// Publishes tick `tick` (orchestrator side).
    pub fn publish(&self, tick: u64, is_key_frame: bool, is_eos: bool) {
        let mut state = self.published.lock();
        *state = TickState {
            tick,
            is_key_frame,
            is_eos,
            shutdown: false,
        };
        self.published_cv.notify_all();
    }

    /// Wakes parked workers for abnormal termination.
    pub fn shutdown(&self) {
        let mut state = self.published.lock();
        state.shutdown = true;
        self.published_cv.notify_all();
    }

    /// Parks until tick `tick` (or shutdown) is published (worker side).
    pub fn wait_published(&self, tick: u64) -> TickState {
        let mut state = self.published.lock();
        while state.tick < tick && !state.shutdown {
            self.published_cv.wait(&mut state);
        }
        *state
    }

    /// Reports tick `tick` fully processed (worker side).
    pub fn mark_processed(&self, tick: u64) {
        let mut processed = self.processed.lock();
        *processed = tick;
        self.processed_cv.notify_all();
    }

    /// Parks until the worker has processed tick `tick` (orchestrator side).
    pub fn wait_processed(&self, tick: u64) {
        let mut processed = self.processed.lock();
        while *processed < tick {
            self.processed_cv.wait(&mut processed);
        }
    }
}

/// Handle the orchestrator keeps per extractor track after the track state
/// moved into its worker thread.
#[derive(Clone)]
pub(crate) struct ExtractorHandle {
    pub track_id: TrackId,
    pub gate: Arc<TickGate>,
}
