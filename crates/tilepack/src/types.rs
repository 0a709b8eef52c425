use bytes::Bytes;
use serde::Deserialize;

use crate::error::{TilepackError, TilepackResult};

/// Track identifiers handed out to tile tracks and extractor tracks.
pub type TrackId = u64;

/// Quality rank assigned to the main (highest priority) stream.
pub const MAINSTREAM_QUALITY_RANK: u8 = 1;

/// First track id used for extractor tracks; tile tracks stay below it.
pub const DEFAULT_EXTRACTORTRACK_TRACKIDBASE: TrackId = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rational {
    pub num: u64,
    pub den: u64,
}

impl Rational {
    pub const fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

impl Codec {
    /// Maps the raw codec id carried by a bitstream descriptor.
    pub fn from_id(id: u8) -> TilepackResult<Self> {
        match id {
            0 => Ok(Self::H264),
            1 => Ok(Self::H265),
            _ => Err(TilepackError::UndefinedOperation(format!(
                "unknown codec id {id}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Equirectangular,
    Cubemap,
}

impl Projection {
    /// Maps the raw projection id reported by the NALU parser.
    pub fn from_id(id: u8) -> TilepackResult<Self> {
        match id {
            0 => Ok(Self::Equirectangular),
            1 => Ok(Self::Cubemap),
            _ => Err(TilepackError::InvalidProjectionType(id)),
        }
    }
}

/// One coded access unit queued for segmentation.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub data: Bytes,
    pub pts: u64,
    pub is_key_frame: bool,
}

/// Pixel geometry of one tile inside the source picture, row-major order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileInfo {
    pub horizontal_pos: u32,
    pub vertical_pos: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// Raw descriptor of one input elementary stream, as handed in by the caller.
#[derive(Debug, Clone)]
pub struct BsBuffer {
    /// Codec id: 0 = H.264, 1 = H.265.
    pub codec_id: u8,
    /// Header bitstream chunk consumed by the NALU parser at initialization.
    pub data: Bytes,
    pub frame_rate: Rational,
    pub bit_rate: u64,
}

/// Immutable segmentation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentInfo {
    /// Output directory prefix, including any trailing separator.
    pub dir_name: String,
    /// Base name of all emitted files.
    pub out_name: String,
    /// Target segment duration in seconds.
    pub seg_dur: u64,
    pub is_live: bool,
    /// Number of segments kept available in the live window.
    pub window_size: u32,
    /// Extra segments kept beyond the window before deletion.
    pub extra_window_size: u32,
    /// Extractor tracks serviced by one worker thread.
    pub extractor_tracks_per_seg_thread: u16,
}

impl SegmentInfo {
    /// `{dir}{out}_track{id}` — base path shared by init and media segments.
    pub fn track_base_name(&self, track_id: TrackId) -> String {
        format!("{}{}_track{}", self.dir_name, self.out_name, track_id)
    }

    /// `{dir}{out}_track{id}.init.mp4`
    pub fn init_seg_name(&self, track_id: TrackId) -> String {
        format!("{}.init.mp4", self.track_base_name(track_id))
    }

    /// `{dir}{out}_track{id}.{seg}.mp4`
    pub fn media_seg_name(&self, track_id: TrackId, seg_idx: u64) -> String {
        format!("{}.{}.mp4", self.track_base_name(track_id), seg_idx)
    }
}
