//! Writer-facing sample metadata.
//!
//! [`CodedMeta`] is the per-frame template handed to the ISO-BMFF segment
//! writer; it is built once per track and mutated per frame (frame type,
//! EOS flag, presentation counters).

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{
    omaf::{PicResolution, RegionWisePacking, SphereRegion},
    types::{Projection, Rational, TrackId, MAINSTREAM_QUALITY_RANK},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Idr,
    NonIdr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedFormat {
    H264,
    H265,
    H265Extractor,
}

/// Decoder configuration NALU slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigType {
    Vps,
    Sps,
    Pps,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitrate {
    pub avg_bitrate: u64,
    pub max_bitrate: u64,
}

/// One region of the writer-facing packing, flattened from
/// [`RectRegionPacking`](crate::omaf::RectRegionPacking).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub proj_top: u32,
    pub proj_left: u32,
    pub proj_width: u32,
    pub proj_height: u32,
    pub transform: u8,
    pub packed_top: u32,
    pub packed_left: u32,
    pub packed_width: u32,
    pub packed_height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionPacking {
    pub constituent_pict_matching: bool,
    pub proj_picture_width: u32,
    pub proj_picture_height: u32,
    pub packed_picture_width: u32,
    pub packed_picture_height: u32,
    pub regions: Vec<Region>,
}

impl From<&RegionWisePacking> for RegionPacking {
    fn from(rwpk: &RegionWisePacking) -> Self {
        Self {
            constituent_pict_matching: rwpk.constituent_pic_matching,
            proj_picture_width: rwpk.proj_pic_width,
            proj_picture_height: rwpk.proj_pic_height,
            packed_picture_width: rwpk.packed_pic_width,
            packed_picture_height: rwpk.packed_pic_height,
            regions: rwpk
                .regions
                .iter()
                .map(|r| Region {
                    proj_top: r.proj_reg_top,
                    proj_left: r.proj_reg_left,
                    proj_width: r.proj_reg_width,
                    proj_height: r.proj_reg_height,
                    transform: r.transform_type,
                    packed_top: r.packed_reg_top,
                    packed_left: r.packed_reg_left,
                    packed_width: r.packed_reg_width,
                    packed_height: r.packed_reg_height,
                })
                .collect(),
        }
    }
}

/// Spherical coverage of the whole track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Spherical {
    pub c_azimuth: i32,
    pub c_elevation: i32,
    pub c_tilt: i32,
    pub r_azimuth: u32,
    pub r_elevation: u32,
}

impl From<&SphereRegion> for Spherical {
    fn from(region: &SphereRegion) -> Self {
        Self {
            c_azimuth: region.centre_azimuth,
            c_elevation: region.centre_elevation,
            c_tilt: region.centre_tilt,
            r_azimuth: region.azimuth_range,
            r_elevation: region.elevation_range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityInfo {
    pub orig_width: u32,
    pub orig_height: u32,
    pub quality_rank: u8,
    pub sphere: Spherical,
}

/// Quality ranking over the spherical coverage of an extractor track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quality3d {
    pub quality_info: Vec<QualityInfo>,
    pub remaining_area: bool,
}

impl Quality3d {
    /// One [`QualityInfo`] per source picture resolution, ranked from
    /// [`MAINSTREAM_QUALITY_RANK`] upward, all sharing the track coverage.
    pub fn from_pic_resolutions(
        coverage: Spherical,
        pic_res_list: &[PicResolution],
    ) -> Self {
        let quality_info = pic_res_list
            .iter()
            .enumerate()
            .map(|(res_idx, res)| QualityInfo {
                orig_width: res.width,
                orig_height: res.height,
                quality_rank: MAINSTREAM_QUALITY_RANK + res_idx as u8,
                sphere: coverage,
            })
            .collect();

        Self {
            quality_info,
            remaining_area: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterMeta {
    /// Duration of one produced segment, in seconds.
    pub segment_duration: Rational,
}

/// Per-frame metadata template given to the segment writer.
#[derive(Debug, Clone)]
pub struct CodedMeta {
    pub pres_index: u64,
    pub coding_index: u64,
    pub pres_time: Rational,
    pub duration: Rational,
    pub track_id: TrackId,
    pub in_coding_order: bool,
    pub format: CodedFormat,
    pub decoder_config: BTreeMap<ConfigType, Bytes>,
    pub width: u32,
    pub height: u32,
    pub bitrate: Bitrate,
    pub r#type: FrameType,
    pub is_eos: bool,
    pub projection: Projection,
    pub region_packing: Option<RegionPacking>,
    pub spherical_coverage: Option<Spherical>,
    pub quality_rank_coverage: Option<Quality3d>,
    pub segmenter_meta: SegmenterMeta,
}
