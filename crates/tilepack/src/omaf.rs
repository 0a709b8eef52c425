//! Region-wise packing and content coverage metadata.
//!
//! Both structures are derived from the tile grid of a source picture: one
//! rectangular region / one sphere region per tile, covering the full
//! projected picture between them.

use crate::types::TileInfo;

/// One rectangular region mapping a projected rect onto a packed rect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RectRegionPacking {
    pub transform_type: u8,
    pub guard_band: bool,
    pub proj_reg_width: u32,
    pub proj_reg_height: u32,
    pub proj_reg_top: u32,
    pub proj_reg_left: u32,
    pub packed_reg_width: u32,
    pub packed_reg_height: u32,
    pub packed_reg_top: u32,
    pub packed_reg_left: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionWisePacking {
    pub constituent_pic_matching: bool,
    pub proj_pic_width: u32,
    pub proj_pic_height: u32,
    pub packed_pic_width: u32,
    pub packed_pic_height: u32,
    pub regions: Vec<RectRegionPacking>,
}

impl RegionWisePacking {
    /// Builds the source packing of a tiled picture: one identity region per
    /// tile, projected and packed picture sizes both equal to the source.
    pub fn from_tile_grid(width: u32, height: u32, tiles: &[TileInfo]) -> Self {
        let regions = tiles
            .iter()
            .map(|tile| RectRegionPacking {
                transform_type: 0,
                guard_band: false,
                proj_reg_width: tile.tile_width,
                proj_reg_height: tile.tile_height,
                proj_reg_top: tile.vertical_pos,
                proj_reg_left: tile.horizontal_pos,
                packed_reg_width: tile.tile_width,
                packed_reg_height: tile.tile_height,
                packed_reg_top: tile.vertical_pos,
                packed_reg_left: tile.horizontal_pos,
            })
            .collect();

        Self {
            constituent_pic_matching: false,
            proj_pic_width: width,
            proj_pic_height: height,
            packed_pic_width: width,
            packed_pic_height: height,
            regions,
        }
    }

    /// Packing carrying only the region of one tile, keeping the projected
    /// and packed picture sizes of the full source.
    pub fn single_region(&self, tile_idx: usize) -> Option<Self> {
        let region = *self.regions.get(tile_idx)?;
        Some(Self {
            constituent_pic_matching: self.constituent_pic_matching,
            proj_pic_width: self.proj_pic_width,
            proj_pic_height: self.proj_pic_height,
            packed_pic_width: self.packed_pic_width,
            packed_pic_height: self.packed_pic_height,
            regions: vec![region],
        })
    }
}

/// Spherical coverage of one region, angles in units of 2^-16 degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SphereRegion {
    pub view_idc: u8,
    pub centre_azimuth: i32,
    pub centre_elevation: i32,
    pub centre_tilt: i32,
    pub azimuth_range: u32,
    pub elevation_range: u32,
    pub interpolate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentCoverage {
    /// 1 = two azimuth and two elevation circles, 0 = four great circles.
    pub coverage_shape_type: u8,
    pub view_idc_presence: bool,
    pub default_view_idc: u8,
    pub sphere_regions: Vec<SphereRegion>,
}

impl ContentCoverage {
    /// Derives per-region spherical coverage from a source packing, assuming
    /// the projected picture spans the full sphere (360 x 180 degrees).
    pub fn from_rwpk(rwpk: &RegionWisePacking, proj_type: u8) -> Self {
        let width = rwpk.proj_pic_width;
        let height = rwpk.proj_pic_height;

        let sphere_regions = rwpk
            .regions
            .iter()
            .map(|region| SphereRegion {
                view_idc: 0,
                centre_azimuth: ((((width as f64 / 2.0)
                    - (region.proj_reg_left as f64 + region.proj_reg_width as f64 / 2.0))
                    * 360.0
                    * 65536.0)
                    / width as f64) as i32,
                centre_elevation: ((((height as f64 / 2.0)
                    - (region.proj_reg_top as f64 + region.proj_reg_height as f64 / 2.0))
                    * 180.0
                    * 65536.0)
                    / height as f64) as i32,
                centre_tilt: 0,
                azimuth_range: ((region.proj_reg_width as f64 * 360.0 * 65536.0)
                    / width as f64) as u32,
                elevation_range: ((region.proj_reg_height as f64 * 180.0 * 65536.0)
                    / height as f64) as u32,
                interpolate: false,
            })
            .collect();

        Self {
            coverage_shape_type: if proj_type == 0 { 1 } else { 0 },
            view_idc_presence: false,
            default_view_idc: 0,
            sphere_regions,
        }
    }
}

/// Source picture resolution advertised by an extractor track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicResolution {
    pub width: u32,
    pub height: u32,
}
