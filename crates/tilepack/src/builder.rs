//! Track construction.
//!
//! Builds one segmentation context per tile track and per extractor track
//! from parsed stream headers, wiring each context to its init- and
//! media-segment writers.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;

use crate::{
    error::{TilepackError, TilepackResult},
    extractor::{ExtractorTrack, ExtractorTrackConfig, ExtractorTrackSet, TileSliceSource},
    meta::{
        Bitrate, CodedFormat, CodedMeta, ConfigType, FrameType, Quality3d, RegionPacking,
        SegmenterMeta, Spherical,
    },
    segmenter::{
        GeneralSegConfig, InitSegConfig, MediaType, OperatingMode, SegmenterFactory, TrackConfig,
        TrackEntry, TrackKind, TrackMeta, TrackSegmentCtx,
    },
    stream::VideoStream,
    types::{
        Codec, Projection, Rational, SegmentInfo, TrackId, DEFAULT_EXTRACTORTRACK_TRACKIDBASE,
    },
};

/// Everything produced by the tile-track construction pass.
pub(crate) struct TileTrackBuild {
    /// Tile-track entries per stream, row-major tile order.
    pub per_stream: BTreeMap<u8, Vec<TrackEntry>>,
    /// Init-segment track configs of every tile track, keyed by track id.
    pub all_tile_tracks: BTreeMap<TrackId, TrackConfig>,
    /// Coded-meta snapshot of every tile track, for init-segment generation.
    pub all_tile_metas: BTreeMap<TrackId, CodedMeta>,
    /// `(stream idx, tile idx) -> track id` lookup used when resolving
    /// extractor tile references.
    pub tiles_track_idxs: BTreeMap<u8, BTreeMap<u32, TrackId>>,
    pub frame_rate: Rational,
    pub projection: Projection,
}

fn track_timescale(frame_rate: Rational) -> Rational {
    Rational::new(frame_rate.den, frame_rate.num * 1000)
}

fn frame_duration(frame_rate: Rational) -> Rational {
    Rational::new(frame_rate.den * 1000, frame_rate.num * 1000)
}

/// Dense quality rank over the distinct bitrates of all streams: the highest
/// bitrate maps to rank 1.
fn quality_rank(bit_rate_ranking: &BTreeSet<u64>, bit_rate: u64) -> u8 {
    let position = bit_rate_ranking
        .iter()
        .position(|&rate| rate == bit_rate)
        .unwrap_or(0);
    (bit_rate_ranking.len() - position) as u8
}

fn decoder_config(
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
) -> BTreeMap<ConfigType, Bytes> {
    let mut config = BTreeMap::new();
    if let Some(vps) = vps {
        config.insert(ConfigType::Vps, vps);
    }
    if let Some(sps) = sps {
        config.insert(ConfigType::Sps, sps);
    }
    if let Some(pps) = pps {
        config.insert(ConfigType::Pps, pps);
    }
    config
}

/// Builds one [`TrackEntry`] per tile per stream (component C4).
pub(crate) fn build_tile_track_ctxs(
    streams: &BTreeMap<u8, VideoStream>,
    seg_info: &SegmentInfo,
    factory: &dyn SegmenterFactory,
    mut track_id_starter: TrackId,
) -> TilepackResult<TileTrackBuild> {
    let bit_rate_ranking: BTreeSet<u64> =
        streams.values().map(|stream| stream.bit_rate()).collect();

    let mut per_stream = BTreeMap::new();
    let mut all_tile_tracks = BTreeMap::new();
    let mut all_tile_metas = BTreeMap::new();
    let mut tiles_track_idxs = BTreeMap::new();
    let mut frame_rate = None;
    let mut projection = None;

    for (&stream_idx, stream) in streams {
        let stream_projection = Projection::from_id(stream.projection_type())?;
        frame_rate = Some(stream.frame_rate());
        projection = Some(stream_projection);
        let rank = quality_rank(&bit_rate_ranking, stream.bit_rate());

        let vps = stream.vps_nalu();
        if stream.codec() == Codec::H265 && vps.as_deref().map_or(true, <[u8]>::is_empty) {
            return Err(TilepackError::InvalidHeader);
        }
        let sps = stream.sps_nalu();
        if sps.as_deref().map_or(true, <[u8]>::is_empty) {
            return Err(TilepackError::InvalidSps);
        }
        let pps = stream.pps_nalu();
        if pps.as_deref().map_or(true, <[u8]>::is_empty) {
            return Err(TilepackError::InvalidPps);
        }
        let config = decoder_config(vps, sps, pps);

        let tiles_num = stream.tiles_num();
        let tile_bit_rate = stream.bit_rate() / tiles_num as u64;
        let timescale = track_timescale(stream.frame_rate());

        let mut entries = Vec::with_capacity(tiles_num);
        let mut tiles_index = BTreeMap::new();

        for tile_idx in 0..tiles_num {
            let track_id = track_id_starter + tile_idx as TrackId;
            let tile = stream.tiles_info()[tile_idx];

            let track_config = TrackConfig::new(TrackMeta {
                track_id,
                timescale,
                r#type: MediaType::Video,
            });
            all_tile_tracks.insert(track_id, track_config.clone());

            let init_cfg = InitSegConfig {
                tracks: BTreeMap::from([(track_id, track_config)]),
                fragmented: true,
                write_to_bitstream: true,
                packed_sub_pictures: true,
                mode: OperatingMode::Omaf,
                stream_ids: vec![track_id],
                init_seg_name: seg_info.init_seg_name(track_id),
            };

            let sgt_duration = Rational::new(seg_info.seg_dur, 1);
            let seg_cfg = GeneralSegConfig {
                sgt_duration,
                subsgt_duration: sgt_duration,
                need_check_idr: true,
                tracks: BTreeMap::from([(
                    track_id,
                    TrackMeta {
                        track_id,
                        timescale,
                        r#type: MediaType::Video,
                    },
                )]),
                use_separated_sidx: false,
                stream_ids: vec![stream_idx as TrackId],
                base_name: seg_info.track_base_name(track_id),
            };

            let region_packing = stream
                .src_rwpk()
                .single_region(tile_idx)
                .as_ref()
                .map(RegionPacking::from);

            let coded_meta = CodedMeta {
                pres_index: 0,
                coding_index: 0,
                pres_time: Rational::new(0, 1000),
                duration: frame_duration(stream.frame_rate()),
                track_id,
                in_coding_order: true,
                format: CodedFormat::H265,
                decoder_config: config.clone(),
                width: tile.tile_width,
                height: tile.tile_height,
                bitrate: Bitrate {
                    avg_bitrate: tile_bit_rate,
                    max_bitrate: 0,
                },
                r#type: FrameType::Idr,
                is_eos: false,
                projection: stream_projection,
                region_packing,
                spherical_coverage: None,
                quality_rank_coverage: None,
                segmenter_meta: SegmenterMeta {
                    segment_duration: sgt_duration,
                },
            };
            all_tile_metas.insert(track_id, coded_meta.clone());

            let init_segmenter = factory.create_init_segmenter(&init_cfg)?;
            let segmenter = factory.create_segmenter(&seg_cfg, true)?;

            entries.push(TrackEntry {
                ctx: TrackSegmentCtx {
                    kind: TrackKind::Tile {
                        stream_idx,
                        tile_idx: tile_idx as u32,
                    },
                    track_id,
                    init_cfg,
                    seg_cfg,
                    coded_meta,
                    quality_rank: rank,
                    sample: Bytes::new(),
                    extractor_nalu: None,
                },
                init_segmenter,
                segmenter,
            });
            tiles_index.insert(tile_idx as u32, track_id);
        }

        track_id_starter += tiles_num as TrackId;
        per_stream.insert(stream_idx, entries);
        tiles_track_idxs.insert(stream_idx, tiles_index);
    }

    let frame_rate = frame_rate.ok_or(TilepackError::InvalidData("no video streams"))?;
    let projection = projection.ok_or(TilepackError::InvalidData("no video streams"))?;

    Ok(TileTrackBuild {
        per_stream,
        all_tile_tracks,
        all_tile_metas,
        tiles_track_idxs,
        frame_rate,
        projection,
    })
}

/// Builds one [`ExtractorTrack`] + [`TrackEntry`] pair per extractor track
/// (component C5).
pub(crate) fn build_extractor_track_ctxs(
    extractor_tracks: ExtractorTrackSet,
    streams: &BTreeMap<u8, VideoStream>,
    tile_build: &TileTrackBuild,
    seg_info: &SegmentInfo,
    factory: &dyn SegmenterFactory,
) -> TilepackResult<BTreeMap<u8, (ExtractorTrack, TrackEntry)>> {
    let frame_rate = tile_build.frame_rate;
    let timescale = track_timescale(frame_rate);
    let mut built = BTreeMap::new();

    for (extractor_idx, config) in extractor_tracks {
        let track_id = DEFAULT_EXTRACTORTRACK_TRACKIDBASE + extractor_idx as TrackId;

        // Resolve the merge layout against the tile-track index built by C4.
        let mut ref_track_idxs = Vec::new();
        let mut tile_sources = Vec::new();
        for tile_ref in config.merge_layout.tile_refs() {
            let tiles_index = tile_build
                .tiles_track_idxs
                .get(&tile_ref.stream_idx)
                .ok_or(TilepackError::StreamNotFound(tile_ref.stream_idx))?;
            let ref_track_id = tiles_index
                .get(&tile_ref.orig_tile_idx)
                .ok_or(TilepackError::StreamNotFound(tile_ref.stream_idx))?;
            ref_track_idxs.push(*ref_track_id);

            let stream = streams
                .get(&tile_ref.stream_idx)
                .ok_or(TilepackError::StreamNotFound(tile_ref.stream_idx))?;
            tile_sources.push(TileSliceSource {
                scratch: stream.tile_nalu_scratch(),
                tile_idx: tile_ref.orig_tile_idx as usize,
            });
        }

        // The init segment references every tile track of the run, not only
        // the subset this extractor merges.
        let all_track_ids: Vec<TrackId> = tile_build.all_tile_tracks.keys().copied().collect();
        let mut tracks = tile_build.all_tile_tracks.clone();
        let mut own_config = TrackConfig::new(TrackMeta {
            track_id,
            timescale,
            r#type: MediaType::Video,
        });
        own_config
            .track_references
            .insert("scal".to_string(), all_track_ids.clone());
        tracks.insert(track_id, own_config);

        let mut stream_ids = vec![track_id];
        stream_ids.extend(&all_track_ids);

        let init_cfg = InitSegConfig {
            tracks,
            fragmented: true,
            write_to_bitstream: true,
            packed_sub_pictures: true,
            mode: OperatingMode::Omaf,
            stream_ids,
            init_seg_name: seg_info.init_seg_name(track_id),
        };

        let sgt_duration = Rational::new(seg_info.seg_dur, 1);
        let seg_cfg = GeneralSegConfig {
            sgt_duration,
            subsgt_duration: sgt_duration,
            need_check_idr: true,
            tracks: BTreeMap::from([(
                track_id,
                TrackMeta {
                    track_id,
                    timescale,
                    r#type: MediaType::Video,
                },
            )]),
            use_separated_sidx: false,
            stream_ids: vec![track_id],
            base_name: seg_info.track_base_name(track_id),
        };

        let coverage = config
            .covi
            .sphere_regions
            .first()
            .map(Spherical::from)
            .ok_or(TilepackError::NullPtr)?;

        let coded_meta = CodedMeta {
            pres_index: 0,
            coding_index: 0,
            pres_time: Rational::new(0, 1000),
            duration: frame_duration(frame_rate),
            track_id,
            in_coding_order: true,
            format: CodedFormat::H265Extractor,
            decoder_config: decoder_config(
                Some(config.vps.clone()),
                Some(config.sps.clone()),
                Some(config.pps.clone()),
            ),
            width: config.rwpk.packed_pic_width,
            height: config.rwpk.packed_pic_height,
            bitrate: Bitrate::default(),
            r#type: FrameType::Idr,
            is_eos: false,
            projection: tile_build.projection,
            region_packing: Some(RegionPacking::from(&config.rwpk)),
            spherical_coverage: Some(coverage),
            quality_rank_coverage: Some(Quality3d::from_pic_resolutions(
                coverage,
                &config.pic_res_list,
            )),
            segmenter_meta: SegmenterMeta {
                segment_duration: sgt_duration,
            },
        };

        let init_segmenter = factory.create_init_segmenter(&init_cfg)?;
        let segmenter = factory.create_segmenter(&seg_cfg, true)?;

        let track = ExtractorTrack::new(
            extractor_idx,
            config.proj_sei,
            config.rwpk_sei,
            config.sample_builder,
            tile_sources,
        );
        let sei_prefix = track.build_sei_prefix();

        let entry = TrackEntry {
            ctx: TrackSegmentCtx {
                kind: TrackKind::Extractor { extractor_idx },
                track_id,
                init_cfg,
                seg_cfg,
                coded_meta,
                quality_rank: 0,
                sample: Bytes::new(),
                extractor_nalu: Some(sei_prefix),
            },
            init_segmenter,
            segmenter,
        };

        built.insert(extractor_idx, (track, entry));
    }

    Ok(built)
}
