//! End-to-end segmentation scenarios with file-backed collaborator doubles.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex},
    thread,
};

use bytes::Bytes;
use tilepack::{
    extractor::{ExtractorSampleBuilder, TileRef, TilesMergeDirection},
    meta::FrameType,
    omaf::{ContentCoverage, PicResolution, RegionWisePacking},
    mpd::{MpdContext, MpdTrackEntry},
    segmenter::{GeneralSegConfig, InitSegConfig, InitSegmenter, Segmenter, SegmenterFactory},
    BsBuffer, Codec, ExtractorTrackConfig, ExtractorTrackSet, FrameData, FrameSink, MpdWriter,
    MpdWriterFactory, NaluParser, NaluParserFactory, Rational, Segmentation, SegmentInfo,
    TileInfo, TilepackError, TilepackResult, TrackId, TrackSegmentCtx, VideoStream,
    DEFAULT_EXTRACTORTRACK_TRACKIDBASE,
};

const FRAME_PAYLOAD: &[u8] = b"coded-frame";

// --- scripted NAL parser -------------------------------------------------

struct ScriptedParser {
    width: u32,
    height: u32,
    tile_rows: u8,
    tile_cols: u8,
    proj_type: u8,
    with_sps: bool,
}

impl ScriptedParser {
    fn tiles(&self) -> Vec<TileInfo> {
        let tile_width = self.width / self.tile_cols as u32;
        let tile_height = self.height / self.tile_rows as u32;
        let mut tiles = Vec::new();
        for row in 0..self.tile_rows as u32 {
            for col in 0..self.tile_cols as u32 {
                tiles.push(TileInfo {
                    horizontal_pos: col * tile_width,
                    vertical_pos: row * tile_height,
                    tile_width,
                    tile_height,
                });
            }
        }
        tiles
    }
}

impl NaluParser for ScriptedParser {
    fn parse_header_data(&mut self) -> TilepackResult<()> {
        Ok(())
    }

    fn src_width(&self) -> u32 {
        self.width
    }

    fn src_height(&self) -> u32 {
        self.height
    }

    fn tile_rows(&self) -> u8 {
        self.tile_rows
    }

    fn tile_cols(&self) -> u8 {
        self.tile_cols
    }

    fn projection_type(&self) -> u8 {
        self.proj_type
    }

    fn tile_info(&self, tile_idx: usize) -> TilepackResult<TileInfo> {
        Ok(self.tiles()[tile_idx])
    }

    fn vps_nalu(&self) -> Option<Bytes> {
        Some(Bytes::from_static(b"vps"))
    }

    fn sps_nalu(&self) -> Option<Bytes> {
        self.with_sps.then(|| Bytes::from_static(b"sps"))
    }

    fn pps_nalu(&self) -> Option<Bytes> {
        Some(Bytes::from_static(b"pps"))
    }

    fn parse_slice_nalu(&mut self, data: &Bytes, tiles_num: usize) -> TilepackResult<Vec<Bytes>> {
        Ok(vec![data.clone(); tiles_num])
    }
}

#[derive(Clone)]
struct ScriptedParserFactory {
    tile_rows: u8,
    tile_cols: u8,
    proj_type: u8,
    with_sps: bool,
}

impl Default for ScriptedParserFactory {
    fn default() -> Self {
        Self {
            tile_rows: 2,
            tile_cols: 2,
            proj_type: 0,
            with_sps: true,
        }
    }
}

impl NaluParserFactory for ScriptedParserFactory {
    fn create_parser(&self, _codec: Codec, _bs: &BsBuffer) -> TilepackResult<Box<dyn NaluParser>> {
        Ok(Box::new(ScriptedParser {
            width: 1920,
            height: 1080,
            tile_rows: self.tile_rows,
            tile_cols: self.tile_cols,
            proj_type: self.proj_type,
            with_sps: self.with_sps,
        }))
    }
}

// --- file-backed segment writer ------------------------------------------

#[derive(Default, Clone)]
struct TrackStats {
    frames: u64,
    segments: u64,
    bytes_written: u64,
    last_pres_index: u64,
    last_pres_time_num: u64,
    quality_rank: u8,
    worker_thread: Option<String>,
}

#[derive(Default)]
struct Recorder {
    tracks: Mutex<BTreeMap<TrackId, TrackStats>>,
}

impl Recorder {
    fn stats(&self, track_id: TrackId) -> TrackStats {
        self.tracks
            .lock()
            .unwrap()
            .get(&track_id)
            .cloned()
            .unwrap_or_default()
    }

    fn all(&self) -> BTreeMap<TrackId, TrackStats> {
        self.tracks.lock().unwrap().clone()
    }
}

struct FileInitSegmenter {
    recorder: Arc<Recorder>,
}

impl InitSegmenter for FileInitSegmenter {
    fn generate_init_segment(
        &mut self,
        ctx: &TrackSegmentCtx,
        _all_tile_tracks: &BTreeMap<TrackId, tilepack::meta::CodedMeta>,
    ) -> TilepackResult<()> {
        // Serialize the first packing region so tests can re-read it.
        let mut payload = Vec::new();
        if let Some(packing) = &ctx.coded_meta.region_packing {
            if let Some(region) = packing.regions.first() {
                for value in [
                    region.proj_top,
                    region.proj_left,
                    region.proj_width,
                    region.proj_height,
                    region.packed_top,
                    region.packed_left,
                    region.packed_width,
                    region.packed_height,
                    region.transform as u32,
                    0u32,
                ] {
                    payload.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        std::fs::write(&ctx.init_cfg.init_seg_name, payload)?;

        self.recorder
            .tracks
            .lock()
            .unwrap()
            .entry(ctx.track_id)
            .or_default()
            .quality_rank = ctx.quality_rank;
        Ok(())
    }
}

struct FileSegmenter {
    base_name: String,
    track_id: TrackId,
    with_idr_boundary: bool,
    seg_num: u64,
    pending_frames: u64,
    buffer: Vec<u8>,
    recorder: Arc<Recorder>,
}

impl FileSegmenter {
    fn close(&mut self) -> TilepackResult<()> {
        if self.pending_frames == 0 {
            return Ok(());
        }
        self.seg_num += 1;
        std::fs::write(
            format!("{}.{}.mp4", self.base_name, self.seg_num),
            &self.buffer,
        )?;
        self.buffer.clear();
        self.pending_frames = 0;

        self.recorder
            .tracks
            .lock()
            .unwrap()
            .entry(self.track_id)
            .or_default()
            .segments = self.seg_num;
        Ok(())
    }
}

impl Segmenter for FileSegmenter {
    fn segment_data(&mut self, ctx: &mut TrackSegmentCtx) -> TilepackResult<()> {
        if ctx.coded_meta.is_eos {
            return self.close();
        }

        if self.with_idr_boundary
            && self.pending_frames > 0
            && ctx.coded_meta.r#type == FrameType::Idr
        {
            self.close()?;
        }

        self.pending_frames += 1;
        self.buffer.extend_from_slice(&ctx.sample);

        let mut tracks = self.recorder.tracks.lock().unwrap();
        let stats = tracks.entry(self.track_id).or_default();
        stats.frames += 1;
        stats.bytes_written += ctx.sample.len() as u64;
        stats.last_pres_index = ctx.coded_meta.pres_index;
        stats.last_pres_time_num = ctx.coded_meta.pres_time.num;
        if stats.worker_thread.is_none() {
            stats.worker_thread = thread::current().name().map(str::to_string);
        }
        Ok(())
    }

    fn segments_num(&self) -> u64 {
        self.seg_num
    }
}

struct FileFactory {
    recorder: Arc<Recorder>,
}

impl SegmenterFactory for FileFactory {
    fn create_init_segmenter(
        &self,
        _config: &InitSegConfig,
    ) -> TilepackResult<Box<dyn InitSegmenter>> {
        Ok(Box::new(FileInitSegmenter {
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn create_segmenter(
        &self,
        config: &GeneralSegConfig,
        with_idr_boundary: bool,
    ) -> TilepackResult<Box<dyn Segmenter>> {
        let track_id = *config
            .tracks
            .keys()
            .next()
            .ok_or(TilepackError::NullPtr)?;
        Ok(Box::new(FileSegmenter {
            base_name: config.base_name.clone(),
            track_id,
            with_idr_boundary,
            seg_num: 0,
            pending_frames: 0,
            buffer: Vec::new(),
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

// --- recording MPD writer ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum MpdEvent {
    Initialize,
    Update { seg_num: u64, frames_num: u64 },
    Write { frames_num: u64 },
}

#[derive(Default)]
struct MpdLog {
    events: Mutex<Vec<MpdEvent>>,
    tile_tracks: Mutex<Vec<MpdTrackEntry>>,
}

struct RecordingMpdWriter {
    log: Arc<MpdLog>,
}

impl MpdWriter for RecordingMpdWriter {
    fn initialize(&mut self) -> TilepackResult<()> {
        self.log.events.lock().unwrap().push(MpdEvent::Initialize);
        Ok(())
    }

    fn update_mpd(&mut self, seg_num: u64, frames_num: u64) -> TilepackResult<()> {
        self.log.events.lock().unwrap().push(MpdEvent::Update {
            seg_num,
            frames_num,
        });
        Ok(())
    }

    fn write_mpd(&mut self, frames_num: u64) -> TilepackResult<()> {
        self.log
            .events
            .lock()
            .unwrap()
            .push(MpdEvent::Write { frames_num });
        Ok(())
    }
}

struct RecordingMpdFactory {
    log: Arc<MpdLog>,
}

impl MpdWriterFactory for RecordingMpdFactory {
    fn create_writer(&self, context: MpdContext) -> TilepackResult<Box<dyn MpdWriter>> {
        *self.log.tile_tracks.lock().unwrap() = context.tile_tracks.clone();
        Ok(Box::new(RecordingMpdWriter {
            log: Arc::clone(&self.log),
        }))
    }
}

// --- extractor sample builder --------------------------------------------

struct ConcatSampleBuilder;

impl ExtractorSampleBuilder for ConcatSampleBuilder {
    fn construct_extractors(&mut self, tile_slices: &[Bytes]) -> TilepackResult<Bytes> {
        Ok(tile_slices.concat().into())
    }
}

fn extractor_config(refs: Vec<TileRef>) -> ExtractorTrackConfig {
    let tiles: Vec<TileInfo> = (0..refs.len() as u32)
        .map(|i| TileInfo {
            horizontal_pos: i * 960,
            vertical_pos: 0,
            tile_width: 960,
            tile_height: 540,
        })
        .collect();
    let rwpk = RegionWisePacking::from_tile_grid(960 * refs.len().max(1) as u32, 540, &tiles);
    let covi = ContentCoverage::from_rwpk(&rwpk, 0);
    ExtractorTrackConfig {
        merge_layout: TilesMergeDirection { cols: vec![refs] },
        vps: Bytes::from_static(b"vps"),
        sps: Bytes::from_static(b"sps"),
        pps: Bytes::from_static(b"pps"),
        rwpk,
        covi,
        pic_res_list: vec![PicResolution {
            width: 1920,
            height: 1080,
        }],
        proj_sei: Bytes::from_static(b"proj-sei"),
        rwpk_sei: Bytes::from_static(b"rwpk-sei"),
        sample_builder: Box::new(ConcatSampleBuilder),
    }
}

// --- harness --------------------------------------------------------------

struct Harness {
    _dir: tempfile::TempDir,
    dir_path: String,
    seg_info: SegmentInfo,
    recorder: Arc<Recorder>,
    mpd_log: Arc<MpdLog>,
}

impl Harness {
    fn new(seg_dur: u64, is_live: bool, window_size: u32, extra_window_size: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = format!("{}/", dir.path().display());
        let seg_info = SegmentInfo {
            dir_name: dir_path.clone(),
            out_name: "vr".to_string(),
            seg_dur,
            is_live,
            window_size,
            extra_window_size,
            extractor_tracks_per_seg_thread: 1,
        };
        Self {
            _dir: dir,
            dir_path,
            seg_info,
            recorder: Arc::new(Recorder::default()),
            mpd_log: Arc::new(MpdLog::default()),
        }
    }

    fn segmentation(
        &self,
        streams: BTreeMap<u8, VideoStream>,
        extractors: ExtractorTrackSet,
    ) -> Segmentation {
        Segmentation::new(
            streams,
            extractors,
            self.seg_info.clone(),
            Box::new(FileFactory {
                recorder: Arc::clone(&self.recorder),
            }),
            Box::new(RecordingMpdFactory {
                log: Arc::clone(&self.mpd_log),
            }),
        )
    }

    fn file_exists(&self, name: &str) -> bool {
        Path::new(&format!("{}{name}", self.dir_path)).exists()
    }

    fn file_count(&self) -> usize {
        std::fs::read_dir(self.dir_path.trim_end_matches('/'))
            .unwrap()
            .count()
    }
}

fn make_stream(
    stream_idx: u8,
    bit_rate: u64,
    parser_factory: &ScriptedParserFactory,
) -> (VideoStream, FrameSink) {
    let bs = BsBuffer {
        codec_id: 1,
        data: Bytes::from_static(b"header"),
        frame_rate: Rational::new(30, 1),
        bit_rate,
    };
    VideoStream::new(stream_idx, &bs, parser_factory).unwrap()
}

fn feed_frames<F>(sink: FrameSink, count: u64, is_key: F) -> thread::JoinHandle<()>
where
    F: Fn(u64) -> bool + Send + 'static,
{
    thread::spawn(move || {
        for pts in 0..count {
            let frame = FrameData {
                data: Bytes::from_static(FRAME_PAYLOAD),
                pts,
                is_key_frame: is_key(pts),
            };
            if sink.add_frame(frame).is_err() {
                break;
            }
        }
        sink.finish();
    })
}

// --- scenarios ------------------------------------------------------------

/// Two streams, 2x2 tiles each, one extractor track, 60 key-only frames.
#[test]
fn test_two_streams_one_extractor_end_to_end() {
    let harness = Harness::new(1, false, 0, 0);
    let parser_factory = ScriptedParserFactory::default();

    let mut streams = BTreeMap::new();
    let (stream_a, sink_a) = make_stream(0, 10_000_000, &parser_factory);
    let (stream_b, sink_b) = make_stream(1, 5_000_000, &parser_factory);
    streams.insert(0, stream_a);
    streams.insert(1, stream_b);

    let mut extractors = ExtractorTrackSet::new();
    extractors.insert(
        0,
        extractor_config(vec![
            TileRef {
                stream_idx: 0,
                orig_tile_idx: 0,
            },
            TileRef {
                stream_idx: 0,
                orig_tile_idx: 1,
            },
            TileRef {
                stream_idx: 1,
                orig_tile_idx: 2,
            },
            TileRef {
                stream_idx: 1,
                orig_tile_idx: 3,
            },
        ]),
    );

    let feeder_a = feed_frames(sink_a, 60, |_| true);
    let feeder_b = feed_frames(sink_b, 60, |_| true);

    let frames = harness
        .segmentation(streams, extractors)
        .run()
        .unwrap();
    feeder_a.join().unwrap();
    feeder_b.join().unwrap();

    assert_eq!(frames, 60);

    // 8 tile tracks (ids 1..=8) plus extractor track 1000, each with an
    // init segment and 60 media segments.
    for track_id in (1..=8).chain([DEFAULT_EXTRACTORTRACK_TRACKIDBASE]) {
        assert!(harness.file_exists(&format!("vr_track{track_id}.init.mp4")));
        assert!(harness.file_exists(&format!("vr_track{track_id}.1.mp4")));
        assert!(harness.file_exists(&format!("vr_track{track_id}.60.mp4")));
        assert_eq!(harness.recorder.stats(track_id).segments, 60);
        assert_eq!(harness.recorder.stats(track_id).frames, 60);
    }
    // 9 init segments + 9 * 60 media segments.
    assert_eq!(harness.file_count(), 9 + 9 * 60);

    // The 10 Mb/s stream outranks the 5 Mb/s stream on every tile.
    for track_id in 1..=4 {
        assert_eq!(harness.recorder.stats(track_id).quality_rank, 1);
    }
    for track_id in 5..=8 {
        assert_eq!(harness.recorder.stats(track_id).quality_rank, 2);
    }

    // Presentation counters advance in lock-step across every context:
    // 60 frames of 33 ms each (integer milliseconds at 30 fps).
    for (_, stats) in harness.recorder.all() {
        assert_eq!(stats.last_pres_index, 59);
        assert_eq!(stats.last_pres_time_num, 59 * 33);
    }

    // The extractor sample is the concatenation of its four tile slices.
    let extractor_stats = harness.recorder.stats(DEFAULT_EXTRACTORTRACK_TRACKIDBASE);
    assert_eq!(
        extractor_stats.bytes_written,
        60 * 4 * FRAME_PAYLOAD.len() as u64
    );

    // Static run: exactly one MPD write, no live updates.
    let events = harness.mpd_log.events.lock().unwrap().clone();
    assert_eq!(events.first(), Some(&MpdEvent::Initialize));
    assert_eq!(events.last(), Some(&MpdEvent::Write { frames_num: 60 }));
    assert!(!events
        .iter()
        .any(|event| matches!(event, MpdEvent::Update { .. })));
}

/// A projection id outside {ERP, CUBEMAP} fails construction before any
/// file is created.
#[test]
fn test_projection_mismatch_creates_no_files() {
    let harness = Harness::new(1, false, 0, 0);
    let parser_factory = ScriptedParserFactory {
        proj_type: 2,
        ..Default::default()
    };

    let mut streams = BTreeMap::new();
    let (stream, sink) = make_stream(0, 10_000_000, &parser_factory);
    streams.insert(0, stream);
    drop(sink);

    let result = harness
        .segmentation(streams, ExtractorTrackSet::new())
        .run();
    assert!(matches!(
        result,
        Err(TilepackError::InvalidProjectionType(2))
    ));
    assert_eq!(harness.file_count(), 0);
}

/// A missing SPS fails construction with no tile-track contexts retained.
#[test]
fn test_missing_sps_creates_no_files() {
    let harness = Harness::new(1, false, 0, 0);
    let parser_factory = ScriptedParserFactory {
        with_sps: false,
        ..Default::default()
    };

    let mut streams = BTreeMap::new();
    let (stream, sink) = make_stream(0, 10_000_000, &parser_factory);
    streams.insert(0, stream);
    drop(sink);

    let result = harness
        .segmentation(streams, ExtractorTrackSet::new())
        .run();
    assert!(matches!(result, Err(TilepackError::InvalidSps)));
    assert_eq!(harness.file_count(), 0);
    assert!(harness.recorder.all().is_empty());
}

/// Streams disagreeing on IDR-ness abort the tick with `InvalidData`.
#[test]
fn test_keyframe_disagreement_aborts() {
    let harness = Harness::new(1, false, 0, 0);
    let parser_factory = ScriptedParserFactory::default();

    let mut streams = BTreeMap::new();
    let (stream_a, sink_a) = make_stream(0, 10_000_000, &parser_factory);
    let (stream_b, sink_b) = make_stream(1, 5_000_000, &parser_factory);
    streams.insert(0, stream_a);
    streams.insert(1, stream_b);

    let mut extractors = ExtractorTrackSet::new();
    extractors.insert(
        0,
        extractor_config(vec![TileRef {
            stream_idx: 0,
            orig_tile_idx: 0,
        }]),
    );

    // Stream A inserts an IDR at frame 30; stream B does not.
    let feeder_a = feed_frames(sink_a, 40, |pts| pts == 0 || pts == 30);
    let feeder_b = feed_frames(sink_b, 40, |pts| pts == 0);

    let result = harness.segmentation(streams, extractors).run();
    assert!(matches!(result, Err(TilepackError::InvalidData(_))));

    feeder_a.join().unwrap();
    feeder_b.join().unwrap();
}

/// Live windowing: with window 3 + extra 1, segments 1 and 2 are deleted
/// once segment 6 has been produced; 3..=6 remain.
#[test]
fn test_live_windowing_deletes_expired_segments() {
    let harness = Harness::new(1, true, 3, 1);
    let parser_factory = ScriptedParserFactory::default();

    let mut streams = BTreeMap::new();
    let (stream, sink) = make_stream(0, 10_000_000, &parser_factory);
    streams.insert(0, stream);

    let mut extractors = ExtractorTrackSet::new();
    extractors.insert(
        0,
        extractor_config(vec![TileRef {
            stream_idx: 0,
            orig_tile_idx: 0,
        }]),
    );

    let feeder = feed_frames(sink, 6, |_| true);
    let frames = harness.segmentation(streams, extractors).run().unwrap();
    feeder.join().unwrap();

    assert_eq!(frames, 6);
    for track_id in (1..=4).chain([DEFAULT_EXTRACTORTRACK_TRACKIDBASE]) {
        for seg in 1..=2u64 {
            assert!(
                !harness.file_exists(&format!("vr_track{track_id}.{seg}.mp4")),
                "segment {seg} of track {track_id} should have been deleted"
            );
        }
        for seg in 3..=6u64 {
            assert!(
                harness.file_exists(&format!("vr_track{track_id}.{seg}.mp4")),
                "segment {seg} of track {track_id} should remain"
            );
        }
    }

    // Live run: the manifest is refreshed, never written statically.
    let events = harness.mpd_log.events.lock().unwrap().clone();
    assert!(events
        .iter()
        .any(|event| matches!(event, MpdEvent::Update { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, MpdEvent::Write { .. })));
}

/// Seven extractor tracks at three per thread shard onto three workers
/// servicing 3 + 3 + 1 tracks.
#[test]
fn test_extractor_sharding_across_worker_threads() {
    let mut harness = Harness::new(1, false, 0, 0);
    harness.seg_info.extractor_tracks_per_seg_thread = 3;
    let parser_factory = ScriptedParserFactory::default();

    let mut streams = BTreeMap::new();
    let (stream, sink) = make_stream(0, 10_000_000, &parser_factory);
    streams.insert(0, stream);

    let mut extractors = ExtractorTrackSet::new();
    for extractor_idx in 0..7u8 {
        extractors.insert(
            extractor_idx,
            extractor_config(vec![TileRef {
                stream_idx: 0,
                orig_tile_idx: (extractor_idx % 4) as u32,
            }]),
        );
    }

    let feeder = feed_frames(sink, 5, |_| true);
    let frames = harness.segmentation(streams, extractors).run().unwrap();
    feeder.join().unwrap();

    assert_eq!(frames, 5);

    let mut by_thread: BTreeMap<String, Vec<TrackId>> = BTreeMap::new();
    for extractor_idx in 0..7u64 {
        let track_id = DEFAULT_EXTRACTORTRACK_TRACKIDBASE + extractor_idx;
        let stats = harness.recorder.stats(track_id);
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.segments, 5);
        by_thread
            .entry(stats.worker_thread.expect("extractor served by a worker"))
            .or_default()
            .push(track_id);
    }

    let mut shard_sizes: Vec<usize> = by_thread.values().map(Vec::len).collect();
    shard_sizes.sort_unstable();
    assert_eq!(shard_sizes, vec![1, 3, 3]);

    // Shards cover contiguous runs of the ordered extractor map.
    for tracks in by_thread.values() {
        let first = tracks[0];
        for (offset, &track_id) in tracks.iter().enumerate() {
            assert_eq!(track_id, first + offset as u64);
        }
    }
}

/// The packing region written for a tile reproduces the source tile rect
/// bit-exactly when read back from the init segment.
#[test]
fn test_rwpk_round_trip_through_init_segment() {
    let harness = Harness::new(1, false, 0, 0);
    let parser_factory = ScriptedParserFactory::default();

    let mut streams = BTreeMap::new();
    let (stream, sink) = make_stream(0, 10_000_000, &parser_factory);
    streams.insert(0, stream);

    let feeder = feed_frames(sink, 1, |_| true);
    harness
        .segmentation(streams, ExtractorTrackSet::new())
        .run()
        .unwrap();
    feeder.join().unwrap();

    // Track 2 carries tile (row 0, col 1): rect (960, 0, 960, 540).
    let payload =
        std::fs::read(format!("{}vr_track2.init.mp4", harness.dir_path)).unwrap();
    let values: Vec<u32> = payload
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();

    let expected = [
        0u32, 960, 960, 540, // proj top/left/width/height
        0, 960, 960, 540, // packed top/left/width/height
        0, 0, // transform type, guard band
    ];
    assert_eq!(values, expected);
}

/// The MPD writer receives one entry per tile track with its quality rank.
#[test]
fn test_mpd_context_snapshot() {
    let harness = Harness::new(1, false, 0, 0);
    let parser_factory = ScriptedParserFactory::default();

    let mut streams = BTreeMap::new();
    let (stream_a, sink_a) = make_stream(0, 10_000_000, &parser_factory);
    let (stream_b, sink_b) = make_stream(1, 5_000_000, &parser_factory);
    streams.insert(0, stream_a);
    streams.insert(1, stream_b);

    let feeder_a = feed_frames(sink_a, 2, |_| true);
    let feeder_b = feed_frames(sink_b, 2, |_| true);
    harness
        .segmentation(streams, ExtractorTrackSet::new())
        .run()
        .unwrap();
    feeder_a.join().unwrap();
    feeder_b.join().unwrap();

    let tile_tracks = harness.mpd_log.tile_tracks.lock().unwrap();
    assert_eq!(tile_tracks.len(), 8);
    assert!(tile_tracks
        .iter()
        .all(|entry| entry.meta.region_packing.is_some()));
    assert_eq!(tile_tracks[0].quality_rank, 1);
    assert_eq!(tile_tracks[7].quality_rank, 2);
}
