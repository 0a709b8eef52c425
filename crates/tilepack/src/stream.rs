//! Input video streams.
//!
//! A [`VideoStream`] wraps one pre-encoded tiled elementary stream: parsed
//! header geometry, source packing/coverage metadata, the per-tile slice
//! scratch shared with extractor workers, and the pending access-unit queue
//! fed by the caller through a [`FrameSink`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;

use crate::{
    error::{TilepackError, TilepackResult},
    omaf::{ContentCoverage, RegionWisePacking},
    types::{BsBuffer, Codec, FrameData, Rational, TileInfo},
};

/// Frames buffered per stream before the producer blocks.
const FRAME_QUEUE_DEPTH: usize = 32;

/// How often a parked frame wait re-checks the explicit EOS mark.
const EOS_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// NAL-unit parser of one input stream (external collaborator).
pub trait NaluParser: Send {
    fn parse_header_data(&mut self) -> TilepackResult<()>;

    fn src_width(&self) -> u32;
    fn src_height(&self) -> u32;
    fn tile_rows(&self) -> u8;
    fn tile_cols(&self) -> u8;

    /// Raw projection id: 0 = ERP, 1 = cubemap. Validated by the builders.
    fn projection_type(&self) -> u8;

    fn tile_info(&self, tile_idx: usize) -> TilepackResult<TileInfo>;

    fn vps_nalu(&self) -> Option<Bytes>;
    fn sps_nalu(&self) -> Option<Bytes>;
    fn pps_nalu(&self) -> Option<Bytes>;

    /// Splits one access unit into per-tile slice NALUs, row-major order.
    fn parse_slice_nalu(&mut self, data: &Bytes, tiles_num: usize) -> TilepackResult<Vec<Bytes>>;
}

/// Creates the parser matching a stream's codec (external collaborator).
pub trait NaluParserFactory {
    fn create_parser(&self, codec: Codec, bs: &BsBuffer) -> TilepackResult<Box<dyn NaluParser>>;
}

/// Producer half of a stream's frame queue.
///
/// Dropping the sink (or calling [`FrameSink::finish`]) marks end of stream;
/// the orchestrator flushes every track once the queue drains. A caller that
/// keeps the sender alive can end the stream with [`FrameSink::set_eos`]
/// instead.
pub struct FrameSink {
    sender: Sender<FrameData>,
    eos: Arc<AtomicBool>,
}

impl FrameSink {
    /// Queues one access unit, blocking while the queue is full.
    pub fn add_frame(&self, frame: FrameData) -> TilepackResult<()> {
        if frame.data.is_empty() {
            return Err(TilepackError::DataSize);
        }

        self.sender
            .send(frame)
            .map_err(|_| TilepackError::InvalidData("frame queued after end of stream"))
    }

    /// Marks end of stream without giving up the sender. Already-queued
    /// frames are still consumed.
    pub fn set_eos(&self) {
        self.eos.store(true, Ordering::Release);
    }

    /// Marks end of stream.
    pub fn finish(self) {
        self.eos.store(true, Ordering::Release);
    }
}

/// Shared per-tile slice scratch of one stream: written by the orchestrator
/// during the parse stage, read by extractor workers after the tick publish.
pub type TileNaluScratch = Arc<RwLock<Vec<Bytes>>>;

pub struct VideoStream {
    stream_idx: u8,
    codec: Codec,
    width: u32,
    height: u32,
    tile_rows: u8,
    tile_cols: u8,
    proj_type: u8,
    frame_rate: Rational,
    bit_rate: u64,
    tiles_info: Vec<TileInfo>,
    src_rwpk: RegionWisePacking,
    src_covi: ContentCoverage,
    parser: Box<dyn NaluParser>,
    frames: Receiver<FrameData>,
    eos: Arc<AtomicBool>,
    curr_frame: Option<FrameData>,
    frames_to_one_seg: Vec<FrameData>,
    tile_nalus: TileNaluScratch,
}

impl VideoStream {
    /// Parses the stream headers and derives the tile grid with its source
    /// region-wise packing and content coverage. Returns the stream plus the
    /// producer handle for its frame queue.
    pub fn new(
        stream_idx: u8,
        bs: &BsBuffer,
        parser_factory: &dyn NaluParserFactory,
    ) -> TilepackResult<(Self, FrameSink)> {
        let codec = Codec::from_id(bs.codec_id)?;
        let mut parser = parser_factory.create_parser(codec, bs)?;

        parser.parse_header_data()?;
        let width = parser.src_width();
        let height = parser.src_height();
        let tile_rows = parser.tile_rows();
        let tile_cols = parser.tile_cols();
        let proj_type = parser.projection_type();

        let tiles_num = tile_rows as usize * tile_cols as usize;
        let mut tiles_info = Vec::with_capacity(tiles_num);
        for tile_idx in 0..tiles_num {
            tiles_info.push(parser.tile_info(tile_idx)?);
        }

        let src_rwpk = RegionWisePacking::from_tile_grid(width, height, &tiles_info);
        let src_covi = ContentCoverage::from_rwpk(&src_rwpk, proj_type);

        let (sender, frames) = bounded(FRAME_QUEUE_DEPTH);
        let eos = Arc::new(AtomicBool::new(false));

        Ok((
            Self {
                stream_idx,
                codec,
                width,
                height,
                tile_rows,
                tile_cols,
                proj_type,
                frame_rate: bs.frame_rate,
                bit_rate: bs.bit_rate,
                tiles_info,
                src_rwpk,
                src_covi,
                parser,
                frames,
                eos: Arc::clone(&eos),
                curr_frame: None,
                frames_to_one_seg: Vec::new(),
                tile_nalus: Arc::new(RwLock::new(vec![Bytes::new(); tiles_num])),
            },
            FrameSink { sender, eos },
        ))
    }

    pub fn stream_idx(&self) -> u8 {
        self.stream_idx
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_rows(&self) -> u8 {
        self.tile_rows
    }

    pub fn tile_cols(&self) -> u8 {
        self.tile_cols
    }

    pub fn tiles_num(&self) -> usize {
        self.tile_rows as usize * self.tile_cols as usize
    }

    pub fn projection_type(&self) -> u8 {
        self.proj_type
    }

    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    pub fn bit_rate(&self) -> u64 {
        self.bit_rate
    }

    pub fn tiles_info(&self) -> &[TileInfo] {
        &self.tiles_info
    }

    pub fn src_rwpk(&self) -> &RegionWisePacking {
        &self.src_rwpk
    }

    pub fn src_covi(&self) -> &ContentCoverage {
        &self.src_covi
    }

    pub fn vps_nalu(&self) -> Option<Bytes> {
        self.parser.vps_nalu()
    }

    pub fn sps_nalu(&self) -> Option<Bytes> {
        self.parser.sps_nalu()
    }

    pub fn pps_nalu(&self) -> Option<Bytes> {
        self.parser.pps_nalu()
    }

    pub fn tile_nalu_scratch(&self) -> TileNaluScratch {
        Arc::clone(&self.tile_nalus)
    }

    /// Whether the producer has explicitly marked end of stream. A dropped
    /// [`FrameSink`] also ends the stream, once the queue is drained.
    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }

    /// Blocks until the next access unit is available; `None` means the
    /// stream reached end of stream and the queue is drained.
    pub(crate) fn next_frame(&mut self) -> Option<&FrameData> {
        let frame = loop {
            match self.frames.try_recv() {
                Ok(frame) => break frame,
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {
                    if self.is_eos() {
                        return None;
                    }
                }
            }

            match self.frames.recv_timeout(EOS_POLL_INTERVAL) {
                Ok(frame) => break frame,
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {}
            }
        };

        self.curr_frame = Some(frame);
        self.curr_frame.as_ref()
    }

    /// Parses the current frame's slice NALUs into the per-tile scratch.
    pub(crate) fn update_tiles_nalu(&mut self) -> TilepackResult<()> {
        let frame = self.curr_frame.as_ref().ok_or(TilepackError::NullPtr)?;
        let tiles_num = self.tiles_num();

        let nalus = self.parser.parse_slice_nalu(&frame.data, tiles_num)?;
        if nalus.len() != tiles_num {
            return Err(TilepackError::InvalidData(
                "slice NALU count does not match tile grid",
            ));
        }

        *self.tile_nalus.write() = nalus;
        Ok(())
    }

    /// Moves the current frame into the open segment's buffer.
    pub(crate) fn add_frame_to_segment(&mut self) {
        if let Some(frame) = self.curr_frame.take() {
            self.frames_to_one_seg.push(frame);
        }
    }

    /// Drops the frames buffered for the segment that just closed.
    pub(crate) fn destroy_curr_segment_frames(&mut self) {
        self.frames_to_one_seg.clear();
    }
}
