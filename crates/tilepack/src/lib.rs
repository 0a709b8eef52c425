//! Tile-aware OMAF DASH segmentation core.
//!
//! `tilepack` ingests pre-encoded tiled H.264/H.265 elementary streams and
//! drives the viewport-dependent OMAF packaging flow: every tile becomes its
//! own DASH tile track, extractor tracks describe how a chosen subset of
//! tiles merges back into one decodable HEVC bitstream, and all tracks stay
//! synchronized on segment and IDR boundaries under live windowing.
//!
//! ```text
//! FrameSink ──► VideoStream queue ─┐
//! FrameSink ──► VideoStream queue ─┼─► Segmentation ──► tile-track segments
//!                                  │        │
//!                                  │        ├─► tick gates ─► extractor workers
//!                                  │        │                  └─► extractor-track segments
//!                                  │        └─► LiveWindowJanitor / MPD writer
//! ```
//!
//! The NAL-unit parser, the ISO-BMFF segment writer, the MPD writer and the
//! extractor-sample constructor are external collaborators reached through
//! the traits in [`stream`], [`segmenter`], [`mpd`] and [`extractor`].

pub mod builder;
pub mod error;
pub mod extractor;
pub mod meta;
pub mod mpd;
pub mod omaf;
pub mod orchestrator;
pub mod segmenter;
pub mod stream;
pub mod types;
pub mod window;

pub use error::{TilepackError, TilepackResult};
pub use extractor::{
    ExtractorSampleBuilder, ExtractorTrackConfig, ExtractorTrackSet, TileRef, TilesMergeDirection,
};
pub use mpd::{MpdContext, MpdTrackEntry, MpdWriter, MpdWriterFactory};
pub use orchestrator::Segmentation;
pub use segmenter::{
    GeneralSegConfig, InitSegConfig, InitSegmenter, Segmenter, SegmenterFactory, TrackSegmentCtx,
};
pub use stream::{FrameSink, NaluParser, NaluParserFactory, VideoStream};
pub use types::{
    BsBuffer, Codec, FrameData, Projection, Rational, SegmentInfo, TileInfo, TrackId,
    DEFAULT_EXTRACTORTRACK_TRACKIDBASE, MAINSTREAM_QUALITY_RANK,
};
pub use window::LiveWindowJanitor;
