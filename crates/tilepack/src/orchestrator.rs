//! Segmentation orchestration.
//!
//! [`Segmentation::run`] owns the whole run: it builds every tile-track and
//! extractor-track context, writes all init segments, then drives the
//! per-frame loop that keeps tile tracks and extractor tracks synchronized on
//! segment and IDR boundaries. Extractor tracks are serviced by dedicated
//! worker threads, sharded by [`SegmentInfo::extractor_tracks_per_seg_thread`]
//! and synchronized with the orchestrator through per-track tick gates.

use std::{
    collections::BTreeMap,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use bytes::Bytes;
use tracing::{error, info};

use crate::{
    builder::{build_extractor_track_ctxs, build_tile_track_ctxs, TileTrackBuild},
    error::{TilepackError, TilepackResult},
    extractor::{ExtractorHandle, ExtractorTrack, ExtractorTrackSet, TickGate, TickState},
    meta::FrameType,
    mpd::{MpdContext, MpdTrackEntry, MpdWriter, MpdWriterFactory},
    segmenter::{SegmenterFactory, TrackEntry},
    stream::VideoStream,
    types::{Rational, SegmentInfo, TrackId},
    window::LiveWindowJanitor,
};

/// One extractor track as owned by its worker thread.
struct ExtractorUnit {
    track: ExtractorTrack,
    entry: TrackEntry,
    gate: Arc<TickGate>,
    prev_seg_num: u64,
}

/// Worker-thread sharding: `(thread count, tracks per thread, tracks on the
/// last thread)`.
pub(crate) fn compute_sharding(extractor_count: usize, per_thread: u16) -> (usize, usize, usize) {
    let per_thread = (per_thread as usize).max(1);
    if extractor_count == 0 {
        return (0, per_thread, per_thread);
    }
    if extractor_count % per_thread == 0 {
        (extractor_count / per_thread, per_thread, per_thread)
    } else {
        (
            extractor_count / per_thread + 1,
            per_thread,
            extractor_count % per_thread,
        )
    }
}

pub struct Segmentation {
    streams: BTreeMap<u8, VideoStream>,
    extractor_tracks: ExtractorTrackSet,
    seg_info: SegmentInfo,
    segmenter_factory: Box<dyn SegmenterFactory>,
    mpd_factory: Box<dyn MpdWriterFactory>,
    track_id_start: TrackId,
}

impl Segmentation {
    pub fn new(
        streams: BTreeMap<u8, VideoStream>,
        extractor_tracks: ExtractorTrackSet,
        seg_info: SegmentInfo,
        segmenter_factory: Box<dyn SegmenterFactory>,
        mpd_factory: Box<dyn MpdWriterFactory>,
    ) -> Self {
        Self {
            streams,
            extractor_tracks,
            seg_info,
            segmenter_factory,
            mpd_factory,
            track_id_start: 1,
        }
    }

    /// First track id handed to tile tracks (default 1).
    pub fn with_track_id_start(mut self, track_id_start: TrackId) -> Self {
        self.track_id_start = track_id_start;
        self
    }

    /// Runs the segmentation to end of stream. Returns the number of frames
    /// written into segments.
    pub fn run(mut self) -> TilepackResult<u64> {
        let mut tile_build = build_tile_track_ctxs(
            &self.streams,
            &self.seg_info,
            self.segmenter_factory.as_ref(),
            self.track_id_start,
        )?;

        let extractor_tracks = std::mem::take(&mut self.extractor_tracks);
        let built_extractors = build_extractor_track_ctxs(
            extractor_tracks,
            &self.streams,
            &tile_build,
            &self.seg_info,
            self.segmenter_factory.as_ref(),
        )?;

        let mut units: Vec<ExtractorUnit> = built_extractors
            .into_values()
            .map(|(track, entry)| ExtractorUnit {
                track,
                entry,
                gate: Arc::new(TickGate::default()),
                prev_seg_num: 0,
            })
            .collect();

        let handles: Vec<ExtractorHandle> = units
            .iter()
            .map(|unit| ExtractorHandle {
                track_id: unit.entry.ctx.track_id,
                gate: Arc::clone(&unit.gate),
            })
            .collect();

        let mut mpd = self.create_mpd_writer(&tile_build, &units)?;
        mpd.initialize()?;

        for entries in tile_build.per_stream.values_mut() {
            for entry in entries.iter_mut() {
                entry
                    .init_segmenter
                    .generate_init_segment(&entry.ctx, &tile_build.all_tile_metas)?;
            }
        }
        for unit in units.iter_mut() {
            unit.entry
                .init_segmenter
                .generate_init_segment(&unit.entry.ctx, &tile_build.all_tile_metas)?;
        }

        let (thread_count, ave_per_thread, last_per_thread) = compute_sharding(
            units.len(),
            self.seg_info.extractor_tracks_per_seg_thread,
        );
        info!("launching {thread_count} threads for extractor track segmentation");
        info!("average extractor track number per thread is {ave_per_thread}");
        info!("the last thread involves {last_per_thread} extractor tracks");

        let mut shards: Vec<Vec<ExtractorUnit>> = Vec::with_capacity(thread_count);
        for thread_idx in 0..thread_count {
            let take = if thread_idx == thread_count - 1 {
                last_per_thread
            } else {
                ave_per_thread
            };
            shards.push(units.drain(..take).collect());
        }

        let track_ids: Vec<TrackId> = tile_build
            .all_tile_tracks
            .keys()
            .copied()
            .chain(handles.iter().map(|handle| handle.track_id))
            .collect();
        let janitor = LiveWindowJanitor::new(self.seg_info.clone(), track_ids);

        let mut workers: Vec<JoinHandle<TilepackResult<()>>> = Vec::with_capacity(thread_count);
        let frame_rate = tile_build.frame_rate;

        let loop_result = segmentation_loop(
            &mut self.streams,
            &mut tile_build,
            &self.seg_info,
            frame_rate,
            &handles,
            &mut shards,
            &mut workers,
            mpd.as_mut(),
            &janitor,
        );

        // Release any worker still parked on its gate, then collect results.
        for handle in &handles {
            handle.gate.shutdown();
        }
        let mut worker_result: TilepackResult<()> = Ok(());
        for worker in workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("extractor track segmentation failed: {e}");
                    if worker_result.is_ok() {
                        worker_result = Err(e);
                    }
                }
                Err(_) => {
                    if worker_result.is_ok() {
                        worker_result =
                            Err(TilepackError::InvalidData("extractor worker panicked"));
                    }
                }
            }
        }

        let frames_num = loop_result?;
        worker_result?;
        Ok(frames_num)
    }

    fn create_mpd_writer(
        &self,
        tile_build: &TileTrackBuild,
        units: &[ExtractorUnit],
    ) -> TilepackResult<Box<dyn MpdWriter>> {
        let tile_tracks = tile_build
            .per_stream
            .values()
            .flatten()
            .map(|entry| MpdTrackEntry {
                track_id: entry.ctx.track_id,
                meta: entry.ctx.coded_meta.clone(),
                quality_rank: entry.ctx.quality_rank,
            })
            .collect();
        let extractor_tracks = units
            .iter()
            .map(|unit| MpdTrackEntry {
                track_id: unit.entry.ctx.track_id,
                meta: unit.entry.ctx.coded_meta.clone(),
                quality_rank: unit.entry.ctx.quality_rank,
            })
            .collect();

        self.mpd_factory.create_writer(MpdContext {
            tile_tracks,
            extractor_tracks,
            seg_info: self.seg_info.clone(),
            projection: tile_build.projection,
            frame_rate: tile_build.frame_rate,
        })
    }
}

/// The per-tick loop. One iteration consumes one presentation frame from
/// every stream; extractor workers run in lock-step behind the tick gates.
#[allow(clippy::too_many_arguments)]
fn segmentation_loop(
    streams: &mut BTreeMap<u8, VideoStream>,
    tile_build: &mut TileTrackBuild,
    seg_info: &SegmentInfo,
    frame_rate: Rational,
    handles: &[ExtractorHandle],
    shards: &mut Vec<Vec<ExtractorUnit>>,
    workers: &mut Vec<JoinHandle<TilepackResult<()>>>,
    mpd: &mut dyn MpdWriter,
    janitor: &LiveWindowJanitor,
) -> TilepackResult<u64> {
    let mut frames_num: u64 = 0;
    let mut seg_num: u64 = 0;
    let mut prev_seg_num: u64 = 0;
    let mut seg_timer = Instant::now();

    loop {
        if seg_num == 1 && seg_info.is_live {
            mpd.update_mpd(seg_num, frames_num)?;
        }

        let mut frames_is_key = BTreeMap::new();
        let mut streams_is_eos = BTreeMap::new();

        for (&stream_idx, stream) in streams.iter_mut() {
            let entries = tile_build
                .per_stream
                .get_mut(&stream_idx)
                .ok_or(TilepackError::StreamNotFound(stream_idx))?;

            match stream.next_frame().map(|frame| frame.is_key_frame) {
                Some(is_key_frame) => {
                    frames_is_key.insert(stream_idx, is_key_frame);
                    streams_is_eos.insert(stream_idx, false);

                    stream.update_tiles_nalu()?;
                    seg_num =
                        write_segment_for_each_video(stream, entries, is_key_frame, false, frame_rate)?;
                }
                None => {
                    frames_is_key.insert(stream_idx, false);
                    streams_is_eos.insert(stream_idx, true);

                    seg_num = write_segment_for_each_video(stream, entries, false, true, frame_rate)?;
                }
            }
        }

        // All streams must agree on IDR-ness and EOS for this tick.
        let mut key_frames = frames_is_key.values();
        let now_key_frame = *key_frames
            .next()
            .ok_or(TilepackError::InvalidData("no video streams"))?;
        if key_frames.any(|&key| key != now_key_frame) {
            return Err(TilepackError::InvalidData(
                "streams disagree on key frame at current tick",
            ));
        }

        let mut eos_flags = streams_is_eos.values();
        let is_eos = *eos_flags
            .next()
            .ok_or(TilepackError::InvalidData("no video streams"))?;
        if eos_flags.any(|&eos| eos != is_eos) {
            return Err(TilepackError::InvalidData(
                "streams disagree on end of stream",
            ));
        }

        let tick = frames_num + 1;
        for handle in handles {
            handle.gate.publish(tick, now_key_frame, is_eos);
        }

        for shard in shards.drain(..) {
            let worker = thread::Builder::new()
                .name(format!("extractor-seg-{}", workers.len()))
                .spawn(move || extractor_worker_loop(shard, frame_rate))
                .map_err(|_| TilepackError::CreateThread)?;
            workers.push(worker);
        }

        for handle in handles {
            handle.gate.wait_processed(tick);
        }

        for stream in streams.values_mut() {
            if seg_num == prev_seg_num + 1 {
                stream.destroy_curr_segment_frames();
            }
            stream.add_frame_to_segment();
        }

        if seg_num == prev_seg_num + 1 {
            prev_seg_num += 1;
            info!(
                "completed segment {seg_num} in {} ms",
                seg_timer.elapsed().as_millis()
            );
            seg_timer = Instant::now();

            if seg_info.is_live {
                janitor.collect(seg_num);
            }
        }

        if is_eos {
            if seg_info.is_live {
                mpd.update_mpd(seg_num, frames_num)?;
            } else {
                mpd.write_mpd(frames_num)?;
            }
            info!("total {frames_num} frames written into segments");
            break;
        }
        frames_num += 1;
    }

    Ok(frames_num)
}

/// Writes this tick's sample into every tile track of one stream, advancing
/// each context in lock-step. Returns the segment count reported by the last
/// writer.
fn write_segment_for_each_video(
    stream: &VideoStream,
    entries: &mut [TrackEntry],
    is_key_frame: bool,
    is_eos: bool,
    frame_rate: Rational,
) -> TilepackResult<u64> {
    let tile_nalus: Vec<Bytes> = stream.tile_nalu_scratch().read().clone();
    let mut seg_num = 0;

    for (tile_idx, entry) in entries.iter_mut().enumerate() {
        entry.ctx.coded_meta.r#type = if is_key_frame {
            FrameType::Idr
        } else {
            FrameType::NonIdr
        };
        entry.ctx.coded_meta.is_eos = is_eos;
        entry.ctx.sample = if is_eos {
            Bytes::new()
        } else {
            tile_nalus.get(tile_idx).cloned().unwrap_or_default()
        };

        entry.write_frame(frame_rate)?;
        seg_num = entry.segmenter.segments_num();
    }

    Ok(seg_num)
}

/// Worker-thread routine: services one shard of extractor tracks, one tick
/// at a time, until end of stream or shutdown.
fn extractor_worker_loop(
    mut units: Vec<ExtractorUnit>,
    frame_rate: Rational,
) -> TilepackResult<()> {
    let anchor_gate = match units.first() {
        Some(unit) => Arc::clone(&unit.gate),
        None => return Ok(()),
    };

    let mut tick: u64 = 1;
    loop {
        let state = anchor_gate.wait_published(tick);
        if state.shutdown {
            return Ok(());
        }

        for unit_idx in 0..units.len() {
            if let Err(e) = service_extractor_track(&mut units[unit_idx], state, frame_rate) {
                // Unblock the orchestrator before surfacing the fault.
                for unit in &units {
                    unit.gate.mark_processed(u64::MAX);
                }
                return Err(e);
            }
        }

        if state.is_eos {
            return Ok(());
        }
        tick += 1;
    }
}

fn service_extractor_track(
    unit: &mut ExtractorUnit,
    state: TickState,
    frame_rate: Rational,
) -> TilepackResult<()> {
    unit.entry.ctx.sample = if state.is_eos {
        Bytes::new()
    } else {
        unit.track.construct_extractors()?
    };
    unit.entry.ctx.coded_meta.r#type = if state.is_key_frame {
        FrameType::Idr
    } else {
        FrameType::NonIdr
    };
    unit.entry.ctx.coded_meta.is_eos = state.is_eos;

    unit.entry.write_frame(frame_rate)?;

    let seg_num = unit.entry.segmenter.segments_num();
    if seg_num == unit.prev_seg_num + 1 {
        unit.prev_seg_num = seg_num;
        unit.track.destroy_curr_seg_nalus();
        // The prefix for the segment that just opened.
        unit.entry.ctx.extractor_nalu = Some(unit.track.build_sei_prefix());
    }

    if let Some(prefix) = unit.entry.ctx.extractor_nalu.take() {
        unit.track.add_extractors_nalu_to_seg(prefix);
    }

    unit.track.increase_processed_frm_num();
    unit.gate.mark_processed(unit.track.processed_frm_num());

    Ok(())
}
