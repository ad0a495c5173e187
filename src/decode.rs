//! Compressed-bitstream decoding pipeline.
//!
//! The decoder accumulates elementary-stream bytes in an internal buffer,
//! parses packets out of it and hands them to the codec backend. Output
//! lands in a caller-supplied surface (external memory) or in a surface from
//! the decoder-owned pool (internal memory). A caller that never initialized
//! the pipeline gets an implicit header parse on the first call (auto mode).

use std::sync::Arc;

use crate::backend::{self, DecoderBackend, ProbeOutcome, Received, StreamInfo};
use crate::bitstream::Bitstream;
use crate::param::{
    check_frame_info, FrameAllocRequest, IoPattern, MemType, VideoParam,
};
use crate::pool::FramePool;
use crate::status::{Status, VplError, VplResult, Warning};
use crate::surface::Surface;
use crate::sync::SyncPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninit,
    HeaderKnown,
    Initialized,
    Draining,
    Closed,
}

/// Result of one `decode_frame_async` submit.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A picture was produced into `surface`; its reference count has been
    /// raised for the caller.
    Frame {
        surface: Arc<Surface>,
        sync: SyncPoint,
        warning: Option<Warning>,
    },
    /// Feed more bitstream bytes (or, while draining, the stream has ended).
    MoreData,
    /// The caller runs external memory but supplied no output slot.
    MoreSurface,
}

pub struct Decoder {
    state: State,
    param: Option<VideoParam>,
    header_info: Option<StreamInfo>,
    backend: Option<Box<dyn DecoderBackend>>,
    /// Elementary-stream bytes not yet assembled into packets.
    cache: Vec<u8>,
    pool: Option<Arc<FramePool>>,
    /// Once a caller has decoded through its own surfaces, a missing output
    /// slot is back-pressure rather than a switch to internal memory.
    external_mode: bool,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder {
            state: State::Uninit,
            param: None,
            header_info: None,
            backend: None,
            cache: Vec::new(),
            pool: None,
            external_mode: false,
        }
    }

    /// Parse the leading bytes of `bs` for a sequence header and fill a
    /// parameter set from it. Returns `None` when more data is needed. On
    /// success the read cursor has moved past the header. Does not change
    /// the initialization state of the pipeline.
    pub fn decode_header(&mut self, bs: &mut Bitstream) -> VplResult<Option<VideoParam>> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        match backend::probe_header(bs.unread()) {
            ProbeOutcome::NeedData => {
                bs.compact();
                Ok(None)
            }
            ProbeOutcome::Header { end, info, .. } => {
                bs.consume(end);
                bs.compact();
                bs.codec_id = Some(info.codec_id);
                self.header_info = Some(info);
                if self.state == State::Uninit {
                    self.state = State::HeaderKnown;
                }
                Ok(Some(Self::param_from_stream(&info)))
            }
        }
    }

    fn param_from_stream(info: &StreamInfo) -> VideoParam {
        VideoParam::new(info.codec_id, info.to_frame_info())
    }

    /// Validate the parameter set and open the codec backend.
    pub fn init(&mut self, param: &VideoParam) -> VplResult<()> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        check_frame_info(&param.frame_info)?;
        if param.io_pattern.contains(IoPattern::OUT_VIDEO_MEMORY)
            || param.io_pattern.contains(IoPattern::IN_VIDEO_MEMORY)
        {
            return Err(VplError::InvalidVideoParam);
        }

        let mut be = backend::new_decoder(param.codec_id)?;
        if let Some(info) = self.header_info {
            // out-of-band priming, the header bytes may already be consumed
            be.prime(info);
        }
        self.backend = Some(be);
        self.param = Some(*param);
        self.cache.clear();
        self.state = State::Initialized;
        Ok(())
    }

    /// Close and re-open with a new parameter set; the internal pool is
    /// kept.
    pub fn reset(&mut self, param: &VideoParam) -> VplResult<()> {
        if self.state == State::Closed || self.backend.is_none() {
            return Err(VplError::NotInitialized);
        }
        self.backend = None;
        self.init(param)
    }

    pub fn close(&mut self) -> VplResult<()> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        self.state = State::Closed;
        self.backend = None;
        self.pool = None;
        self.cache.clear();
        Ok(())
    }

    /// Current stream parameters, available once a header has been seen.
    pub fn get_video_param(&self) -> VplResult<VideoParam> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        let info = self
            .backend
            .as_ref()
            .and_then(|b| b.stream_info())
            .or(self.header_info);
        match info {
            Some(info) if info.width != 0 && info.height != 0 => {
                Ok(Self::param_from_stream(&info))
            }
            _ => self.param.ok_or(VplError::NotInitialized),
        }
    }

    /// Sanitize a parameter set, or produce the widest supported template
    /// when `par` is absent.
    pub fn query(&self, par: Option<&VideoParam>) -> VplResult<(VideoParam, Option<Warning>)> {
        match par {
            None => {
                let mut out = VideoParam::new(
                    crate::param::CodecId::Avc,
                    crate::param::FrameInfo::new(crate::param::FourCc::I420, u16::MAX, u16::MAX),
                );
                out.async_depth = 16;
                Ok((out, None))
            }
            Some(par) => {
                if par.protected != 0 {
                    return Err(VplError::Unsupported);
                }
                let mut out = *par;
                let mut warning = None;
                if out.io_pattern != IoPattern::IN_SYSTEM_MEMORY | IoPattern::OUT_SYSTEM_MEMORY {
                    out.io_pattern = IoPattern::IN_SYSTEM_MEMORY | IoPattern::OUT_SYSTEM_MEMORY;
                    warning = Some(Warning::IncompatibleVideoParam);
                }
                Ok((out, warning))
            }
        }
    }

    /// Surface counts the application should allocate for external memory.
    pub fn query_io_surf(&self, par: &VideoParam) -> VplResult<FrameAllocRequest> {
        Ok(FrameAllocRequest {
            info: par.frame_info,
            num_min: 1,
            num_suggested: par.async_depth.max(1) + 1,
            mem_type: MemType::FROM_DECODE | MemType::EXTERNAL_FRAME | MemType::SYSTEM_MEMORY,
        })
    }

    /// The decoder-owned pool backing internal-memory decoding.
    pub(crate) fn surface_pool(&mut self) -> VplResult<Arc<FramePool>> {
        if self.state != State::Initialized && self.state != State::Draining {
            return Err(VplError::NotInitialized);
        }
        if self.pool.is_none() {
            let info = self
                .param
                .as_ref()
                .map(|p| p.frame_info)
                .ok_or(VplError::NotInitialized)?;
            self.pool = Some(FramePool::with_shape(info.fourcc, info.width, info.height, 0));
        }
        Ok(self.pool.as_ref().unwrap().clone())
    }

    /// Submit bitstream bytes and try to produce one decoded picture.
    ///
    /// `bs == None` enters draining mode; `work == None` selects internal
    /// memory (or, before initialization, auto mode).
    pub fn decode_frame_async(
        &mut self,
        bs: Option<&mut Bitstream>,
        work: Option<&Arc<Surface>>,
    ) -> VplResult<DecodeOutcome> {
        match self.state {
            State::Closed => return Err(VplError::NotInitialized),
            State::Uninit | State::HeaderKnown => {
                if work.is_some() {
                    return Err(VplError::NotInitialized);
                }
                // auto mode: run the header parse from the bitstream
                let bs = match bs {
                    Some(bs) => bs,
                    None => return Err(VplError::NotInitialized),
                };
                let param = match self.header_info {
                    Some(info) => Self::param_from_stream(&info),
                    None => match self.decode_header(bs)? {
                        Some(param) => param,
                        None => return Ok(DecodeOutcome::MoreData),
                    },
                };
                self.init(&param)?;
                return self.decode_frame_async(Some(bs), None);
            }
            State::Initialized | State::Draining => {}
        }

        // a caller that decodes through its own surfaces gets back-pressure
        // instead of a silent switch to internal memory
        if work.is_some() {
            self.external_mode = true;
        } else if self.external_mode {
            return Ok(DecodeOutcome::MoreSurface);
        }

        // output slots come from the caller or from the decoder-owned pool
        let pool = if work.is_none() {
            Some(self.surface_pool()?)
        } else {
            None
        };

        match bs {
            Some(bs) => {
                self.cache.extend_from_slice(bs.unread());
                let _ = bs.take_unread();
            }
            None => {
                self.state = State::Draining;
            }
        }

        let draining = self.state == State::Draining;
        let backend = self.backend.as_mut().ok_or(VplError::NotInitialized)?;

        loop {
            let (consumed, packet) = backend.parse(&self.cache);
            if consumed > 0 {
                self.cache.drain(..consumed);
            }
            let progressed = consumed > 0 || packet.is_some();
            if let Some(packet) = packet {
                if let Err(e) = backend.send_packet(Some(packet)) {
                    log::error!("decode: backend rejected packet: {e}");
                    return Err(VplError::Unknown);
                }
            } else if draining && !progressed {
                // no further complete unit can appear; drop a truncated
                // tail and tell the backend the stream is over
                self.cache.clear();
                backend
                    .send_packet(None)
                    .map_err(|_| VplError::Unknown)?;
            }

            match backend.receive_frame().map_err(|e| {
                log::error!("decode: backend receive failed: {e}");
                VplError::UndefinedBehavior
            })? {
                Received::Frame(image) => {
                    let warning = if backend.take_param_change() {
                        if let Some(info) = backend.stream_info() {
                            self.header_info = Some(info);
                            self.param = Some(Self::param_from_stream(&info));
                        }
                        Some(Warning::VideoParamChanged)
                    } else {
                        None
                    };

                    let surface = match (work, &pool) {
                        (Some(surface), _) => {
                            surface.add_ref();
                            surface.clone()
                        }
                        (None, Some(pool)) => pool.get_free_surface()?,
                        (None, None) => return Err(VplError::Unknown),
                    };
                    surface.copy_image_into(&image)?;

                    let sync = SyncPoint::completed(match warning {
                        Some(w) => Status::from(w),
                        None => Status::Ok,
                    });
                    surface.set_sync(sync.clone());
                    return Ok(DecodeOutcome::Frame {
                        surface,
                        sync,
                        warning,
                    });
                }
                Received::Eos => return Ok(DecodeOutcome::MoreData),
                Received::Again => {
                    if progressed || draining {
                        continue;
                    }
                    // nothing left to parse and nothing buffered
                    return Ok(DecodeOutcome::MoreData);
                }
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::raw::{write_sequence_header, SEQ_HEADER_LEN};
    use crate::backend::{EncodeConfig, EncoderBackend};
    use crate::image::Image;
    use crate::param::{CodecId, FourCc, FrameRate, RateControl};

    fn stream_info(width: u16, height: u16) -> StreamInfo {
        StreamInfo {
            codec_id: CodecId::Hevc,
            fourcc: FourCc::I420,
            width,
            height,
            frame_rate: FrameRate::new(30, 1),
            shift: 0,
            full_range: false,
        }
    }

    /// Encode `n` I420 frames into an elementary stream with a leading
    /// sequence header. Luma of frame `i` is filled with `base + i`.
    fn make_stream(width: u16, height: u16, n: u64, base: u8) -> Vec<u8> {
        let mut enc = crate::backend::raw::RawEncoder::new(EncodeConfig {
            codec_id: CodecId::Hevc,
            fourcc: FourCc::I420,
            full_range: false,
            width,
            height,
            frame_rate: FrameRate::new(30, 1),
            bitrate_kbps: 4000,
            gop_size: 60,
            rate_control: RateControl::Vbr,
            shift: 0,
        });
        for i in 0..n {
            let mut img = Image::alloc(FourCc::I420, width, height);
            img.planes[0].iter_mut().for_each(|b| *b = base + i as u8);
            img.pts = 1000 + i;
            enc.send_frame(Some(&img)).unwrap();
        }
        let mut stream = Vec::new();
        while let Some(pkt) = enc.receive_packet().unwrap() {
            stream.extend_from_slice(&pkt.data);
        }
        stream
    }

    #[test]
    fn decode_header_needs_complete_header() {
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(1024);
        let mut header = Vec::new();
        write_sequence_header(&stream_info(96, 64), &mut header);

        bs.append(&header[..10]).unwrap();
        assert!(dec.decode_header(&mut bs).unwrap().is_none());

        bs.append(&header[10..]).unwrap();
        let param = dec.decode_header(&mut bs).unwrap().unwrap();
        assert_eq!(param.codec_id, CodecId::Hevc);
        assert_eq!(param.frame_info.width, 96);
        assert_eq!(param.frame_info.height, 64);
        // cursor moved past the sequence header
        assert_eq!(bs.data_length(), 0);
    }

    #[test]
    fn init_rejects_bad_params() {
        let mut dec = Decoder::new();
        let mut param = VideoParam::new(
            CodecId::Hevc,
            crate::param::FrameInfo::new(FourCc::I420, 0, 64),
        );
        assert_eq!(dec.init(&param), Err(VplError::InvalidVideoParam));

        param.frame_info.width = 96;
        param.io_pattern = IoPattern::OUT_VIDEO_MEMORY;
        assert_eq!(dec.init(&param), Err(VplError::InvalidVideoParam));
    }

    #[test]
    fn external_memory_decode_fills_supplied_surface() {
        let stream = make_stream(96, 64, 1, 40);
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());

        let pool = FramePool::with_shape(FourCc::I420, 96, 64, 4);
        let work = pool.get_free_surface().unwrap();
        work.release().unwrap(); // hand it over unclaimed, decode takes the reference

        bs.append(&stream).unwrap();
        let mut param_bs = Bitstream::with_capacity(stream.len());
        param_bs.append(&stream[..SEQ_HEADER_LEN]).unwrap();
        let param = dec.decode_header(&mut param_bs).unwrap().unwrap();
        dec.init(&param).unwrap();

        match dec.decode_frame_async(Some(&mut bs), Some(&work)).unwrap() {
            DecodeOutcome::Frame { surface, .. } => {
                assert_eq!(surface.ref_count(), 1);
                let data = surface.data();
                assert_eq!(data.info.width, 96);
                assert_eq!(data.info.height, 64);
                assert_eq!(data.planes[0][0], 40);
                assert_eq!(data.timestamp, 1000);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_output_dims_follow_header() {
        let stream = make_stream(48, 32, 1, 7);
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());
        bs.append(&stream).unwrap();

        match dec.decode_frame_async(Some(&mut bs), None).unwrap() {
            DecodeOutcome::Frame { surface, .. } => {
                let par = dec.get_video_param().unwrap();
                let data = surface.data();
                assert_eq!((data.info.width, data.info.height), (48, 32));
                assert_eq!((par.frame_info.width, par.frame_info.height), (48, 32));
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn auto_mode_returns_more_data_on_partial_header() {
        let stream = make_stream(96, 64, 1, 9);
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());

        bs.append(&stream[..10]).unwrap();
        match dec.decode_frame_async(Some(&mut bs), None).unwrap() {
            DecodeOutcome::MoreData => {}
            other => panic!("expected more data, got {:?}", other),
        }

        bs.append(&stream[10..]).unwrap();
        match dec.decode_frame_async(Some(&mut bs), None).unwrap() {
            DecodeOutcome::Frame { surface, .. } => {
                assert_eq!(surface.data().planes[0][0], 9);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn internal_pool_stays_small_when_surfaces_are_released() {
        let n = 5u64;
        let stream = make_stream(32, 16, n, 1);
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());
        bs.append(&stream).unwrap();

        let mut decoded = 0;
        loop {
            let outcome = dec.decode_frame_async(if bs.data_length() > 0 {
                Some(&mut bs)
            } else {
                None
            }, None);
            match outcome.unwrap() {
                DecodeOutcome::Frame { surface, .. } => {
                    decoded += 1;
                    surface.release().unwrap();
                }
                DecodeOutcome::MoreData => {
                    if bs.data_length() == 0 {
                        break;
                    }
                }
                DecodeOutcome::MoreSurface => panic!("unexpected more-surface"),
            }
        }
        assert_eq!(decoded, n);
        let pool = dec.surface_pool().unwrap();
        assert!(pool.size() as u64 <= n + 1, "pool grew to {}", pool.size());
    }

    #[test]
    fn draining_signals_end_of_stream() {
        let stream = make_stream(32, 16, 2, 1);
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());
        bs.append(&stream).unwrap();

        let mut frames = 0;
        while let DecodeOutcome::Frame { surface, .. } =
            dec.decode_frame_async(Some(&mut bs), None).unwrap()
        {
            surface.release().unwrap();
            frames += 1;
        }
        // drain the rest
        loop {
            match dec.decode_frame_async(None, None).unwrap() {
                DecodeOutcome::Frame { surface, .. } => {
                    surface.release().unwrap();
                    frames += 1;
                }
                DecodeOutcome::MoreData => break,
                DecodeOutcome::MoreSurface => panic!("unexpected more-surface"),
            }
        }
        assert_eq!(frames, 2);
    }

    #[test]
    fn mid_stream_header_change_warns() {
        let mut stream = make_stream(32, 16, 1, 1);
        stream.extend_from_slice(&make_stream(64, 48, 1, 2));

        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());
        bs.append(&stream).unwrap();

        match dec.decode_frame_async(Some(&mut bs), None).unwrap() {
            DecodeOutcome::Frame { warning, surface, .. } => {
                assert_eq!(warning, None);
                surface.release().unwrap();
            }
            other => panic!("expected frame, got {:?}", other),
        }
        match dec.decode_frame_async(Some(&mut bs), None).unwrap() {
            DecodeOutcome::Frame { warning, surface, .. } => {
                assert_eq!(warning, Some(Warning::VideoParamChanged));
                assert_eq!(surface.data().info.width, 64);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn work_surface_before_init_is_not_initialized() {
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(64);
        let pool = FramePool::with_shape(FourCc::I420, 32, 16, 1);
        let surface = pool.get_free_surface().unwrap();
        assert_eq!(
            dec.decode_frame_async(Some(&mut bs), Some(&surface))
                .unwrap_err(),
            VplError::NotInitialized
        );
    }

    #[test]
    fn closed_decoder_rejects_calls() {
        let stream = make_stream(32, 16, 1, 1);
        let mut dec = Decoder::new();
        let mut bs = Bitstream::with_capacity(stream.len());
        bs.append(&stream).unwrap();
        let _ = dec.decode_frame_async(Some(&mut bs), None).unwrap();
        dec.close().unwrap();
        assert_eq!(
            dec.decode_frame_async(None, None).unwrap_err(),
            VplError::NotInitialized
        );
    }
}
