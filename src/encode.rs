//! Raw-frame encoding pipeline.
//!
//! Surfaces go in, compressed packets come out appended to the caller's
//! bitstream buffer. A packet that does not fit is kept pending so the
//! caller can grow the buffer and retry.

use std::sync::Arc;

use crate::backend::{self, EncodeConfig, EncoderBackend, Packet};
use crate::bitstream::Bitstream;
use crate::param::{
    check_frame_info, CodecId, FourCc, FrameAllocRequest, IoPattern, MemType, VideoParam,
};
use crate::pool::FramePool;
use crate::status::{Status, VplError, VplResult, Warning};
use crate::surface::Surface;
use crate::sync::SyncPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninit,
    Initialized,
    Closed,
}

/// Result of one `encode_frame_async` submit.
#[derive(Debug)]
pub enum EncodeOutcome {
    /// A packet was appended to the bitstream.
    Packet { sync: SyncPoint },
    /// Nothing available yet; feed another frame (or the drain finished).
    MoreData,
}

pub struct Encoder {
    state: State,
    param: Option<VideoParam>,
    backend: Option<Box<dyn EncoderBackend>>,
    pool: Option<Arc<FramePool>>,
    /// Packet that did not fit into the caller's buffer on the previous
    /// call.
    pending: Option<Packet>,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder {
            state: State::Uninit,
            param: None,
            backend: None,
            pool: None,
            pending: None,
        }
    }

    fn backend_config(param: &VideoParam) -> VplResult<EncodeConfig> {
        let info = &param.frame_info;
        // 8-bit 4:2:0 encodes as planar Y/U/V, 10-bit as 10-bit planar
        let fourcc = match info.fourcc {
            FourCc::I420 => FourCc::I420,
            FourCc::I010 => FourCc::I010,
            _ => return Err(VplError::InvalidVideoParam),
        };
        let fps = info.frame_rate.fps();
        let gop = if param.gop_ref_dist != 0 {
            param.gop_ref_dist as u32
        } else {
            2 * fps
        };
        Ok(EncodeConfig {
            codec_id: param.codec_id,
            fourcc,
            full_range: param.codec_id == CodecId::Mjpeg,
            width: info.width,
            height: info.height,
            frame_rate: info.frame_rate,
            bitrate_kbps: param.target_kbps,
            gop_size: gop,
            rate_control: param.rate_control,
            shift: info.shift,
        })
    }

    /// Validate the parameter set and open the codec backend.
    pub fn init(&mut self, param: &VideoParam) -> VplResult<()> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        match param.codec_id {
            CodecId::Avc | CodecId::Hevc | CodecId::Mjpeg => {}
            CodecId::Av1 => return Err(VplError::Unsupported), // reserved
            CodecId::Mpeg2 => return Err(VplError::InvalidVideoParam),
        }
        check_frame_info(&param.frame_info)?;
        if param.io_pattern.contains(IoPattern::IN_VIDEO_MEMORY)
            || param.io_pattern.contains(IoPattern::OUT_VIDEO_MEMORY)
        {
            return Err(VplError::InvalidVideoParam);
        }

        let config = Self::backend_config(param)?;
        self.backend = Some(backend::new_encoder(&config)?);

        let mut stored = *param;
        stored.gop_ref_dist = config.gop_size as u16;
        self.param = Some(stored);
        self.pending = None;
        self.state = State::Initialized;
        Ok(())
    }

    pub fn reset(&mut self, param: &VideoParam) -> VplResult<()> {
        if self.state != State::Initialized {
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
        self.pending = None;
        Ok(())
    }

    pub fn get_video_param(&self) -> VplResult<VideoParam> {
        self.param.ok_or(VplError::NotInitialized)
    }

    pub fn query(&self, par: Option<&VideoParam>) -> VplResult<(VideoParam, Option<Warning>)> {
        match par {
            None => {
                let mut out = VideoParam::new(
                    CodecId::Hevc,
                    crate::param::FrameInfo::new(FourCc::I420, u16::MAX, u16::MAX),
                );
                out.async_depth = 16;
                out.target_kbps = u32::MAX;
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

    pub fn query_io_surf(&self, par: &VideoParam) -> VplResult<FrameAllocRequest> {
        Ok(FrameAllocRequest {
            info: par.frame_info,
            num_min: 1,
            num_suggested: par.async_depth.max(1),
            mem_type: MemType::FROM_ENCODE | MemType::EXTERNAL_FRAME | MemType::SYSTEM_MEMORY,
        })
    }

    /// The encoder-owned pool backing `get_surface_for_encode`.
    pub(crate) fn surface_pool(&mut self) -> VplResult<Arc<FramePool>> {
        if self.state != State::Initialized {
            return Err(VplError::NotInitialized);
        }
        if self.pool.is_none() {
            let info = self
                .param
                .as_ref()
                .ok_or(VplError::NotInitialized)?
                .frame_info;
            self.pool = Some(FramePool::with_shape(info.fourcc, info.width, info.height, 0));
        }
        Ok(self.pool.as_ref().unwrap().clone())
    }

    /// Submit a frame (`None` drains) and try to pull one compressed packet
    /// into `bs`.
    pub fn encode_frame_async(
        &mut self,
        surface: Option<&Arc<Surface>>,
        bs: &mut Bitstream,
    ) -> VplResult<EncodeOutcome> {
        if self.state != State::Initialized {
            return Err(VplError::NotInitialized);
        }
        let backend = self.backend.as_mut().ok_or(VplError::NotInitialized)?;

        if self.pending.is_none() {
            match surface {
                Some(surface) => {
                    let image = surface.snapshot_image()?;
                    if let Err(e) = backend.send_frame(Some(&image)) {
                        log::error!("encode: backend rejected frame: {e}");
                        return Err(VplError::Unknown);
                    }
                }
                None => {
                    backend.send_frame(None).map_err(|_| VplError::Unknown)?;
                }
            }
        }

        let packet = match self.pending.take() {
            Some(p) => Some(p),
            None => backend.receive_packet().map_err(|e| {
                log::error!("encode: backend receive failed: {e}");
                VplError::UndefinedBehavior
            })?,
        };

        let packet = match packet {
            Some(p) => p,
            None => return Ok(EncodeOutcome::MoreData),
        };

        if packet.data.len() > bs.spare() {
            // keep the packet for a retry with a larger buffer
            self.pending = Some(packet);
            return Err(VplError::NotEnoughBuffer);
        }
        bs.time_stamp = packet.pts;
        bs.append(&packet.data)?;

        let sync = SyncPoint::completed(Status::Ok);
        if let Some(surface) = surface {
            surface.set_sync(sync.clone());
        }
        Ok(EncodeOutcome::Packet { sync })
    }
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder::new()
    }
}
