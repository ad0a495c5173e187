//! Frame-to-frame transform pipeline (scale, crop, color conversion).
//!
//! Initialization derives a small chain of geometric primitives from the
//! input and output frame descriptions; the sink always carries an explicit
//! format pin, so whenever cropping is involved a color conversion is forced
//! even between identical formats.

mod filters;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::image::Image;
use crate::param::{
    check_frame_info, FrameAllocRequest, FrameDataFlags, FrameInfo, FrameRate, IoPattern, MemType,
    Rect, VppParam,
};
use crate::pool::FramePool;
use crate::status::{Status, VplError, VplResult};
use crate::surface::Surface;
use crate::sync::SyncPoint;

use filters::{Composite, CropScale, Filter, Scale};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninit,
    Initialized,
    Closed,
}

/// One stage of the derived filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Primitive {
    ColorConvert,
    Scale { w: u16, h: u16 },
    CropScale { src: Rect, dst_w: u16, dst_h: u16 },
    Composite { src: Rect, dst: Rect, dst_w: u16, dst_h: u16 },
    Null,
}

/// Derive the primitive composition for a (source, destination) pair.
pub(crate) fn derive_chain(src: &FrameInfo, dst: &FrameInfo) -> Vec<Primitive> {
    let mut csc = src.fourcc != dst.fourcc;

    let mut crop = src.crop.x != 0 || src.crop.y != 0 || dst.crop.x != 0 || dst.crop.y != 0;
    if !crop
        && (src.crop.w != src.width
            || src.crop.h != src.height
            || dst.crop.w != dst.width
            || dst.crop.h != dst.height)
    {
        crop = true;
    }
    let scale = !crop && (src.width != dst.width || src.height != dst.height);

    let mut chain = Vec::new();
    if crop {
        // the sink needs an explicit format pin once cropping is in play
        csc = true;
        if dst.crop.w == dst.width && dst.crop.h == dst.height {
            chain.push(Primitive::CropScale {
                src: src.crop,
                dst_w: dst.crop.w,
                dst_h: dst.crop.h,
            });
        } else {
            chain.push(Primitive::Composite {
                src: src.crop,
                dst: dst.crop,
                dst_w: dst.width,
                dst_h: dst.height,
            });
        }
    } else if scale {
        chain.push(Primitive::Scale {
            w: dst.width,
            h: dst.height,
        });
    }
    if csc {
        chain.push(Primitive::ColorConvert);
    }
    if chain.is_empty() {
        chain.push(Primitive::Null);
    }
    chain
}

/// Executable form of the chain: geometric filters feeding a format-pinned
/// sink with push/pull semantics.
struct FilterGraph {
    stages: Vec<Box<dyn Filter>>,
    dst_info: FrameInfo,
    queue: VecDeque<Image>,
}

impl FilterGraph {
    fn build(chain: &[Primitive], dst_info: FrameInfo) -> FilterGraph {
        let mut stages: Vec<Box<dyn Filter>> = Vec::new();
        for primitive in chain {
            match *primitive {
                Primitive::Scale { w, h } => stages.push(Box::new(Scale { dst_w: w, dst_h: h })),
                Primitive::CropScale { src, dst_w, dst_h } => {
                    stages.push(Box::new(CropScale { src, dst_w, dst_h }))
                }
                Primitive::Composite {
                    src,
                    dst,
                    dst_w,
                    dst_h,
                } => stages.push(Box::new(Composite {
                    src,
                    dst,
                    dst_w,
                    dst_h,
                })),
                // conversion happens in the sink pack, identity needs nothing
                Primitive::ColorConvert | Primitive::Null => {}
            }
        }
        FilterGraph {
            stages,
            dst_info,
            queue: VecDeque::new(),
        }
    }

    fn push(&mut self, image: &Image) {
        let mut canvas = filters::unpack(image);
        for stage in &self.stages {
            canvas = stage.apply(canvas);
        }
        let mut out = filters::pack(&canvas, self.dst_info.fourcc);
        out.pts = image.pts;
        self.queue.push_back(out);
    }

    fn pull(&mut self) -> Option<Image> {
        self.queue.pop_front()
    }
}

/// Result of one `run_frame_async` submit.
#[derive(Debug)]
pub enum VppOutcome {
    Frame { sync: SyncPoint },
    /// The sink is empty (or drained); push more input.
    MoreData,
}

pub struct Vpp {
    state: State,
    param: Option<VppParam>,
    graph: Option<FilterGraph>,
    pool: Option<Arc<FramePool>>,
}

impl Vpp {
    pub fn new() -> Vpp {
        Vpp {
            state: State::Uninit,
            param: None,
            graph: None,
            pool: None,
        }
    }

    /// Validate the parameter set and build the filter chain.
    pub fn init(&mut self, param: &VppParam) -> VplResult<()> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        if param.io_pattern.is_empty() {
            return Err(VplError::InvalidVideoParam);
        }
        if !param.io_pattern.contains(IoPattern::IN_SYSTEM_MEMORY)
            || !param.io_pattern.contains(IoPattern::OUT_SYSTEM_MEMORY)
        {
            return Err(VplError::InvalidVideoParam);
        }
        if param
            .io_pattern
            .intersects(IoPattern::IN_VIDEO_MEMORY | IoPattern::OUT_VIDEO_MEMORY)
        {
            return Err(VplError::InvalidVideoParam);
        }
        if param.async_depth > 16 {
            return Err(VplError::InvalidVideoParam);
        }
        if param.protected != 0 || param.num_ext_params != 0 || param.num_threads != 0 {
            return Err(VplError::InvalidVideoParam);
        }
        check_frame_info(&param.in_info)?;
        check_frame_info(&param.out_info)?;

        let chain = derive_chain(&param.in_info, &param.out_info);
        self.graph = Some(FilterGraph::build(&chain, param.out_info));
        self.param = Some(*param);
        self.state = State::Initialized;
        Ok(())
    }

    pub fn reset(&mut self, param: &VppParam) -> VplResult<()> {
        if self.state != State::Initialized {
            return Err(VplError::NotInitialized);
        }
        self.init(param)
    }

    pub fn close(&mut self) -> VplResult<()> {
        if self.state == State::Closed {
            return Err(VplError::NotInitialized);
        }
        self.state = State::Closed;
        self.graph = None;
        self.pool = None;
        Ok(())
    }

    pub fn get_video_param(&self) -> VplResult<VppParam> {
        self.param.ok_or(VplError::NotInitialized)
    }

    /// Produce the widest supported template (`par == None`) or a sanitized
    /// copy of `par`.
    pub fn query(&self, par: Option<&VppParam>) -> VplResult<VppParam> {
        match par {
            None => {
                let mut info = FrameInfo::new(crate::param::FourCc::I420, u16::MAX, u16::MAX);
                info.crop = Rect::new(0, 0, u16::MAX, u16::MAX);
                info.frame_rate = FrameRate::new(u32::MAX, u32::MAX);
                let mut out = VppParam::new(info, info);
                out.io_pattern = IoPattern::all();
                Ok(out)
            }
            Some(par) => {
                if par.protected != 0 {
                    return Err(VplError::InvalidVideoParam);
                }
                let mut out = *par;
                if out.out_info.width == 0 {
                    out.out_info.width = out.in_info.width;
                }
                if out.out_info.height == 0 {
                    out.out_info.height = out.in_info.height;
                }
                out.io_pattern = IoPattern::IN_SYSTEM_MEMORY | IoPattern::OUT_SYSTEM_MEMORY;
                Ok(out)
            }
        }
    }

    /// Surface counts for both sides; index 0 is input, index 1 is output.
    pub fn query_io_surf(&self, par: Option<&VppParam>) -> VplResult<[FrameAllocRequest; 2]> {
        let (in_info, out_info) = match par {
            Some(par) => {
                if par
                    .io_pattern
                    .intersects(IoPattern::IN_VIDEO_MEMORY | IoPattern::OUT_VIDEO_MEMORY)
                {
                    return Err(VplError::InvalidVideoParam);
                }
                if !par.io_pattern.contains(IoPattern::IN_SYSTEM_MEMORY)
                    || !par.io_pattern.contains(IoPattern::OUT_SYSTEM_MEMORY)
                {
                    return Err(VplError::InvalidVideoParam);
                }
                (par.in_info, par.out_info)
            }
            None => (FrameInfo::default(), FrameInfo::default()),
        };
        Ok([
            FrameAllocRequest {
                info: in_info,
                num_min: 1,
                num_suggested: 1,
                mem_type: MemType::FROM_VPPIN | MemType::EXTERNAL_FRAME | MemType::SYSTEM_MEMORY,
            },
            FrameAllocRequest {
                info: out_info,
                num_min: 1,
                num_suggested: 1,
                mem_type: MemType::FROM_VPPOUT | MemType::EXTERNAL_FRAME | MemType::SYSTEM_MEMORY,
            },
        ])
    }

    /// The pipeline-owned pool backing `get_surface_for_vpp`.
    pub(crate) fn surface_pool(&mut self) -> VplResult<Arc<FramePool>> {
        if self.state != State::Initialized {
            return Err(VplError::NotInitialized);
        }
        if self.pool.is_none() {
            let info = self.param.as_ref().ok_or(VplError::NotInitialized)?.in_info;
            let suggested = self.query_io_surf(None)?[0].num_suggested as usize;
            self.pool = Some(FramePool::with_shape(
                info.fourcc,
                info.width,
                info.height,
                suggested,
            ));
        }
        Ok(self.pool.as_ref().unwrap().clone())
    }

    /// Push `input` (if any) through the filter chain and try to pull a
    /// transformed frame into `output`.
    pub fn run_frame_async(
        &mut self,
        input: Option<&Arc<Surface>>,
        output: &Arc<Surface>,
    ) -> VplResult<VppOutcome> {
        if self.state != State::Initialized {
            return Err(VplError::NotInitialized);
        }
        let graph = self.graph.as_mut().ok_or(VplError::NotInitialized)?;

        let mut in_timestamp = None;
        if let Some(input) = input {
            let image = input.snapshot_image()?;
            if image.pts != 0 {
                in_timestamp = Some(image.pts);
            }
            graph.push(&image);
        }

        let image = match graph.pull() {
            Some(image) => image,
            None => return Ok(VppOutcome::MoreData),
        };
        output.copy_image_into(&image)?;

        if let Some(ts) = in_timestamp {
            let mut data = output.data_mut();
            data.timestamp = ts;
            data.flags |= FrameDataFlags::ORIGINAL_TIMESTAMP;
        }

        let sync = SyncPoint::completed(Status::Ok);
        output.set_sync(sync.clone());
        Ok(VppOutcome::Frame { sync })
    }
}

impl Default for Vpp {
    fn default() -> Vpp {
        Vpp::new()
    }
}
