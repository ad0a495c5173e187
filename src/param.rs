//! Parameter and format types shared by every pipeline.
//!
//! The geometry helpers on [`FourCc`] are the single source of truth for how
//! planes are laid out in memory; surfaces, the transform filters and the
//! codec backends all derive their sizes from here.

use crate::status::{VplError, VplResult};

const fn make_fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// Pitch alignment used for pool-allocated surfaces.
pub const PITCH_ALIGN: usize = 16;

/// Pixel formats supported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FourCc {
    I420,
    I010,
    Nv12,
    P010,
    Yuy2,
    Nv16,
    P210,
    Rgb4,
}

/// How the samples of a format are arranged in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneLayout {
    /// Separate Y, U and V planes.
    Planar3,
    /// Y plane plus one interleaved UV plane.
    SemiPlanar,
    /// Single plane, all components interleaved per pixel.
    Packed,
}

impl FourCc {
    pub fn as_u32(self) -> u32 {
        match self {
            FourCc::I420 => make_fourcc(b'I', b'4', b'2', b'0'),
            FourCc::I010 => make_fourcc(b'I', b'0', b'1', b'0'),
            FourCc::Nv12 => make_fourcc(b'N', b'V', b'1', b'2'),
            FourCc::P010 => make_fourcc(b'P', b'0', b'1', b'0'),
            FourCc::Yuy2 => make_fourcc(b'Y', b'U', b'Y', b'2'),
            FourCc::Nv16 => make_fourcc(b'N', b'V', b'1', b'6'),
            FourCc::P210 => make_fourcc(b'P', b'2', b'1', b'0'),
            FourCc::Rgb4 => make_fourcc(b'R', b'G', b'B', b'4'),
        }
    }

    pub fn from_u32(code: u32) -> Option<FourCc> {
        let all = [
            FourCc::I420,
            FourCc::I010,
            FourCc::Nv12,
            FourCc::P010,
            FourCc::Yuy2,
            FourCc::Nv16,
            FourCc::P210,
            FourCc::Rgb4,
        ];
        all.into_iter().find(|f| f.as_u32() == code)
    }

    pub fn layout(self) -> PlaneLayout {
        match self {
            FourCc::I420 | FourCc::I010 => PlaneLayout::Planar3,
            FourCc::Nv12 | FourCc::P010 | FourCc::Nv16 | FourCc::P210 => PlaneLayout::SemiPlanar,
            FourCc::Yuy2 | FourCc::Rgb4 => PlaneLayout::Packed,
        }
    }

    pub fn bit_depth(self) -> u8 {
        match self {
            FourCc::I010 | FourCc::P010 | FourCc::P210 => 10,
            _ => 8,
        }
    }

    /// Bytes per luma sample (2 for the 10-bit formats, which store samples
    /// in 16-bit words).
    pub fn bytes_per_sample(self) -> usize {
        if self.bit_depth() > 8 {
            2
        } else {
            1
        }
    }

    /// Chroma subsampling as (horizontal shift, vertical shift).
    pub fn chroma_shift(self) -> (u32, u32) {
        match self {
            FourCc::I420 | FourCc::I010 | FourCc::Nv12 | FourCc::P010 => (1, 1),
            FourCc::Yuy2 | FourCc::Nv16 | FourCc::P210 => (1, 0),
            FourCc::Rgb4 => (0, 0),
        }
    }

    pub fn plane_count(self) -> usize {
        match self.layout() {
            PlaneLayout::Planar3 => 3,
            PlaneLayout::SemiPlanar => 2,
            PlaneLayout::Packed => 1,
        }
    }

    /// Bytes per pixel for packed layouts.
    fn packed_bytes_per_pixel(self) -> usize {
        match self {
            FourCc::Yuy2 => 2,
            FourCc::Rgb4 => 4,
            _ => 0,
        }
    }

    /// Minimum pitch (bytes per luma row) for a given width.
    pub fn min_pitch(self, width: u16) -> usize {
        let w = width as usize;
        match self.layout() {
            PlaneLayout::Packed => w * self.packed_bytes_per_pixel(),
            _ => w * self.bytes_per_sample(),
        }
    }

    /// Pitch aligned the way pool allocations align it.
    pub fn aligned_pitch(self, width: u16) -> usize {
        (self.min_pitch(width) + PITCH_ALIGN - 1) / PITCH_ALIGN * PITCH_ALIGN
    }

    /// Row bytes and row count of plane `idx` for a tightly packed image of
    /// the given dimensions.
    pub fn plane_dims(self, idx: usize, width: u16, height: u16) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        let (hs, vs) = self.chroma_shift();
        let bps = self.bytes_per_sample();
        match self.layout() {
            PlaneLayout::Packed => (w * self.packed_bytes_per_pixel(), h),
            PlaneLayout::Planar3 => {
                if idx == 0 {
                    (w * bps, h)
                } else {
                    ((w >> hs) * bps, h >> vs)
                }
            }
            PlaneLayout::SemiPlanar => {
                if idx == 0 {
                    (w * bps, h)
                } else {
                    // interleaved U/V pairs span the full luma width
                    (w * bps, h >> vs)
                }
            }
        }
    }

    /// Pitch of plane `idx` given the luma pitch of the surface.
    pub fn plane_pitch(self, idx: usize, luma_pitch: usize) -> usize {
        match self.layout() {
            PlaneLayout::Planar3 if idx > 0 => luma_pitch >> self.chroma_shift().0,
            _ => luma_pitch,
        }
    }
}

/// Compressed-stream codecs known to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Avc,
    Hevc,
    Mjpeg,
    Mpeg2,
    Av1,
}

impl CodecId {
    pub fn as_u32(self) -> u32 {
        match self {
            CodecId::Avc => make_fourcc(b'A', b'V', b'C', b' '),
            CodecId::Hevc => make_fourcc(b'H', b'E', b'V', b'C'),
            CodecId::Mjpeg => make_fourcc(b'M', b'J', b'P', b'G'),
            CodecId::Mpeg2 => make_fourcc(b'M', b'P', b'G', b'2'),
            CodecId::Av1 => make_fourcc(b'A', b'V', b'1', b' '),
        }
    }

    pub fn from_u32(code: u32) -> Option<CodecId> {
        let all = [
            CodecId::Avc,
            CodecId::Hevc,
            CodecId::Mjpeg,
            CodecId::Mpeg2,
            CodecId::Av1,
        ];
        all.into_iter().find(|c| c.as_u32() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateControl {
    #[default]
    Vbr,
    Cbr,
    Cqp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PicStruct {
    #[default]
    Progressive,
    FieldTff,
    FieldBff,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> FrameRate {
        FrameRate { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// Frames per second rounded to the nearest integer, used for GOP
    /// defaulting.
    pub fn fps(&self) -> u32 {
        if self.den == 0 {
            0
        } else {
            (self.num + self.den / 2) / self.den
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, w: u16, h: u16) -> Rect {
        Rect { x, y, w, h }
    }

    pub fn full(w: u16, h: u16) -> Rect {
        Rect { x: 0, y: 0, w, h }
    }
}

bitflags::bitflags! {
    /// Which side of a pipeline uses system vs. video memory.
    pub struct IoPattern: u16 {
        const IN_VIDEO_MEMORY  = 0x01;
        const IN_SYSTEM_MEMORY = 0x02;
        const OUT_VIDEO_MEMORY = 0x10;
        const OUT_SYSTEM_MEMORY = 0x20;
    }
}

bitflags::bitflags! {
    /// Access flags for mapping a surface.
    pub struct MapFlags: u32 {
        const READ  = 0x1;
        const WRITE = 0x2;
        const READ_WRITE = 0x3;
    }
}

bitflags::bitflags! {
    /// Flags attached to the payload of a surface.
    pub struct FrameDataFlags: u16 {
        const ORIGINAL_TIMESTAMP = 0x1;
    }
}

bitflags::bitflags! {
    /// Memory type descriptors reported by `query_io_surf`.
    pub struct MemType: u16 {
        const SYSTEM_MEMORY  = 0x0001;
        const EXTERNAL_FRAME = 0x0002;
        const FROM_DECODE    = 0x0010;
        const FROM_ENCODE    = 0x0020;
        const FROM_VPPIN     = 0x0040;
        const FROM_VPPOUT    = 0x0080;
    }
}

/// Immutable description of one frame: format, allocation dimensions, crop,
/// rate and structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub fourcc: FourCc,
    pub width: u16,
    pub height: u16,
    pub crop: Rect,
    pub frame_rate: FrameRate,
    pub pic_struct: PicStruct,
    /// Set when 10-bit samples are stored in the high bits of their 16-bit
    /// words.
    pub shift: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
}

impl FrameInfo {
    pub fn new(fourcc: FourCc, width: u16, height: u16) -> FrameInfo {
        FrameInfo {
            fourcc,
            width,
            height,
            crop: Rect::full(width, height),
            frame_rate: FrameRate::new(30, 1),
            pic_struct: PicStruct::Progressive,
            shift: if fourcc == FourCc::P010 || fourcc == FourCc::P210 {
                1
            } else {
                0
            },
            bit_depth_luma: fourcc.bit_depth(),
            bit_depth_chroma: fourcc.bit_depth(),
        }
    }
}

impl Default for FrameInfo {
    fn default() -> FrameInfo {
        FrameInfo::new(FourCc::I420, 0, 0)
    }
}

/// Parameter set for the decoder and encoder pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParam {
    pub codec_id: CodecId,
    pub frame_info: FrameInfo,
    pub target_kbps: u32,
    pub rate_control: RateControl,
    pub gop_ref_dist: u16,
    pub io_pattern: IoPattern,
    pub async_depth: u16,
    pub protected: u16,
    pub num_threads: u16,
    pub num_ext_params: u16,
}

impl VideoParam {
    pub fn new(codec_id: CodecId, frame_info: FrameInfo) -> VideoParam {
        VideoParam {
            codec_id,
            frame_info,
            target_kbps: 0,
            rate_control: RateControl::default(),
            gop_ref_dist: 0,
            io_pattern: IoPattern::IN_SYSTEM_MEMORY | IoPattern::OUT_SYSTEM_MEMORY,
            async_depth: 1,
            protected: 0,
            num_threads: 0,
            num_ext_params: 0,
        }
    }
}

/// Parameter set for the transform pipeline: one frame description per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VppParam {
    pub in_info: FrameInfo,
    pub out_info: FrameInfo,
    pub io_pattern: IoPattern,
    pub async_depth: u16,
    pub protected: u16,
    pub num_threads: u16,
    pub num_ext_params: u16,
}

impl VppParam {
    pub fn new(in_info: FrameInfo, out_info: FrameInfo) -> VppParam {
        VppParam {
            in_info,
            out_info,
            io_pattern: IoPattern::IN_SYSTEM_MEMORY | IoPattern::OUT_SYSTEM_MEMORY,
            async_depth: 1,
            protected: 0,
            num_threads: 0,
            num_ext_params: 0,
        }
    }
}

/// Surface counts and memory types a pipeline asks the application to
/// allocate.
#[derive(Debug, Clone, Copy)]
pub struct FrameAllocRequest {
    pub info: FrameInfo,
    pub num_min: u16,
    pub num_suggested: u16,
    pub mem_type: MemType,
}

/// Two-part API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16) -> Version {
        Version { major, minor }
    }
}

/// Implementation selector passed to session initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImplType {
    #[default]
    Auto,
    AutoAny,
    Software,
    Hardware,
}

impl ImplType {
    pub fn as_u32(self) -> u32 {
        match self {
            ImplType::Auto => 0,
            ImplType::AutoAny => 1,
            ImplType::Software => 2,
            ImplType::Hardware => 3,
        }
    }

    pub fn from_u32(v: u32) -> Option<ImplType> {
        match v {
            0 => Some(ImplType::Auto),
            1 => Some(ImplType::AutoAny),
            2 => Some(ImplType::Software),
            3 => Some(ImplType::Hardware),
            _ => None,
        }
    }
}

/// Device handle categories a session can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    VaDisplay,
    D3d9DeviceManager,
    D3d11Device,
    CmDevice,
}

/// Frame-info domain check shared by the pipelines.
///
/// Validates format, dimensions and frame rate; P010 requires the shift flag
/// per the 10-bit storage contract.
pub fn check_frame_info(info: &FrameInfo) -> VplResult<()> {
    if info.fourcc == FourCc::P010 && info.shift == 0 {
        return Err(VplError::InvalidVideoParam);
    }
    if info.width == 0 || info.height == 0 {
        return Err(VplError::InvalidVideoParam);
    }
    if !info.frame_rate.is_valid() {
        return Err(VplError::InvalidVideoParam);
    }
    Ok(())
}
