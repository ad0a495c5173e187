//! Seam to the underlying compressed-video library.
//!
//! The pipelines talk to the codec through these traits: packets go in,
//! pictures come out (and the reverse for encoding). Backend-internal
//! failures are `anyhow` errors; the pipelines translate them into the
//! status taxonomy at the boundary (send side becomes `Unknown`, receive
//! side becomes `UndefinedBehavior`).

pub mod raw;

use crate::image::Image;
use crate::param::{CodecId, FourCc, FrameInfo, FrameRate, RateControl};
use crate::status::{VplError, VplResult};

/// One unit of compressed data.
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: u64,
}

/// Stream parameters carried by a sequence header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub codec_id: CodecId,
    pub fourcc: FourCc,
    pub width: u16,
    pub height: u16,
    pub frame_rate: FrameRate,
    pub shift: u8,
    pub full_range: bool,
}

impl StreamInfo {
    pub fn to_frame_info(&self) -> FrameInfo {
        let mut info = FrameInfo::new(self.fourcc, self.width, self.height);
        info.frame_rate = self.frame_rate;
        info.shift = self.shift;
        info
    }
}

/// Result of pulling one picture out of a decoder backend.
#[derive(Debug)]
pub enum Received {
    Frame(Image),
    /// Nothing available yet; feed more input.
    Again,
    /// Drain finished, the stream is exhausted.
    Eos,
}

/// Outcome of probing leading bytes for a sequence header.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Not enough bytes to locate or complete a header.
    NeedData,
    /// A header was found; `start..end` is its byte range in the probed
    /// slice.
    Header {
        start: usize,
        end: usize,
        info: StreamInfo,
    },
}

pub trait DecoderBackend: Send {
    /// Prime the backend with out-of-band stream parameters; the sequence
    /// header bytes may already have been consumed by a header parse.
    fn prime(&mut self, info: StreamInfo);

    /// Split the elementary stream into packets. Returns the number of bytes
    /// consumed and a complete packet when one was assembled. Consuming
    /// bytes without producing a packet (skipping garbage) is legal.
    fn parse(&mut self, data: &[u8]) -> (usize, Option<Packet>);

    /// Submit a packet; `None` starts draining.
    fn send_packet(&mut self, packet: Option<Packet>) -> anyhow::Result<()>;

    fn receive_frame(&mut self) -> anyhow::Result<Received>;

    /// Parameters of the stream as last seen, once known.
    fn stream_info(&self) -> Option<StreamInfo>;

    /// True once when an in-band sequence header changed the stream
    /// parameters; reading clears the flag.
    fn take_param_change(&mut self) -> bool;
}

pub trait EncoderBackend: Send {
    /// Submit a raw picture; `None` drains the encoder.
    fn send_frame(&mut self, frame: Option<&Image>) -> anyhow::Result<()>;

    /// Pull one compressed packet, or `None` when nothing is available.
    fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>>;
}

/// Everything an encoder backend needs to open.
#[derive(Debug, Clone, Copy)]
pub struct EncodeConfig {
    pub codec_id: CodecId,
    pub fourcc: FourCc,
    pub full_range: bool,
    pub width: u16,
    pub height: u16,
    pub frame_rate: FrameRate,
    pub bitrate_kbps: u32,
    pub gop_size: u32,
    pub rate_control: RateControl,
    pub shift: u8,
}

/// Decoder codecs the runtime accepts.
pub const DECODE_CODECS: &[CodecId] = &[
    CodecId::Avc,
    CodecId::Hevc,
    CodecId::Mjpeg,
    CodecId::Mpeg2,
    CodecId::Av1,
];

/// Encoder codecs the runtime accepts (AV1 is reserved).
pub const ENCODE_CODECS: &[CodecId] = &[CodecId::Avc, CodecId::Hevc, CodecId::Mjpeg];

/// Open a decoder backend for the given codec.
pub fn new_decoder(codec_id: CodecId) -> VplResult<Box<dyn DecoderBackend>> {
    if !DECODE_CODECS.contains(&codec_id) {
        return Err(VplError::InvalidVideoParam);
    }
    Ok(Box::new(raw::RawDecoder::new(codec_id)))
}

/// Open an encoder backend for the given configuration.
pub fn new_encoder(config: &EncodeConfig) -> VplResult<Box<dyn EncoderBackend>> {
    if !ENCODE_CODECS.contains(&config.codec_id) {
        return Err(VplError::InvalidVideoParam);
    }
    Ok(Box::new(raw::RawEncoder::new(*config)))
}

/// Probe leading bytes for a sequence header without opening a backend.
pub fn probe_header(data: &[u8]) -> ProbeOutcome {
    raw::probe(data)
}
