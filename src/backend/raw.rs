//! Built-in elementary-stream codec.
//!
//! A deterministic stand-in for the external compressed-video library: the
//! stream is a magic-framed sequence header followed by magic-framed frame
//! packets carrying tightly packed planes. It exists so the runtime, the
//! demos and the tests exercise real parser back-pressure, drain and
//! mid-stream parameter changes without a native codec.
//!
//! Layout, little endian:
//!
//! ```text
//! sequence header:  "VPLS" codec:u32 fourcc:u32 w:u16 h:u16
//!                   fr_num:u32 fr_den:u32 shift:u8 flags:u8 pad:u16
//! frame packet:     "VPLF" payload_len:u32 pts:u64 payload...
//! ```

use std::collections::VecDeque;

use anyhow::{bail, Context};

use crate::backend::{
    DecoderBackend, EncodeConfig, EncoderBackend, Packet, ProbeOutcome, Received, StreamInfo,
};
use crate::image::Image;
use crate::param::{CodecId, FourCc, FrameRate};

const SEQ_MAGIC: &[u8; 4] = b"VPLS";
const FRAME_MAGIC: &[u8; 4] = b"VPLF";
pub(crate) const SEQ_HEADER_LEN: usize = 28;
const FRAME_HEADER_LEN: usize = 16;
const FLAG_FULL_RANGE: u8 = 0x01;

fn read_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

fn read_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

fn read_u64(data: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[off..off + 8]);
    u64::from_le_bytes(bytes)
}

/// Serialize a sequence header.
pub fn write_sequence_header(info: &StreamInfo, out: &mut Vec<u8>) {
    out.extend_from_slice(SEQ_MAGIC);
    out.extend_from_slice(&info.codec_id.as_u32().to_le_bytes());
    out.extend_from_slice(&info.fourcc.as_u32().to_le_bytes());
    out.extend_from_slice(&info.width.to_le_bytes());
    out.extend_from_slice(&info.height.to_le_bytes());
    out.extend_from_slice(&info.frame_rate.num.to_le_bytes());
    out.extend_from_slice(&info.frame_rate.den.to_le_bytes());
    out.push(info.shift);
    out.push(if info.full_range { FLAG_FULL_RANGE } else { 0 });
    out.extend_from_slice(&[0u8; 2]);
}

/// Parse a complete sequence header unit (starting at the magic).
pub fn parse_sequence_header(data: &[u8]) -> anyhow::Result<StreamInfo> {
    if data.len() < SEQ_HEADER_LEN || &data[0..4] != SEQ_MAGIC {
        bail!("truncated sequence header");
    }
    let codec_id =
        CodecId::from_u32(read_u32(data, 4)).context("unknown codec id in sequence header")?;
    let fourcc =
        FourCc::from_u32(read_u32(data, 8)).context("unknown pixel format in sequence header")?;
    Ok(StreamInfo {
        codec_id,
        fourcc,
        width: read_u16(data, 12),
        height: read_u16(data, 14),
        frame_rate: FrameRate::new(read_u32(data, 16), read_u32(data, 20)),
        shift: data[24],
        full_range: data[25] & FLAG_FULL_RANGE != 0,
    })
}

fn find_magic(data: &[u8]) -> Option<(usize, bool)> {
    // returns position and whether it is a sequence header
    for i in 0..data.len().saturating_sub(3) {
        if &data[i..i + 4] == SEQ_MAGIC {
            return Some((i, true));
        }
        if &data[i..i + 4] == FRAME_MAGIC {
            return Some((i, false));
        }
    }
    None
}

/// Locate and parse a sequence header anywhere in `data`.
pub(crate) fn probe(data: &[u8]) -> ProbeOutcome {
    let mut at = 0;
    while let Some((pos, is_seq)) = find_magic(&data[at..]) {
        let start = at + pos;
        if is_seq {
            if data.len() - start < SEQ_HEADER_LEN {
                return ProbeOutcome::NeedData;
            }
            match parse_sequence_header(&data[start..]) {
                Ok(info) => {
                    return ProbeOutcome::Header {
                        start,
                        end: start + SEQ_HEADER_LEN,
                        info,
                    }
                }
                Err(_) => {
                    at = start + 4;
                    continue;
                }
            }
        }
        at = start + 4;
    }
    ProbeOutcome::NeedData
}

pub struct RawDecoder {
    codec_id: CodecId,
    info: Option<StreamInfo>,
    queue: VecDeque<Image>,
    draining: bool,
    param_changed: bool,
}

impl RawDecoder {
    pub fn new(codec_id: CodecId) -> RawDecoder {
        RawDecoder {
            codec_id,
            info: None,
            queue: VecDeque::new(),
            draining: false,
            param_changed: false,
        }
    }
}

impl DecoderBackend for RawDecoder {
    fn prime(&mut self, info: StreamInfo) {
        self.info = Some(info);
    }

    fn parse(&mut self, data: &[u8]) -> (usize, Option<Packet>) {
        match find_magic(data) {
            None => {
                // keep a potential partial magic at the tail
                (data.len().saturating_sub(3), None)
            }
            Some((pos, _)) if pos > 0 => (pos, None),
            Some((_, true)) => {
                if data.len() < SEQ_HEADER_LEN {
                    return (0, None);
                }
                (
                    SEQ_HEADER_LEN,
                    Some(Packet {
                        data: data[..SEQ_HEADER_LEN].to_vec(),
                        pts: 0,
                    }),
                )
            }
            Some((_, false)) => {
                if data.len() < FRAME_HEADER_LEN {
                    return (0, None);
                }
                let payload_len = read_u32(data, 4) as usize;
                let total = FRAME_HEADER_LEN + payload_len;
                if data.len() < total {
                    return (0, None);
                }
                (
                    total,
                    Some(Packet {
                        data: data[..total].to_vec(),
                        pts: read_u64(data, 8),
                    }),
                )
            }
        }
    }

    fn send_packet(&mut self, packet: Option<Packet>) -> anyhow::Result<()> {
        let packet = match packet {
            Some(p) => p,
            None => {
                self.draining = true;
                return Ok(());
            }
        };
        if packet.data.len() >= 4 && &packet.data[0..4] == SEQ_MAGIC {
            let info = parse_sequence_header(&packet.data)?;
            if info.codec_id != self.codec_id {
                bail!("sequence header codec does not match the opened decoder");
            }
            if let Some(prev) = self.info {
                if prev != info {
                    self.param_changed = true;
                }
            }
            self.info = Some(info);
            return Ok(());
        }
        if packet.data.len() >= FRAME_HEADER_LEN && &packet.data[0..4] == FRAME_MAGIC {
            let info = self.info.context("frame packet before sequence header")?;
            let payload = &packet.data[FRAME_HEADER_LEN..];
            let mut image = Image::from_packed(info.fourcc, info.width, info.height, payload)
                .map_err(|e| anyhow::anyhow!("bad frame payload: {e}"))?;
            image.pts = packet.pts;
            self.queue.push_back(image);
            return Ok(());
        }
        bail!("unrecognized packet");
    }

    fn receive_frame(&mut self) -> anyhow::Result<Received> {
        if let Some(image) = self.queue.pop_front() {
            return Ok(Received::Frame(image));
        }
        if self.draining {
            return Ok(Received::Eos);
        }
        Ok(Received::Again)
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    fn take_param_change(&mut self) -> bool {
        std::mem::take(&mut self.param_changed)
    }
}

pub struct RawEncoder {
    config: EncodeConfig,
    queue: VecDeque<Packet>,
    wrote_header: bool,
    draining: bool,
}

impl RawEncoder {
    pub fn new(config: EncodeConfig) -> RawEncoder {
        RawEncoder {
            config,
            queue: VecDeque::new(),
            wrote_header: false,
            draining: false,
        }
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            codec_id: self.config.codec_id,
            fourcc: self.config.fourcc,
            width: self.config.width,
            height: self.config.height,
            frame_rate: self.config.frame_rate,
            shift: self.config.shift,
            full_range: self.config.full_range,
        }
    }
}

impl EncoderBackend for RawEncoder {
    fn send_frame(&mut self, frame: Option<&Image>) -> anyhow::Result<()> {
        let frame = match frame {
            Some(f) => f,
            None => {
                self.draining = true;
                return Ok(());
            }
        };
        if frame.fourcc != self.config.fourcc
            || frame.width != self.config.width
            || frame.height != self.config.height
        {
            bail!(
                "frame {:?} {}x{} does not match encoder configuration",
                frame.fourcc,
                frame.width,
                frame.height
            );
        }

        let mut data = Vec::new();
        if !self.wrote_header {
            write_sequence_header(&self.stream_info(), &mut data);
            self.wrote_header = true;
        }

        let mut payload = Vec::with_capacity(Image::packed_len(
            frame.fourcc,
            frame.width,
            frame.height,
        ));
        frame.write_packed(&mut payload);

        data.extend_from_slice(FRAME_MAGIC);
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&frame.pts.to_le_bytes());
        data.extend_from_slice(&payload);

        self.queue.push_back(Packet {
            data,
            pts: frame.pts,
        });
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::RateControl;

    fn test_info() -> StreamInfo {
        StreamInfo {
            codec_id: CodecId::Hevc,
            fourcc: FourCc::I420,
            width: 96,
            height: 64,
            frame_rate: FrameRate::new(30, 1),
            shift: 0,
            full_range: false,
        }
    }

    fn test_config() -> EncodeConfig {
        EncodeConfig {
            codec_id: CodecId::Hevc,
            fourcc: FourCc::I420,
            full_range: false,
            width: 96,
            height: 64,
            frame_rate: FrameRate::new(30, 1),
            bitrate_kbps: 4000,
            gop_size: 60,
            rate_control: RateControl::Vbr,
            shift: 0,
        }
    }

    #[test]
    fn sequence_header_round_trips() {
        let info = test_info();
        let mut bytes = Vec::new();
        write_sequence_header(&info, &mut bytes);
        assert_eq!(bytes.len(), SEQ_HEADER_LEN);
        assert_eq!(parse_sequence_header(&bytes).unwrap(), info);
    }

    #[test]
    fn probe_skips_leading_garbage() {
        let mut bytes = vec![0xAA; 11];
        write_sequence_header(&test_info(), &mut bytes);
        match probe(&bytes) {
            ProbeOutcome::Header { start, end, info } => {
                assert_eq!(start, 11);
                assert_eq!(end, 11 + SEQ_HEADER_LEN);
                assert_eq!(info, test_info());
            }
            other => panic!("expected header, got {:?}", other),
        }
    }

    #[test]
    fn probe_reports_need_data_for_partial_header() {
        let mut bytes = Vec::new();
        write_sequence_header(&test_info(), &mut bytes);
        bytes.truncate(10);
        assert!(matches!(probe(&bytes), ProbeOutcome::NeedData));
    }

    #[test]
    fn parser_waits_for_complete_units() {
        let mut decoder = RawDecoder::new(CodecId::Hevc);

        let mut stream = Vec::new();
        write_sequence_header(&test_info(), &mut stream);
        let img = Image::alloc(FourCc::I420, 96, 64);
        let mut enc = RawEncoder::new(test_config());
        enc.send_frame(Some(&img)).unwrap();
        stream.extend_from_slice(&enc.receive_packet().unwrap().unwrap().data[SEQ_HEADER_LEN..]);

        // feed an incomplete header: no packet, nothing consumed
        let (consumed, pkt) = decoder.parse(&stream[..10]);
        assert_eq!(consumed, 0);
        assert!(pkt.is_none());

        // complete header parses as one unit
        let (consumed, pkt) = decoder.parse(&stream);
        assert_eq!(consumed, SEQ_HEADER_LEN);
        assert!(pkt.is_some());

        // partial frame holds back too
        let (consumed, pkt) = decoder.parse(&stream[SEQ_HEADER_LEN..SEQ_HEADER_LEN + 20]);
        assert_eq!(consumed, 0);
        assert!(pkt.is_none());

        let (consumed, pkt) = decoder.parse(&stream[SEQ_HEADER_LEN..]);
        assert_eq!(consumed, stream.len() - SEQ_HEADER_LEN);
        assert_eq!(pkt.unwrap().pts, 0);
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let mut enc = RawEncoder::new(test_config());
        let mut dec = RawDecoder::new(CodecId::Hevc);

        let mut frames = Vec::new();
        for i in 0..3u64 {
            let mut img = Image::alloc(FourCc::I420, 96, 64);
            img.planes[0].iter_mut().for_each(|b| *b = i as u8 + 10);
            img.pts = i * 33;
            frames.push(img.clone());
            enc.send_frame(Some(&img)).unwrap();
        }

        let mut stream = Vec::new();
        while let Some(pkt) = enc.receive_packet().unwrap() {
            stream.extend_from_slice(&pkt.data);
        }

        let mut rest = &stream[..];
        loop {
            let (consumed, pkt) = dec.parse(rest);
            if let Some(pkt) = pkt {
                dec.send_packet(Some(pkt)).unwrap();
            } else if consumed == 0 {
                break;
            }
            rest = &rest[consumed..];
        }
        dec.send_packet(None).unwrap();

        let mut decoded = Vec::new();
        loop {
            match dec.receive_frame().unwrap() {
                Received::Frame(f) => decoded.push(f),
                Received::Eos => break,
                Received::Again => panic!("unexpected again while draining"),
            }
        }
        assert_eq!(decoded.len(), 3);
        for (got, want) in decoded.iter().zip(frames.iter()) {
            assert_eq!(got.planes, want.planes);
            assert_eq!(got.pts, want.pts);
        }
    }

    #[test]
    fn mid_stream_header_change_raises_flag() {
        let mut dec = RawDecoder::new(CodecId::Hevc);

        let mut first = Vec::new();
        write_sequence_header(&test_info(), &mut first);
        dec.send_packet(Some(Packet {
            data: first,
            pts: 0,
        }))
        .unwrap();
        assert!(!dec.take_param_change());

        let mut changed = test_info();
        changed.width = 128;
        let mut second = Vec::new();
        write_sequence_header(&changed, &mut second);
        dec.send_packet(Some(Packet {
            data: second,
            pts: 0,
        }))
        .unwrap();
        assert!(dec.take_param_change());
        assert!(!dec.take_param_change());
        assert_eq!(dec.stream_info().unwrap().width, 128);
    }

    #[test]
    fn receive_signals_again_then_eos() {
        let mut dec = RawDecoder::new(CodecId::Avc);
        assert!(matches!(dec.receive_frame().unwrap(), Received::Again));
        dec.send_packet(None).unwrap();
        assert!(matches!(dec.receive_frame().unwrap(), Received::Eos));
    }

    #[test]
    fn frame_before_header_is_an_error() {
        let mut dec = RawDecoder::new(CodecId::Avc);
        let mut data = Vec::new();
        data.extend_from_slice(FRAME_MAGIC);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        assert!(dec.send_packet(Some(Packet { data, pts: 0 })).is_err());
    }
}
