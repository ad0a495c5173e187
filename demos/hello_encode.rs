//! Encode a generated test pattern and write the elementary stream to a
//! file.
//!
//! Usage: hello_encode <out-file> [frames]

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use vplite::prelude::*;
use vplite::{CodecId, EncodeOutcome, FrameRate, RateControl, Surface};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let out_path = args.next().unwrap_or_else(|| "out.vpls".to_string());
    let frames: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30);
    let (width, height) = (352u16, 288u16);

    let mut session = Session::init(ImplType::Software, None)?;

    let mut info = FrameInfo::new(FourCc::I420, width, height);
    info.frame_rate = FrameRate::new(30, 1);
    let mut par = VideoParam::new(CodecId::Hevc, info);
    par.target_kbps = 4000;
    par.rate_control = RateControl::Vbr;
    session.encoder()?.init(&par)?;

    let mut out = File::create(&out_path)?;
    let mut bs = Bitstream::with_capacity(4 << 20);
    let mut written = 0usize;

    for n in 0..frames {
        let surface: Arc<Surface> = session.get_surface_for_encode()?;
        fill_pattern(&surface, n);
        match session.encoder()?.encode_frame_async(Some(&surface), &mut bs)? {
            EncodeOutcome::Packet { .. } => written += flush(&mut bs, &mut out)?,
            EncodeOutcome::MoreData => {}
        }
        surface.release()?;
    }

    // drain
    loop {
        match session.encoder()?.encode_frame_async(None, &mut bs)? {
            EncodeOutcome::Packet { .. } => written += flush(&mut bs, &mut out)?,
            EncodeOutcome::MoreData => break,
        }
    }

    println!("encoded {frames} frames, {written} bytes -> {out_path}");
    session.close()?;
    Ok(())
}

fn fill_pattern(surface: &Surface, n: u64) {
    let mut data = surface.data_mut();
    let pitch = data.pitch;
    let (w, h) = (data.info.width as usize, data.info.height as usize);
    for y in 0..h {
        for x in 0..w {
            data.planes[0][y * pitch + x] = ((x + y + n as usize) % 256) as u8;
        }
    }
    data.timestamp = n * 33;
}

fn flush(bs: &mut Bitstream, out: &mut File) -> std::io::Result<usize> {
    let bytes = bs.unread().to_vec();
    out.write_all(&bytes)?;
    bs.consume(bytes.len());
    bs.compact();
    Ok(bytes.len())
}
