//! Decode an elementary stream produced by hello_encode.
//!
//! Usage: hello_decode <in-file>

use std::fs::File;
use std::io::Read;

use vplite::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let in_path = std::env::args()
        .nth(1)
        .ok_or("usage: hello_decode <in-file>")?;
    let mut input = File::open(&in_path)?;

    let mut session = Session::init(ImplType::Software, None)?;
    let mut bs = Bitstream::with_capacity(1 << 20);
    let mut chunk = vec![0u8; 64 * 1024];
    let mut eof = false;
    let mut frames = 0u64;

    loop {
        if !eof && bs.spare() >= chunk.len() {
            let read = input.read(&mut chunk)?;
            if read == 0 {
                eof = true;
            } else {
                bs.append(&chunk[..read])?;
            }
        }

        let feed = bs.data_length() > 0 || !eof;
        let outcome = session
            .decoder()?
            .decode_frame_async(if feed { Some(&mut bs) } else { None }, None)?;
        match outcome {
            DecodeOutcome::Frame { surface, sync, .. } => {
                session.sync_operation(&sync, 0)?;
                let data = surface.data();
                if frames == 0 {
                    println!(
                        "stream: {:?} {}x{}",
                        data.info.fourcc, data.info.width, data.info.height
                    );
                }
                drop(data);
                surface.release()?;
                frames += 1;
            }
            DecodeOutcome::MoreData => {
                if eof && bs.data_length() == 0 {
                    break;
                }
            }
            DecodeOutcome::MoreSurface => unreachable!("internal memory mode"),
        }
    }

    println!("decoded {frames} frames from {in_path}");
    session.close()?;
    Ok(())
}
