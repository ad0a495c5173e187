//! Run a crop + scale + color-convert chain over a generated frame.

use std::sync::Arc;

use vplite::prelude::*;
use vplite::{Rect, Surface, VppParam};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut session = Session::init(ImplType::Software, None)?;

    let mut in_info = FrameInfo::new(FourCc::I420, 1920, 1080);
    in_info.crop = Rect::new(16, 16, 1280, 720);
    let out_info = FrameInfo::new(FourCc::Nv12, 640, 360);
    session.vpp()?.init(&VppParam::new(in_info, out_info))?;

    let input: Arc<Surface> = session.get_surface_for_vpp()?;
    {
        let mut data = input.data_mut();
        let pitch = data.pitch;
        for y in 0..1080usize {
            for x in 0..1920usize {
                data.planes[0][y * pitch + x] = ((x / 4 + y / 4) % 256) as u8;
            }
        }
        data.timestamp = 1;
    }

    let output = Arc::new(Surface::with_shape(FourCc::Nv12, 640, 360));
    match session.vpp()?.run_frame_async(Some(&input), &output)? {
        VppOutcome::Frame { sync } => session.sync_operation(&sync, 0)?,
        VppOutcome::MoreData => unreachable!("one frame in, one frame out"),
    }

    let data = output.data();
    println!(
        "transformed to {:?} {}x{}, first luma row starts with {:?}",
        data.info.fourcc,
        data.info.width,
        data.info.height,
        &data.planes[0][..8]
    );
    drop(data);
    input.release()?;
    session.close()?;
    Ok(())
}
