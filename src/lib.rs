//! # vplite
//!
//! A software-only video processing runtime: a uniform session API over
//! compressed-bitstream decoding, raw-frame encoding and frame-to-frame
//! transformation (color conversion, scaling, cropping), together with a
//! dispatcher that discovers runtime libraries on disk and binds an
//! application to one of them.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vplite::prelude::*;
//!
//! # fn main() -> Result<(), VplError> {
//! let mut session = Session::init(ImplType::Software, None)?;
//!
//! // feed a compressed stream, pull decoded surfaces
//! let mut bs = Bitstream::with_capacity(1 << 20);
//! // ... fill `bs` from your source ...
//! loop {
//!     match session.decoder()?.decode_frame_async(Some(&mut bs), None)? {
//!         DecodeOutcome::Frame { surface, sync, .. } => {
//!             session.sync_operation(&sync, 0)?;
//!             // ... read surface.data() ...
//!             surface.release()?;
//!         }
//!         DecodeOutcome::MoreData => break, // refill and come back
//!         DecodeOutcome::MoreSurface => { /* provide an output slot */ }
//!     }
//! }
//! # Ok(()) }
//! ```
//!
//! ## Concepts
//! - [`Session`] — owns one instance of each pipeline plus shared state
//! - [`Surface`] — one raw frame descriptor, pooled and reference counted
//! - [`FramePool`] — lazily growing container of surfaces of one shape
//! - [`SyncPoint`] — token returned by every asynchronous submit
//! - [`Loader`](dispatch::Loader) — discovers and binds runtime libraries
//!
//! ## Modules
//! - [`decode`], [`encode`], [`vpp`] — the three pipelines
//! - [`dispatch`] — candidate discovery, capability filtering, binding
//! - [`backend`] — seam to the compressed-video library
//! - [`ffi`] — the exported C symbol table (this crate is itself a
//!   discoverable runtime)

mod bitstream;
mod decode;
mod encode;
mod image;
mod param;
mod pool;
mod session;
mod status;
mod surface;
mod sync;
mod variant;
mod vpp;

pub mod backend;
pub mod dispatch;
pub mod ffi;

pub use bitstream::Bitstream;
pub use decode::{DecodeOutcome, Decoder};
pub use encode::{EncodeOutcome, Encoder};
pub use image::Image;
pub use param::{
    check_frame_info, CodecId, FourCc, FrameAllocRequest, FrameDataFlags, FrameInfo, FrameRate,
    HandleType, ImplType, IoPattern, MapFlags, MemType, PicStruct, PlaneLayout, RateControl, Rect,
    Version, VideoParam, VppParam,
};
pub use pool::{AllocationPolicy, FramePool, PoolInterface, UNBOUNDED_POOL_SIZE};
pub use session::{FrameAllocator, InitParam, Session, API_VERSION};
pub use status::{error_from_code, Status, VplError, VplResult, Warning};
pub use surface::{Surface, SurfaceData};
pub use sync::SyncPoint;
pub use variant::{Variant, VariantValue, VariantVersion};
pub use vpp::{Vpp, VppOutcome};

pub mod prelude {
    pub use crate::{
        Bitstream, DecodeOutcome, EncodeOutcome, FourCc, FrameInfo, ImplType, Session, Status,
        SyncPoint, Version, VideoParam, VplError, VplResult, VppOutcome, Warning,
    };
}
