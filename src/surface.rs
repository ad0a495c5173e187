//! Frame surface descriptors.
//!
//! A surface is a descriptor for one raw frame plus its backing memory. The
//! pool owns the memory for the surface's whole lifetime; the atomic
//! reference counter only gates *reuse*. The counter deliberately does not
//! destroy anything when it reaches zero.
//!
//! The interface-table operations of the external contract (`add_ref`,
//! `release`, `map`, `synchronize`, ...) are inherent methods here; the
//! C-callable vtable form lives in the `ffi` module.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::image::{copy_plane, Image};
use crate::param::{FourCc, FrameDataFlags, FrameInfo, MapFlags, Rect};
use crate::status::{Status, VplError, VplResult};
use crate::sync::SyncPoint;

/// Mutable payload of a surface: description, plane memory and per-frame
/// metadata.
#[derive(Debug)]
pub struct SurfaceData {
    pub info: FrameInfo,
    /// Bytes per row of the luma plane; chroma pitches are derived.
    pub pitch: usize,
    pub planes: Vec<Vec<u8>>,
    pub timestamp: u64,
    pub flags: FrameDataFlags,
}

impl SurfaceData {
    fn empty() -> SurfaceData {
        SurfaceData {
            info: FrameInfo::default(),
            pitch: 0,
            planes: Vec::new(),
            timestamp: 0,
            flags: FrameDataFlags::empty(),
        }
    }
}

#[derive(Debug)]
pub struct Surface {
    ref_count: AtomicU32,
    locked: AtomicU32,
    data: RwLock<SurfaceData>,
    last_sync: Mutex<Option<SyncPoint>>,
}

impl Surface {
    /// An empty descriptor; plane memory is attached on first shaped use.
    pub fn new() -> Surface {
        Surface {
            ref_count: AtomicU32::new(0),
            locked: AtomicU32::new(0),
            data: RwLock::new(SurfaceData::empty()),
            last_sync: Mutex::new(None),
        }
    }

    /// A descriptor with plane memory for the given shape.
    pub fn with_shape(fourcc: FourCc, width: u16, height: u16) -> Surface {
        let surface = Surface::new();
        surface.allocate(fourcc, width, height);
        surface
    }

    /// Attach (or replace) plane memory for the given shape.
    pub fn allocate(&self, fourcc: FourCc, width: u16, height: u16) {
        let pitch = fourcc.aligned_pitch(width);
        let mut planes = Vec::new();
        for idx in 0..fourcc.plane_count() {
            let (_, rows) = fourcc.plane_dims(idx, width, height);
            planes.push(vec![0u8; fourcc.plane_pitch(idx, pitch) * rows]);
        }
        let mut data = self.data.write().unwrap();
        data.info = FrameInfo::new(fourcc, width, height);
        data.pitch = pitch;
        data.planes = planes;
    }

    pub fn is_allocated(&self) -> bool {
        !self.data.read().unwrap().planes.is_empty()
    }

    pub fn data(&self) -> RwLockReadGuard<'_, SurfaceData> {
        self.data.read().unwrap()
    }

    pub fn data_mut(&self) -> RwLockWriteGuard<'_, SurfaceData> {
        self.data.write().unwrap()
    }

    // --- reference counting -------------------------------------------------

    pub fn add_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) -> VplResult<()> {
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(VplError::UndefinedBehavior);
            }
            match self.ref_count.compare_exchange(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Atomically claim a free surface (refcount 0 -> 1). Two callers racing
    /// for the same slot cannot both win.
    pub(crate) fn try_claim(&self) -> bool {
        self.ref_count
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // --- lock count (pipeline in-use marker) --------------------------------

    pub(crate) fn lock(&self) {
        self.locked.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unlock(&self) {
        self.locked.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn locked(&self) -> u32 {
        self.locked.load(Ordering::Acquire)
    }

    /// Reusable means nobody holds it and no pipeline is using it.
    pub fn is_free(&self) -> bool {
        self.ref_count() == 0 && self.locked() == 0
    }

    // --- interface-table operations -----------------------------------------

    /// Map the surface for CPU access. System memory is always mapped; this
    /// is a status-only operation kept for the device-memory contract.
    pub fn map(&self, _flags: MapFlags) -> VplResult<()> {
        Ok(())
    }

    pub fn unmap(&self) -> VplResult<()> {
        Ok(())
    }

    /// System-memory surfaces have no exportable resource.
    pub fn native_handle(&self) -> VplResult<*mut c_void> {
        Err(VplError::NotFound)
    }

    /// System-memory surfaces are not bound to a device.
    pub fn device_handle(&self) -> VplResult<*mut c_void> {
        Err(VplError::NotFound)
    }

    /// Resolve the sync token most recently associated with this surface.
    pub fn synchronize(&self, wait_ms: u32) -> VplResult<()> {
        let guard = self.last_sync.lock().unwrap();
        match guard.as_ref() {
            Some(sp) => match sp.resolve(wait_ms).as_error() {
                Some(err) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    pub(crate) fn set_sync(&self, sp: SyncPoint) {
        *self.last_sync.lock().unwrap() = Some(sp);
    }

    // --- payload transfer ---------------------------------------------------

    /// Copy a decoded or filtered image into this surface, row by row,
    /// honoring the surface pitch. Reallocates when the current shape cannot
    /// hold the image. The frame description is updated to the image
    /// dimensions with a full crop.
    pub fn copy_image_into(&self, image: &Image) -> VplResult<()> {
        let needs_alloc = {
            let data = self.data.read().unwrap();
            data.planes.is_empty()
                || data.info.fourcc != image.fourcc
                || data.info.width < image.width
                || data.info.height < image.height
        };
        if needs_alloc {
            self.allocate(image.fourcc, image.width, image.height);
        }

        let mut data = self.data.write().unwrap();
        let pitch = data.pitch;
        for idx in 0..image.planes.len() {
            let (row_bytes, rows) = image.fourcc.plane_dims(idx, image.width, image.height);
            let dst_pitch = image.fourcc.plane_pitch(idx, pitch);
            copy_plane(
                &mut data.planes[idx],
                dst_pitch,
                &image.planes[idx],
                image.linesize[idx],
                row_bytes,
                rows,
            );
        }
        data.info.fourcc = image.fourcc;
        data.info.width = image.width;
        data.info.height = image.height;
        data.info.crop = Rect::full(image.width, image.height);
        data.timestamp = image.pts;
        Ok(())
    }

    /// Copy the surface planes out into a tight image, using the crop-free
    /// allocation dimensions.
    pub fn snapshot_image(&self) -> VplResult<Image> {
        let data = self.data.read().unwrap();
        if data.planes.is_empty() {
            return Err(VplError::NotInitialized);
        }
        let info = data.info;
        let mut image = Image::alloc(info.fourcc, info.width, info.height);
        for idx in 0..image.planes.len() {
            let (row_bytes, rows) = info.fourcc.plane_dims(idx, info.width, info.height);
            let src_pitch = info.fourcc.plane_pitch(idx, data.pitch);
            copy_plane(
                &mut image.planes[idx],
                image.linesize[idx],
                &data.planes[idx],
                src_pitch,
                row_bytes,
                rows,
            );
        }
        image.pts = data.timestamp;
        Ok(image)
    }
}

impl Default for Surface {
    fn default() -> Surface {
        Surface::new()
    }
}

/// Status form of `synchronize` used at the C boundary.
pub(crate) fn synchronize_status(surface: &Surface, wait_ms: u32) -> Status {
    match surface.synchronize(wait_ms) {
        Ok(()) => Status::Ok,
        Err(e) => Status::from(e),
    }
}
