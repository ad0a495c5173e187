//! Sessions: one instance of each pipeline plus the shared session state.
//!
//! A session owns at most one decoder, one encoder and one transform
//! pipeline, a frame allocator for external-memory callers, and a set of
//! opaque device handles. Closing the session invalidates every subsequent
//! call with `NotInitialized`.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::param::{FourCc, HandleType, ImplType, Version};
use crate::pool::FramePool;
use crate::status::{VplError, VplResult};
use crate::surface::Surface;
use crate::sync::SyncPoint;
use crate::vpp::Vpp;

/// API version implemented by this runtime.
pub const API_VERSION: Version = Version::new(1, 35);

/// Parameters accepted by [`Session::init_ex`].
#[derive(Debug, Clone, Copy)]
pub struct InitParam {
    pub impl_type: ImplType,
    pub version: Version,
    pub external_threads: u16,
}

impl Default for InitParam {
    fn default() -> InitParam {
        InitParam {
            impl_type: ImplType::Auto,
            version: API_VERSION,
            external_threads: 0,
        }
    }
}

/// Allocator handed to external-memory callers. Surfaces come from a
/// session-owned shape-unaware pool and get their buffers attached at
/// allocation time.
pub struct FrameAllocator {
    pool: Arc<FramePool>,
}

impl FrameAllocator {
    fn new() -> FrameAllocator {
        FrameAllocator {
            pool: FramePool::new(0),
        }
    }

    /// A surface of the requested shape with its reference count already 1.
    pub fn alloc_surface(
        &self,
        fourcc: FourCc,
        width: u16,
        height: u16,
    ) -> VplResult<Arc<Surface>> {
        let surface = self.pool.get_free_surface()?;
        let reshape = {
            let data = surface.data();
            data.planes.is_empty()
                || data.info.fourcc != fourcc
                || data.info.width != width
                || data.info.height != height
        };
        if reshape {
            surface.allocate(fourcc, width, height);
        }
        Ok(surface)
    }

    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }
}

pub struct Session {
    closed: bool,
    impl_type: ImplType,
    decoder: Decoder,
    encoder: Encoder,
    vpp: Vpp,
    allocator: FrameAllocator,
    handles: HashMap<HandleType, *mut c_void>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.closed)
            .field("impl_type", &self.impl_type)
            .finish()
    }
}

impl Session {
    /// Legacy initialization: implementation selector plus requested API
    /// version (`None` means "whatever the runtime has").
    pub fn init(impl_type: ImplType, version: Option<Version>) -> VplResult<Session> {
        Session::init_ex(InitParam {
            impl_type,
            version: version.unwrap_or(API_VERSION),
            external_threads: 0,
        })
    }

    /// Initialize a session, validating version compatibility: the major
    /// version must match the runtime, the minor must not exceed it. Only
    /// the software implementation exists in this core.
    pub fn init_ex(par: InitParam) -> VplResult<Session> {
        let requested = par.version;
        if requested.major != 0 {
            if requested.major != API_VERSION.major || requested.minor > API_VERSION.minor {
                return Err(VplError::Unsupported);
            }
        }
        match par.impl_type {
            ImplType::Auto | ImplType::AutoAny | ImplType::Software => {}
            ImplType::Hardware => return Err(VplError::Unsupported),
        }

        Ok(Session {
            closed: false,
            impl_type: ImplType::Software,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            vpp: Vpp::new(),
            allocator: FrameAllocator::new(),
            handles: HashMap::new(),
        })
    }

    fn check_open(&self) -> VplResult<()> {
        if self.closed {
            return Err(VplError::NotInitialized);
        }
        Ok(())
    }

    pub fn query_impl(&self) -> VplResult<ImplType> {
        self.check_open()?;
        Ok(self.impl_type)
    }

    pub fn query_version(&self) -> VplResult<Version> {
        self.check_open()?;
        Ok(API_VERSION)
    }

    /// Close the session; every call after this fails with
    /// `NotInitialized`.
    pub fn close(&mut self) -> VplResult<()> {
        self.check_open()?;
        let _ = self.decoder.close();
        let _ = self.encoder.close();
        let _ = self.vpp.close();
        self.closed = true;
        Ok(())
    }

    // --- pipelines ----------------------------------------------------------

    pub fn decoder(&mut self) -> VplResult<&mut Decoder> {
        self.check_open()?;
        Ok(&mut self.decoder)
    }

    pub fn encoder(&mut self) -> VplResult<&mut Encoder> {
        self.check_open()?;
        Ok(&mut self.encoder)
    }

    pub fn vpp(&mut self) -> VplResult<&mut Vpp> {
        self.check_open()?;
        Ok(&mut self.vpp)
    }

    // --- synchronization ----------------------------------------------------

    /// Resolve a sync token, waiting up to `wait_ms` (the software core
    /// resolves immediately).
    pub fn sync_operation(&self, sync: &SyncPoint, wait_ms: u32) -> VplResult<()> {
        self.check_open()?;
        match sync.resolve(wait_ms).as_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // --- memory helpers -----------------------------------------------------

    pub fn get_surface_for_decode(&mut self) -> VplResult<Arc<Surface>> {
        self.check_open()?;
        self.decoder.surface_pool()?.get_free_surface()
    }

    pub fn get_surface_for_encode(&mut self) -> VplResult<Arc<Surface>> {
        self.check_open()?;
        self.encoder.surface_pool()?.get_free_surface()
    }

    pub fn get_surface_for_vpp(&mut self) -> VplResult<Arc<Surface>> {
        self.check_open()?;
        self.vpp.surface_pool()?.get_free_surface()
    }

    pub fn frame_allocator(&self) -> &FrameAllocator {
        &self.allocator
    }

    // --- device handles -----------------------------------------------------

    /// Store an opaque device handle. Each handle type can be set exactly
    /// once.
    pub fn set_handle(&mut self, kind: HandleType, handle: *mut c_void) -> VplResult<()> {
        self.check_open()?;
        if self.handles.contains_key(&kind) {
            return Err(VplError::UndefinedBehavior);
        }
        self.handles.insert(kind, handle);
        Ok(())
    }

    pub fn get_handle(&self, kind: HandleType) -> VplResult<*mut c_void> {
        self.check_open()?;
        self.handles.get(&kind).copied().ok_or(VplError::NotFound)
    }

    // --- legacy multi-session surface ---------------------------------------

    pub fn join_session(&mut self, _child: &mut Session) -> VplResult<()> {
        Err(VplError::NotImplemented)
    }

    pub fn disjoin_session(&mut self) -> VplResult<()> {
        Err(VplError::NotImplemented)
    }

    pub fn clone_session(&self) -> VplResult<Session> {
        Err(VplError::NotImplemented)
    }

    pub fn set_priority(&mut self, _priority: i32) -> VplResult<()> {
        Err(VplError::NotImplemented)
    }

    pub fn get_priority(&self) -> VplResult<i32> {
        Err(VplError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::Bitstream;
    use crate::decode::DecodeOutcome;
    use crate::encode::EncodeOutcome;
    use crate::param::{CodecId, FrameInfo, FrameRate, VideoParam};

    #[test]
    fn open_query_close() {
        let mut session = Session::init(ImplType::Software, Some(Version::new(1, 35))).unwrap();
        assert_eq!(session.query_impl().unwrap(), ImplType::Software);
        assert_eq!(session.query_version().unwrap(), API_VERSION);
        session.close().unwrap();
        assert_eq!(session.query_impl().unwrap_err(), VplError::NotInitialized);
        assert_eq!(session.close().unwrap_err(), VplError::NotInitialized);
    }

    #[test]
    fn auto_impl_resolves_to_software() {
        let session = Session::init(ImplType::Auto, None).unwrap();
        assert_eq!(session.query_impl().unwrap(), ImplType::Software);
    }

    #[test]
    fn version_gate() {
        assert_eq!(
            Session::init(ImplType::Software, Some(Version::new(2, 0))).unwrap_err(),
            VplError::Unsupported
        );
        assert_eq!(
            Session::init(ImplType::Software, Some(Version::new(1, 99))).unwrap_err(),
            VplError::Unsupported
        );
        // major 0 means "unspecified"
        assert!(Session::init(ImplType::Software, Some(Version::new(0, 0))).is_ok());
    }

    #[test]
    fn hardware_impl_is_unsupported() {
        assert_eq!(
            Session::init(ImplType::Hardware, None).unwrap_err(),
            VplError::Unsupported
        );
    }

    #[test]
    fn set_handle_is_set_once() {
        let mut session = Session::init(ImplType::Software, None).unwrap();
        let fake = 0x1234 as *mut c_void;
        session.set_handle(HandleType::VaDisplay, fake).unwrap();
        assert_eq!(session.get_handle(HandleType::VaDisplay).unwrap(), fake);
        assert_eq!(
            session.set_handle(HandleType::VaDisplay, fake).unwrap_err(),
            VplError::UndefinedBehavior
        );
        assert_eq!(
            session.get_handle(HandleType::D3d11Device).unwrap_err(),
            VplError::NotFound
        );
    }

    #[test]
    fn surfaces_require_initialized_pipelines() {
        let mut session = Session::init(ImplType::Software, None).unwrap();
        assert_eq!(
            session.get_surface_for_decode().unwrap_err(),
            VplError::NotInitialized
        );
        assert_eq!(
            session.get_surface_for_encode().unwrap_err(),
            VplError::NotInitialized
        );
        assert_eq!(
            session.get_surface_for_vpp().unwrap_err(),
            VplError::NotInitialized
        );
    }

    #[test]
    fn encode_surface_comes_from_session_pool() {
        let mut session = Session::init(ImplType::Software, None).unwrap();
        let mut info = FrameInfo::new(FourCc::I420, 64, 48);
        info.frame_rate = FrameRate::new(30, 1);
        let par = VideoParam::new(CodecId::Hevc, info);
        session.encoder().unwrap().init(&par).unwrap();

        let surface = session.get_surface_for_encode().unwrap();
        assert_eq!(surface.ref_count(), 1);
        assert_eq!(surface.data().info.width, 64);
    }

    #[test]
    fn frame_allocator_attaches_buffers_on_demand() {
        let session = Session::init(ImplType::Software, None).unwrap();
        let surface = session
            .frame_allocator()
            .alloc_surface(FourCc::I420, 32, 16)
            .unwrap();
        assert_eq!(surface.ref_count(), 1);
        assert!(surface.is_allocated());
    }

    #[test]
    fn legacy_session_calls_are_not_implemented() {
        let mut a = Session::init(ImplType::Software, None).unwrap();
        let mut b = Session::init(ImplType::Software, None).unwrap();
        assert_eq!(a.join_session(&mut b).unwrap_err(), VplError::NotImplemented);
        assert_eq!(a.disjoin_session().unwrap_err(), VplError::NotImplemented);
        assert_eq!(a.clone_session().unwrap_err(), VplError::NotImplemented);
        assert_eq!(a.set_priority(1).unwrap_err(), VplError::NotImplemented);
        assert_eq!(a.get_priority().unwrap_err(), VplError::NotImplemented);
    }

    #[test]
    fn encode_decode_through_one_session() {
        let mut session = Session::init(ImplType::Software, None).unwrap();

        let mut info = FrameInfo::new(FourCc::I420, 48, 32);
        info.frame_rate = FrameRate::new(30, 1);
        let mut par = VideoParam::new(CodecId::Avc, info);
        par.target_kbps = 1000;
        session.encoder().unwrap().init(&par).unwrap();

        let mut bs = Bitstream::with_capacity(1 << 20);
        for i in 0..3u64 {
            let surface = session.get_surface_for_encode().unwrap();
            {
                let mut data = surface.data_mut();
                data.planes[0].iter_mut().for_each(|b| *b = 30 + i as u8);
                data.timestamp = i;
            }
            let outcome = session
                .encoder()
                .unwrap()
                .encode_frame_async(Some(&surface), &mut bs)
                .unwrap();
            if let EncodeOutcome::Packet { sync } = outcome {
                session.sync_operation(&sync, 0).unwrap();
            }
            surface.release().unwrap();
        }
        loop {
            match session
                .encoder()
                .unwrap()
                .encode_frame_async(None, &mut bs)
                .unwrap()
            {
                EncodeOutcome::Packet { .. } => {}
                EncodeOutcome::MoreData => break,
            }
        }

        let mut frames = 0;
        loop {
            let has_input = bs.data_length() > 0;
            let outcome = session
                .decoder()
                .unwrap()
                .decode_frame_async(if has_input { Some(&mut bs) } else { None }, None)
                .unwrap();
            match outcome {
                DecodeOutcome::Frame { surface, sync, .. } => {
                    session.sync_operation(&sync, 0).unwrap();
                    surface.release().unwrap();
                    frames += 1;
                }
                DecodeOutcome::MoreData => {
                    if !has_input {
                        break;
                    }
                }
                DecodeOutcome::MoreSurface => panic!("unexpected more-surface"),
            }
        }
        assert_eq!(frames, 3);
    }
}
