//! C ABI exported by this runtime.
//!
//! These are the symbols the dispatcher resolves when it validates a
//! candidate library, plus the session entry points and the per-surface
//! callback table. Statuses cross the boundary as the numeric codes of
//! [`Status`](crate::Status); every null argument check here maps to the
//! `NullPtr` code, a null session to `InvalidHandle`.

use std::ffi::c_void;
use std::sync::Arc;

use crate::dispatch::caps::{CApiVersion, CapsFormat, CInitParam, ImplDescription};
use crate::param::{HandleType, ImplType, MapFlags, Version};
use crate::session::Session;
use crate::status::{Status, VplError};
use crate::surface::{synchronize_status, Surface};

lazy_static::lazy_static! {
    /// Process-wide one-shot logging setup, done lazily at the first
    /// entry from foreign code.
    static ref LOGGING: () = {
        let _ = env_logger::Builder::from_default_env().try_init();
    };
}

fn ensure_logging() {
    lazy_static::initialize(&LOGGING);
}

fn code<T>(result: &Result<T, VplError>) -> i32 {
    Status::from(result).code()
}

// --- session entry points ---------------------------------------------------

/// Initialize a session. `session` receives an owned handle that must be
/// passed to `vpl_close`.
#[no_mangle]
pub extern "C" fn vpl_init_ex(par: *const CInitParam, session: *mut *mut Session) -> i32 {
    ensure_logging();
    if par.is_null() || session.is_null() {
        return Status::NullPtr.code();
    }
    let par = unsafe { &*par };
    let impl_type = match ImplType::from_u32(par.impl_type) {
        Some(t) => t,
        None => return Status::Unsupported.code(),
    };
    let result = Session::init_ex(crate::session::InitParam {
        impl_type,
        version: Version::new(par.version.major, par.version.minor),
        external_threads: par.external_threads,
    });
    match result {
        Ok(s) => {
            unsafe { *session = Box::into_raw(Box::new(s)) };
            Status::Ok.code()
        }
        Err(e) => Status::from(e).code(),
    }
}

#[no_mangle]
pub extern "C" fn vpl_close(session: *mut Session) -> i32 {
    if session.is_null() {
        return Status::InvalidHandle.code();
    }
    let mut session = unsafe { Box::from_raw(session) };
    let _ = session.close();
    Status::Ok.code()
}

#[no_mangle]
pub extern "C" fn vpl_query_impl(session: *const Session, impl_out: *mut u32) -> i32 {
    if session.is_null() {
        return Status::InvalidHandle.code();
    }
    if impl_out.is_null() {
        return Status::NullPtr.code();
    }
    let session = unsafe { &*session };
    match session.query_impl() {
        Ok(impl_type) => {
            unsafe { *impl_out = impl_type.as_u32() };
            Status::Ok.code()
        }
        Err(e) => Status::from(e).code(),
    }
}

#[no_mangle]
pub extern "C" fn vpl_query_version(session: *const Session, version: *mut CApiVersion) -> i32 {
    if session.is_null() {
        return Status::InvalidHandle.code();
    }
    if version.is_null() {
        return Status::NullPtr.code();
    }
    let session = unsafe { &*session };
    match session.query_version() {
        Ok(v) => {
            unsafe { *version = v.into() };
            Status::Ok.code()
        }
        Err(e) => Status::from(e).code(),
    }
}

#[no_mangle]
pub extern "C" fn vpl_set_handle(
    session: *mut Session,
    handle_type: u32,
    handle: *mut c_void,
) -> i32 {
    if session.is_null() {
        return Status::InvalidHandle.code();
    }
    let kind = match handle_type {
        0 => HandleType::VaDisplay,
        1 => HandleType::D3d9DeviceManager,
        2 => HandleType::D3d11Device,
        3 => HandleType::CmDevice,
        _ => return Status::Unsupported.code(),
    };
    let session = unsafe { &mut *session };
    code(&session.set_handle(kind, handle))
}

// --- capability query -------------------------------------------------------

/// Hand out this runtime's capability description. Returns null for an
/// unknown delivery format.
#[no_mangle]
pub extern "C" fn vpl_query_impl_description(format: u32) -> *const ImplDescription {
    ensure_logging();
    match CapsFormat::from_u32(format) {
        Some(CapsFormat::ImplDescStructure) => {
            Box::into_raw(Box::new(ImplDescription::software_runtime()))
        }
        None => std::ptr::null(),
    }
}

#[no_mangle]
pub extern "C" fn vpl_release_impl_description(desc: *const ImplDescription) -> i32 {
    if desc.is_null() {
        return Status::NullPtr.code();
    }
    unsafe { drop(Box::from_raw(desc as *mut ImplDescription)) };
    Status::Ok.code()
}

// --- surfaces ---------------------------------------------------------------

/// Per-surface callback table, the C-callable form of the surface
/// interface.
#[repr(C)]
pub struct CFrameSurfaceVtable {
    pub add_ref: unsafe extern "C" fn(*mut CFrameSurface) -> i32,
    pub release: unsafe extern "C" fn(*mut CFrameSurface) -> i32,
    pub get_ref_counter: unsafe extern "C" fn(*mut CFrameSurface, *mut u32) -> i32,
    pub map: unsafe extern "C" fn(*mut CFrameSurface, u32) -> i32,
    pub unmap: unsafe extern "C" fn(*mut CFrameSurface) -> i32,
    pub get_native_handle: unsafe extern "C" fn(*mut CFrameSurface, *mut *mut c_void) -> i32,
    pub get_device_handle: unsafe extern "C" fn(*mut CFrameSurface, *mut *mut c_void) -> i32,
    pub synchronize: unsafe extern "C" fn(*mut CFrameSurface, u32) -> i32,
}

/// Surface handle handed across the boundary. `context` owns one strong
/// reference to the surface; the final `release` (reference count reaching
/// zero) frees this wrapper, not the surface memory, which stays with its
/// pool.
#[repr(C)]
pub struct CFrameSurface {
    pub context: *mut c_void,
    pub iface: *const CFrameSurfaceVtable,
}

unsafe fn surface_of<'a>(handle: *mut CFrameSurface) -> Result<&'a Surface, Status> {
    if handle.is_null() {
        return Err(Status::NullPtr);
    }
    let ctx = (*handle).context;
    if ctx.is_null() {
        return Err(Status::InvalidHandle);
    }
    Ok(&*(ctx as *const Surface))
}

unsafe extern "C" fn surface_add_ref(handle: *mut CFrameSurface) -> i32 {
    match surface_of(handle) {
        Ok(surface) => {
            surface.add_ref();
            Status::Ok.code()
        }
        Err(status) => status.code(),
    }
}

unsafe extern "C" fn surface_release(handle: *mut CFrameSurface) -> i32 {
    let surface = match surface_of(handle) {
        Ok(surface) => surface,
        Err(status) => return status.code(),
    };
    match surface.release() {
        Ok(()) => {
            if surface.ref_count() == 0 {
                // last external reference: reclaim the wrapper and the
                // strong reference it held; the pool keeps the memory
                let ctx = (*handle).context as *const Surface;
                (*handle).context = std::ptr::null_mut();
                drop(Arc::from_raw(ctx));
                drop(Box::from_raw(handle));
            }
            Status::Ok.code()
        }
        Err(e) => Status::from(e).code(),
    }
}

unsafe extern "C" fn surface_get_ref_counter(handle: *mut CFrameSurface, out: *mut u32) -> i32 {
    if out.is_null() {
        return Status::NullPtr.code();
    }
    match surface_of(handle) {
        Ok(surface) => {
            *out = surface.ref_count();
            Status::Ok.code()
        }
        Err(status) => status.code(),
    }
}

unsafe extern "C" fn surface_map(handle: *mut CFrameSurface, flags: u32) -> i32 {
    match surface_of(handle) {
        Ok(surface) => code(&surface.map(MapFlags::from_bits_truncate(flags))),
        Err(status) => status.code(),
    }
}

unsafe extern "C" fn surface_unmap(handle: *mut CFrameSurface) -> i32 {
    match surface_of(handle) {
        Ok(surface) => code(&surface.unmap()),
        Err(status) => status.code(),
    }
}

unsafe extern "C" fn surface_get_native_handle(
    handle: *mut CFrameSurface,
    out: *mut *mut c_void,
) -> i32 {
    if out.is_null() {
        return Status::NullPtr.code();
    }
    match surface_of(handle) {
        Ok(surface) => code(&surface.native_handle()),
        Err(status) => status.code(),
    }
}

unsafe extern "C" fn surface_get_device_handle(
    handle: *mut CFrameSurface,
    out: *mut *mut c_void,
) -> i32 {
    if out.is_null() {
        return Status::NullPtr.code();
    }
    match surface_of(handle) {
        Ok(surface) => code(&surface.device_handle()),
        Err(status) => status.code(),
    }
}

unsafe extern "C" fn surface_synchronize(handle: *mut CFrameSurface, wait_ms: u32) -> i32 {
    match surface_of(handle) {
        Ok(surface) => synchronize_status(surface, wait_ms).code(),
        Err(status) => status.code(),
    }
}

static SURFACE_VTABLE: CFrameSurfaceVtable = CFrameSurfaceVtable {
    add_ref: surface_add_ref,
    release: surface_release,
    get_ref_counter: surface_get_ref_counter,
    map: surface_map,
    unmap: surface_unmap,
    get_native_handle: surface_get_native_handle,
    get_device_handle: surface_get_device_handle,
    synchronize: surface_synchronize,
};

fn wrap_surface(surface: Arc<Surface>) -> *mut CFrameSurface {
    Box::into_raw(Box::new(CFrameSurface {
        context: Arc::into_raw(surface) as *mut c_void,
        iface: &SURFACE_VTABLE,
    }))
}

fn get_surface_common(
    session: *mut Session,
    out: *mut *mut CFrameSurface,
    f: impl FnOnce(&mut Session) -> Result<Arc<Surface>, VplError>,
) -> i32 {
    if session.is_null() {
        return Status::InvalidHandle.code();
    }
    if out.is_null() {
        return Status::NullPtr.code();
    }
    let session = unsafe { &mut *session };
    match f(session) {
        Ok(surface) => {
            unsafe { *out = wrap_surface(surface) };
            Status::Ok.code()
        }
        Err(e) => Status::from(e).code(),
    }
}

#[no_mangle]
pub extern "C" fn vpl_get_surface_for_decode(
    session: *mut Session,
    out: *mut *mut CFrameSurface,
) -> i32 {
    get_surface_common(session, out, Session::get_surface_for_decode)
}

#[no_mangle]
pub extern "C" fn vpl_get_surface_for_encode(
    session: *mut Session,
    out: *mut *mut CFrameSurface,
) -> i32 {
    get_surface_common(session, out, Session::get_surface_for_encode)
}

#[no_mangle]
pub extern "C" fn vpl_get_surface_for_vpp(
    session: *mut Session,
    out: *mut *mut CFrameSurface,
) -> i32 {
    get_surface_common(session, out, Session::get_surface_for_vpp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{CodecId, FourCc, FrameInfo, FrameRate, VideoParam};
    use std::ptr;

    fn open_session() -> *mut Session {
        let par = CInitParam {
            impl_type: ImplType::Software.as_u32(),
            version: CApiVersion {
                major: 1,
                minor: 35,
            },
            external_threads: 0,
        };
        let mut session: *mut Session = ptr::null_mut();
        assert_eq!(vpl_init_ex(&par, &mut session), 0);
        assert!(!session.is_null());
        session
    }

    #[test]
    fn init_query_close_round_trip() {
        let session = open_session();

        let mut impl_out = u32::MAX;
        assert_eq!(vpl_query_impl(session, &mut impl_out), 0);
        assert_eq!(impl_out, ImplType::Software.as_u32());

        let mut version = CApiVersion { major: 0, minor: 0 };
        assert_eq!(vpl_query_version(session, &mut version), 0);
        assert_eq!((version.major, version.minor), (1, 35));

        assert_eq!(vpl_close(session), 0);
    }

    #[test]
    fn null_arguments_map_to_the_right_codes() {
        assert_eq!(vpl_close(ptr::null_mut()), Status::InvalidHandle.code());
        assert_eq!(
            vpl_query_impl(ptr::null(), ptr::null_mut()),
            Status::InvalidHandle.code()
        );

        let session = open_session();
        assert_eq!(
            vpl_query_impl(session, ptr::null_mut()),
            Status::NullPtr.code()
        );
        assert_eq!(
            vpl_init_ex(ptr::null(), ptr::null_mut()),
            Status::NullPtr.code()
        );
        assert_eq!(vpl_close(session), 0);
    }

    #[test]
    fn version_mismatch_is_unsupported() {
        let par = CInitParam {
            impl_type: ImplType::Software.as_u32(),
            version: CApiVersion { major: 9, minor: 0 },
            external_threads: 0,
        };
        let mut session: *mut Session = ptr::null_mut();
        assert_eq!(vpl_init_ex(&par, &mut session), Status::Unsupported.code());
        assert!(session.is_null());
    }

    #[test]
    fn caps_description_round_trips() {
        let desc = vpl_query_impl_description(CapsFormat::ImplDescStructure as u32);
        assert!(!desc.is_null());
        let name = unsafe { (*desc).name().to_owned() };
        assert_eq!(name, "vplite software runtime");
        assert_eq!(vpl_release_impl_description(desc), 0);

        assert!(vpl_query_impl_description(42).is_null());
        assert_eq!(
            vpl_release_impl_description(ptr::null()),
            Status::NullPtr.code()
        );
    }

    #[test]
    fn surface_handles_require_an_initialized_pipeline() {
        let session = open_session();
        let mut out: *mut CFrameSurface = ptr::null_mut();
        assert_eq!(
            vpl_get_surface_for_decode(session, &mut out),
            Status::NotInitialized.code()
        );
        assert_eq!(vpl_close(session), 0);
    }

    #[test]
    fn surface_vtable_drives_the_reference_count() {
        let session = open_session();
        {
            let rust_session = unsafe { &mut *session };
            let mut info = FrameInfo::new(FourCc::I420, 64, 48);
            info.frame_rate = FrameRate::new(30, 1);
            let par = VideoParam::new(CodecId::Hevc, info);
            rust_session.encoder().unwrap().init(&par).unwrap();
        }

        let mut handle: *mut CFrameSurface = ptr::null_mut();
        assert_eq!(vpl_get_surface_for_encode(session, &mut handle), 0);
        assert!(!handle.is_null());

        unsafe {
            let iface = &*(*handle).iface;

            let mut count = 0u32;
            assert_eq!((iface.get_ref_counter)(handle, &mut count), 0);
            assert_eq!(count, 1);

            assert_eq!((iface.add_ref)(handle), 0);
            assert_eq!((iface.get_ref_counter)(handle, &mut count), 0);
            assert_eq!(count, 2);

            assert_eq!((iface.map)(handle, MapFlags::READ_WRITE.bits()), 0);
            assert_eq!((iface.unmap)(handle), 0);

            let mut native: *mut c_void = ptr::null_mut();
            assert_eq!(
                (iface.get_native_handle)(handle, &mut native),
                Status::NotFound.code()
            );

            assert_eq!((iface.synchronize)(handle, 100), 0);

            assert_eq!((iface.release)(handle), 0);
            assert_eq!((iface.get_ref_counter)(handle, &mut count), 0);
            assert_eq!(count, 1);
            // the final release reclaims the wrapper
            assert_eq!((iface.release)(handle), 0);
        }

        assert_eq!(vpl_close(session), 0);
    }
}
