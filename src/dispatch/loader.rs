//! Loader: validates discovered candidates, queries their capabilities,
//! applies the attached filters and creates sessions against the selected
//! runtime.

use std::ffi::c_void;
use std::ptr;

use libloading::Library;

use crate::dispatch::caps::{CApiVersion, CapsFormat, CInitParam, ImplDescription};
use crate::dispatch::config::{self, Config, ConfigHandle};
use crate::dispatch::discovery::{self, Candidate};
use crate::status::{error_from_code, VplError, VplResult};
use crate::variant::Variant;

pub(crate) type QueryImplDescFn = unsafe extern "C" fn(u32) -> *const ImplDescription;
pub(crate) type ReleaseImplDescFn = unsafe extern "C" fn(*const ImplDescription) -> i32;
pub(crate) type GetSurfaceFn = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> i32;
pub(crate) type InitExFn = unsafe extern "C" fn(*const CInitParam, *mut *mut c_void) -> i32;

/// Function table every discoverable runtime must export.
#[allow(dead_code)]
struct SymbolTable {
    query_impl_description: QueryImplDescFn,
    release_impl_description: ReleaseImplDescFn,
    get_surface_for_vpp: GetSurfaceFn,
    get_surface_for_encode: GetSurfaceFn,
    get_surface_for_decode: GetSurfaceFn,
}

fn resolve_symbols(lib: &Library) -> Result<SymbolTable, libloading::Error> {
    unsafe {
        Ok(SymbolTable {
            query_impl_description: *lib.get(b"vpl_query_impl_description\0")?,
            release_impl_description: *lib.get(b"vpl_release_impl_description\0")?,
            get_surface_for_vpp: *lib.get(b"vpl_get_surface_for_vpp\0")?,
            get_surface_for_encode: *lib.get(b"vpl_get_surface_for_encode\0")?,
            get_surface_for_decode: *lib.get(b"vpl_get_surface_for_decode\0")?,
        })
    }
}

struct LoadedRuntime {
    candidate: Candidate,
    lib: Library,
    symbols: SymbolTable,
    /// Description handle and derived init parameters, cached after the
    /// first capability query.
    desc: Option<*const ImplDescription>,
    init_par: Option<CInitParam>,
}

/// Opaque handle to a runtime's capability description.
#[derive(Debug, Clone, Copy)]
pub struct ImplDescHandle {
    ptr: *const ImplDescription,
}

impl ImplDescHandle {
    /// The description behind the handle. Valid until the handle is
    /// released or the loader is unloaded.
    pub fn description(&self) -> &ImplDescription {
        unsafe { &*self.ptr }
    }
}

/// A session created inside a loaded runtime. The loader keeps the backing
/// library alive for as long as it exists.
#[derive(Debug)]
pub struct RuntimeSession {
    raw: *mut c_void,
    library_index: u32,
}

impl RuntimeSession {
    pub fn raw(&self) -> *mut c_void {
        self.raw
    }

    pub fn library_index(&self) -> u32 {
        self.library_index
    }
}

pub struct Loader {
    runtimes: Vec<LoadedRuntime>,
    configs: Vec<Config>,
}

impl Loader {
    /// Discover and validate candidate runtimes. Fails with `NotFound` when
    /// no directory yields a library with the full symbol table.
    pub fn load() -> VplResult<Loader> {
        Loader::from_candidates(discovery::build_candidate_list())
    }

    pub(crate) fn from_candidates(candidates: Vec<Candidate>) -> VplResult<Loader> {
        let mut runtimes = Vec::new();
        for candidate in candidates {
            let lib = match unsafe { Library::new(&candidate.path) } {
                Ok(lib) => lib,
                Err(e) => {
                    log::debug!("dispatch: cannot load {:?}: {e}", candidate.path);
                    continue;
                }
            };
            match resolve_symbols(&lib) {
                Ok(symbols) => runtimes.push(LoadedRuntime {
                    candidate,
                    lib,
                    symbols,
                    desc: None,
                    init_par: None,
                }),
                Err(e) => {
                    // missing symbol: not a runtime, unload and move on
                    log::debug!("dispatch: {:?} misses a symbol: {e}", candidate.path);
                    drop(lib);
                }
            }
        }
        if runtimes.is_empty() {
            return Err(VplError::NotFound);
        }
        Ok(Loader {
            runtimes,
            configs: Vec::new(),
        })
    }

    pub fn candidate_paths(&self) -> Vec<&std::path::Path> {
        self.runtimes
            .iter()
            .map(|rt| rt.candidate.path.as_path())
            .collect()
    }

    // --- configs ------------------------------------------------------------

    pub fn create_config(&mut self) -> ConfigHandle {
        self.configs.push(Config::new());
        ConfigHandle(self.configs.len() - 1)
    }

    pub fn set_config_property(
        &mut self,
        cfg: ConfigHandle,
        name: &str,
        value: Variant,
    ) -> VplResult<()> {
        self.configs
            .get_mut(cfg.0)
            .ok_or(VplError::InvalidHandle)?
            .set_property(name, value)
    }

    // --- capability query and filtering -------------------------------------

    fn ensure_desc(&mut self, pos: usize) -> VplResult<*const ImplDescription> {
        if self.runtimes[pos].desc.is_none() {
            let rt = &mut self.runtimes[pos];
            let desc =
                unsafe { (rt.symbols.query_impl_description)(CapsFormat::ImplDescStructure as u32) };
            if desc.is_null() {
                return Err(VplError::Unsupported);
            }
            let d = unsafe { &*desc };
            rt.init_par = Some(CInitParam {
                impl_type: d.impl_type,
                version: CApiVersion {
                    major: d.api_version.major,
                    minor: d.api_version.minor,
                },
                external_threads: 0,
            });
            rt.desc = Some(desc);
        }
        Ok(self.runtimes[pos].desc.unwrap())
    }

    /// Positions of the runtimes that pass every attached config, in
    /// priority-then-discovery order.
    fn visible(&mut self) -> VplResult<Vec<usize>> {
        let mut out = Vec::new();
        for pos in 0..self.runtimes.len() {
            let desc = match self.ensure_desc(pos) {
                Ok(desc) => desc,
                // a candidate without a queryable description stays hidden
                Err(_) => continue,
            };
            if config::passes(unsafe { &*desc }, &self.configs)? {
                out.push(pos);
            }
        }
        Ok(out)
    }

    /// Number of implementations visible after filtering.
    pub fn implementation_count(&mut self) -> VplResult<usize> {
        Ok(self.visible()?.len())
    }

    /// Query the capability description of the `i`-th visible
    /// implementation.
    pub fn enum_implementations(
        &mut self,
        i: u32,
        format: CapsFormat,
    ) -> VplResult<ImplDescHandle> {
        if format != CapsFormat::ImplDescStructure {
            return Err(VplError::Unsupported);
        }
        let visible = self.visible()?;
        let pos = *visible.get(i as usize).ok_or(VplError::NotFound)?;
        let ptr = self.ensure_desc(pos)?;
        Ok(ImplDescHandle { ptr })
    }

    /// Create a session against the `i`-th visible implementation using the
    /// parameters recorded from its capability description.
    pub fn create_session(&mut self, i: u32) -> VplResult<RuntimeSession> {
        let visible = self.visible()?;
        let pos = *visible.get(i as usize).ok_or(VplError::NotFound)?;
        self.ensure_desc(pos)?;

        let rt = &self.runtimes[pos];
        let init_ex: InitExFn = unsafe {
            *rt.lib
                .get(b"vpl_init_ex\0")
                .map_err(|_| VplError::NotFound)?
        };
        let par = rt.init_par.unwrap();
        let mut raw: *mut c_void = ptr::null_mut();
        let code = unsafe { init_ex(&par, &mut raw) };
        if code < 0 || raw.is_null() {
            return Err(error_from_code(code).unwrap_or(VplError::Unknown));
        }
        Ok(RuntimeSession {
            raw,
            library_index: pos as u32,
        })
    }

    /// Release a description handle, dispatching to the runtime it came
    /// from (located by handle identity).
    pub fn release_impl_description(&mut self, handle: ImplDescHandle) -> VplResult<()> {
        for rt in &mut self.runtimes {
            if rt.desc == Some(handle.ptr) {
                let code = unsafe { (rt.symbols.release_impl_description)(handle.ptr) };
                rt.desc = None;
                return match error_from_code(code) {
                    Some(err) => Err(err),
                    None => Ok(()),
                };
            }
        }
        Err(VplError::InvalidHandle)
    }

    /// Unload every library and free the configs.
    pub fn unload(self) {
        // dropping the runtimes closes the libraries
    }
}
