//! Frame pools: lazily growing containers of surfaces of one shape.
//!
//! A free slot is found by scanning in insertion order and atomically
//! claiming the first surface with no references and no lock. The scan takes
//! no lock of its own; a racing claim simply moves on to the next slot, so
//! two callers can never be handed the same surface.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::param::FourCc;
use crate::status::{VplError, VplResult, Warning};
use crate::surface::Surface;

/// Sentinel reported by `maximum_pool_size` under the unlimited policy.
pub const UNBOUNDED_POOL_SIZE: u32 = u32::MAX;

/// Allocation policies. Only on-demand growth is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPolicy {
    Unlimited,
}

#[derive(Debug, Clone, Copy)]
struct PoolShape {
    fourcc: FourCc,
    width: u16,
    height: u16,
}

#[derive(Debug)]
pub struct FramePool {
    shape: Option<PoolShape>,
    surfaces: RwLock<Vec<Arc<Surface>>>,
    interface: Arc<PoolInterface>,
}

impl FramePool {
    /// Shape-unaware pool: `n` empty descriptors whose buffers are attached
    /// on first shaped use.
    pub fn new(n: usize) -> Arc<FramePool> {
        FramePool::build(None, n)
    }

    /// Shape-aware pool with `n` pre-allocated surfaces.
    pub fn with_shape(fourcc: FourCc, width: u16, height: u16, n: usize) -> Arc<FramePool> {
        FramePool::build(
            Some(PoolShape {
                fourcc,
                width,
                height,
            }),
            n,
        )
    }

    fn build(shape: Option<PoolShape>, n: usize) -> Arc<FramePool> {
        Arc::new_cyclic(|weak: &Weak<FramePool>| {
            let mut surfaces = Vec::with_capacity(n);
            for _ in 0..n {
                surfaces.push(Arc::new(match shape {
                    Some(s) => Surface::with_shape(s.fourcc, s.width, s.height),
                    None => Surface::new(),
                }));
            }
            FramePool {
                shape,
                surfaces: RwLock::new(surfaces),
                interface: Arc::new(PoolInterface {
                    ref_count: AtomicU32::new(0),
                    revoked: AtomicBool::new(false),
                    pool: weak.clone(),
                }),
            }
        })
    }

    /// Return a free surface with its reference count already raised to 1,
    /// growing the pool when every slot is in use.
    pub fn get_free_surface(&self) -> VplResult<Arc<Surface>> {
        {
            let surfaces = self.surfaces.read().unwrap();
            for surface in surfaces.iter() {
                if surface.locked() == 0 && surface.try_claim() {
                    if !surface.is_allocated() {
                        if let Some(shape) = self.shape {
                            surface.allocate(shape.fourcc, shape.width, shape.height);
                        }
                    }
                    return Ok(surface.clone());
                }
            }
        }

        // no free slot, grow on demand
        let surface = Arc::new(match self.shape {
            Some(s) => Surface::with_shape(s.fourcc, s.width, s.height),
            None => Surface::new(),
        });
        if !surface.try_claim() {
            return Err(VplError::Unknown);
        }
        self.surfaces.write().unwrap().push(surface.clone());
        Ok(surface)
    }

    pub fn size(&self) -> usize {
        self.surfaces.read().unwrap().len()
    }

    /// Hand out the shared pool-interface handle, raising its reference
    /// count for the caller.
    pub fn interface(&self) -> Arc<PoolInterface> {
        self.interface.ref_count.fetch_add(1, Ordering::AcqRel);
        self.interface.clone()
    }
}

/// Refcounted handle through which a pool is shared with callers.
///
/// Releasing the last reference invalidates the handle's context: policy
/// calls made afterwards fail with `InvalidHandle`. The pool itself is owned
/// by its session and survives.
#[derive(Debug)]
pub struct PoolInterface {
    ref_count: AtomicU32,
    revoked: AtomicBool,
    pool: Weak<FramePool>,
}

impl PoolInterface {
    fn ctx(&self) -> VplResult<Arc<FramePool>> {
        if self.revoked.load(Ordering::Acquire) {
            return Err(VplError::InvalidHandle);
        }
        self.pool.upgrade().ok_or(VplError::InvalidHandle)
    }

    pub fn add_ref(&self) -> VplResult<()> {
        self.ctx()?;
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn release(&self) -> VplResult<()> {
        self.ctx()?;
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
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        if self.ref_count.load(Ordering::Acquire) == 0 {
            self.revoked.store(true, Ordering::Release);
        }
        Ok(())
    }

    pub fn ref_count(&self) -> VplResult<u32> {
        self.ctx()?;
        Ok(self.ref_count.load(Ordering::Acquire))
    }

    pub fn allocation_policy(&self) -> VplResult<AllocationPolicy> {
        self.ctx()?;
        Ok(AllocationPolicy::Unlimited)
    }

    pub fn maximum_pool_size(&self) -> VplResult<u32> {
        self.ctx()?;
        Ok(UNBOUNDED_POOL_SIZE)
    }

    pub fn current_pool_size(&self) -> VplResult<u32> {
        let pool = self.ctx()?;
        Ok(pool.size() as u32)
    }

    /// The growth policy is fixed; requesting a particular surface count is
    /// refused with a warning.
    pub fn set_num_surfaces(&self, _num: u32) -> VplResult<Warning> {
        self.ctx()?;
        Ok(Warning::IncompatibleVideoParam)
    }

    /// Surfaces are never returned to the system; see `set_num_surfaces`.
    pub fn revoke_surfaces(&self, _num: u32) -> VplResult<Warning> {
        self.ctx()?;
        Ok(Warning::IncompatibleVideoParam)
    }
}
