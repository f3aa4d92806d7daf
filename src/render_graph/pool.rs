//! Render targets and the pool that recycles them

use crate::backend::*;
use std::collections::BTreeSet;

/// Unique identifier for a pooled render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetId(pub(crate) u32);

/// A framebuffer with N same-sized colour attachments.
///
/// The shape is fixed at construction. Targets are owned by the pool and
/// only ever referenced by id from outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    pub width: u32,
    pub height: u32,
    pub framebuffer: FramebufferHandle,
    pub attachments: Vec<TextureHandle>,
}

impl RenderTarget {
    fn allocate(
        backend: &mut dyn GraphicsBackend,
        id: RenderTargetId,
        width: u32,
        height: u32,
        attachment_count: usize,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let mut attachments = Vec::with_capacity(attachment_count);
        for index in 0..attachment_count {
            let created = backend.create_texture(&TextureDescriptor {
                label: Some(format!("render target {} attachment {}", id.0, index)),
                width,
                height,
                format,
            });
            match created {
                Ok(texture) => attachments.push(texture),
                Err(e) => {
                    attachments.into_iter().for_each(|t| backend.destroy_texture(t));
                    return Err(e);
                }
            }
        }

        let label = format!("render target {}", id.0);
        let framebuffer = match backend.create_framebuffer(&label, &attachments) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                attachments.into_iter().for_each(|t| backend.destroy_texture(t));
                return Err(e);
            }
        };

        Ok(Self {
            id,
            width,
            height,
            framebuffer,
            attachments,
        })
    }

    fn matches(&self, width: u32, height: u32, attachment_count: usize) -> bool {
        self.width == width && self.height == height && self.attachments.len() == attachment_count
    }

    fn samples_any(&self, textures: &[TextureHandle]) -> bool {
        self.attachments.iter().any(|t| textures.contains(t))
    }

    /// Make this target the draw destination
    pub fn bind(&self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        backend.bind_render_target(self.framebuffer)
    }

    /// Restore the default draw destination
    pub fn unbind(&self, backend: &mut dyn GraphicsBackend) {
        backend.unbind_render_target();
    }

    fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_framebuffer(self.framebuffer);
        for texture in self.attachments {
            backend.destroy_texture(texture);
        }
    }
}

/// Counters describing how the pool satisfied requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocations: usize,
    pub reuses: usize,
    pub misuse_releases: usize,
}

/// Long-lived set of render targets, partitioned into free and in-use.
///
/// Requests are satisfied by shape: the first free target (in id order)
/// with the requested size and attachment count is reused, otherwise a new
/// one is allocated. Between calls every target is in exactly one of the
/// two sets.
pub struct RenderTargetPool {
    all: Vec<RenderTarget>,
    free: BTreeSet<RenderTargetId>,
    in_use: BTreeSet<RenderTargetId>,
    format: TextureFormat,
    next_id: u32,
    stats: PoolStats,
}

impl RenderTargetPool {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            all: Vec::new(),
            free: BTreeSet::new(),
            in_use: BTreeSet::new(),
            format,
            next_id: 0,
            stats: PoolStats::default(),
        }
    }

    /// Acquire any target of the given shape
    pub fn acquire_for_read(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        attachment_count: usize,
    ) -> BackendResult<RenderTargetId> {
        self.acquire(backend, width, height, attachment_count, &[])
    }

    /// Acquire a target of the given shape that does not hold any of
    /// `excluded` among its attachments
    pub fn acquire_for_write(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        attachment_count: usize,
        excluded: &[TextureHandle],
    ) -> BackendResult<RenderTargetId> {
        self.acquire(backend, width, height, attachment_count, excluded)
    }

    fn acquire(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        attachment_count: usize,
        excluded: &[TextureHandle],
    ) -> BackendResult<RenderTargetId> {
        let candidate = self.free.iter().copied().find(|id| {
            self.get(*id)
                .is_some_and(|t| t.matches(width, height, attachment_count) && !t.samples_any(excluded))
        });

        if let Some(id) = candidate {
            self.free.remove(&id);
            self.in_use.insert(id);
            self.stats.reuses += 1;
            log::trace!("RenderTargetPool: reusing {:?} ({}x{}x{})", id, width, height, attachment_count);
            return Ok(id);
        }

        let id = RenderTargetId(self.next_id);
        let target = RenderTarget::allocate(backend, id, width, height, attachment_count, self.format)?;
        self.next_id += 1;
        self.all.push(target);
        self.in_use.insert(id);
        self.stats.allocations += 1;
        log::debug!(
            "RenderTargetPool: allocated {:?} ({}x{}x{}), {} targets total",
            id,
            width,
            height,
            attachment_count,
            self.all.len()
        );
        Ok(id)
    }

    /// Return a target to the free set. Releasing a target that is not in
    /// use is logged and ignored; the return value says whether anything moved.
    pub fn release(&mut self, id: RenderTargetId) -> bool {
        if self.in_use.remove(&id) {
            self.free.insert(id);
            log::trace!("RenderTargetPool: released {:?}", id);
            true
        } else {
            self.stats.misuse_releases += 1;
            log::warn!("RenderTargetPool: release of {:?} which is not in use", id);
            false
        }
    }

    /// Destroy every target. Only valid between passes.
    pub fn reset(&mut self, backend: &mut dyn GraphicsBackend) {
        if !self.in_use.is_empty() {
            log::warn!(
                "RenderTargetPool: reset with {} targets still in use",
                self.in_use.len()
            );
        }
        log::debug!("RenderTargetPool: destroying {} targets", self.all.len());
        for target in self.all.drain(..) {
            target.destroy(backend);
        }
        self.free.clear();
        self.in_use.clear();
    }

    pub fn get(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.all.iter().find(|t| t.id == id)
    }

    /// Find the target that owns `texture` as one of its attachments
    pub fn owner_of(&self, texture: TextureHandle) -> Option<RenderTargetId> {
        self.all
            .iter()
            .find(|t| t.attachments.contains(&texture))
            .map(|t| t.id)
    }

    pub fn is_in_use(&self, id: RenderTargetId) -> bool {
        self.in_use.contains(&id)
    }

    pub fn is_free(&self, id: RenderTargetId) -> bool {
        self.free.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn in_use(&self) -> impl Iterator<Item = RenderTargetId> + '_ {
        self.in_use.iter().copied()
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

/// Scoped acquisition over a pool.
///
/// Every target acquired through the scope goes back to the pool when the
/// scope is dropped, on success, error and unwind alike, unless it was
/// handed out with [`TargetScope::keep`].
pub struct TargetScope<'a> {
    pool: &'a mut RenderTargetPool,
    acquired: Vec<RenderTargetId>,
}

impl<'a> TargetScope<'a> {
    pub fn new(pool: &'a mut RenderTargetPool) -> Self {
        Self {
            pool,
            acquired: Vec::new(),
        }
    }

    pub fn acquire_for_read(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        attachment_count: usize,
    ) -> BackendResult<RenderTargetId> {
        let id = self.pool.acquire_for_read(backend, width, height, attachment_count)?;
        self.acquired.push(id);
        Ok(id)
    }

    pub fn acquire_for_write(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
        attachment_count: usize,
        excluded: &[TextureHandle],
    ) -> BackendResult<RenderTargetId> {
        let id = self
            .pool
            .acquire_for_write(backend, width, height, attachment_count, excluded)?;
        self.acquired.push(id);
        Ok(id)
    }

    /// Release a target acquired through this scope before the scope ends
    pub fn release(&mut self, id: RenderTargetId) -> bool {
        match self.acquired.iter().position(|a| *a == id) {
            Some(index) => {
                self.acquired.swap_remove(index);
                self.pool.release(id)
            }
            None => false,
        }
    }

    /// Take `id` out of the scope so it outlives it
    pub fn keep(&mut self, id: RenderTargetId) {
        self.acquired.retain(|a| *a != id);
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &*self.pool
    }
}

impl Drop for TargetScope<'_> {
    fn drop(&mut self) {
        for id in self.acquired.drain(..) {
            self.pool.release(id);
        }
    }
}
