//! Main engine orchestrator

use crate::backend::*;
use crate::effects::{self, Effect};
use crate::render_graph::{GraphResult, PassExecutor, RenderTargetPool, ShaderGraph};
use crate::EngineConfig;

/// Long-lived owner of the backend, the render target pool and the pass
/// executor.
///
/// Graphs are built per effect invocation and handed to [`FilterEngine::render`]
/// or [`FilterEngine::apply`]; the pool persists across invocations until
/// [`FilterEngine::reset_session`] is called.
pub struct FilterEngine<B: GraphicsBackend> {
    backend: B,
    pool: RenderTargetPool,
    executor: PassExecutor,
    config: EngineConfig,
}

#[cfg(feature = "wgpu-backend")]
impl FilterEngine<WgpuBackend> {
    /// Create an engine on a headless wgpu device
    pub fn headless(config: EngineConfig) -> BackendResult<Self> {
        let backend = WgpuBackend::new(&config)?;
        Ok(Self::new(backend, config))
    }
}

impl<B: GraphicsBackend> FilterEngine<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        log::info!(
            "Filter engine on {} backend, targets {:?}",
            backend.name(),
            config.target_format
        );
        Self {
            backend,
            pool: RenderTargetPool::new(config.target_format),
            executor: PassExecutor::new(config.clear_color),
            config,
        }
    }

    /// Create a texture holding `pixels`, tightly packed in the configured
    /// target format. The caller owns it.
    pub fn upload_seed(
        &mut self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> BackendResult<TextureHandle> {
        let texture = self.backend.create_texture(&TextureDescriptor {
            label: Some("seed".into()),
            width,
            height,
            format: self.config.target_format,
        })?;
        if let Err(e) = self.backend.write_texture(texture, pixels) {
            self.backend.destroy_texture(texture);
            return Err(e);
        }
        Ok(texture)
    }

    /// Run one pass of `graph`
    pub fn render(
        &mut self,
        graph: &mut ShaderGraph,
        width: u32,
        height: u32,
    ) -> GraphResult<Option<TextureHandle>> {
        graph.render_pass(&mut self.backend, &mut self.pool, &self.executor, width, height)
    }

    /// Run one pass of a per-invocation graph and discard it
    pub fn apply(
        &mut self,
        mut graph: ShaderGraph,
        width: u32,
        height: u32,
    ) -> GraphResult<Option<TextureHandle>> {
        self.render(&mut graph, width, height)
    }

    /// Build the graph for `effect` over `seed` and apply it
    pub fn apply_effect(
        &mut self,
        seed: TextureHandle,
        effect: Effect,
        width: u32,
        height: u32,
    ) -> GraphResult<Option<TextureHandle>> {
        let graph = effects::build_graph(seed, effect)?;
        self.apply(graph, width, height)
    }

    /// Drop every pooled target, e.g. when the source image changes
    pub fn reset_session(&mut self) {
        self.pool.reset(&mut self.backend);
    }

    /// Destroy a caller-owned texture such as a seed
    pub fn destroy_texture(&mut self, texture: TextureHandle) {
        self.backend.destroy_texture(texture);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    pub fn executor(&self) -> &PassExecutor {
        &self.executor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
