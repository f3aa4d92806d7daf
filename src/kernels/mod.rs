//! Compute kernels
//!
//! A kernel is the effect-specific part of a node: its compiled program, the
//! sockets it declares, its parameters and the uniform configuration hook.
//! The render graph only ever talks to kernels through [`ComputeKernel`].

pub mod gaussian_blur;
pub mod grayscale;
pub mod invert;
pub mod params;
pub mod passthrough;
pub mod subtract;

pub use gaussian_blur::GaussianBlur;
pub use grayscale::Grayscale;
pub use invert::Invert;
pub use params::*;
pub use passthrough::Passthrough;
pub use subtract::Subtract;

use crate::backend::*;
use crate::render_graph::{
    FullscreenPass, GraphError, GraphResult, PassExecutor, RenderTargetId, RenderTargetPool,
    SocketDescriptor, SocketValue, TargetScope, UniformSetter,
};
use std::any::Any;

/// Values gathered from a node's input sockets, in socket order
#[derive(Debug, Clone, Copy)]
pub struct KernelInputs<'a> {
    values: &'a [SocketValue],
}

impl<'a> KernelInputs<'a> {
    pub fn new(values: &'a [SocketValue]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SocketValue> {
        self.values.get(index).copied()
    }

    pub fn texture(&self, index: usize) -> Option<TextureHandle> {
        self.get(index)?.texture()
    }

    pub fn float(&self, index: usize) -> Option<f32> {
        self.get(index)?.float()
    }

    /// Every texture input, in socket order
    pub fn textures(&self) -> Vec<TextureHandle> {
        self.values.iter().filter_map(SocketValue::texture).collect()
    }
}

/// What a kernel may touch while it renders one node
pub struct KernelContext<'a, 'p> {
    backend: &'a mut dyn GraphicsBackend,
    scope: &'a mut TargetScope<'p>,
    executor: &'a PassExecutor,
    output: RenderTargetId,
    width: u32,
    height: u32,
}

impl<'a, 'p> KernelContext<'a, 'p> {
    pub fn new(
        backend: &'a mut dyn GraphicsBackend,
        scope: &'a mut TargetScope<'p>,
        executor: &'a PassExecutor,
        output: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            backend,
            scope,
            executor,
            output,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Target the node publishes its outputs from
    pub fn output(&self) -> RenderTargetId {
        self.output
    }

    pub fn backend(&mut self) -> &mut dyn GraphicsBackend {
        &mut *self.backend
    }

    pub fn pool(&self) -> &RenderTargetPool {
        self.scope.pool()
    }

    /// Acquire an intermediate target that does not alias `sampled`.
    /// It is released when the node finishes, if not earlier.
    pub fn acquire_scratch(
        &mut self,
        attachment_count: usize,
        sampled: &[TextureHandle],
    ) -> BackendResult<RenderTargetId> {
        self.scope.acquire_for_write(
            &mut *self.backend,
            self.width,
            self.height,
            attachment_count,
            sampled,
        )
    }

    /// Give an intermediate target back before the node finishes.
    /// The node's output target stays held until its consumers have run.
    pub fn release(&mut self, target: RenderTargetId) -> bool {
        if target == self.output {
            log::warn!("KernelContext: refusing to release output target {target:?}");
            return false;
        }
        self.scope.release(target)
    }

    /// Attachments of a pooled target
    pub fn attachments(&self, target: RenderTargetId) -> BackendResult<Vec<TextureHandle>> {
        self.scope
            .pool()
            .get(target)
            .map(|t| t.attachments.clone())
            .ok_or_else(|| BackendError::IncompleteRenderTarget(format!("{target:?} is not pooled")))
    }

    /// Run one full-screen pass of `program` into `target`
    pub fn run<F>(
        &mut self,
        label: &str,
        program: ProgramHandle,
        inputs: &[TextureHandle],
        target: RenderTargetId,
        configure: F,
    ) -> BackendResult<()>
    where
        F: FnOnce(&mut UniformSetter<'_>) -> BackendResult<()>,
    {
        let render_target = self
            .scope
            .pool()
            .get(target)
            .ok_or_else(|| BackendError::IncompleteRenderTarget(format!("{target:?} is not pooled")))?;
        self.executor.run(
            &mut *self.backend,
            FullscreenPass {
                label,
                program,
                inputs,
                width: self.width,
                height: self.height,
            },
            render_target,
            configure,
        )
    }
}

/// Capability every effect kernel implements.
///
/// The scheduler relies only on this trait. `outputs().len()` is the number
/// of attachments of the node's render target.
pub trait ComputeKernel: Any {
    /// Human readable kernel name, also used as the program label
    fn label(&self) -> &str;

    fn inputs(&self) -> &[SocketDescriptor];

    fn outputs(&self) -> &[SocketDescriptor];

    fn parameter_set(&self) -> Option<&ParameterSet> {
        None
    }

    fn parameter_set_mut(&mut self) -> Option<&mut ParameterSet> {
        None
    }

    /// Create the kernel's programs. Called before every execution;
    /// backends cache programs, so repeated calls are cheap.
    fn compile(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()>;

    /// Program used by the single-pass [`ComputeKernel::execute`]
    fn program(&self) -> Option<ProgramHandle>;

    /// Set every named uniform of the program, including which texture
    /// unit each logical input reads
    fn configure_uniforms(
        &self,
        uniforms: &mut UniformSetter<'_>,
        inputs: &KernelInputs<'_>,
    ) -> BackendResult<()>;

    /// Produce the node's output into `output`. The default is one pass of
    /// [`ComputeKernel::program`] over the texture inputs.
    fn execute(
        &self,
        ctx: &mut KernelContext<'_, '_>,
        inputs: &KernelInputs<'_>,
        output: RenderTargetId,
    ) -> GraphResult<()> {
        let program = self.program().ok_or_else(|| GraphError::KernelNotCompiled {
            kernel: self.label().to_string(),
        })?;
        let textures = inputs.textures();
        ctx.run(self.label(), program, &textures, output, |u| {
            self.configure_uniforms(u, inputs)
        })?;
        Ok(())
    }

    fn output_count(&self) -> usize {
        self.outputs().len()
    }

    /// Validate and apply `(name, value)` pairs
    fn set_parameters(&mut self, params: &[(&str, f32)]) -> Result<(), ParameterError> {
        let label = self.label().to_string();
        match self.parameter_set_mut() {
            Some(set) => set.apply(params),
            None => match params.first() {
                Some((name, _)) => Err(ParameterError::UnknownParameter {
                    kernel: label,
                    name: name.to_string(),
                }),
                None => Ok(()),
            },
        }
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Compile a single-output program from a kernel's fragment source
pub(crate) fn compile_program(
    backend: &mut dyn GraphicsBackend,
    label: &'static str,
    fragment_source: &'static str,
    uniforms: Vec<UniformDecl>,
) -> BackendResult<ProgramHandle> {
    backend.create_program(&ProgramDescriptor {
        label: label.into(),
        fragment_source: fragment_source.into(),
        uniforms,
        outputs: 1,
    })
}
