//! Common utilities for render graph integration tests.
//!
//! Everything here runs against the command-recording backend, so the
//! scenarios exercise scheduling and pool bookkeeping without a GPU.

#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use filter_graph::backend::{
    BackendResult, GraphicsBackend, ProgramDescriptor, ProgramHandle, RecordingBackend,
    TextureDescriptor, TextureHandle, UniformDecl, UniformType,
};
use filter_graph::kernels::{ComputeKernel, KernelContext, KernelInputs};
use filter_graph::render_graph::{
    GraphResult, PassExecutor, RenderTargetId, RenderTargetPool, SocketDescriptor, SocketType,
    UniformSetter,
};
use filter_graph::{EngineConfig, TextureFormat};

/// Install the test logger once.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Backend, pool and executor as the engine would hold them.
pub struct Harness {
    pub backend: RecordingBackend,
    pub pool: RenderTargetPool,
    pub executor: PassExecutor,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();
        let config = EngineConfig::default();
        Self {
            backend: RecordingBackend::new(),
            pool: RenderTargetPool::new(config.target_format),
            executor: PassExecutor::new(config.clear_color),
        }
    }

    /// Create a caller-owned seed texture.
    pub fn seed(&mut self, width: u32, height: u32) -> TextureHandle {
        self.backend
            .create_texture(&TextureDescriptor {
                label: Some("seed".into()),
                width,
                height,
                format: TextureFormat::Rgba8Unorm,
            })
            .unwrap()
    }

    pub fn render(
        &mut self,
        graph: &mut filter_graph::ShaderGraph,
        width: u32,
        height: u32,
    ) -> GraphResult<Option<TextureHandle>> {
        graph.render_pass(&mut self.backend, &mut self.pool, &self.executor, width, height)
    }

    /// Free and in-use sets partition every target the pool owns.
    pub fn assert_partitioned(&self) {
        assert_eq!(
            self.pool.free_count() + self.pool.in_use_count(),
            self.pool.len(),
            "every target is either free or in use"
        );
        for id in self.pool.in_use() {
            assert!(!self.pool.is_free(id), "{id:?} is both free and in use");
        }
    }
}

// ============================================================================
// Probe kernel
// ============================================================================

/// What a probe saw about one of its inputs when it executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub kernel: String,
    pub input: TextureHandle,
    /// Pool target owning the input, if the input is pooled
    pub owner: Option<RenderTargetId>,
    pub owner_in_use: bool,
}

pub type Observations = Rc<RefCell<Vec<Observation>>>;

/// How a probe misbehaves, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Failure {
    #[default]
    Healthy,
    /// Write a uniform the program does not declare
    MissingUniform,
    /// Acquire a scratch target, then fail
    AfterScratch,
    /// Try to hand the node's own output back early, then render normally
    ReleasesOutput,
}

/// Kernel with N image inputs that records pool state while it executes.
pub struct Probe {
    label: &'static str,
    inputs: Vec<SocketDescriptor>,
    outputs: Vec<SocketDescriptor>,
    program: Option<ProgramHandle>,
    observations: Observations,
    failure: Failure,
    pub scratch: Rc<RefCell<Option<RenderTargetId>>>,
    /// What the early release of the output reported
    pub output_released: Rc<RefCell<Option<bool>>>,
}

const INPUT_NAMES: [&str; 3] = ["input", "input1", "input2"];
const OUTPUT_NAMES: [&str; 3] = ["output", "output1", "output2"];

impl Probe {
    pub fn new(label: &'static str, inputs: usize, observations: &Observations) -> Self {
        Self::with_outputs(label, inputs, 1, observations)
    }

    pub fn with_outputs(
        label: &'static str,
        inputs: usize,
        outputs: usize,
        observations: &Observations,
    ) -> Self {
        Self {
            label,
            inputs: INPUT_NAMES[..inputs]
                .iter()
                .map(|n| SocketDescriptor::new(*n, SocketType::Image))
                .collect(),
            outputs: OUTPUT_NAMES[..outputs]
                .iter()
                .map(|n| SocketDescriptor::new(*n, SocketType::Image))
                .collect(),
            program: None,
            observations: observations.clone(),
            failure: Failure::Healthy,
            scratch: Rc::new(RefCell::new(None)),
            output_released: Rc::new(RefCell::new(None)),
        }
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }
}

impl ComputeKernel for Probe {
    fn label(&self) -> &str {
        self.label
    }

    fn inputs(&self) -> &[SocketDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[SocketDescriptor] {
        &self.outputs
    }

    fn compile(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        let uniforms = self
            .inputs
            .iter()
            .map(|s| UniformDecl {
                name: format!("u_{}", s.name).into(),
                ty: UniformType::Sampler,
            })
            .collect();
        self.program = Some(backend.create_program(&ProgramDescriptor {
            label: self.label.into(),
            fragment_source: "probe".into(),
            uniforms,
            outputs: self.outputs.len() as u32,
        })?);
        Ok(())
    }

    fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    fn configure_uniforms(
        &self,
        uniforms: &mut UniformSetter<'_>,
        _inputs: &KernelInputs<'_>,
    ) -> BackendResult<()> {
        for (unit, socket) in self.inputs.iter().enumerate() {
            uniforms.set_texture_unit(&format!("u_{}", socket.name), unit as u32)?;
        }
        if self.failure == Failure::MissingUniform {
            uniforms.set_float("u_missing", 1.0)?;
        }
        Ok(())
    }

    fn execute(
        &self,
        ctx: &mut KernelContext<'_, '_>,
        inputs: &KernelInputs<'_>,
        output: RenderTargetId,
    ) -> GraphResult<()> {
        for input in inputs.textures() {
            let owner = ctx.pool().owner_of(input);
            self.observations.borrow_mut().push(Observation {
                kernel: self.label.to_string(),
                input,
                owner,
                owner_in_use: owner.is_some_and(|id| ctx.pool().is_in_use(id)),
            });
        }

        if self.failure == Failure::AfterScratch {
            let scratch = ctx.acquire_scratch(1, &inputs.textures())?;
            *self.scratch.borrow_mut() = Some(scratch);
            return Err(filter_graph::backend::BackendError::IncompleteRenderTarget(
                "probe failure".into(),
            )
            .into());
        }

        if self.failure == Failure::ReleasesOutput {
            *self.output_released.borrow_mut() = Some(ctx.release(output));
        }

        let program = self.program.expect("compiled before execute");
        ctx.run(self.label, program, &inputs.textures(), output, |u| {
            self.configure_uniforms(u, inputs)
        })?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn observations() -> Observations {
    Rc::new(RefCell::new(Vec::new()))
}
