//! Render graph nodes

use crate::backend::*;
use crate::kernels::{ComputeKernel, KernelContext, KernelInputs};
use crate::render_graph::dependency::DependencyResolver;
use crate::render_graph::error::*;
use crate::render_graph::pass::PassExecutor;
use crate::render_graph::pool::{RenderTargetId, RenderTargetPool, TargetScope};
use crate::render_graph::socket::*;

/// Unique identifier for a node within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

const SOURCE_OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("output", SocketType::Image)];
const CONSTANT_OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("value", SocketType::Float)];

/// What a node does when it renders
pub enum NodeKind {
    /// Republishes the externally supplied seed texture
    Source { texture: TextureHandle },
    /// Publishes a fixed float
    Constant { value: f32 },
    Kernel(Box<dyn ComputeKernel>),
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Source { texture } => f.debug_struct("Source").field("texture", texture).finish(),
            NodeKind::Constant { value } => f.debug_struct("Constant").field("value", value).finish(),
            NodeKind::Kernel(kernel) => f.debug_tuple("Kernel").field(&kernel.label()).finish(),
        }
    }
}

/// A node of the graph
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    pub(crate) inputs: Vec<InputSocket>,
    pub(crate) outputs: Vec<OutputSocket>,
    pub(crate) last_target: Option<RenderTargetId>,
    pub(crate) dependency: DependencyResolver,
}

impl Node {
    pub(crate) fn source(id: NodeId, texture: TextureHandle) -> Self {
        Self::with_sockets(id, NodeKind::Source { texture }, &[], SOURCE_OUTPUTS)
    }

    pub(crate) fn constant(id: NodeId, value: f32) -> Self {
        Self::with_sockets(id, NodeKind::Constant { value }, &[], CONSTANT_OUTPUTS)
    }

    pub(crate) fn kernel(id: NodeId, kernel: Box<dyn ComputeKernel>) -> GraphResult<Self> {
        let outputs = kernel.outputs();
        let invalid = |reason: String| GraphError::InvalidKernelOutputs {
            kernel: kernel.label().to_string(),
            reason,
        };
        if outputs.is_empty() || outputs.len() > MAX_COLOR_ATTACHMENTS {
            return Err(invalid(format!(
                "{} outputs, expected 1..={MAX_COLOR_ATTACHMENTS}",
                outputs.len()
            )));
        }
        if let Some(output) = outputs.iter().find(|o| !o.ty.is_texture()) {
            return Err(invalid(format!("`{}` is not an image-like socket", output.name)));
        }

        let inputs = kernel.inputs().to_vec();
        let outputs = kernel.outputs().to_vec();
        Ok(Self::with_sockets(id, NodeKind::Kernel(kernel), &inputs, &outputs))
    }

    fn with_sockets(
        id: NodeId,
        kind: NodeKind,
        inputs: &[SocketDescriptor],
        outputs: &[SocketDescriptor],
    ) -> Self {
        Self {
            id,
            kind,
            inputs: inputs.iter().map(InputSocket::new).collect(),
            outputs: outputs.iter().map(OutputSocket::new).collect(),
            last_target: None,
            dependency: DependencyResolver::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn label(&self) -> &str {
        match &self.kind {
            NodeKind::Source { .. } => "Source",
            NodeKind::Constant { .. } => "Constant",
            NodeKind::Kernel(kernel) => kernel.label(),
        }
    }

    pub fn inputs(&self) -> &[InputSocket] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSocket] {
        &self.outputs
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }

    /// Target holding this node's outputs, while it is held
    pub fn last_target(&self) -> Option<RenderTargetId> {
        self.last_target
    }

    pub fn dependency(&self) -> &DependencyResolver {
        &self.dependency
    }

    /// Called once by each consumer after it ran
    pub fn is_needed(&mut self) -> bool {
        self.dependency.is_resolved()
    }

    pub fn kernel_ref(&self) -> Option<&dyn ComputeKernel> {
        match &self.kind {
            NodeKind::Kernel(kernel) => Some(kernel.as_ref()),
            _ => None,
        }
    }

    pub fn kernel_mut(&mut self) -> Option<&mut dyn ComputeKernel> {
        match &mut self.kind {
            NodeKind::Kernel(kernel) => Some(kernel.as_mut()),
            _ => None,
        }
    }

    pub(crate) fn set_seed(&mut self, seed: TextureHandle) {
        if let NodeKind::Source { texture } = &mut self.kind {
            *texture = seed;
        }
    }

    pub(crate) fn set_constant(&mut self, new_value: f32) -> bool {
        match &mut self.kind {
            NodeKind::Constant { value } => {
                *value = new_value;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn clear_outputs(&mut self) {
        for output in &mut self.outputs {
            output.data = None;
        }
    }

    /// Render this node and publish its outputs.
    ///
    /// Returns the texture on the first output if the node rendered one.
    /// Source and constant nodes only publish and return `None`, so a pass
    /// never hands the seed back as its result. A kernel node runs its whole
    /// pass sequence inside a [`TargetScope`], so anything it acquired is
    /// back in the pool if it fails.
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        pool: &mut RenderTargetPool,
        executor: &PassExecutor,
        width: u32,
        height: u32,
        inputs: &[SocketValue],
    ) -> GraphResult<Option<TextureHandle>> {
        match &mut self.kind {
            NodeKind::Source { texture } => {
                let texture = *texture;
                self.outputs[0].data = Some(SocketValue::Texture(texture));
                Ok(None)
            }
            NodeKind::Constant { value } => {
                self.outputs[0].data = Some(SocketValue::Float(*value));
                Ok(None)
            }
            NodeKind::Kernel(kernel) => {
                for (index, (socket, value)) in self.inputs.iter().zip(inputs).enumerate() {
                    if socket.ty.is_texture() != value.texture().is_some() {
                        return Err(GraphError::InputValueMismatch {
                            kernel: kernel.label().to_string(),
                            input: index,
                            expected: socket.ty,
                        });
                    }
                }

                kernel.compile(backend)?;
                let sampled: Vec<TextureHandle> =
                    inputs.iter().filter_map(SocketValue::texture).collect();
                let attachment_count = self.outputs.len();

                let output = {
                    let mut scope = TargetScope::new(pool);
                    let output = if sampled.is_empty() {
                        scope.acquire_for_read(backend, width, height, attachment_count)?
                    } else {
                        scope.acquire_for_write(backend, width, height, attachment_count, &sampled)?
                    };
                    {
                        let mut ctx = KernelContext::new(
                            backend, &mut scope, executor, output, width, height,
                        );
                        kernel.execute(&mut ctx, &KernelInputs::new(inputs), output)?;
                    }
                    scope.keep(output);
                    output
                };

                if let Some(previous) = self.last_target.replace(output) {
                    pool.release(previous);
                }

                let attachments = pool
                    .get(output)
                    .map(|t| t.attachments.clone())
                    .unwrap_or_default();
                for (socket, texture) in self.outputs.iter_mut().zip(&attachments) {
                    socket.data = Some(SocketValue::Texture(*texture));
                }
                log::trace!("{} ({:?}) rendered into {:?}", kernel.label(), self.id, output);
                Ok(attachments.first().copied())
            }
        }
    }
}
