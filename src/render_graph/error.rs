//! Render graph errors

use crate::backend::BackendError;
use crate::kernels::ParameterError;
use crate::render_graph::node::NodeId;
use crate::render_graph::socket::{InputSocketRef, OutputSocketRef, SocketType};
use thiserror::Error;

/// Errors raised while building or executing a graph
///
/// Structural errors are raised while editing the graph or before any GPU
/// work is issued. Backend errors abort the pass that produced them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Graph contains a cycle ({ordered} of {total} nodes could be ordered)")]
    Cycle { ordered: usize, total: usize },
    #[error("Cannot connect {from_type:?} output {from:?} to {to_type:?} input {to:?}")]
    SocketTypeMismatch {
        from: OutputSocketRef,
        from_type: SocketType,
        to: InputSocketRef,
        to_type: SocketType,
    },
    #[error("Input {0:?} is already connected")]
    InputAlreadyConnected(InputSocketRef),
    #[error("Input {0:?} is not connected")]
    InputNotConnected(InputSocketRef),
    #[error("Node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("Node {node:?} has no socket `{name}`")]
    UnknownSocket { node: NodeId, name: String },
    #[error("Output {0:?} does not exist")]
    UnknownOutput(OutputSocketRef),
    #[error("Input {0:?} does not exist")]
    UnknownInput(InputSocketRef),
    #[error("Node {0:?} is the graph source and cannot be removed")]
    SourceNodeRemoval(NodeId),
    #[error("Node {0:?} does not run a kernel of the requested type")]
    KernelTypeMismatch(NodeId),
    #[error("Input {input} of kernel `{kernel}` expected a {expected:?} value")]
    InputValueMismatch {
        kernel: String,
        input: usize,
        expected: SocketType,
    },
    #[error("Kernel `{kernel}` has unusable outputs: {reason}")]
    InvalidKernelOutputs { kernel: String, reason: String },
    #[error("Kernel `{kernel}` was executed before it was compiled")]
    KernelNotCompiled { kernel: String },
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type GraphResult<T> = Result<T, GraphError>;
