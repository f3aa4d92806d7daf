//! Typed sockets and links between nodes

use crate::backend::TextureHandle;
use crate::render_graph::node::NodeId;
use std::borrow::Cow;

/// Type carried by a socket. Only sockets of equal type can be linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    Float,
    Image,
    VectorMap,
    AngleMap,
}

impl SocketType {
    /// Whether values of this type live in a texture
    pub fn is_texture(&self) -> bool {
        !matches!(self, SocketType::Float)
    }
}

/// Value published on an output socket
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SocketValue {
    Float(f32),
    Texture(TextureHandle),
}

impl SocketValue {
    pub fn texture(&self) -> Option<TextureHandle> {
        match self {
            SocketValue::Texture(texture) => Some(*texture),
            SocketValue::Float(_) => None,
        }
    }

    pub fn float(&self) -> Option<f32> {
        match self {
            SocketValue::Float(value) => Some(*value),
            SocketValue::Texture(_) => None,
        }
    }
}

/// Static description of a socket declared by a kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketDescriptor {
    pub name: Cow<'static, str>,
    pub ty: SocketType,
}

impl SocketDescriptor {
    pub const fn new(name: &'static str, ty: SocketType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
        }
    }
}

/// Address of an output socket: owning node and output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputSocketRef {
    pub node: NodeId,
    pub index: usize,
}

/// Address of an input socket: owning node and input index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputSocketRef {
    pub node: NodeId,
    pub index: usize,
}

/// Directed connection from an output to an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    pub from: OutputSocketRef,
    pub to: InputSocketRef,
}

/// Output socket. Fan-out is unbounded.
#[derive(Debug, Clone)]
pub struct OutputSocket {
    pub name: Cow<'static, str>,
    pub ty: SocketType,
    pub(crate) data: Option<SocketValue>,
    pub(crate) consumers: Vec<InputSocketRef>,
}

impl OutputSocket {
    pub(crate) fn new(desc: &SocketDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            ty: desc.ty,
            data: None,
            consumers: Vec::new(),
        }
    }

    /// Value published by the last render of the owning node
    pub fn data(&self) -> Option<SocketValue> {
        self.data
    }

    pub fn consumers(&self) -> &[InputSocketRef] {
        &self.consumers
    }
}

/// Input socket. At most one source.
#[derive(Debug, Clone)]
pub struct InputSocket {
    pub name: Cow<'static, str>,
    pub ty: SocketType,
    pub(crate) source: Option<OutputSocketRef>,
}

impl InputSocket {
    pub(crate) fn new(desc: &SocketDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            ty: desc.ty,
            source: None,
        }
    }

    pub fn source(&self) -> Option<OutputSocketRef> {
        self.source
    }
}
