//! Render Graph System
//!
//! Nodes wrap compute kernels behind typed input and output sockets. The
//! graph orders them topologically, executes each one against targets taken
//! from a [`RenderTargetPool`], and returns targets to the pool once every
//! consumer of a node has run.

pub mod dependency;
pub mod error;
pub mod graph;
pub mod node;
pub mod pass;
pub mod pool;
pub mod socket;

pub use dependency::*;
pub use error::*;
pub use graph::*;
pub use node::*;
pub use pass::*;
pub use pool::*;
pub use socket::*;
