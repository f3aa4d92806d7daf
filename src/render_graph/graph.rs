//! Render graph definition and scheduling

use crate::backend::*;
use crate::kernels::ComputeKernel;
use crate::render_graph::error::*;
use crate::render_graph::node::*;
use crate::render_graph::pass::PassExecutor;
use crate::render_graph::pool::RenderTargetPool;
use crate::render_graph::socket::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// A graph of nodes built for one effect invocation.
///
/// Nodes live in an arena keyed by [`NodeId`]; sockets refer to each other
/// only by id and index, and the graph owns the link set. The source node
/// is created with the graph and republishes the seed texture.
pub struct ShaderGraph {
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeSet<Link>,
    next_id: u32,
    source: NodeId,
}

impl ShaderGraph {
    pub fn new(seed: TextureHandle) -> Self {
        let source = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(source, Node::source(source, seed));
        Self {
            nodes,
            links: BTreeSet::new(),
            next_id: 1,
            source,
        }
    }

    /// The node publishing the seed texture
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Replace the seed texture republished by the source node
    pub fn set_seed(&mut self, seed: TextureHandle) {
        if let Some(node) = self.nodes.get_mut(&self.source) {
            node.set_seed(seed);
        }
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a node running `kernel`
    pub fn add_kernel<K: ComputeKernel>(&mut self, kernel: K) -> GraphResult<NodeId> {
        self.add_boxed_kernel(Box::new(kernel))
    }

    pub fn add_boxed_kernel(&mut self, kernel: Box<dyn ComputeKernel>) -> GraphResult<NodeId> {
        let id = NodeId(self.next_id);
        let node = Node::kernel(id, kernel)?;
        self.next_id += 1;
        log::trace!("ShaderGraph: added {} as {:?}", node.label(), id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Add a node publishing a fixed float
    pub fn add_constant(&mut self, value: f32) -> NodeId {
        let id = self.allocate_id();
        self.nodes.insert(id, Node::constant(id, value));
        id
    }

    pub fn set_constant(&mut self, node: NodeId, value: f32) -> GraphResult<()> {
        let target = self.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))?;
        if target.set_constant(value) {
            Ok(())
        } else {
            Err(GraphError::KernelTypeMismatch(node))
        }
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, node: NodeId) -> GraphResult<()> {
        if node == self.source {
            return Err(GraphError::SourceNodeRemoval(node));
        }
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }

        let touching: Vec<Link> = self
            .links
            .iter()
            .filter(|l| l.from.node == node || l.to.node == node)
            .copied()
            .collect();
        for link in touching {
            self.disconnect(link.to)?;
        }

        if let Some(removed) = self.nodes.remove(&node) {
            if let Some(target) = removed.last_target {
                log::warn!("ShaderGraph: removed {:?} while it still held {:?}", node, target);
            }
        }
        Ok(())
    }

    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Look up an output socket by name
    pub fn output(&self, node: NodeId, name: &str) -> GraphResult<OutputSocketRef> {
        let index = self
            .nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .output_index(name)
            .ok_or_else(|| GraphError::UnknownSocket {
                node,
                name: name.to_string(),
            })?;
        Ok(OutputSocketRef { node, index })
    }

    /// Look up an input socket by name
    pub fn input(&self, node: NodeId, name: &str) -> GraphResult<InputSocketRef> {
        let index = self
            .nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .input_index(name)
            .ok_or_else(|| GraphError::UnknownSocket {
                node,
                name: name.to_string(),
            })?;
        Ok(InputSocketRef { node, index })
    }

    fn output_socket(&self, socket: OutputSocketRef) -> GraphResult<&OutputSocket> {
        self.nodes
            .get(&socket.node)
            .and_then(|n| n.outputs.get(socket.index))
            .ok_or(GraphError::UnknownOutput(socket))
    }

    fn input_socket(&self, socket: InputSocketRef) -> GraphResult<&InputSocket> {
        self.nodes
            .get(&socket.node)
            .and_then(|n| n.inputs.get(socket.index))
            .ok_or(GraphError::UnknownInput(socket))
    }

    /// Link an output to an input of the same type.
    ///
    /// Cycles are not rejected here; they are reported when the graph is
    /// scheduled, before any GPU work.
    pub fn connect(&mut self, from: OutputSocketRef, to: InputSocketRef) -> GraphResult<()> {
        let from_type = self.output_socket(from)?.ty;
        let input = self.input_socket(to)?;
        if input.source.is_some() {
            return Err(GraphError::InputAlreadyConnected(to));
        }
        if input.ty != from_type {
            return Err(GraphError::SocketTypeMismatch {
                from,
                from_type,
                to,
                to_type: input.ty,
            });
        }

        if let Some(node) = self.nodes.get_mut(&to.node) {
            node.inputs[to.index].source = Some(from);
        }
        if let Some(node) = self.nodes.get_mut(&from.node) {
            node.outputs[from.index].consumers.push(to);
            node.dependency.add_dependant();
        }
        self.links.insert(Link { from, to });
        log::trace!("ShaderGraph: linked {:?} -> {:?}", from, to);
        Ok(())
    }

    /// Link two sockets by name
    pub fn connect_by_name(
        &mut self,
        from: NodeId,
        output: &str,
        to: NodeId,
        input: &str,
    ) -> GraphResult<()> {
        let from = self.output(from, output)?;
        let to = self.input(to, input)?;
        self.connect(from, to)
    }

    /// Remove the link feeding `to`
    pub fn disconnect(&mut self, to: InputSocketRef) -> GraphResult<Link> {
        let from = self
            .input_socket(to)?
            .source
            .ok_or(GraphError::InputNotConnected(to))?;
        let link = Link { from, to };

        if let Some(node) = self.nodes.get_mut(&to.node) {
            node.inputs[to.index].source = None;
        }
        if let Some(node) = self.nodes.get_mut(&from.node) {
            node.outputs[from.index].consumers.retain(|c| *c != to);
            node.dependency.remove_dependant();
        }
        self.links.remove(&link);
        Ok(link)
    }

    /// Forward parameters to a node's kernel
    pub fn set_parameters(&mut self, node: NodeId, params: &[(&str, f32)]) -> GraphResult<()> {
        let target = self.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))?;
        let kernel = target.kernel_mut().ok_or(GraphError::KernelTypeMismatch(node))?;
        kernel.set_parameters(params)?;
        Ok(())
    }

    /// Typed access to a node's kernel
    pub fn kernel<T: ComputeKernel>(&self, node: NodeId) -> GraphResult<&T> {
        self.nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .kernel_ref()
            .and_then(|k| k.as_any().downcast_ref::<T>())
            .ok_or(GraphError::KernelTypeMismatch(node))
    }

    pub fn kernel_mut<T: ComputeKernel>(&mut self, node: NodeId) -> GraphResult<&mut T> {
        self.nodes
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .kernel_mut()
            .and_then(|k| k.as_any_mut().downcast_mut::<T>())
            .ok_or(GraphError::KernelTypeMismatch(node))
    }

    /// Topological order of every node (Kahn's algorithm, FIFO, ties in id order)
    pub fn execution_order(&self) -> GraphResult<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|&id| (id, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for link in &self.links {
            successors.entry(link.from.node).or_default().push(link.to.node);
            *in_degree.entry(link.to.node).or_default() += 1;
        }

        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|id| in_degree[*id] == 0)
            .copied()
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for next in successors.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(GraphError::Cycle {
                ordered: order.len(),
                total: self.nodes.len(),
            });
        }
        Ok(order)
    }

    /// Values feeding `node`, or `None` if any input has nothing to offer
    fn gather_inputs(&self, node: &Node) -> Option<Vec<SocketValue>> {
        node.inputs
            .iter()
            .map(|input| {
                let source = input.source?;
                self.nodes.get(&source.node)?.outputs.get(source.index)?.data
            })
            .collect()
    }

    /// Execute every node in topological order and return the texture of
    /// the last node that produced one.
    ///
    /// Nodes with an input that has no value are skipped and their outputs
    /// left unset; that is not an error. A node's target goes back to the
    /// pool as soon as all of its consumers have run. If any node fails,
    /// every target held by the graph is released before the error is
    /// returned.
    pub fn render_pass(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        pool: &mut RenderTargetPool,
        executor: &PassExecutor,
        width: u32,
        height: u32,
    ) -> GraphResult<Option<TextureHandle>> {
        let order = self.execution_order()?;
        log::debug!("ShaderGraph: executing {} nodes at {}x{}", order.len(), width, height);

        for node in self.nodes.values_mut() {
            node.dependency.reset();
            node.clear_outputs();
        }

        let result = self.execute(&order, backend, pool, executor, width, height);
        if result.is_err() {
            self.release_targets(pool);
            for node in self.nodes.values_mut() {
                node.dependency.reset();
            }
        }
        result
    }

    fn execute(
        &mut self,
        order: &[NodeId],
        backend: &mut dyn GraphicsBackend,
        pool: &mut RenderTargetPool,
        executor: &PassExecutor,
        width: u32,
        height: u32,
    ) -> GraphResult<Option<TextureHandle>> {
        let mut result = None;

        for &id in order {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let inputs = self.gather_inputs(node);
            let sources: Vec<NodeId> = node
                .inputs
                .iter()
                .filter_map(|i| i.source.map(|s| s.node))
                .collect();

            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            match inputs {
                Some(values) => {
                    let rendered = node.render(backend, pool, executor, width, height, &values)?;
                    if rendered.is_some() {
                        result = rendered;
                    }
                    if node.dependency.total_dependants() == 0 {
                        if let Some(target) = node.last_target.take() {
                            pool.release(target);
                        }
                    }
                }
                None => {
                    log::warn!(
                        "ShaderGraph: skipping {} ({:?}), an input has no value",
                        node.label(),
                        id
                    );
                    node.clear_outputs();
                }
            }

            for source in sources {
                let Some(producer) = self.nodes.get_mut(&source) else {
                    continue;
                };
                if producer.is_needed() {
                    if let Some(target) = producer.last_target.take() {
                        log::trace!(
                            "ShaderGraph: {:?} fully consumed, releasing {:?}",
                            source,
                            target
                        );
                        pool.release(target);
                    }
                }
            }
        }

        // The caller receives the raw texture, no consumer will claim the target
        if let Some(last) = order.last().and_then(|id| self.nodes.get_mut(id)) {
            if let Some(target) = last.last_target.take() {
                pool.release(target);
            }
        }

        Ok(result)
    }

    /// Give every target still held by a node back to the pool
    pub fn release_targets(&mut self, pool: &mut RenderTargetPool) {
        for node in self.nodes.values_mut() {
            if let Some(target) = node.last_target.take() {
                pool.release(target);
            }
        }
    }
}
