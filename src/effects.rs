//! Ready-made graphs for the effects a caller can pick

use crate::backend::TextureHandle;
use crate::kernels::{GaussianBlur, Grayscale, Invert, Subtract};
use crate::render_graph::{GraphResult, NodeId, ShaderGraph};

/// An effect selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Invert,
    Grayscale,
    GaussianBlur {
        radius: f32,
    },
    /// `blur(sigma) - tau * blur(sigma * k)`
    DifferenceOfGaussians {
        sigma: f32,
        k: f32,
        tau: f32,
    },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Invert => "Invert",
            Effect::Grayscale => "Grayscale",
            Effect::GaussianBlur { .. } => "Gaussian Blur",
            Effect::DifferenceOfGaussians { .. } => "Difference of Gaussians",
        }
    }

    pub fn difference_of_gaussians() -> Self {
        Effect::DifferenceOfGaussians {
            sigma: 1.0,
            k: 1.6,
            tau: 1.0,
        }
    }
}

/// Build the graph for `effect` over `seed`
pub fn build_graph(seed: TextureHandle, effect: Effect) -> GraphResult<ShaderGraph> {
    let mut graph = ShaderGraph::new(seed);
    let source = graph.source();

    match effect {
        Effect::Invert => {
            let node = graph.add_kernel(Invert::new())?;
            chain(&mut graph, source, node)?;
        }
        Effect::Grayscale => {
            let node = graph.add_kernel(Grayscale::new())?;
            chain(&mut graph, source, node)?;
        }
        Effect::GaussianBlur { radius } => {
            let node = graph.add_kernel(GaussianBlur::new())?;
            graph.set_parameters(node, &[("radius", radius)])?;
            chain(&mut graph, source, node)?;
        }
        Effect::DifferenceOfGaussians { sigma, k, tau } => {
            let narrow = graph.add_kernel(GaussianBlur::new())?;
            let wide = graph.add_kernel(GaussianBlur::new())?;
            let subtract = graph.add_kernel(Subtract::new())?;
            graph.set_parameters(narrow, &[("radius", sigma)])?;
            graph.set_parameters(wide, &[("radius", sigma * k)])?;
            graph.set_parameters(subtract, &[("tau", tau)])?;

            chain(&mut graph, source, narrow)?;
            chain(&mut graph, source, wide)?;
            graph.connect_by_name(narrow, "output", subtract, "a")?;
            graph.connect_by_name(wide, "output", subtract, "b")?;
        }
    }

    log::debug!("Built {} graph with {} nodes", effect.name(), graph.node_count());
    Ok(graph)
}

fn chain(graph: &mut ShaderGraph, from: NodeId, to: NodeId) -> GraphResult<()> {
    graph.connect_by_name(from, "output", to, "input")
}
