//! Scheduling and pool scenarios run end to end on the recording backend.

mod common;

use std::any::Any;

use common::{observations, Failure, Harness, Probe};
use filter_graph::backend::recording::Command;
use filter_graph::backend::{
    BackendError, BackendResult, GraphicsBackend, ProgramDescriptor, ProgramHandle, UniformDecl,
    UniformType, UniformValue,
};
use filter_graph::effects::{self, Effect};
use filter_graph::kernels::{ComputeKernel, GaussianBlur, KernelInputs, Passthrough};
use filter_graph::render_graph::{
    GraphError, ShaderGraph, SocketDescriptor, SocketType, UniformSetter,
};
use rstest::rstest;

/// Scales its image by a float wired from another node
#[derive(Default)]
struct Scale {
    program: Option<ProgramHandle>,
}

const SCALE_INPUTS: &[SocketDescriptor] = &[
    SocketDescriptor::new("input", SocketType::Image),
    SocketDescriptor::new("factor", SocketType::Float),
];
const SCALE_OUTPUTS: &[SocketDescriptor] = &[SocketDescriptor::new("output", SocketType::Image)];

impl ComputeKernel for Scale {
    fn label(&self) -> &str {
        "Scale"
    }

    fn inputs(&self) -> &[SocketDescriptor] {
        SCALE_INPUTS
    }

    fn outputs(&self) -> &[SocketDescriptor] {
        SCALE_OUTPUTS
    }

    fn compile(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        self.program = Some(backend.create_program(&ProgramDescriptor {
            label: "Scale".into(),
            fragment_source: "scale".into(),
            uniforms: vec![
                UniformDecl::new("u_image", UniformType::Sampler),
                UniformDecl::new("u_factor", UniformType::Float),
            ],
            outputs: 1,
        })?);
        Ok(())
    }

    fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    fn configure_uniforms(
        &self,
        uniforms: &mut UniformSetter<'_>,
        inputs: &KernelInputs<'_>,
    ) -> BackendResult<()> {
        uniforms.set_texture_unit("u_image", 0)?;
        uniforms.set_float("u_factor", inputs.float(1).unwrap_or(1.0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Pool invariants
// ============================================================================

#[test]
fn test_pool_partition_holds_across_acquire_release() {
    let mut h = Harness::new();
    let mut held = Vec::new();

    for step in 0..40u32 {
        if step % 3 == 2 {
            if let Some(id) = held.pop() {
                assert!(h.pool.release(id));
            }
        } else {
            let count = 1 + (step % 2) as usize;
            let id = h
                .pool
                .acquire_for_read(&mut h.backend, 4, 4, count)
                .unwrap();
            held.push(id);
        }
        h.assert_partitioned();
    }

    // Releasing twice is a logged no-op
    let id = held[0];
    assert!(h.pool.release(id));
    assert!(!h.pool.release(id));
    h.assert_partitioned();
    assert_eq!(h.pool.stats().misuse_releases, 1);
}

#[test]
fn test_write_target_never_aliases_excluded() {
    let mut h = Harness::new();
    let first = h.pool.acquire_for_read(&mut h.backend, 2, 2, 1).unwrap();
    let second = h.pool.acquire_for_read(&mut h.backend, 2, 2, 1).unwrap();
    h.pool.release(first);
    h.pool.release(second);

    let excluded = h.pool.get(first).unwrap().attachments.clone();
    let chosen = h
        .pool
        .acquire_for_write(&mut h.backend, 2, 2, 1, &excluded)
        .unwrap();
    assert_eq!(chosen, second);

    let all: Vec<_> = [first, second]
        .iter()
        .flat_map(|id| h.pool.get(*id).unwrap().attachments.clone())
        .collect();
    let fresh = h
        .pool
        .acquire_for_write(&mut h.backend, 2, 2, 1, &all)
        .unwrap();
    let attachments = &h.pool.get(fresh).unwrap().attachments;
    assert!(attachments.iter().all(|t| !all.contains(t)));
    assert_eq!(h.pool.len(), 3);
}

#[test]
fn test_pool_reuses_one_target_per_shape() {
    let mut h = Harness::new();
    for _ in 0..100 {
        let id = h.pool.acquire_for_read(&mut h.backend, 2, 2, 1).unwrap();
        h.pool.release(id);
    }
    assert_eq!(h.pool.len(), 1);
    assert_eq!(h.pool.stats().allocations, 1);
    assert_eq!(h.pool.stats().reuses, 99);
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_execution_order_respects_links() {
    let obs = observations();
    let mut graph = ShaderGraph::new(Harness::new().seed(4, 4));
    let source = graph.source();
    // Ids are handed out against data flow
    let c = graph.add_kernel(Probe::new("c", 1, &obs)).unwrap();
    let b = graph.add_kernel(Probe::new("b", 1, &obs)).unwrap();
    let a = graph.add_kernel(Probe::new("a", 1, &obs)).unwrap();
    graph.connect_by_name(source, "output", a, "input").unwrap();
    graph.connect_by_name(a, "output", b, "input").unwrap();
    graph.connect_by_name(b, "output", c, "input").unwrap();

    let order = graph.execution_order().unwrap();
    assert_eq!(order, vec![source, a, b, c]);
    for link in graph.links() {
        let from = order.iter().position(|n| *n == link.from.node).unwrap();
        let to = order.iter().position(|n| *n == link.to.node).unwrap();
        assert!(from < to, "{link:?} runs out of order");
    }
}

#[test]
fn test_dog_order_runs_blurs_before_subtract() {
    let mut h = Harness::new();
    let seed = h.seed(8, 8);
    let graph = effects::build_graph(seed, Effect::difference_of_gaussians()).unwrap();
    let order = graph.execution_order().unwrap();
    for link in graph.links() {
        let from = order.iter().position(|n| *n == link.from.node).unwrap();
        let to = order.iter().position(|n| *n == link.to.node).unwrap();
        assert!(from < to);
    }
}

#[test]
fn test_cycle_fails_before_any_draw() {
    let mut h = Harness::new();
    let obs = observations();
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let a = graph.add_kernel(Probe::new("a", 1, &obs)).unwrap();
    let b = graph.add_kernel(Probe::new("b", 1, &obs)).unwrap();
    graph.connect_by_name(a, "output", b, "input").unwrap();
    graph.connect_by_name(b, "output", a, "input").unwrap();

    let err = h.render(&mut graph, 4, 4).unwrap_err();
    assert_eq!(err, GraphError::Cycle { ordered: 1, total: 3 });
    assert_eq!(h.backend.draw_count(), 0);
    assert!(h.pool.is_empty());
}

#[test]
fn test_fan_out_keeps_producer_until_last_consumer() {
    let mut h = Harness::new();
    let obs = observations();
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let source = graph.source();
    let a = graph.add_kernel(Probe::new("a", 1, &obs)).unwrap();
    let b = graph.add_kernel(Probe::new("b", 1, &obs)).unwrap();
    let c = graph.add_kernel(Probe::new("c", 1, &obs)).unwrap();
    graph.connect_by_name(source, "output", a, "input").unwrap();
    graph.connect_by_name(a, "output", b, "input").unwrap();
    graph.connect_by_name(a, "output", c, "input").unwrap();

    let result = h.render(&mut graph, 4, 4).unwrap();
    assert!(result.is_some());

    let seen = obs.borrow();
    let from_a: Vec<_> = seen.iter().filter(|o| o.kernel != "a").collect();
    assert_eq!(from_a.len(), 2);
    assert_eq!(from_a[0].kernel, "b");
    assert_eq!(from_a[1].kernel, "c");
    // After b ran, a's target is still held for c
    assert!(from_a[1].owner_in_use);
    let owner = from_a[1].owner.unwrap();
    assert!(h.pool.is_free(owner));
    assert_eq!(h.pool.in_use_count(), 0);
    h.assert_partitioned();
}

#[test]
fn test_identity_pass_returns_new_texture() {
    let mut h = Harness::new();
    let seed = h.seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let passthrough = graph.add_kernel(Passthrough::new()).unwrap();
    graph
        .connect_by_name(graph.source(), "output", passthrough, "input")
        .unwrap();

    let result = h.render(&mut graph, 4, 4).unwrap().unwrap();
    assert_ne!(result, seed);
    assert_eq!(h.backend.draw_count(), 1);
    assert_eq!(h.pool.owner_of(seed), None);
    assert_eq!(h.pool.in_use_count(), 0);
    assert!(graph.node(graph.source()).unwrap().last_target().is_none());

    let draw = h.backend.draws().next().unwrap();
    assert_eq!(draw.sampled, vec![seed]);
    assert_eq!(draw.written, vec![result]);
}

#[test]
fn test_unconnected_input_skips_node() {
    let mut h = Harness::new();
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let passthrough = graph.add_kernel(Passthrough::new()).unwrap();

    assert_eq!(h.render(&mut graph, 4, 4).unwrap(), None);
    assert_eq!(h.backend.draw_count(), 0);
    assert!(h.pool.is_empty());
    assert!(graph.node(passthrough).unwrap().outputs()[0].data().is_none());
}

#[test]
fn test_skipped_branch_does_not_hide_earlier_result() {
    let mut h = Harness::new();
    let obs = observations();
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let source = graph.source();
    let a = graph.add_kernel(Probe::new("a", 1, &obs)).unwrap();
    let join = graph.add_kernel(Probe::new("join", 2, &obs)).unwrap();
    graph.connect_by_name(source, "output", a, "input").unwrap();
    graph.connect_by_name(a, "output", join, "input").unwrap();

    // `join` waits on `input1`, so the pass ends with a's output
    let result = h.render(&mut graph, 4, 4).unwrap();
    let produced = graph.node(a).unwrap().outputs()[0].data().and_then(|v| v.texture());
    assert_eq!(result, produced);
    assert_eq!(h.backend.draw_count(), 1);
    assert_eq!(h.pool.in_use_count(), 0);
}

#[test]
fn test_dangling_branch_next_to_terminal_does_not_leak() {
    let mut h = Harness::new();
    let obs = observations();
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let source = graph.source();
    let producer = graph.add_kernel(Probe::new("producer", 1, &obs)).unwrap();
    let dangling = graph.add_kernel(Probe::new("dangling", 1, &obs)).unwrap();
    let terminal = graph.add_kernel(Probe::new("terminal", 1, &obs)).unwrap();
    graph.connect_by_name(source, "output", producer, "input").unwrap();
    graph.connect_by_name(producer, "output", dangling, "input").unwrap();
    graph.connect_by_name(producer, "output", terminal, "input").unwrap();

    for _ in 0..3 {
        h.render(&mut graph, 4, 4).unwrap();
        assert_eq!(h.pool.in_use_count(), 0);
        h.assert_partitioned();
    }
    // The producer's target plus one shared by both leaves
    assert_eq!(h.pool.len(), 2);
    assert!(graph.nodes().all(|n| n.last_target().is_none()));
}

#[test]
fn test_difference_of_gaussians_pass() {
    let mut h = Harness::new();
    let seed = h.seed(8, 8);
    let mut graph = effects::build_graph(seed, Effect::difference_of_gaussians()).unwrap();

    let result = h.render(&mut graph, 8, 8).unwrap();
    assert!(result.is_some());
    // Two separable blurs plus the subtraction
    assert_eq!(h.backend.draw_count(), 5);
    assert_eq!(h.pool.in_use_count(), 0);
    assert!(h
        .backend
        .draws()
        .all(|d| d.written.iter().all(|w| !d.sampled.contains(w))));

    let last = h.backend.draws().last().unwrap();
    assert_eq!(last.program_label, "Subtract");
    assert_eq!(last.sampled.len(), 2);
}

#[rstest]
#[case(Effect::Invert)]
#[case(Effect::Grayscale)]
#[case(Effect::GaussianBlur { radius: 4.0 })]
#[case(Effect::difference_of_gaussians())]
fn test_repeated_pass_reuses_targets(#[case] effect: Effect) {
    let mut h = Harness::new();
    let seed = h.seed(8, 8);
    let mut graph = effects::build_graph(seed, effect).unwrap();

    h.render(&mut graph, 8, 8).unwrap();
    let after_first = h.pool.stats().allocations;
    let textures = h.backend.live_texture_count();

    h.render(&mut graph, 8, 8).unwrap();
    assert_eq!(h.pool.stats().allocations, after_first);
    assert_eq!(h.backend.live_texture_count(), textures);
    assert_eq!(h.pool.in_use_count(), 0);
}

#[test]
fn test_resize_allocates_new_shape() {
    let mut h = Harness::new();
    let seed = h.seed(8, 8);
    let mut graph = effects::build_graph(seed, Effect::GaussianBlur { radius: 2.0 }).unwrap();

    h.render(&mut graph, 8, 8).unwrap();
    let small = h.pool.len();
    h.render(&mut graph, 16, 16).unwrap();
    assert_eq!(h.pool.len(), small * 2);
    assert_eq!(h.pool.in_use_count(), 0);
}

#[test]
fn test_constant_feeds_float_input() {
    let mut h = Harness::new();
    let seed = h.seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let factor = graph.add_constant(0.25);
    let scale = graph.add_kernel(Scale::default()).unwrap();
    graph.connect_by_name(graph.source(), "output", scale, "input").unwrap();
    graph.connect_by_name(factor, "value", scale, "factor").unwrap();

    assert!(h.render(&mut graph, 4, 4).unwrap().is_some());
    assert!(h.backend.commands().iter().any(|c| matches!(
        c,
        Command::SetUniform { name, value: UniformValue::Float(v), .. }
            if name == "u_factor" && *v == 0.25
    )));

    graph.set_constant(factor, 2.0).unwrap();
    h.backend.clear_commands();
    h.render(&mut graph, 4, 4).unwrap();
    assert!(h.backend.commands().iter().any(|c| matches!(
        c,
        Command::SetUniform { value: UniformValue::Float(v), .. } if *v == 2.0
    )));
    assert_eq!(h.backend.draws().next().unwrap().sampled, vec![seed]);
    assert_eq!(h.pool.in_use_count(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_failure_mid_node_releases_scratch() {
    let mut h = Harness::new();
    let obs = observations();
    let probe = Probe::new("broken", 1, &obs).failing(Failure::AfterScratch);
    let scratch = probe.scratch.clone();
    let upstream = Probe::new("upstream", 1, &obs);

    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let source = graph.source();
    let up = graph.add_kernel(upstream).unwrap();
    let broken = graph.add_kernel(probe).unwrap();
    graph.connect_by_name(source, "output", up, "input").unwrap();
    graph.connect_by_name(up, "output", broken, "input").unwrap();

    let err = h.render(&mut graph, 4, 4).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Backend(BackendError::IncompleteRenderTarget(_))
    ));

    let scratch = scratch.borrow().unwrap();
    assert!(h.pool.is_free(scratch));
    assert_eq!(h.pool.in_use_count(), 0);
    assert!(graph.nodes().all(|n| n.last_target().is_none()));
    h.assert_partitioned();
}

#[test]
fn test_kernel_cannot_release_its_own_output() {
    let mut h = Harness::new();
    let obs = observations();
    let eager = Probe::new("eager", 1, &obs).failing(Failure::ReleasesOutput);
    let released = eager.output_released.clone();

    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let source = graph.source();
    let a = graph.add_kernel(eager).unwrap();
    let b = graph.add_kernel(Probe::new("sibling", 1, &obs)).unwrap();
    let c = graph.add_kernel(Probe::new("consumer", 1, &obs)).unwrap();
    graph.connect_by_name(source, "output", a, "input").unwrap();
    graph.connect_by_name(source, "output", b, "input").unwrap();
    graph.connect_by_name(a, "output", c, "input").unwrap();

    h.render(&mut graph, 4, 4).unwrap();
    assert_eq!(*released.borrow(), Some(false));

    // The sibling runs between a and its consumer and must not reuse a's target
    let a_out = graph.node(a).unwrap().outputs()[0].data().and_then(|v| v.texture());
    let b_out = graph.node(b).unwrap().outputs()[0].data().and_then(|v| v.texture());
    assert!(a_out.is_some());
    assert_ne!(a_out, b_out);

    let seen = obs.borrow();
    let consumed = seen.iter().find(|o| o.kernel == "consumer").unwrap();
    assert_eq!(Some(consumed.input), a_out);
    assert!(consumed.owner_in_use);

    assert_eq!(h.pool.stats().misuse_releases, 0);
    assert_eq!(h.pool.in_use_count(), 0);
    h.assert_partitioned();
}

#[test]
fn test_missing_uniform_aborts_the_pass() {
    let mut h = Harness::new();
    let obs = observations();
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let node = graph
        .add_kernel(Probe::new("typo", 1, &obs).failing(Failure::MissingUniform))
        .unwrap();
    graph
        .connect_by_name(graph.source(), "output", node, "input")
        .unwrap();

    let err = h.render(&mut graph, 4, 4).unwrap_err();
    assert_eq!(
        err,
        GraphError::Backend(BackendError::MissingUniform {
            program: "typo".into(),
            name: "u_missing".into(),
        })
    );
    assert_eq!(h.backend.draw_count(), 0);
    assert_eq!(h.pool.in_use_count(), 0);
}

#[test]
fn test_program_link_failure_propagates() {
    let mut h = Harness::new();
    h.backend.reject_program("Passthrough");
    let mut graph = ShaderGraph::new(h.seed(4, 4));
    let node = graph.add_kernel(Passthrough::new()).unwrap();
    graph
        .connect_by_name(graph.source(), "output", node, "input")
        .unwrap();

    let err = h.render(&mut graph, 4, 4).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Backend(BackendError::ProgramLinkFailed { .. })
    ));
    assert!(h.pool.is_empty());
}

// ============================================================================
// Graph editing
// ============================================================================

#[test]
fn test_connect_rejects_second_link_into_input() {
    let seed = Harness::new().seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let source = graph.source();
    let a = graph.add_kernel(Passthrough::new()).unwrap();
    let b = graph.add_kernel(Passthrough::new()).unwrap();
    graph.connect_by_name(source, "output", b, "input").unwrap();

    let err = graph.connect_by_name(a, "output", b, "input").unwrap_err();
    assert!(matches!(err, GraphError::InputAlreadyConnected(_)));
    assert_eq!(graph.links().count(), 1);
    assert_eq!(graph.node(a).unwrap().dependency().total_dependants(), 0);
}

#[test]
fn test_connect_rejects_type_mismatch() {
    let seed = Harness::new().seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let constant = graph.add_constant(0.5);
    let blur = graph.add_kernel(GaussianBlur::new()).unwrap();

    let err = graph
        .connect_by_name(constant, "value", blur, "input")
        .unwrap_err();
    assert!(matches!(err, GraphError::SocketTypeMismatch { .. }));
    assert_eq!(graph.links().count(), 0);
}

#[test]
fn test_disconnect_and_remove_update_dependants() {
    let seed = Harness::new().seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let source = graph.source();
    let a = graph.add_kernel(Passthrough::new()).unwrap();
    let b = graph.add_kernel(Passthrough::new()).unwrap();
    graph.connect_by_name(source, "output", a, "input").unwrap();
    graph.connect_by_name(source, "output", b, "input").unwrap();
    assert_eq!(graph.node(source).unwrap().dependency().total_dependants(), 2);

    let input = graph.input(a, "input").unwrap();
    graph.disconnect(input).unwrap();
    assert!(matches!(
        graph.disconnect(input),
        Err(GraphError::InputNotConnected(_))
    ));
    assert_eq!(graph.node(source).unwrap().dependency().total_dependants(), 1);

    graph.remove_node(b).unwrap();
    assert_eq!(graph.node(source).unwrap().dependency().total_dependants(), 0);
    assert_eq!(graph.links().count(), 0);
    assert!(matches!(graph.remove_node(b), Err(GraphError::UnknownNode(_))));
}

#[test]
fn test_source_node_cannot_be_removed() {
    let seed = Harness::new().seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let source = graph.source();
    assert_eq!(
        graph.remove_node(source),
        Err(GraphError::SourceNodeRemoval(source))
    );
}

#[test]
fn test_parameters_reach_the_kernel() {
    let seed = Harness::new().seed(4, 4);
    let mut graph = ShaderGraph::new(seed);
    let blur = graph.add_kernel(GaussianBlur::new()).unwrap();
    graph.set_parameters(blur, &[("radius", 5.0)]).unwrap();
    assert_eq!(graph.kernel::<GaussianBlur>(blur).unwrap().radius(), 5.0);

    assert!(matches!(
        graph.set_parameters(blur, &[("sigma", 1.0)]),
        Err(GraphError::Parameter(_))
    ));
    assert!(matches!(
        graph.kernel::<Passthrough>(blur),
        Err(GraphError::KernelTypeMismatch(_))
    ));
}
