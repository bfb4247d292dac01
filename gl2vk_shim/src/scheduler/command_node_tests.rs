use super::*;
use crate::backend::{RecordedOp, RecordingBackend};
use crate::scheduler::draw_bindings::DrawBindings;

struct Fixture {
    backend: Arc<RecordingBackend>,
    bindings: Arc<DrawBindingsTable>,
    node: CommandNode,
    config: ShimConfig,
}

fn fixture_with(backend: RecordingBackend, config: ShimConfig) -> Fixture {
    let backend = Arc::new(backend);
    let bindings = Arc::new(DrawBindingsTable::new());
    let node = CommandNode::spawn(0, backend.clone(), bindings.clone(), &config).unwrap();
    Fixture { backend, bindings, node, config }
}

fn fixture() -> Fixture {
    fixture_with(RecordingBackend::new(), ShimConfig { node_count: 1, ..ShimConfig::default() })
}

impl Fixture {
    fn await_idle(&self) -> Result<()> {
        self.node.await_idle(self.config.await_retry_budget, self.config.await_backoff)
    }

    fn ops(&self, frame_index: usize) -> Vec<RecordedOp> {
        let buffer = self.node.buffer(frame_index).unwrap();
        self.backend.secondary(buffer).unwrap().ops
    }

    fn plain_bindings(&self) -> DrawBindingsId {
        self.bindings.intern(DrawBindings {
            pipeline: PipelineId(1),
            vertex_buffers: vec![BufferId(10)],
            index_buffer: None,
        })
    }
}

#[test]
fn test_allocates_one_buffer_per_frame_slot() {
    let f = fixture();
    assert!(f.node.buffer(0).is_some());
    assert!(f.node.buffer(1).is_some());
    assert!(f.node.buffer(2).is_none());
    assert_eq!(f.backend.secondaries_of_node(0).len(), 2);
}

#[test]
fn test_records_commands_in_order() {
    let f = fixture();
    let bindings = f.plain_bindings();

    f.node.enqueue(Command::begin_recording(0, 1, None)).unwrap();
    for first in 0..3 {
        f.node.enqueue(Command::draw(bindings, 3, first * 3)).unwrap();
    }
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    assert_eq!(
        f.ops(0),
        vec![
            RecordedOp::BindPipeline(PipelineId(1)),
            RecordedOp::BindVertexBuffers(vec![BufferId(10)]),
            RecordedOp::Draw { vertex_count: 3, first_vertex: 0 },
            RecordedOp::Draw { vertex_count: 3, first_vertex: 3 },
            RecordedOp::Draw { vertex_count: 3, first_vertex: 6 },
        ]
    );
    let stats = f.node.stats();
    assert_eq!(stats.executed, 5);
    assert_eq!(stats.misuse, 0);
    assert_eq!(stats.state, NodeState::Sleeping);
    assert!(!f.node.is_recording(0));
}

#[test]
fn test_indexed_draw_binds_index_buffer() {
    let f = fixture();
    let bindings = f.bindings.intern(DrawBindings {
        pipeline: PipelineId(2),
        vertex_buffers: vec![BufferId(10), BufferId(11)],
        index_buffer: Some((BufferId(12), crate::layout::IndexType::U16)),
    });

    f.node.enqueue(Command::begin_recording(1, 0, None)).unwrap();
    f.node.enqueue(Command::draw_indexed(bindings, 6, 0)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    assert_eq!(
        f.ops(1),
        vec![
            RecordedOp::BindPipeline(PipelineId(2)),
            RecordedOp::BindVertexBuffers(vec![BufferId(10), BufferId(11)]),
            RecordedOp::BindIndexBuffer(BufferId(12), crate::layout::IndexType::U16),
            RecordedOp::DrawIndexed { index_count: 6, first_index: 0 },
        ]
    );
}

#[test]
fn test_active_pipeline_bound_on_begin() {
    let f = fixture();
    f.node.enqueue(Command::begin_recording(0, 0, Some(PipelineId(7)))).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    assert_eq!(f.ops(0), vec![RecordedOp::BindPipeline(PipelineId(7))]);
}

#[test]
fn test_push_constants_and_upload_recorded() {
    let f = fixture();
    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    f.node
        .enqueue(Command::push_constants(PipelineId(1), StageFlags::VERTEX, 4, &[9, 9, 9, 9]).unwrap())
        .unwrap();
    f.node.enqueue(Command::buffer_upload(BufferId(1), BufferId(2), 64)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    assert_eq!(
        f.ops(0),
        vec![
            RecordedOp::PushConstants {
                pipeline: PipelineId(1),
                stages: StageFlags::VERTEX,
                offset: 4,
                data: vec![9, 9, 9, 9],
            },
            RecordedOp::CopyBuffer { src: BufferId(1), dst: BufferId(2), size: 64 },
        ]
    );
}

#[test]
fn test_protocol_misuse_is_skipped_and_counted() {
    let f = fixture();
    let bindings = f.plain_bindings();

    // Nothing open yet
    f.node.enqueue(Command::draw(bindings, 3, 0)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    // Begin twice
    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    // Unknown bindings
    f.node.enqueue(Command::draw(DrawBindingsId(42), 3, 0)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    let stats = f.node.stats();
    assert_eq!(stats.misuse, 4);
    assert_eq!(stats.executed, 6);
    assert!(f.ops(0).is_empty());
    assert_eq!(f.backend.secondary(f.node.buffer(0).unwrap()).unwrap().begin_count, 1);
    assert!(f.node.take_fatal().is_none());
}

#[test]
fn test_backend_failure_is_kept_as_fatal() {
    let f = fixture();
    let bindings = f.plain_bindings();
    f.backend.set_fail_draws(true);

    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    f.node.enqueue(Command::draw(bindings, 3, 0)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    assert!(matches!(f.node.take_fatal(), Some(Error::BackendError(_))));
    assert!(f.node.take_fatal().is_none());
}

#[test]
fn test_backpressure_with_small_log() {
    let f = fixture_with(
        RecordingBackend::new().with_draw_delay(Duration::from_millis(1)),
        ShimConfig { node_count: 1, log_capacity: 2, ..ShimConfig::default() },
    );
    let bindings = f.plain_bindings();

    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    for first in 0..20 {
        f.node.enqueue(Command::draw(bindings, 1, first)).unwrap();
    }
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();

    let draws: Vec<u32> = f
        .ops(0)
        .into_iter()
        .filter_map(|op| match op {
            RecordedOp::Draw { first_vertex, .. } => Some(first_vertex),
            _ => None,
        })
        .collect();
    assert_eq!(draws, (0..20).collect::<Vec<_>>());
    assert!(f.node.stats().backpressure_stalls > 0);
}

#[test]
fn test_await_reports_liveness_failure() {
    let f = fixture_with(
        RecordingBackend::new().with_draw_delay(Duration::from_millis(200)),
        ShimConfig { node_count: 1, ..ShimConfig::default() },
    );
    let bindings = f.plain_bindings();

    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    f.node.enqueue(Command::draw(bindings, 3, 0)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();

    let result = f.node.await_idle(2, Duration::from_millis(1));
    assert!(matches!(result, Err(Error::Liveness(_))));

    // Eventually drains
    f.node.await_idle(1000, Duration::from_millis(5)).unwrap();
}

#[test]
fn test_shutdown_kills_worker() {
    let mut f = fixture();
    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    f.node.shutdown();

    assert_eq!(f.node.state(), NodeState::Killed);
    assert_eq!(f.backend.open_secondary_count(), 0);
    assert!(matches!(
        f.node.enqueue(Command::end_recording()),
        Err(Error::ProtocolMisuse(_))
    ));
    assert!(matches!(f.await_idle(), Err(Error::ProtocolMisuse(_))));

    // Idempotent
    f.node.shutdown();
}

#[test]
fn test_wakes_after_long_sleep() {
    let f = fixture_with(
        RecordingBackend::new(),
        ShimConfig {
            node_count: 1,
            park_timeout: Duration::from_secs(30),
            ..ShimConfig::default()
        },
    );
    f.await_idle().unwrap();

    // The worker is parked with a long timeout; only the unpark can wake it
    f.node.enqueue(Command::begin_recording(0, 0, None)).unwrap();
    f.node.enqueue(Command::end_recording()).unwrap();
    f.await_idle().unwrap();
    assert_eq!(f.node.stats().executed, 2);
}
