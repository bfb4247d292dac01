//! Integration tests for the recording scheduler
//!
//! Exercises the worker pool end to end against the recording backend:
//! ordering, barrier, backpressure and shutdown under real threads.
//! No GPU required.
//!
//! Run with: cargo test --test scheduler_integration_tests

use std::sync::Arc;
use std::time::Duration;
use gl2vk_shim::gl2vk::backend::{BufferId, PipelineId, RecordedOp, RecordingBackend};
use gl2vk_shim::gl2vk::scheduler::{Command, DrawBindings, DrawBindingsId, NodeState, RecordingScheduler};
use gl2vk_shim::gl2vk::{Error, ShimConfig};

fn start(node_count: usize, log_capacity: usize) -> (Arc<RecordingBackend>, RecordingScheduler) {
    let backend = Arc::new(RecordingBackend::new());
    let config = ShimConfig { node_count, log_capacity, ..ShimConfig::default() };
    let scheduler = RecordingScheduler::new(backend.clone(), &config).unwrap();
    (backend, scheduler)
}

fn quad_bindings(scheduler: &RecordingScheduler) -> DrawBindingsId {
    scheduler.intern_bindings(DrawBindings {
        pipeline: PipelineId(1),
        vertex_buffers: vec![BufferId(1), BufferId(2)],
        index_buffer: None,
    })
}

fn draw_firsts(ops: &[RecordedOp]) -> Vec<u32> {
    ops.iter()
        .filter_map(|op| match op {
            RecordedOp::Draw { first_vertex, .. } => Some(*first_vertex),
            _ => None,
        })
        .collect()
}

#[test]
fn test_integration_commands_recorded_in_order() {
    const DRAWS: u32 = 1000;
    let (backend, mut scheduler) = start(1, 512);
    let bindings = quad_bindings(&scheduler);

    scheduler.begin_frame(0).unwrap();
    for first in 0..DRAWS {
        scheduler.enqueue(Command::draw(bindings, 6, first)).unwrap();
    }
    let frame = scheduler.end_frame().unwrap();

    let ops = backend.secondary(frame.secondaries[0]).unwrap().ops;
    assert_eq!(draw_firsts(&ops), (0..DRAWS).collect::<Vec<_>>());
    // Bindings only change once
    assert_eq!(ops.iter().filter(|op| !op.is_draw()).count(), 2);
    assert_eq!(backend.open_secondary_count(), 0);
}

#[test]
fn test_integration_round_robin_across_nodes() {
    const NODES: usize = 4;
    let (backend, mut scheduler) = start(NODES, 64);
    let bindings = quad_bindings(&scheduler);

    scheduler.begin_frame(1).unwrap();
    for first in 0..400u32 {
        scheduler.enqueue(Command::draw(bindings, 6, first)).unwrap();
        scheduler.select_next_node();
    }
    let frame = scheduler.end_frame().unwrap();
    assert_eq!(frame.secondaries.len(), NODES);

    for (node, buffer) in frame.secondaries.iter().enumerate() {
        let firsts = draw_firsts(&backend.secondary(*buffer).unwrap().ops);
        let expected: Vec<u32> = (0..400u32).filter(|f| *f as usize % NODES == node).collect();
        assert_eq!(firsts, expected);
    }

    let submissions = backend.submissions();
    assert!(submissions.is_empty(), "the scheduler never submits on its own");
}

#[test]
fn test_integration_backpressure_keeps_every_command() {
    let (backend, mut scheduler) = start(2, 2);
    let bindings = quad_bindings(&scheduler);

    for _ in 0..5 {
        scheduler.begin_frame(0).unwrap();
        for first in 0..200u32 {
            scheduler.select_node((first % 2) as usize).unwrap();
            scheduler.enqueue(Command::draw(bindings, 3, first)).unwrap();
        }
        let frame = scheduler.end_frame().unwrap();

        let even = draw_firsts(&backend.secondary(frame.secondaries[0]).unwrap().ops);
        let odd = draw_firsts(&backend.secondary(frame.secondaries[1]).unwrap().ops);
        assert_eq!(even, (0..200).step_by(2).collect::<Vec<_>>());
        assert_eq!(odd, (1..200).step_by(2).collect::<Vec<_>>());
    }

    let stats = scheduler.node_stats(0).unwrap();
    assert_eq!(stats.misuse, 0);
    assert_eq!(stats.executed, stats.pushed);
}

#[test]
fn test_integration_buffers_closed_after_every_barrier() {
    let (backend, mut scheduler) = start(3, 16);
    let bindings = quad_bindings(&scheduler);

    for frame in 0..50u32 {
        scheduler.begin_frame(frame % 3).unwrap();
        scheduler.select_node((frame % 3) as usize).unwrap();
        scheduler.enqueue(Command::draw(bindings, 3, frame)).unwrap();
        scheduler.end_frame().unwrap();
        assert_eq!(backend.open_secondary_count(), 0);
        for node in 0..3 {
            assert_eq!(scheduler.node_stats(node).unwrap().state, NodeState::Sleeping);
        }
    }
}

#[test]
fn test_integration_misuse_counted_per_node() {
    let (_backend, mut scheduler) = start(2, 16);

    // End without begin on node 1, twice
    scheduler.enqueue_to(1, Command::end_recording()).unwrap();
    scheduler.enqueue_to(1, Command::end_recording()).unwrap();
    scheduler.await_node(1).unwrap();

    scheduler.begin_frame(0).unwrap();
    scheduler.enqueue_to(0, Command::begin_recording(0, 0, None)).unwrap();
    scheduler.end_frame().unwrap();

    assert_eq!(scheduler.node_stats(0).unwrap().misuse, 1);
    assert_eq!(scheduler.node_stats(1).unwrap().misuse, 2);
}

#[test]
fn test_integration_slow_node_recovers() {
    let backend = Arc::new(RecordingBackend::new().with_draw_delay(Duration::from_millis(100)));
    let config = ShimConfig {
        node_count: 2,
        await_retry_budget: 3,
        await_backoff: Duration::from_millis(10),
        ..ShimConfig::default()
    };
    let mut scheduler = RecordingScheduler::new(backend.clone(), &config).unwrap();
    let bindings = quad_bindings(&scheduler);

    scheduler.begin_frame(0).unwrap();
    scheduler.enqueue_to(1, Command::draw(bindings, 3, 0)).unwrap();
    let frame = scheduler.end_frame().unwrap();
    assert_eq!(frame.stalled_nodes, vec![1]);
    assert_eq!(scheduler.liveness_strikes(), 1);

    // Let the slow node drain, then a clean frame resets the strike count
    std::thread::sleep(Duration::from_millis(300));
    scheduler.begin_frame(1).unwrap();
    let frame = scheduler.end_frame().unwrap();
    assert!(frame.stalled_nodes.is_empty());
    assert_eq!(frame.secondaries.len(), 2);
    assert_eq!(scheduler.liveness_strikes(), 0);
}

#[test]
fn test_integration_shutdown_then_drop() {
    let (backend, mut scheduler) = start(8, 32);
    let bindings = quad_bindings(&scheduler);
    scheduler.begin_frame(0).unwrap();
    for first in 0..64 {
        scheduler.enqueue(Command::draw(bindings, 3, first)).unwrap();
        scheduler.select_next_node();
    }
    scheduler.shutdown();

    for node in 0..8 {
        assert_eq!(scheduler.node_stats(node).unwrap().state, NodeState::Killed);
    }
    assert_eq!(backend.open_secondary_count(), 0);
    assert!(matches!(scheduler.end_frame(), Err(Error::ProtocolMisuse(_))));
    drop(scheduler);
}
