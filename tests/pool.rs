//! End-to-end tests for the process pool.
//!
//! Workers are the `poolman` binary itself, which serves the built-in
//! targets from its demo registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use poolman::{
    LogLevel, Logger, MemorySink, PoolConfig, PoolError, PoolManager, PoolState, ResultEnvelope,
    Target, Wait, WorkerCommand,
};
use serde_json::{Value, json};

fn worker_command() -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_poolman"))
}

fn config(size: usize) -> PoolConfig {
    PoolConfig::new()
        .with_size(size)
        .with_worker_command(worker_command())
        .with_stop_timeout(Duration::from_secs(2))
}

fn started(target: Target, config: PoolConfig) -> PoolManager {
    let pool = PoolManager::new(target, config).unwrap();
    pool.start().unwrap();
    pool
}

fn values(results: Vec<ResultEnvelope>) -> Vec<i64> {
    results.into_iter().map(|r| r.decode().unwrap()).collect()
}

#[test]
fn test_map_ordered_matches_input() {
    let pool = PoolManager::new(Target::function("square"), config(3).with_ordered(true)).unwrap();

    let results = pool.map(1..=20).unwrap();

    let seqs: Vec<u64> = results.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, (0..20).collect::<Vec<_>>());
    assert_eq!(values(results), (1..=20).map(|x| x * x).collect::<Vec<i64>>());
    assert_eq!(pool.state(), PoolState::Closed);
}

#[test]
fn test_unordered_returns_every_result() {
    let pool = started(Target::function("sleep_ms"), config(3));

    // Longest first so completion order differs from submission order
    for ms in [300, 10, 20, 30, 40] {
        pool.put(ms).unwrap();
    }
    let results = pool.get_all().unwrap();
    pool.close().unwrap();

    let mut seqs: Vec<u64> = results.iter().map(|r| r.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert_ne!(results[0].seq, 0, "the slow task should not complete first");
}

#[test]
fn test_ordered_waits_for_slow_task() {
    let pool = started(Target::function("sleep_ms"), config(3).with_ordered(true));

    for ms in [200, 1, 1, 1] {
        pool.put(ms).unwrap();
    }
    let results = pool.get_all().unwrap();
    pool.close().unwrap();

    assert_eq!(values(results), vec![200, 1, 1, 1]);
}

#[test]
fn test_static_args_are_appended() {
    let pool = PoolManager::new(
        Target::function("scale"),
        config(2).with_ordered(true).with_static_arg(10),
    )
    .unwrap();

    let results = pool.map([1, 2, 3]).unwrap();
    assert_eq!(values(results), vec![10, 20, 30]);
}

#[test]
fn test_process_target_keeps_state() {
    let pool = PoolManager::new(
        Target::process("counter"),
        config(1).with_ordered(true).with_static_arg(5),
    )
    .unwrap();

    let results = pool.map(["a", "b", "c"]).unwrap();
    let counts: Vec<i64> = results
        .iter()
        .map(|r| r.value().unwrap()["count"].as_i64().unwrap())
        .collect();
    assert_eq!(counts, vec![5, 10, 15]);
    assert_eq!(results[2].value().unwrap()["item"], json!("c"));
}

#[test]
fn test_process_init_failure_fails_start() {
    let pool = PoolManager::new(Target::process("counter"), config(1).with_static_arg(0)).unwrap();

    let err = pool.start().unwrap_err();
    assert!(
        err.to_string().contains("step must not be zero"),
        "unexpected error: {}",
        err
    );
    assert_eq!(pool.state(), PoolState::Terminated);
}

#[test]
fn test_unknown_target_fails_start() {
    let pool = PoolManager::new(Target::function("no_such_target"), config(1)).unwrap();

    let err = pool.start().unwrap_err();
    assert!(err.to_string().contains("no_such_target"), "unexpected error: {}", err);
}

#[test]
fn test_task_errors_become_failures() {
    let pool = PoolManager::new(Target::function("invert"), config(2).with_ordered(true)).unwrap();

    let results = pool.map([2.0, 0.0, 4.0]).unwrap();

    assert!(results[0].is_success());
    assert_eq!(results[1].error(), Some("division by zero"));
    assert!(results[2].is_success());
    assert!(matches!(
        results[1].clone().into_value(),
        Err(PoolError::WorkerFailure { seq: 1, .. })
    ));
}

#[test]
fn test_panic_is_reported_and_worker_survives() {
    let pool = started(Target::function("panic"), config(1).with_ordered(true));

    pool.put("boom").unwrap();
    pool.put("again").unwrap();
    let results = pool.get_all().unwrap();

    assert!(results[0].error().unwrap().contains("boom"));
    assert!(results[1].error().unwrap().contains("again"));
    assert!(pool.is_alive());
    pool.close().unwrap();
}

#[test]
fn test_worker_exit_yields_lost_task_failure() {
    let pool = started(Target::function("exit"), config(1));

    pool.put(3).unwrap();
    let result = pool.get().unwrap();
    let message = result.error().unwrap();
    assert!(message.contains("task 0"), "unexpected message: {}", message);

    // The only worker is gone, so nothing can run any more. Give its
    // dispatcher a moment to wind down after reporting the loss.
    std::thread::sleep(Duration::from_millis(200));
    assert!(!pool.is_alive());
    let err = pool.put(0).unwrap_err();
    assert!(matches!(err, PoolError::Terminated), "unexpected error: {:?}", err);
    pool.terminate().unwrap();
}

#[test]
fn test_logs_are_forwarded_to_sinks() {
    let sink = Arc::new(MemorySink::new());
    let logger = Logger::with_sink("demo", sink.clone()).unwrap();
    let pool = started(Target::function("echo_log"), config(2).with_logger(logger));

    pool.put("hello").unwrap();
    pool.put("world").unwrap();
    pool.get_all().unwrap();
    pool.close().unwrap();

    let records = sink.records();
    let messages: HashSet<String> = records.iter().map(|r| r.message.clone()).collect();
    assert!(messages.contains("hello"));
    assert!(messages.contains("world"));
    assert!(records.iter().all(|r| r.logger.starts_with("demo")));
    assert!(records.iter().any(|r| r.level == LogLevel::Debug));
    assert!(!messages.iter().any(|m| m.contains("not forwarded")));
}

#[test]
fn test_forward_level_filters_records() {
    let sink = Arc::new(MemorySink::new());
    let logger = Logger::with_sink("demo", sink.clone()).unwrap();
    let pool = started(
        Target::function("echo_log"),
        config(1)
            .with_logger(logger)
            .with_forward_level(LogLevel::Info),
    );

    pool.put("quiet").unwrap();
    pool.get().unwrap();
    pool.close().unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, LogLevel::Info);
    assert_eq!(records[0].logger, "demo::task");
}

#[test]
fn test_put_async_then_get_all() {
    let pool = started(Target::function("square"), config(2).with_ordered(true));

    pool.put_async((0..50).collect::<Vec<i64>>()).unwrap();
    let report = pool.join_async().unwrap();
    assert_eq!(report.submitted, 50);
    assert_eq!(report.skipped, 0);

    let results = pool.get_all().unwrap();
    assert_eq!(values(results), (0..50).map(|x| x * x).collect::<Vec<i64>>());
    pool.close().unwrap();
}

#[test]
fn test_get_waits_for_running_feeder() {
    let pool = started(Target::function("square"), config(2));

    pool.put_async(vec![7]).unwrap();
    // No put has happened yet on this thread; get waits for the feeder
    let result = pool.get().unwrap();
    assert_eq!(result.decode::<i64>().unwrap(), 49);
    pool.close().unwrap();
}

#[test]
fn test_clear_tasks_skips_queued_work() {
    let pool = started(
        Target::function("sleep_ms"),
        config(1).with_ordered(true).with_queue_size(10),
    );

    for _ in 0..6 {
        pool.put(100).unwrap();
    }
    std::thread::sleep(Duration::from_millis(50));
    let cleared = pool.clear_tasks().unwrap();
    assert!(cleared >= 4, "only {} tasks cleared", cleared);

    let results = pool.get_all().unwrap();
    assert_eq!(results.len() + cleared, 6);
    assert_eq!(pool.outstanding(), 0);

    // Later submissions still come back in order
    pool.put(1).unwrap();
    assert_eq!(pool.get().unwrap().seq, 6);
    pool.close().unwrap();
}

#[test]
fn test_join_then_get_remaining() {
    let pool = started(Target::function("square"), config(2));

    for x in 0..5 {
        pool.put(x).unwrap();
    }
    pool.join().unwrap();
    assert_eq!(pool.state(), PoolState::Closing);
    assert!(matches!(
        pool.put(9),
        Err(PoolError::InvalidState { .. })
    ));

    let mut squares = values(pool.get_all().unwrap());
    squares.sort_unstable();
    assert_eq!(squares, vec![0, 1, 4, 9, 16]);

    pool.close().unwrap();
    assert_eq!(pool.state(), PoolState::Closed);
}

#[test]
fn test_terminate_stops_workers() {
    let pool = started(Target::function("sleep_ms"), config(2));

    pool.put(5_000).unwrap();
    pool.put(5_000).unwrap();
    let pids = pool.worker_pids();
    assert_eq!(pids.len(), 2);
    assert!(pool.is_alive());

    pool.terminate().unwrap();
    assert_eq!(pool.state(), PoolState::Terminated);
    assert!(!pool.is_alive());
    assert_eq!(pool.outstanding(), 0);
    assert!(matches!(pool.get(), Err(PoolError::Terminated)));

    // Idempotent
    pool.terminate().unwrap();
}

#[test]
fn test_workers_are_distinct_processes() {
    let pool = PoolManager::new(Target::function("pid"), config(3)).unwrap();

    let results = pool.map(vec![Value::Null; 30]).unwrap();
    let pids: HashSet<u32> = results.into_iter().map(|r| r.decode().unwrap()).collect();

    assert!(!pids.contains(&std::process::id()));
    assert!(pids.len() <= 3);
}

#[test]
fn test_non_blocking_put_bound_is_queue_plus_workers() {
    let pool = started(
        Target::function("sleep_ms"),
        config(2).with_queue_size(2),
    );

    // One task in flight per worker, held by its dispatcher
    pool.put(1_000).unwrap();
    pool.put(1_000).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(pool.pending_tasks(), 0);

    pool.put_with(1_000, Wait::NonBlocking).unwrap();
    pool.put_with(1_000, Wait::NonBlocking).unwrap();
    assert_eq!(pool.pending_tasks(), 2);
    assert!(matches!(
        pool.put_with(1_000, Wait::NonBlocking),
        Err(PoolError::QueueFull { capacity: 2 })
    ));
    assert_eq!(pool.outstanding(), 4);
    pool.terminate().unwrap();
}

#[test]
fn test_get_timeout_keeps_result_claimable() {
    let pool = started(Target::function("sleep_ms"), config(1));

    pool.put(300).unwrap();
    let err = pool
        .get_with(Wait::Timeout(Duration::from_millis(20)))
        .unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)), "unexpected error: {:?}", err);
    assert_eq!(pool.outstanding(), 1);

    assert_eq!(pool.get().unwrap().decode::<u64>().unwrap(), 300);
    pool.close().unwrap();
}

#[test]
fn test_get_without_put_underflows() {
    let pool = started(Target::function("square"), config(1));

    assert!(matches!(pool.get(), Err(PoolError::Underflow)));
    pool.put(2).unwrap();
    pool.get().unwrap();
    assert!(matches!(pool.get(), Err(PoolError::Underflow)));
    pool.close().unwrap();
}

#[test]
fn test_start_twice_is_rejected() {
    let pool = started(Target::function("square"), config(1));

    assert!(matches!(pool.start(), Err(PoolError::InvalidState { .. })));
    pool.close().unwrap();
    pool.close().unwrap();
    assert!(matches!(pool.start(), Err(PoolError::InvalidState { .. })));
}

#[test]
fn test_concurrent_ordered_getters_all_return() {
    let pool = Arc::new(started(
        Target::function("sleep_ms"),
        config(2).with_ordered(true),
    ));

    // seq 1 finishes first and may be buffered by the getter that wants seq 0
    pool.put(400).unwrap();
    pool.put(10).unwrap();

    let getters: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                pool.get_with(Wait::Timeout(Duration::from_secs(5)))
                    .map(|r| r.seq)
            })
        })
        .collect();
    let mut seqs: Vec<u64> = getters
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();
    seqs.sort_unstable();

    assert_eq!(seqs, vec![0, 1]);
    assert_eq!(pool.outstanding(), 0);
    pool.close().unwrap();
}

#[test]
fn test_reorder_limit_overflow_does_not_wedge() {
    let pool = started(
        Target::function("sleep_ms"),
        config(3).with_ordered(true).with_reorder_limit(1),
    );

    for ms in [300, 1, 1] {
        pool.put(ms).unwrap();
    }
    let err = pool.get().unwrap_err();
    assert!(
        matches!(err, PoolError::BufferOverflow { limit: 1 }),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(pool.outstanding(), 3);

    // The slow task is done by now; its result must still come through
    std::thread::sleep(Duration::from_millis(600));
    let mut values = Vec::new();
    for _ in 0..3 {
        values.push(pool.get().unwrap().decode::<u64>().unwrap());
    }
    assert_eq!(values, vec![300, 1, 1]);
    assert_eq!(pool.outstanding(), 0);
    pool.close().unwrap();
}

#[test]
fn test_loggers_are_fixed_once_running() {
    let pool = started(
        Target::function("square"),
        config(1).with_logger(Logger::new("demo").unwrap()),
    );

    assert!(matches!(
        pool.add_logger(Logger::new("other").unwrap()),
        Err(PoolError::InvalidState {
            state: PoolState::Running,
            ..
        })
    ));
    assert!(matches!(
        pool.remove_logger("demo"),
        Err(PoolError::InvalidState {
            state: PoolState::Running,
            ..
        })
    ));
    assert_eq!(pool.loggers().len(), 1);
    pool.close().unwrap();
}

fn worker_exists(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[test]
fn test_drop_without_daemon_closes_gracefully() {
    let pool = started(Target::function("sleep_ms"), config(1).with_daemon(false));
    pool.put(300).unwrap();
    let pids = pool.worker_pids();

    let started_at = Instant::now();
    drop(pool);

    // The queued task ran to completion before the worker was let go
    assert!(started_at.elapsed() >= Duration::from_millis(200));
    assert!(pids.iter().all(|&pid| !worker_exists(pid)));
}

#[test]
fn test_drop_with_daemon_terminates() {
    let pool = started(Target::function("sleep_ms"), config(1).with_daemon(true));
    pool.put(5_000).unwrap();
    let pids = pool.worker_pids();

    let started_at = Instant::now();
    drop(pool);

    assert!(started_at.elapsed() < Duration::from_secs(3));
    assert!(pids.iter().all(|&pid| !worker_exists(pid)));
}
