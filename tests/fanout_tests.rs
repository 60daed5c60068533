use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use multisql::fanout::{self, BatchOptions, ExecError, TargetRunner, run_batch};
use multisql::models::enums::BatchEvent;
use multisql::models::structs::{DatabaseTarget, ResultTable};

/// Scripted stand-in for the database driver.
struct MockRunner {
    /// Databases whose run should fail.
    fail_on: Vec<String>,
    delay: Duration,
    seen_commands: Mutex<Vec<String>>,
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// When set, every run waits here before returning. Proves overlap.
    barrier: Option<tokio::sync::Barrier>,
}

impl MockRunner {
    fn new() -> Self {
        Self {
            fail_on: Vec::new(),
            delay: Duration::ZERO,
            seen_commands: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            barrier: None,
        }
    }

    /// One result set per blank-line-separated statement, like a server
    /// answering a multi-statement command.
    fn tables_for(script: &str) -> Vec<ResultTable> {
        script
            .split("\n\n")
            .enumerate()
            .map(|(i, _)| {
                let mut table = ResultTable::new(format!("Table{}", i));
                table.push_column("id");
                table.rows.push(vec!["1".to_string()]);
                table
            })
            .collect()
    }
}

#[async_trait]
impl TargetRunner for MockRunner {
    async fn run_script(
        &self,
        target: &DatabaseTarget,
        script: &str,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResultTable>, ExecError> {
        if let Ok(mut cmds) = self.seen_commands.lock() {
            cmds.push(script.to_string());
        }
        if let Ok(mut started) = self.started.lock() {
            started.push(format!("{}/{}", target.server, target.database));
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    return Err(ExecError::Cancelled);
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(&target.database) {
            Err(ExecError::Driver(format!(
                "Cannot open database \"{}\".",
                target.database
            )))
        } else {
            Ok(Self::tables_for(script))
        }
    }
}

fn targets(pairs: &[(&str, &str)]) -> Vec<DatabaseTarget> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, (server, db))| DatabaseTarget::new(i as i64, server.to_string(), db.to_string()))
        .collect()
}

#[tokio::test]
async fn failing_target_never_stops_the_others() {
    let mut runner = MockRunner::new();
    runner.fail_on.push("Bad".to_string());
    let (tx, rx) = mpsc::channel();

    let outcome = run_batch(
        Arc::new(runner),
        targets(&[("srv1", "Good1"), ("srv1", "Bad"), ("srv2", "Good2")]),
        "SELECT 1",
        &BatchOptions::default(),
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.cancelled);

    let events: Vec<BatchEvent> = rx.try_iter().collect();
    let finished = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::TargetFinished { .. }))
        .count();
    let failed: Vec<&BatchEvent> = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::TargetFailed { .. }))
        .collect();
    assert_eq!(finished, 2);
    assert_eq!(failed.len(), 1);
    if let BatchEvent::TargetFailed { error, .. } = failed[0] {
        assert!(error.starts_with("srv1.Bad\n"));
        assert!(error.contains("Cannot open database"));
    }
    assert!(matches!(events.last(), Some(BatchEvent::Finished { .. })));
}

#[tokio::test]
async fn sequential_mode_runs_one_at_a_time_in_target_order() {
    let mut runner = MockRunner::new();
    runner.delay = Duration::from_millis(20);
    let runner = Arc::new(runner);
    let (tx, _rx) = mpsc::channel();

    let options = BatchOptions {
        run_in_sequence: true,
        connection_timeout_secs: 30,
    };
    let outcome = run_batch(
        runner.clone(),
        targets(&[("srvB", "db1"), ("srvA", "db2"), ("srvA", "db1")]),
        "SELECT 1",
        &options,
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.completed, 3);
    assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
    let started = runner.started.lock().unwrap().clone();
    assert_eq!(started, vec!["srvA/db1", "srvA/db2", "srvB/db1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mode_overlaps_targets() {
    let mut runner = MockRunner::new();
    // All three must be inside run_script at once or this would hang.
    runner.barrier = Some(tokio::sync::Barrier::new(3));
    let (tx, _rx) = mpsc::channel();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        run_batch(
            Arc::new(runner),
            targets(&[("srv", "db1"), ("srv", "db2"), ("srv", "db3")]),
            "SELECT 1",
            &BatchOptions::default(),
            tx,
            CancellationToken::new(),
        ),
    )
    .await
    .expect("concurrent batch deadlocked");

    assert_eq!(outcome.completed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_in_flight_targets_quietly() {
    let mut runner = MockRunner::new();
    runner.delay = Duration::from_secs(30);
    let (tx, rx) = mpsc::channel();
    let token = CancellationToken::new();

    let batch_token = token.clone();
    let handle = tokio::spawn(async move {
        let options = BatchOptions::default();
        run_batch(
            Arc::new(runner),
            targets(&[("srv", "db1"), ("srv", "db2")]),
            "SELECT 1",
            &options,
            tx,
            batch_token,
        )
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    let outcome = handle.await.unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.failed, 0);

    let events: Vec<BatchEvent> = rx.try_iter().collect();
    assert!(
        events
            .iter()
            .all(|e| !matches!(e, BatchEvent::TargetFinished { .. }))
    );
    assert!(
        events
            .iter()
            .all(|e| !matches!(e, BatchEvent::TargetFailed { .. }))
    );
    assert!(matches!(events.last(), Some(BatchEvent::Cancelled)));
}

#[tokio::test]
async fn script_blank_line_split_is_normalized_before_running() {
    let runner = Arc::new(MockRunner::new());
    let (tx, rx) = mpsc::channel();

    run_batch(
        runner.clone(),
        targets(&[("srv", "db1"), ("srv", "db2"), ("srv", "db3")]),
        "SELECT 1\r\n\r\nSELECT 2",
        &BatchOptions::default(),
        tx,
        CancellationToken::new(),
    )
    .await;

    let commands = runner.seen_commands.lock().unwrap().clone();
    assert_eq!(commands.len(), 3);
    for command in &commands {
        assert_eq!(command, "SELECT 1\n\nSELECT 2");
    }

    // Every target reports both result sets of the two-statement script.
    let finished: Vec<Vec<ResultTable>> = rx
        .try_iter()
        .filter_map(|e| match e {
            BatchEvent::TargetFinished { tables, .. } => Some(tables),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 3);
    assert!(finished.iter().all(|tables| tables.len() == 2));
}

#[tokio::test]
async fn progress_counts_successes_only() {
    let mut runner = MockRunner::new();
    runner.fail_on.push("Bad".to_string());
    let (tx, rx) = mpsc::channel();

    run_batch(
        Arc::new(runner),
        targets(&[("srv", "Bad"), ("srv", "db1"), ("srv", "db2")]),
        "SELECT 1",
        &BatchOptions::default(),
        tx,
        CancellationToken::new(),
    )
    .await;

    let progress: Vec<(usize, usize)> = rx
        .try_iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { done, total } => Some((done, total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 2);
    assert!(progress.iter().all(|(_, total)| *total == 3));
    let mut done: Vec<usize> = progress.iter().map(|(d, _)| *d).collect();
    done.sort_unstable();
    assert_eq!(done, vec![1, 2]);
}

#[test]
fn elapsed_label_is_hh_mm_ss() {
    assert_eq!(fanout::format_elapsed(Duration::from_secs(0)), "00:00:00");
    assert_eq!(fanout::format_elapsed(Duration::from_secs(3905)), "01:05:05");
}
