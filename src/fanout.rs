use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::driver_mssql::{self, MssqlTargetConfig};
use crate::models::enums::{BatchEvent, CredentialMode};
use crate::models::structs::{DatabaseTarget, ResultTable};
use crate::result_text::format_target_error;
use crate::script;
use crate::session::SessionList;

/// Driver errors carrying this text are user cancellations, not failures,
/// and stay out of the error pane.
pub const CANCEL_MESSAGE: &str = "Operation cancelled by user.";

/// Progress label shown after a cancel.
pub const CANCELLED_PROGRESS_TEXT: &str = "Query cancelled.";

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("{0}")]
    Driver(String),
    #[error("Operation cancelled by user.")]
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Finish each target (including display) before starting the next.
    pub run_in_sequence: bool,
    pub connection_timeout_secs: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            run_in_sequence: false,
            connection_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Seam between the executor and the database driver; tests fan out over
/// mock runners, production uses [`MssqlRunner`].
#[async_trait]
pub trait TargetRunner: Send + Sync {
    async fn run_script(
        &self,
        target: &DatabaseTarget,
        script: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResultTable>, ExecError>;
}

/// Opens one tiberius connection per target and runs the script on it.
pub struct MssqlRunner {
    /// Credential per connected server, keyed by lowercase server name.
    credentials: HashMap<String, CredentialMode>,
}

impl MssqlRunner {
    pub fn from_sessions(sessions: &SessionList) -> Self {
        let credentials = sessions
            .servers()
            .iter()
            .map(|s| (s.server.to_lowercase(), s.credential.clone()))
            .collect();
        Self { credentials }
    }
}

#[async_trait]
impl TargetRunner for MssqlRunner {
    async fn run_script(
        &self,
        target: &DatabaseTarget,
        script: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResultTable>, ExecError> {
        let credential = self
            .credentials
            .get(&target.server.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                ExecError::Driver(format!("No connection known for server {}.", target.server))
            })?;
        let cfg = MssqlTargetConfig {
            server: target.server.clone(),
            database: target.database.clone(),
            credential,
            connect_timeout: timeout,
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
            res = async {
                let mut client = driver_mssql::connect(&cfg).await.map_err(ExecError::Driver)?;
                driver_mssql::execute_script(&mut client, script)
                    .await
                    .map_err(ExecError::Driver)
            } => res,
        }
    }
}

enum TargetStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Run one script against every target and report through `events`.
///
/// One shared cancellation token covers the whole batch. Sequential mode
/// awaits each target fully before the next; concurrent mode spawns them all
/// and waits for the set. A failing target is reported and never stops the
/// others.
pub async fn run_batch(
    runner: Arc<dyn TargetRunner>,
    mut targets: Vec<DatabaseTarget>,
    script_text: &str,
    options: &BatchOptions,
    events: Sender<BatchEvent>,
    cancel: CancellationToken,
) -> BatchOutcome {
    let started = Instant::now();
    let command = script::command_text(script_text);
    let timeout = Duration::from_secs(u64::from(options.connection_timeout_secs.max(1)));

    targets.sort_by(|a, b| a.server.cmp(&b.server).then(a.database.cmp(&b.database)));
    for target in &mut targets {
        target.retry_attempt = 0;
    }

    let total = targets.len();
    let progress = Arc::new(Mutex::new(0usize));
    let mut outcome = BatchOutcome::default();
    log::debug!("Preparing to run query on {} databases.", total);

    if options.run_in_sequence {
        for target in targets {
            if cancel.is_cancelled() {
                break;
            }
            let status = run_one(
                runner.as_ref(),
                &target,
                &command,
                timeout,
                &cancel,
                &events,
                &progress,
                total,
            )
            .await;
            tally(&mut outcome, status);
        }
    } else {
        let mut tasks = tokio::task::JoinSet::new();
        for target in targets {
            let runner = runner.clone();
            let command = command.clone();
            let events = events.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            tasks.spawn(async move {
                run_one(
                    runner.as_ref(),
                    &target,
                    &command,
                    timeout,
                    &cancel,
                    &events,
                    &progress,
                    total,
                )
                .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(status) => tally(&mut outcome, status),
                Err(e) => {
                    log::error!("Target task failed to join: {}", e);
                    outcome.failed += 1;
                }
            }
        }
    }

    outcome.cancelled = cancel.is_cancelled();
    outcome.elapsed = started.elapsed();
    if outcome.cancelled {
        let _ = events.send(BatchEvent::Cancelled);
    } else {
        let _ = events.send(BatchEvent::Finished {
            elapsed: outcome.elapsed,
        });
    }
    log::debug!(
        "Completed running query on databases. {} ok, {} failed.",
        outcome.completed,
        outcome.failed
    );
    outcome
}

fn tally(outcome: &mut BatchOutcome, status: TargetStatus) {
    match status {
        TargetStatus::Completed => outcome.completed += 1,
        TargetStatus::Failed => outcome.failed += 1,
        TargetStatus::Cancelled => {}
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    runner: &dyn TargetRunner,
    target: &DatabaseTarget,
    command: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    events: &Sender<BatchEvent>,
    progress: &Arc<Mutex<usize>>,
    total: usize,
) -> TargetStatus {
    let _ = events.send(BatchEvent::TargetStarted {
        target_id: target.id,
        server: target.server.clone(),
        database: target.database.clone(),
    });
    log::debug!("Running query on: {} / {}", target.server, target.database);

    match runner.run_script(target, command, timeout, cancel).await {
        Ok(tables) => {
            let _ = events.send(BatchEvent::TargetFinished {
                target_id: target.id,
                server: target.server.clone(),
                database: target.database.clone(),
                tables,
            });
            if let Ok(mut done) = progress.lock() {
                *done += 1;
                let _ = events.send(BatchEvent::Progress {
                    done: *done,
                    total,
                });
            }
            log::debug!("Finished query on: {} / {}", target.server, target.database);
            TargetStatus::Completed
        }
        Err(ExecError::Cancelled) => TargetStatus::Cancelled,
        Err(err) => {
            let message = err.to_string();
            if message.contains(CANCEL_MESSAGE) {
                return TargetStatus::Cancelled;
            }
            let _ = events.send(BatchEvent::TargetFailed {
                target_id: target.id,
                server: target.server.clone(),
                database: target.database.clone(),
                error: format_target_error(&target.server, &target.database, &message),
            });
            TargetStatus::Failed
        }
    }
}

/// Elapsed-time label, `hh:mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
