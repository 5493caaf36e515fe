//! Runs the external clustering engine.
//!
//! Every call spawns a fresh engine process, drains its output and waits for
//! it to exit before returning. Calls for the same room are serialized, calls
//! for different rooms run side by side.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tokio::process::{Child, Command};

const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Cluster,
    Search,
}

impl JobMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Cluster => "cluster",
            JobMode::Search => "search",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Match {
        cluster: String,
        images: Vec<String>,
    },
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Engine output of a clustering run, kept for the operator.
    Clustered { raw_output: String },
    Searched(SearchOutcome),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Clustering engine could not be started: {0}")]
    Spawn(#[source] io::Error),

    #[error("Clustering engine failed ({status}):\n{stderr}")]
    Failure { status: ExitStatus, stderr: String },

    #[error("Clustering engine did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Clustering engine returned unexpected output ({reason}):\n{output}")]
    Malformed { output: String, reason: String },
}

/// Shape of the engine's search answer: `{"cluster": "...", "images": [...]}`.
///
/// Either field may be missing, which reads as no match.
#[derive(Deserialize)]
struct SearchReply {
    cluster: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

/// Program and leading arguments used to start the engine.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub struct JobRunner {
    engine: EngineCommand,
    workdir: PathBuf,
    timeout: Duration,
    spawn_retries: u32,
    room_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobRunner {
    #[must_use]
    pub fn new(
        engine: EngineCommand,
        workdir: PathBuf,
        timeout: Duration,
        spawn_retries: u32,
    ) -> Self {
        Self {
            engine,
            workdir,
            timeout,
            spawn_retries,
            room_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(&self, mode: JobMode, room_id: &str) -> Result<JobOutcome, JobError> {
        match mode {
            JobMode::Cluster => {
                let raw_output = self.cluster(room_id).await?;
                Ok(JobOutcome::Clustered { raw_output })
            }
            JobMode::Search => self.search(room_id).await.map(JobOutcome::Searched),
        }
    }

    /// Clusters the room's photos and returns the engine's raw output.
    pub async fn cluster(&self, room_id: &str) -> Result<String, JobError> {
        self.invoke(JobMode::Cluster, room_id).await
    }

    /// Matches the reference photo against the room's clusters.
    pub async fn search(&self, room_id: &str) -> Result<SearchOutcome, JobError> {
        let stdout = self.invoke(JobMode::Search, room_id).await?;
        parse_search_output(&stdout)
    }

    async fn invoke(&self, mode: JobMode, room_id: &str) -> Result<String, JobError> {
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let start = Instant::now();
        tracing::info!(%mode, room = room_id, "engine started");
        let result = self.execute(mode, room_id).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => tracing::info!(%mode, room = room_id, ?elapsed, "engine finished"),
            Err(e) => tracing::error!(%mode, room = room_id, ?elapsed, "{e}"),
        }
        result
    }

    /// Stdout of one engine run that exited successfully.
    async fn execute(&self, mode: JobMode, room_id: &str) -> Result<String, JobError> {
        let child = self.spawn(mode, room_id).await?;

        // the child is killed when the timed out future drops it
        let waited = tokio::time::timeout(self.timeout, child.wait_with_output());
        let output = match waited.await {
            Ok(output) => output.map_err(JobError::Spawn)?,
            Err(_) => return Err(JobError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() {
            tracing::debug!(%mode, room = room_id, "engine stderr: {stderr}");
        }

        if !output.status.success() {
            let stderr = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            return Err(JobError::Failure {
                status: output.status,
                stderr,
            });
        }

        tracing::debug!(%mode, room = room_id, "engine stdout: {stdout}");
        Ok(stdout)
    }

    async fn spawn(&self, mode: JobMode, room_id: &str) -> Result<Child, JobError> {
        let mut attempt = 0;
        loop {
            let spawned = Command::new(&self.engine.program)
                .args(&self.engine.args)
                .arg(mode.as_str())
                .arg(room_id)
                .current_dir(&self.workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();
            match spawned {
                Ok(child) => return Ok(child),
                Err(e) if is_transient(&e) && attempt < self.spawn_retries => {
                    attempt += 1;
                    let retries = self.spawn_retries;
                    tracing::warn!("engine spawn failed ({e}), retry {attempt}/{retries}");
                    tokio::time::sleep(SPAWN_RETRY_DELAY * attempt).await;
                }
                Err(e) => return Err(JobError::Spawn(e)),
            }
        }
    }

    fn room_lock(&self, room_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .room_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(room_id.to_owned()).or_default())
    }
}

/// OS level resource exhaustion while starting a process.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory | io::ErrorKind::Interrupted
    )
}

/// Reads the engine's search answer.
///
/// The whole output is tried first, then its last non empty line, so stray
/// diagnostics printed before the JSON do not break the match.
pub fn parse_search_output(stdout: &str) -> Result<SearchOutcome, JobError> {
    let reply = match serde_json::from_str::<SearchReply>(stdout.trim()) {
        Ok(reply) => Ok(reply),
        Err(first) => match stdout.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => serde_json::from_str::<SearchReply>(line.trim()),
            None => Err(first),
        },
    };

    match reply {
        Ok(SearchReply {
            cluster: Some(cluster),
            images,
        }) if !cluster.is_empty() && !images.is_empty() => {
            Ok(SearchOutcome::Match { cluster, images })
        }
        Ok(_) => Ok(SearchOutcome::NoMatch),
        Err(e) => Err(JobError::Malformed {
            output: stdout.to_owned(),
            reason: e.to_string(),
        }),
    }
}
