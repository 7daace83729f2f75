//! Dispatcher and worker pool
//!
//! Work requests flow through a bounded queue into a fixed pool of workers.
//! Scheduling uses worker self-registration: each idle worker parks the send
//! endpoint of its own one-slot channel on the registration channel, and the
//! dispatcher hands a single job to whichever endpoint it receives next.
//! When every worker is busy the dispatcher blocks on the registration
//! channel, which pushes back onto the bounded work queue and, only once that
//! is full, onto the submit path.
//!
//! Every status transition passes through one status channel into a single
//! storage writer, so writes for a given request arrive in submission order.

use chrono::Utc;
use rackops_core::observability::metrics;
use rackops_core::provision::{StatusMsg, TaskStatus, WorkRequest};
use rackops_core::storage::Storage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const WORK_QUEUE_DEPTH: usize = 100;
const STATUS_QUEUE_DEPTH: usize = 100;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("work queue is full")]
    QueueFull,
    #[error("dispatcher is shut down")]
    Closed,
}

/// Handle for submitting work to the pool.
#[derive(Clone)]
pub struct Dispatcher {
    work_tx: mpsc::Sender<WorkRequest>,
}

impl Dispatcher {
    /// Start the status writer, the worker pool, and the dispatch loop.
    pub fn start(num_workers: usize, storage: Arc<dyn Storage>) -> Self {
        let (work_tx, mut work_rx) = mpsc::channel::<WorkRequest>(WORK_QUEUE_DEPTH);
        let (status_tx, mut status_rx) = mpsc::channel::<StatusMsg>(STATUS_QUEUE_DEPTH);
        let (ready_tx, mut ready_rx) =
            mpsc::channel::<mpsc::Sender<WorkRequest>>(num_workers.max(1));

        // Status writer: the only task that writes to storage.
        tokio::spawn(async move {
            while let Some(update) = status_rx.recv().await {
                let id = update.request.info.id.clone();
                if let Err(e) = storage.put(&id, update).await {
                    error!(id = %id, error = %e, "unable to update storage with status");
                } else {
                    debug!(id = %id, "storage updated");
                }
            }
        });

        for id in 0..num_workers {
            info!(worker = id, "creating worker");
            let ready_tx = ready_tx.clone();
            let status_tx = status_tx.clone();
            tokio::spawn(worker_loop(id as i64, ready_tx, status_tx));
        }

        // Dispatch loop: publish Pending on dequeue, then block for an idle
        // worker before handing over the job.
        tokio::spawn(async move {
            while let Some(work) = work_rx.recv().await {
                debug!(id = %work.info.id, "received work request");
                let pending = StatusMsg {
                    request: work.clone(),
                    worker: -1,
                    status: TaskStatus::Pending,
                    message: String::new(),
                    timestamp: Utc::now().timestamp(),
                };
                if status_tx.send(pending).await.is_err() {
                    break;
                }

                let Some(worker) = ready_rx.recv().await else {
                    break;
                };
                debug!(id = %work.info.id, "dispatching work request");
                if worker.send(work).await.is_err() {
                    error!("worker went away while idle");
                }
            }
            info!("stopping dispatcher");
        });

        Self { work_tx }
    }

    /// Enqueue a work request without waiting; the queue is bounded.
    pub fn dispatch(&self, work: WorkRequest) -> Result<(), DispatchError> {
        metrics::record_dispatch();
        self.work_tx.try_send(work).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// One worker: park on the registration channel, run the job, repeat.
async fn worker_loop(
    id: i64,
    ready_tx: mpsc::Sender<mpsc::Sender<WorkRequest>>,
    status_tx: mpsc::Sender<StatusMsg>,
) {
    let (work_tx, mut work_rx) = mpsc::channel::<WorkRequest>(1);
    loop {
        if ready_tx.send(work_tx.clone()).await.is_err() {
            info!(worker = id, "worker stopping");
            return;
        }
        let Some(work) = work_rx.recv().await else {
            info!(worker = id, "worker stopping");
            return;
        };

        let running = StatusMsg {
            request: work.clone(),
            worker: id,
            status: TaskStatus::Running,
            message: String::new(),
            timestamp: Utc::now().timestamp(),
        };
        if status_tx.send(running).await.is_err() {
            return;
        }

        metrics::worker_busy(1.0);
        let result = execute(&work).await;
        metrics::worker_busy(-1.0);

        let (status, message) = match result {
            Ok(()) => (TaskStatus::Complete, String::new()),
            Err(message) => (TaskStatus::Failed, message),
        };
        let done = StatusMsg {
            request: work,
            worker: id,
            status,
            message,
            timestamp: Utc::now().timestamp(),
        };
        if status_tx.send(done).await.is_err() {
            return;
        }
    }
}

/// Run the provisioning script as a child process, blocking this worker.
async fn execute(work: &WorkRequest) -> Result<(), String> {
    let info = &work.info;
    debug!(script = %work.script, id = %info.id, name = %info.name,
        ip = %info.ip, mac = %info.mac, role = %work.role, "RUN");

    let status = tokio::process::Command::new(&work.script)
        .arg(&info.id)
        .arg(&info.name)
        .arg(&info.ip)
        .arg(&info.mac)
        .arg(&work.role)
        .status()
        .await
        .map_err(|e| e.to_string())?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("script '{}' exited with {status}", work.script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackops_core::provision::RequestInfo;
    use rackops_core::storage::MemoryStorage;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn request(id: &str, script: &str) -> WorkRequest {
        WorkRequest {
            info: RequestInfo {
                id: id.to_string(),
                name: "h1".into(),
                ip: "10.0.0.5".into(),
                mac: "AA:BB:CC:DD:EE:01".into(),
                ..Default::default()
            },
            script: script.to_string(),
            role: "compute-node".into(),
        }
    }

    async fn wait_for_status(
        storage: &Arc<dyn Storage>,
        id: &str,
        wanted: TaskStatus,
    ) -> StatusMsg {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(msg) = storage.get(id).await.unwrap() {
                if msg.status == wanted {
                    return msg;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for status {wanted} on '{id}'");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Script that sleeps long enough for the Running state to be observed.
    fn slow_script(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("provision.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\nsleep 0.3\nexit 0").unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_submit_runs_script_to_complete() {
        let dir = tempfile::tempdir().unwrap();
        let script = slow_script(&dir);
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dispatcher = Dispatcher::start(2, storage.clone());

        dispatcher.dispatch(request("n1", &script)).unwrap();

        let running = wait_for_status(&storage, "n1", TaskStatus::Running).await;
        let complete = wait_for_status(&storage, "n1", TaskStatus::Complete).await;
        assert!(complete.timestamp >= running.timestamp);
        assert!(complete.message.is_empty());
        assert!(complete.worker >= 0);
    }

    #[tokio::test]
    async fn test_failing_script_records_failed_with_message() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dispatcher = Dispatcher::start(1, storage.clone());

        dispatcher.dispatch(request("n2", "false")).unwrap();

        let failed = wait_for_status(&storage, "n2", TaskStatus::Failed).await;
        assert!(!failed.message.is_empty());
    }

    #[tokio::test]
    async fn test_missing_script_records_failed() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dispatcher = Dispatcher::start(1, storage.clone());

        dispatcher
            .dispatch(request("n3", "/nonexistent/provision-script"))
            .unwrap();

        let failed = wait_for_status(&storage, "n3", TaskStatus::Failed).await;
        assert!(!failed.message.is_empty());
    }

    #[tokio::test]
    async fn test_at_most_one_record_per_id() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dispatcher = Dispatcher::start(2, storage.clone());

        dispatcher.dispatch(request("n4", "true")).unwrap();
        wait_for_status(&storage, "n4", TaskStatus::Complete).await;

        // A resubmission overwrites the record rather than adding one.
        dispatcher.dispatch(request("n4", "true")).unwrap();
        wait_for_status(&storage, "n4", TaskStatus::Complete).await;
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }
}
