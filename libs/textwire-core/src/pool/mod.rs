mod types;
pub use types::OcrTask;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::OcrEngine;
use crate::error::OcrError;
use crate::proto::OcrResult;

/// Builds one engine instance. Called once per worker at startup and again
/// on every rejuvenation.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn OcrEngine>, OcrError> + Send + Sync>;

/// Fixed set of long-lived workers, each pinned to its own engine and its
/// own bounded task queue. Tasks are dispatched round-robin; a full queue
/// makes `submit` wait, which is the admission back-pressure the sessions
/// rely on.
pub struct WorkerPool {
    senders: Mutex<Vec<mpsc::Sender<OcrTask>>>,
    next_worker: AtomicUsize,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `workers` workers. A worker whose engine fails to initialize
    /// is skipped with an error log; if no engine comes up at all the pool
    /// cannot run and construction fails.
    pub fn new(
        workers: usize,
        queue_capacity: usize,
        rejuvenate_tasks: u64,
        factory: EngineFactory,
    ) -> Result<Self, OcrError> {
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let engine = match factory() {
                Ok(engine) => engine,
                Err(err) => {
                    log::error!("worker {}: engine init failed: {}", worker_id, err);
                    continue;
                }
            };

            let (task_tx, task_rx) = mpsc::channel::<OcrTask>(queue_capacity.max(1));
            let factory = Arc::clone(&factory);
            let handle = tokio::task::spawn_blocking(move || {
                worker_loop(worker_id, engine, task_rx, rejuvenate_tasks, factory);
            });

            senders.push(task_tx);
            handles.push(handle);
        }

        if senders.is_empty() {
            return Err(OcrError::Init(
                "no OCR worker could be initialized".to_string(),
            ));
        }

        let worker_count = senders.len();
        Ok(Self {
            senders: Mutex::new(senders),
            next_worker: AtomicUsize::new(0),
            handles: tokio::sync::Mutex::new(handles),
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Hand a task to some worker. Waits while the chosen worker's queue
    /// is full. Returns the task untouched when the pool is shut down so
    /// the caller can answer it.
    pub async fn submit(&self, task: OcrTask) -> Result<(), OcrTask> {
        let sender = {
            let senders = self.senders.lock().unwrap();
            if senders.is_empty() {
                drop(senders);
                return Err(task);
            }
            let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % senders.len();
            senders[index].clone()
        };

        sender.send(task).await.map_err(|rejected| rejected.0)
    }

    /// Stop accepting tasks, let every worker drain its queue, then join
    /// them. Each worker drops its engine on exit.
    pub async fn shutdown(&self) {
        self.senders.lock().unwrap().clear();

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(err) = handle.await {
                log::error!("worker exited abnormally: {}", err);
            }
        }
    }
}

fn worker_loop(
    worker_id: usize,
    mut engine: Box<dyn OcrEngine>,
    mut tasks: mpsc::Receiver<OcrTask>,
    rejuvenate_tasks: u64,
    factory: EngineFactory,
) {
    log::debug!("worker {} started ({})", worker_id, engine.name());
    let mut processed: u64 = 0;

    while let Some(task) = tasks.blocking_recv() {
        let result = run_task(engine.as_mut(), &task);
        let image_id = task.image_id.clone();

        if task.respond.blocking_send(result).is_err() {
            log::warn!(
                "worker {}: dropping result for image {}, client gone",
                worker_id,
                image_id
            );
        }
        // Reservation and session permit release here.
        drop(task);

        processed += 1;
        if rejuvenate_tasks > 0 && processed % rejuvenate_tasks == 0 {
            match factory() {
                Ok(fresh) => {
                    log::debug!(
                        "worker {}: engine rejuvenated after {} tasks",
                        worker_id,
                        processed
                    );
                    engine = fresh;
                }
                Err(err) => {
                    log::error!(
                        "worker {}: rejuvenation failed, keeping engine: {}",
                        worker_id,
                        err
                    );
                }
            }
        }
    }

    log::debug!("worker {} finished after {} tasks", worker_id, processed);
}

fn run_task(engine: &mut dyn OcrEngine, task: &OcrTask) -> OcrResult {
    log::debug!("recognizing {} (id {})", task.filename, task.image_id);

    match engine.recognize(&task.payload) {
        Ok(text) if text.is_empty() => {
            OcrResult::failure(&task.image_id, "ocr failed to extract text")
        }
        Ok(text) => OcrResult::ok(&task.image_id, text),
        Err(err) => {
            log::warn!("recognition failed for {}: {}", task.image_id, err);
            OcrResult::failure(&task.image_id, err.to_string())
        }
    }
}
