use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tonic::Streaming;

use crate::governor::MemoryGovernor;
use crate::pool::{OcrTask, WorkerPool};
use crate::proto::{ImageRequest, OcrResult};

const EMPTY_IMAGE_DATA: &str = "empty image data";
const MEMORY_LIMIT_EXCEEDED: &str = "server memory limit exceeded";

/// One connected client's stream. The session reads requests, runs
/// admission, and dispatches tasks; completed results flow back through
/// `responses`, whose single consumer is the outbound stream writer, so
/// response writes never interleave.
///
/// Every admitted task carries its own clone of the response sender. The
/// outbound stream therefore closes exactly when the reader has stopped
/// and the last outstanding task has answered (or lost its client).
pub struct StreamSession {
    pool: Arc<WorkerPool>,
    governor: Arc<MemoryGovernor>,
    task_limit: Option<Arc<Semaphore>>,
}

impl StreamSession {
    pub fn new(
        pool: Arc<WorkerPool>,
        governor: Arc<MemoryGovernor>,
        session_task_limit: Option<usize>,
    ) -> Self {
        Self {
            pool,
            governor,
            task_limit: session_task_limit.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    pub async fn run(
        self,
        mut inbound: Streaming<ImageRequest>,
        responses: mpsc::Sender<OcrResult>,
    ) {
        log::info!("client connected");
        let mut dispatched: u64 = 0;
        let mut rejected: u64 = 0;

        loop {
            let request = match inbound.message().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    // Client half-closed; stop reading and let the
                    // outstanding tasks drain through the channel.
                    break;
                }
                Err(status) => {
                    log::warn!("session cancelled: {}", status);
                    break;
                }
            };

            let ImageRequest {
                image_id,
                filename,
                image_data,
            } = request;
            log::info!("processing image {} (id {})", filename, image_id);

            if image_data.is_empty() {
                rejected += 1;
                send_result(&responses, OcrResult::failure(&image_id, EMPTY_IMAGE_DATA)).await;
                continue;
            }

            let reservation = match self.governor.admit(image_data.len() as u64) {
                Some(reservation) => reservation,
                None => {
                    rejected += 1;
                    log::warn!(
                        "rejecting image {}: {} bytes over a {} byte ceiling with {} in flight",
                        image_id,
                        image_data.len(),
                        self.governor.ceiling_bytes(),
                        self.governor.in_flight_bytes()
                    );
                    send_result(
                        &responses,
                        OcrResult::failure(&image_id, MEMORY_LIMIT_EXCEEDED),
                    )
                    .await;
                    continue;
                }
            };

            let permit = match &self.task_limit {
                Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
                None => None,
            };

            let task = OcrTask {
                image_id: image_id.clone(),
                filename,
                payload: image_data,
                reservation: Some(reservation),
                permit,
                respond: responses.clone(),
            };

            // Blocks while the chosen worker's queue is full; that is the
            // back-pressure the client observes.
            if let Err(task) = self.pool.submit(task).await {
                rejected += 1;
                log::error!("worker pool unavailable, failing image {}", task.image_id);
                send_result(
                    &responses,
                    OcrResult::failure(
                        &task.image_id,
                        "ocr engine error: worker pool unavailable",
                    ),
                )
                .await;
                continue;
            }
            dispatched += 1;
        }

        log::info!(
            "client disconnected ({} dispatched, {} rejected)",
            dispatched,
            rejected
        );
    }
}

async fn send_result(responses: &mpsc::Sender<OcrResult>, result: OcrResult) {
    let image_id = result.image_id.clone();
    if responses.send(result).await.is_err() {
        log::warn!("failed to send result for image {}", image_id);
    }
}
