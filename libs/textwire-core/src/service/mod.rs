use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::common::Settings;
use crate::governor::MemoryGovernor;
use crate::pool::WorkerPool;
use crate::proto::ocr_service_server::{OcrService, OcrServiceServer};
use crate::proto::{ImageRequest, OcrResult};
use crate::session::StreamSession;

/// Buffered results per session between the workers and the stream writer.
const RESPONSE_CHANNEL_CAPACITY: usize = 32;

/// gRPC face of the pipeline: accepts a stream, hands it to a
/// `StreamSession`, and returns the session's response channel as the
/// outbound stream.
pub struct OcrStreamService {
    pool: Arc<WorkerPool>,
    governor: Arc<MemoryGovernor>,
    settings: Settings,
    shutting_down: Arc<AtomicBool>,
}

impl OcrStreamService {
    pub fn new(
        pool: Arc<WorkerPool>,
        governor: Arc<MemoryGovernor>,
        settings: Settings,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            governor,
            settings,
            shutting_down,
        }
    }

    /// Wrap the service for serving, with the transport message limits the
    /// wire contract promises in both directions.
    pub fn into_server(self) -> OcrServiceServer<Self> {
        let max_message_bytes = self.settings.max_message_bytes;
        OcrServiceServer::new(self)
            .max_decoding_message_size(max_message_bytes)
            .max_encoding_message_size(max_message_bytes)
    }
}

#[tonic::async_trait]
impl OcrService for OcrStreamService {
    type ProcessImagesStream =
        Pin<Box<dyn Stream<Item = Result<OcrResult, Status>> + Send + 'static>>;

    async fn process_images(
        &self,
        request: Request<Streaming<ImageRequest>>,
    ) -> Result<Response<Self::ProcessImagesStream>, Status> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Status::unavailable("server is shutting down"));
        }

        let (response_tx, response_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let session = StreamSession::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.governor),
            self.settings.session_task_limit,
        );
        tokio::spawn(session.run(request.into_inner(), response_tx));

        let outbound = ReceiverStream::new(response_rx).map(Ok);
        Ok(Response::new(Box::pin(outbound) as Self::ProcessImagesStream))
    }
}
