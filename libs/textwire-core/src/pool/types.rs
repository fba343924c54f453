use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;

use crate::governor::ByteReservation;
use crate::proto::OcrResult;

/// One admitted image on its way through the pool. Dropping the task
/// returns its byte reservation to the governor and its session permit, if
/// any, to the session.
pub struct OcrTask {
    pub image_id: String,
    pub filename: String,
    pub payload: Vec<u8>,
    pub reservation: Option<ByteReservation>,
    pub permit: Option<OwnedSemaphorePermit>,
    /// The owning session's response channel. One clone per task keeps the
    /// outbound stream open until every outstanding task has answered.
    pub respond: mpsc::Sender<OcrResult>,
}
