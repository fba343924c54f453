use std::collections::HashSet;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::{Channel, Server};

use textwire_core::engine::OcrEngine;
use textwire_core::governor::MemoryGovernor;
use textwire_core::pool::{EngineFactory, WorkerPool};
use textwire_core::proto::ocr_service_client::OcrServiceClient;
use textwire_core::proto::{ImageRequest, OcrResult};
use textwire_core::service::OcrStreamService;
use textwire_core::{OcrError, Settings};

/// Recognizes the payload as its own UTF-8 text, optionally slowly.
struct EchoEngine {
    delay: Duration,
}

impl OcrEngine for EchoEngine {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn recognize(&mut self, data: &[u8]) -> Result<String, OcrError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// Runs the real decode step, then returns a fixed text.
struct DecodeEngine;

impl OcrEngine for DecodeEngine {
    fn name(&self) -> &'static str {
        "decode"
    }

    fn recognize(&mut self, data: &[u8]) -> Result<String, OcrError> {
        image::load_from_memory(data).map_err(|e| OcrError::Decode(e.to_string()))?;
        Ok("decoded".to_string())
    }
}

fn echo_factory(delay: Duration) -> EngineFactory {
    Arc::new(move || Ok(Box::new(EchoEngine { delay }) as Box<dyn OcrEngine>))
}

async fn start_server(workers: usize, settings: Settings, factory: EngineFactory) -> SocketAddr {
    let pool = Arc::new(
        WorkerPool::new(
            workers,
            settings.queue_capacity,
            settings.rejuvenate_tasks,
            factory,
        )
        .expect("worker pool should initialize"),
    );
    let governor = Arc::new(MemoryGovernor::new(settings.memory_ceiling_bytes));
    let service = OcrStreamService::new(pool, governor, settings, Arc::new(AtomicBool::new(false)));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind an ephemeral port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(
        Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    addr
}

async fn connect(addr: SocketAddr) -> OcrServiceClient<Channel> {
    OcrServiceClient::connect(format!("http://{}", addr))
        .await
        .expect("client should connect")
}

fn request(image_id: &str, payload: &[u8]) -> ImageRequest {
    ImageRequest {
        image_id: image_id.to_string(),
        filename: format!("{}.png", image_id),
        image_data: payload.to_vec(),
    }
}

/// Send every request, half-close, and collect every result.
async fn roundtrip(
    client: &mut OcrServiceClient<Channel>,
    requests: Vec<ImageRequest>,
) -> Vec<OcrResult> {
    let (tx, rx) = mpsc::channel(requests.len().max(1));
    tokio::spawn(async move {
        for request in requests {
            if tx.send(request).await.is_err() {
                break;
            }
        }
    });

    let mut stream = client
        .process_images(ReceiverStream::new(rx))
        .await
        .expect("ProcessImages should start")
        .into_inner();

    let mut results = Vec::new();
    while let Some(result) = stream.message().await.expect("stream should stay healthy") {
        results.push(result);
    }
    results
}

fn default_settings() -> Settings {
    Settings::default()
}

#[tokio::test]
async fn small_batch_echoes_every_id() {
    let addr = start_server(2, default_settings(), echo_factory(Duration::ZERO)).await;
    let mut client = connect(addr).await;

    let results = roundtrip(
        &mut client,
        vec![
            request("a", b"Hello"),
            request("b", b"World"),
            request("c", b"Test"),
        ],
    )
    .await;

    assert_eq!(results.len(), 3);
    let ids: HashSet<_> = results.iter().map(|r| r.image_id.clone()).collect();
    assert_eq!(ids, HashSet::from(["a".into(), "b".into(), "c".into()]));
    let texts: HashSet<_> = results.iter().map(|r| r.extracted_text.clone()).collect();
    assert_eq!(
        texts,
        HashSet::from(["Hello".into(), "World".into(), "Test".into()])
    );
    assert!(results.iter().all(|r| r.success));
    assert!(results.iter().all(|r| r.error_message.is_empty()));
}

#[tokio::test]
async fn empty_image_data_is_rejected() {
    let addr = start_server(1, default_settings(), echo_factory(Duration::ZERO)).await;
    let mut client = connect(addr).await;

    let results = roundtrip(&mut client, vec![request("empty", b"")]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].image_id, "empty");
    assert!(!results[0].success);
    assert_eq!(results[0].error_message, "empty image data");
    assert!(results[0].extracted_text.is_empty());
}

#[tokio::test]
async fn memory_ceiling_rejects_while_first_image_is_in_flight() {
    let settings = Settings {
        memory_ceiling_bytes: 1024 * 1024,
        ..Settings::default()
    };
    let addr = start_server(4, settings, echo_factory(Duration::from_millis(500))).await;
    let mut client = connect(addr).await;

    let payload = vec![b'x'; 900 * 1024];
    let results = roundtrip(
        &mut client,
        vec![request("big-1", &payload), request("big-2", &payload)],
    )
    .await;

    assert_eq!(results.len(), 2);
    let by_id = |id: &str| results.iter().find(|r| r.image_id == id).unwrap();
    assert!(by_id("big-1").success);
    assert!(!by_id("big-2").success);
    assert_eq!(by_id("big-2").error_message, "server memory limit exceeded");
}

#[tokio::test]
async fn hundred_images_all_answered_after_half_close() {
    let addr = start_server(4, default_settings(), echo_factory(Duration::ZERO)).await;
    let mut client = connect(addr).await;

    let requests: Vec<_> = (0..100)
        .map(|i| request(&format!("img-{}", i), format!("text {}", i).as_bytes()))
        .collect();
    let results = roundtrip(&mut client, requests).await;

    assert_eq!(results.len(), 100);
    let ids: HashSet<_> = results.iter().map(|r| r.image_id.clone()).collect();
    assert_eq!(ids.len(), 100, "every request answered exactly once");
    assert!(results.iter().all(|r| r.success));
}

#[tokio::test]
async fn undecodable_bytes_fail_with_decode_error() {
    let factory: EngineFactory = Arc::new(|| Ok(Box::new(DecodeEngine) as Box<dyn OcrEngine>));
    let addr = start_server(1, default_settings(), factory).await;
    let mut client = connect(addr).await;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        8,
        8,
        image::Rgb([255, 255, 255]),
    ))
    .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
    .expect("in-memory png encode");

    let garbage = vec![0x5au8; 800 * 1024];
    let results = roundtrip(
        &mut client,
        vec![request("good", &png), request("bad", &garbage)],
    )
    .await;

    assert_eq!(results.len(), 2);
    let by_id = |id: &str| results.iter().find(|r| r.image_id == id).unwrap();
    assert!(by_id("good").success);
    assert_eq!(by_id("good").extracted_text, "decoded");
    assert!(!by_id("bad").success);
    assert!(
        by_id("bad").error_message.starts_with("decode failed"),
        "got: {}",
        by_id("bad").error_message
    );
}

#[tokio::test]
async fn responses_are_not_bound_to_request_order() {
    let factory: EngineFactory = Arc::new(|| {
        Ok(Box::new(SelectiveDelayEngine) as Box<dyn OcrEngine>)
    });
    let addr = start_server(2, default_settings(), factory).await;
    let mut client = connect(addr).await;

    let results = roundtrip(
        &mut client,
        vec![request("slow", b"slow"), request("fast", b"fast")],
    )
    .await;

    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0].image_id, "fast",
        "the cheap image should finish first even though it was sent second"
    );
}

/// Sleeps only for the payload "slow".
struct SelectiveDelayEngine;

impl OcrEngine for SelectiveDelayEngine {
    fn name(&self) -> &'static str {
        "selective-delay"
    }

    fn recognize(&mut self, data: &[u8]) -> Result<String, OcrError> {
        if data == b"slow" {
            std::thread::sleep(Duration::from_millis(400));
        }
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

#[tokio::test]
async fn rejections_do_not_poison_the_stream() {
    let addr = start_server(2, default_settings(), echo_factory(Duration::ZERO)).await;
    let mut client = connect(addr).await;

    let results = roundtrip(
        &mut client,
        vec![
            request("one", b"one"),
            request("hole", b""),
            request("two", b"two"),
        ],
    )
    .await;

    assert_eq!(results.len(), 3);
    let by_id = |id: &str| results.iter().find(|r| r.image_id == id).unwrap();
    assert!(by_id("one").success);
    assert!(!by_id("hole").success);
    assert!(by_id("two").success);
}
