use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use textwire_core::init_logger;
use textwire_core::proto::ocr_service_client::OcrServiceClient;
use textwire_core::proto::ImageRequest;
use textwire_core::Settings;

#[derive(Parser)]
#[command(version, about = "Send images to a streaming OCR server", long_about = None)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:50051", help = "server endpoint")]
    server: String,

    #[arg(required = true, help = "image files to recognize")]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger(env!("CARGO_PKG_NAME"));
    let cli = Cli::parse();
    let expected = cli.images.len();

    let max_message_bytes = Settings::get_default_max_message_bytes();
    let mut client = OcrServiceClient::connect(cli.server.clone())
        .await
        .with_context(|| format!("failed to connect to {}", cli.server))?
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);

    let (request_tx, request_rx) = mpsc::channel(16);
    let sender = tokio::spawn(async move {
        for (index, path) in cli.images.into_iter().enumerate() {
            let image_data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(err) => {
                    log::error!("skipping {}: {}", path.display(), err);
                    continue;
                }
            };
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let request = ImageRequest {
                image_id: format!("img-{}", index),
                filename,
                image_data,
            };
            if request_tx.send(request).await.is_err() {
                log::warn!("server closed the stream early");
                break;
            }
        }
        // Dropping the sender half-closes the stream; the server keeps
        // answering what it already accepted.
    });

    let response = client
        .process_images(ReceiverStream::new(request_rx))
        .await
        .context("ProcessImages call failed")?;
    let mut results = response.into_inner();

    let mut received = 0usize;
    while let Some(result) = results.message().await? {
        received += 1;
        if result.success {
            println!("{}: {}", result.image_id, result.extracted_text);
        } else {
            println!("{}: FAILED ({})", result.image_id, result.error_message);
        }
    }

    sender.await.context("request sender task failed")?;
    log::info!("received {} of {} results", received, expected);
    Ok(())
}
