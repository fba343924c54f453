use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tonic::transport::Server;

use textwire_core::engine::{EngineConfig, OcrEngine, TesseractEngine};
use textwire_core::governor::MemoryGovernor;
use textwire_core::pool::{EngineFactory, WorkerPool};
use textwire_core::service::OcrStreamService;
use textwire_core::{init_logger, Settings};

/// Sessions still draining after this long get force-closed.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(version, about = "Streaming OCR server", long_about = None)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0", help = "bind address")]
    address: String,

    #[arg(long, default_value_t = 50051, help = "bind port")]
    port: u16,

    #[arg(long, default_value_t = 4, help = "number of OCR worker threads")]
    threads: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger(env!("CARGO_PKG_NAME"));
    let cli = Cli::parse();
    let workers = cli.threads.max(1);
    let settings = Settings::from_env();

    let governor = Arc::new(MemoryGovernor::new(settings.memory_ceiling_bytes));

    let engine_config = EngineConfig::default();
    let factory: EngineFactory = Arc::new(move || {
        TesseractEngine::new(&engine_config).map(|engine| Box::new(engine) as Box<dyn OcrEngine>)
    });
    let pool = Arc::new(
        WorkerPool::new(
            workers,
            settings.queue_capacity,
            settings.rejuvenate_tasks,
            factory,
        )
        .context("failed to initialize the OCR worker pool")?,
    );
    log::info!("OCR service initialized with {} workers", pool.worker_count());

    let addr: SocketAddr = format!("{}:{}", cli.address, cli.port)
        .parse()
        .context("invalid bind address")?;

    let shutting_down = Arc::new(AtomicBool::new(false));
    let drain_started = Arc::new(Notify::new());

    let service = OcrStreamService::new(
        Arc::clone(&pool),
        governor,
        settings,
        Arc::clone(&shutting_down),
    );

    log::info!("OCR server listening on {}", addr);

    let serve = Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, {
            let shutting_down = Arc::clone(&shutting_down);
            let drain_started = Arc::clone(&drain_started);
            async move {
                wait_for_shutdown_signal().await;
                log::info!("received shutdown signal, draining sessions");
                shutting_down.store(true, Ordering::SeqCst);
                drain_started.notify_waiters();
            }
        });
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => result.context("server error")?,
        _ = drain_started.notified() => {
            match tokio::time::timeout(SHUTDOWN_DEADLINE, &mut serve).await {
                Ok(result) => result.context("server error while draining")?,
                Err(_) => log::warn!(
                    "sessions still open after {:?}, forcing close",
                    SHUTDOWN_DEADLINE
                ),
            }
        }
    }

    pool.shutdown().await;
    log::info!("server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = interrupt.recv() => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
