//! staticd - static file HTTP server

use anyhow::{Context, Result};
use pagecache::FileCache;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use staticd::{Cli, RequestHandler, Server, Stats, StatsSnapshot, StopHandle, WorkerPool};
use std::net::TcpStream;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut config = Cli::parse_lenient(std::env::args()).into_config();
    if config.threads == 0 {
        warn!("Thread count 0 is not usable, running with 1 worker");
        config.threads = 1;
    }

    let root = config.absolute_root();
    info!("Starting staticd v{}", env!("CARGO_PKG_VERSION"));
    info!("Document root: {}", root.display());
    if config.use_cache {
        info!("Cache capacity: {} bytes", config.cache_bytes);
    } else {
        info!("Cache disabled");
    }

    let stats = Arc::new(Stats::new());
    let cache = config
        .use_cache
        .then(|| Arc::new(FileCache::new(config.cache_bytes)));

    let handler = Arc::new(RequestHandler::new(
        root.to_string_lossy().into_owned(),
        cache.clone(),
        Some(Arc::clone(&stats)),
    ));
    let pool = Arc::new(WorkerPool::new(config.threads, move |stream: TcpStream| {
        handler.handle(stream)
    }));

    let server = Server::new(config.port, pool);
    install_signal_handler(server.stop_handle())?;

    if let Err(e) = server.start() {
        error!("{}", e);
        eprintln!("Failed to start server");
        return Ok(ExitCode::FAILURE);
    }

    print_summary(&stats.snapshot(), cache.as_deref());
    Ok(ExitCode::SUCCESS)
}

fn install_signal_handler(handle: StopHandle) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;

    thread::Builder::new()
        .name("staticd-signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                info!("Received signal {}", sig);
                println!("\nShutting down...");
                handle.stop();
            }
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}

fn print_summary(snapshot: &StatsSnapshot, cache: Option<&FileCache>) {
    println!("Total requests handled: {}", snapshot.total_requests);
    println!(
        "Average response time (ms): {:.3}",
        snapshot.average_response_ms()
    );
    println!("Cache hit rate: {:.2}%", snapshot.cache_hit_rate() * 100.0);
    println!("Requests per second: {:.2}", snapshot.requests_per_second());
    println!(
        "Uptime: {:.1}s (since {})",
        snapshot.elapsed.as_secs_f64(),
        snapshot.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(cache) = cache {
        let stats = cache.stats();
        info!(
            "Cache: {} entries, {} of {} bytes, {} evictions",
            stats.entries, stats.size_bytes, stats.capacity_bytes, stats.evictions
        );
    }
}
