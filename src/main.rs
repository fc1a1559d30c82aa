use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use granville::backend::{Backend, FfiBackend, StubBackend};
use granville::cli::{Cli, Command};
use granville::config::Config;
use granville::connection::{self, QueueRouter};
use granville::error::FatalError;
use granville::pool::Pool;
use granville::queue::{RankedQueue, UnrankedQueue};
use granville::ranker::Ranker;
use granville::transport::{DefaultListener, Listener};
use granville::worker::Worker;

fn main() -> ExitCode {
    granville::logging::init();

    let cli = Cli::parse();
    let Command::Serve(args) = cli.command;

    let config = match Config::from_args(args) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), FatalError> {
    let backend: Arc<dyn Backend> = if config.driver == "stub" {
        Arc::new(StubBackend::new())
    } else {
        match FfiBackend::load(&config.driver) {
            Ok(b) => Arc::new(b),
            Err(source) => {
                return Err(FatalError::DriverLoad {
                    driver: config.driver.clone(),
                    source,
                });
            }
        }
    };

    let pool = Arc::new(Pool::new(backend));
    for spec in &config.models {
        if let Err(source) = pool.load(spec) {
            pool.teardown();
            return Err(FatalError::ModelLoad {
                spec: spec.to_string(),
                source,
            });
        }
    }
    info!(models = pool.count(), "models loaded");

    let listener = match DefaultListener::bind(&config.socket) {
        Ok(l) => l,
        Err(source) => {
            pool.teardown();
            return Err(FatalError::SocketBind {
                path: config.socket.clone(),
                source,
            });
        }
    };

    let unranked = Arc::new(UnrankedQueue::new());
    let ranked = Arc::new(RankedQueue::new(config.queue_size));
    let running = Arc::new(AtomicBool::new(true));

    install_shutdown_handler(Arc::clone(&running));

    let ranker_handle = {
        let ranker = Ranker::new(
            Arc::clone(&pool),
            Arc::clone(&unranked),
            Arc::clone(&ranked),
            Arc::clone(&running),
        );
        std::thread::spawn(move || ranker.run())
    };

    let worker_handles: Vec<_> = (0..config.workers)
        .map(|_| {
            let worker = Worker::new(Arc::clone(&pool), Arc::clone(&ranked), Arc::clone(&running));
            std::thread::spawn(move || worker.run())
        })
        .collect();

    info!(socket = %config.socket, workers = config.workers, "accepting connections");
    while running.load(std::sync::atomic::Ordering::Relaxed) {
        match listener.accept() {
            Ok(Some(conn)) => connection::handle(
                conn,
                QueueRouter {
                    unranked: &unranked,
                    ranked: &ranked,
                },
            ),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "accept failed");
            }
        }
    }

    info!("shutting down");
    let _ = ranker_handle.join();
    for handle in worker_handles {
        let _ = handle.join();
    }
    pool.teardown();
    Ok(())
}

#[cfg(unix)]
fn install_shutdown_handler(running: Arc<AtomicBool>) {
    // signal_hook's flag helper sets its flag to `true` on receipt, the
    // opposite polarity of `running` (true = keep going); bridge the two
    // with a watcher thread instead of inverting `running`'s meaning
    // everywhere else it's read.
    let signaled = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&signaled)) {
            error!(error = %e, "failed to install signal handler");
        }
    }
    std::thread::spawn(move || {
        while !signaled.load(std::sync::atomic::Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        running.store(false, std::sync::atomic::Ordering::Relaxed);
    });
}

#[cfg(windows)]
fn install_shutdown_handler(running: Arc<AtomicBool>) {
    let _ = ctrlc_windows(running);
}

#[cfg(windows)]
fn ctrlc_windows(running: Arc<AtomicBool>) {
    // No signal-hook support on Windows in this crate's dependency set;
    // Ctrl-C still reaches the process as SIGINT-equivalent through the
    // Rust runtime's default handler, which simply terminates. A graceful
    // Windows shutdown path is not wired up (named-pipe transport itself
    // is unvalidated beyond compiling, see DESIGN.md).
    let _ = running;
}
