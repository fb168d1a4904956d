//! sslcount - count SSL_read calls per process
//!
//! Attaches an entry and a return uprobe to the target symbol, either
//! in-process or through a bpfman agent (cargo feature `delegated`), then
//! logs per-process counter changes every second until interrupted.

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("Error: sslcount requires Linux to run eBPF programs");
    std::process::exit(1);
}

#[cfg(target_os = "linux")]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use clap::Parser;
    use sslcount::backend;
    use sslcount::cli::Cli;
    use sslcount::lifecycle::Coordinator;
    use std::process;
    use tokio::signal;
    use tokio_util::sync::CancellationToken;
    use tracing::{error, info};
    use tracing_subscriber::EnvFilter;

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("sslcount v{} starting", sslcount::VERSION);

    let result: anyhow::Result<()> = async {
        let settings = cli.settings()?;
        let target = settings.target();
        let backend = backend::build(&settings)?;

        let shutdown = CancellationToken::new();
        let on_interrupt = shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => on_interrupt.cancel(),
                Err(e) => error!("Failed to listen for interrupt: {}", e),
            }
        });

        let mut coordinator = Coordinator::new(shutdown);
        let summary = coordinator.run(backend, &target).await?;
        info!(
            "Polled {} times, {} changes, released {} resources",
            summary.polls, summary.changes, summary.released
        );
        Ok(())
    }
    .await;

    info!("sslcount stopped");

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
