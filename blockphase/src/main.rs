//! `blockphase` command-line entry point

use clap::Parser;

use blockphase::cli::args::{Cli, OutputFormat};
use blockphase::cli::commands;
use blockphase::error::ExitCode;
use blockphase::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        let format = match cli.log_format {
            OutputFormat::Human => LogFormat::Human,
            OutputFormat::Json => LogFormat::Json,
        };
        init_logging(format, cli.verbose, cli.color);
    }

    tokio::spawn(wait_for_signal());

    match commands::dispatch(cli).await {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        std::process::exit(ExitCode::INTERRUPTED);
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
        _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    std::process::exit(ExitCode::INTERRUPTED);
}
