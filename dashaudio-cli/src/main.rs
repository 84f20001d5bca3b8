mod cli;
mod error;
mod params;
mod progress;

use std::process;

use clap::Parser;
use dashaudio_engine::Pipeline;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;
use crate::error::AppError;
use crate::progress::SegmentProgress;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    init_logging(args.verbose, args.quiet)?;

    let config = args.pipeline_config()?;
    let token = CancellationToken::new();
    spawn_interrupt_handler(token.clone());

    let mut pipeline = Pipeline::new(config, token)?;
    let progress = (!args.quiet && !args.no_progress).then(SegmentProgress::new);
    if let Some(progress) = &progress {
        pipeline = pipeline
            .with_progress(progress.callback())
            .with_state_observer(progress.observer());
    }

    let output = pipeline.run(&args.pid).await?;
    println!("Done! OGG file saved to: {}", output.display());
    Ok(())
}

fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight downloads before exiting");
            token.cancel();
        }
    });
}

fn init_logging(verbose: bool, quiet: bool) -> Result<(), AppError> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}
