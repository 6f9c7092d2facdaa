use anyhow::{bail, Result};
use marketintel_cli::cli::Cli;
use marketintel_core::domain::RunStatus;
use marketintel_core::{observability, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = Config::load(&cli.config)?;
    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    observability::init_tracing(log_level, config.logging.json);

    info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config.display(), "marketintel starting");

    let app = marketintel_cli::bootstrap(&config).await?;

    let exit_ok = if cli.once {
        run_once(&app).await
    } else {
        run_forever(&app).await
    };

    app.database.close().await;

    if !exit_ok {
        bail!("marketintel exited with a failure status");
    }
    Ok(())
}

async fn run_once(app: &marketintel_cli::App) -> bool {
    match app.scheduler.run_once().await {
        Ok(run) => {
            info!(
                run_id = %run.id,
                status = ?run.status,
                summary = %run.summary.as_deref().unwrap_or(""),
                "pass complete"
            );
            matches!(run.status, RunStatus::Success | RunStatus::Partial)
        }
        Err(err) => {
            error!(error = %err, "pass failed before a run history row could be written");
            false
        }
    }
}

async fn run_forever(app: &marketintel_cli::App) -> bool {
    let shutdown = app.scheduler.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown.send(());
        }
    });

    match app.scheduler.run_forever().await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "scheduler loop exited with an error");
            false
        }
    }
}
