mod cli;
mod commands;
mod error;

use crate::cli::Cli;
use crate::commands::Context;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use folio_config::Config;
use folio_store::{Database, PoolOptions};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let level = config.log.level_filter().or_raise(|| ErrorKind::Config)?;
    init_tracing(verbosity(level, cli.verbose));

    let options = PoolOptions {
        max_connections: config.database.max_connections,
        busy_timeout: config.database.busy_timeout(),
    };
    let db = Database::connect_with(&config.database.path, options).await.or_raise(|| ErrorKind::Store)?;
    let ctx = Context { db: &db, dry_run: cli.dry_run || config.maintenance.dry_run };
    let result = commands::run(&ctx, cli.command).await;
    db.close().await;
    for line in result? {
        println!("{line}");
    }
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise the configured level, raised one step
/// per `-v`.
fn init_tracing(level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn verbosity(configured: LevelFilter, verbose: u8) -> LevelFilter {
    match verbose {
        0 => configured,
        1 => configured.max(LevelFilter::DEBUG),
        _ => LevelFilter::TRACE,
    }
}
