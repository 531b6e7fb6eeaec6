use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::bus::ChannelBus;
use crate::config::{BusConfig, StoreConfig};
use crate::database::{LibsqlStore, run_migrations};
use crate::logging;
use crate::manager::CheckManager;
use crate::monitoring::Check;
use crate::monitoring::http::{HttpCheck, HttpCheckOptions};
use crate::pool::open_pool;

/// Periodic endpoint monitor with an event pipeline into durable storage.
#[derive(Debug, Parser)]
#[command(name = "monitord", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Monitor one or more URLs with periodic HTTP checks
    Http(HttpArgs),
}

#[derive(Debug, clap::Args)]
struct HttpArgs {
    /// HTTP method to use for the check
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Regular expression used to verify response content
    #[arg(short, long)]
    regex: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 2.0)]
    timeout: f64,

    /// Interval between checks in seconds
    #[arg(short, long, default_value_t = 30.0)]
    interval: f64,

    /// Header to use for requests made (eg: 'Authorization: Bearer token')
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Skip TLS certificate verification for https targets
    #[arg(long)]
    no_verify_tls: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Target URLs to monitor
    #[arg(required = true)]
    urls: Vec<String>,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Http(args) => run_http(args).await,
        }
    }
}

fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    for header in raw {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("headers should be of the form 'Key: Value', got {header:?}"))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

async fn run_http(args: HttpArgs) -> Result<()> {
    logging::init(args.debug);
    let headers = parse_headers(&args.headers)?;

    let mut checks: Vec<Arc<dyn Check>> = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let check = HttpCheck::new(
            url,
            HttpCheckOptions {
                method: args.method.clone(),
                regex: args.regex.clone(),
                timeout: args.timeout,
                headers: headers.clone(),
                verify_tls: !args.no_verify_tls,
                interval: args.interval,
            },
        )?;
        checks.push(Arc::new(check));
    }

    let store_config = StoreConfig::from_env();
    let bus_config = BusConfig::from_env();

    info!(path = %store_config.path, "opening durable store");
    let pool = open_pool(&store_config.path).await?;
    let conn = pool.get().await?;
    run_migrations(&conn).await?;
    drop(conn);

    let store = Arc::new(LibsqlStore::new(pool));
    let bus = Arc::new(ChannelBus::new(bus_config.capacity));
    let manager = CheckManager::new(store, bus, bus_config.topic);

    run_pipeline(manager, checks).await
}

/// Drive the consumer task and one monitor task per check until shutdown.
///
/// A task that dies with an error is logged while its siblings keep
/// running; cancellation at shutdown is a clean join outcome, never a
/// failure.
async fn run_pipeline(manager: CheckManager, checks: Vec<Arc<dyn Check>>) -> Result<()> {
    let mut tasks = JoinSet::new();

    {
        let manager = manager.clone();
        tasks.spawn(async move { manager.consume_events().await });
    }
    for check in checks {
        let manager = manager.clone();
        tasks.spawn(async move { manager.monitor("http", check).await });
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received, cancelling tasks");
                tasks.abort_all();
                break;
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => error!(error = %err, "pipeline task terminated"),
                Some(Err(err)) if err.is_cancelled() => {}
                Some(Err(err)) => error!(error = %err, "pipeline task panicked"),
            },
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "pipeline task terminated"),
            Err(err) if err.is_cancelled() => {}
            Err(err) => error!(error = %err, "pipeline task panicked"),
        }
    }

    Ok(())
}
