use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use lecture_server::{api, catalog::Catalog, config::Config, utils::init_log};
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database url, e.g. sqlite://database/catalog.db
    #[arg(short, long)]
    database: Option<String>,

    #[arg(short = 'H', long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for daily rotated log files, logs go to stdout otherwise
    #[arg(short, long)]
    log_dir: Option<PathBuf>,

    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

impl Args {
    /// file < environment < command line
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        }
        .with_env();
        if let Some(database) = self.database {
            config.database_url = database;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = Some(log_dir);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    let _guard = init_log(config.log_dir.clone())?;

    let catalog =
        Arc::new(Catalog::connect(&config.database_url, config.progress_lock_capacity).await?);
    let app = api::app(catalog, config.request_timeout());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Starting server at http://{}", listener.local_addr()?);
    info!(
        "Swagger UI available at http://{}/swagger-ui/",
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
