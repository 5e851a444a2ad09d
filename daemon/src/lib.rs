use crate::config::Config;
use crate::ledger::{EventLedger, MemoryLedger, SqliteLedger};
use crate::queue::BuildQueue;
use crate::registry::TargetRegistry;
use actix_web::dev::Server;
use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use crossbuild_common::config::{WebhookMode, QUEUE_SIZE};
use crossbuild_common::errors::*;
use crossbuild_worker::pipeline::Pipeline;
use std::net::SocketAddr;
use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod ledger;
pub mod models;
pub mod queue;
pub mod registry;
pub mod schema;
pub mod web;

pub fn open_ledger(config: &Config) -> Result<Arc<dyn EventLedger>> {
    if config.in_memory() {
        warn!("Using an in-memory event ledger, build history is lost on restart");
        return Ok(Arc::new(MemoryLedger::new()));
    }

    let path = config
        .database_path
        .to_str()
        .ok_or_else(|| format_err!("Database path is not valid utf-8: {:?}", config.database_path))?;
    info!("Opening database at {:?}", path);
    let pool = db::setup_pool(path)?;
    Ok(Arc::new(SqliteLedger::new(pool)))
}

/// Start the build worker and bind the http server. Must be called from
/// within a tokio runtime.
pub fn build_server(
    config: Config,
    ledger: Arc<dyn EventLedger>,
    pipeline: Arc<Pipeline>,
) -> Result<(Server, SocketAddr)> {
    let registry =
        TargetRegistry::new(pipeline.name(), &config.settings.branches, pipeline.targets())
            .shared();
    let (queue, _worker) = BuildQueue::start(QUEUE_SIZE, ledger.clone(), pipeline, registry.clone());

    let bind_addr = config.bind_addr.clone();
    let webhook = config.webhook;
    let ledger = Data::from(ledger);

    let server = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::default())
            .app_data(Data::new(config.clone()))
            .app_data(ledger.clone())
            .app_data(Data::new(queue.clone()))
            .app_data(Data::new(registry.clone()))
            .service(api::push_hook)
            .service(api::list_events)
            .service(api::get_event)
            .service(api::list_targets);

        if webhook == WebhookMode::Test {
            app.service(api::test_hook)
        } else {
            app
        }
    })
    .bind(&bind_addr)
    .with_context(|| anyhow!("Failed to bind to {:?}", bind_addr))?;

    let address = server
        .addrs()
        .first()
        .copied()
        .ok_or_else(|| format_err!("Server is not bound to any address"))?;

    Ok((server.run(), address))
}

pub async fn run_config(config: Config) -> Result<()> {
    let ledger = open_ledger(&config)?;
    let pipeline = Arc::new(Pipeline::from_settings(&config.settings)?);
    info!(
        "Building {:?} for {} targets",
        pipeline.name(),
        pipeline.targets().len()
    );

    let (server, address) = build_server(config, ledger, pipeline)?;
    info!("Listening on http://{}", address);
    server.await?;
    Ok(())
}
