use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web::{Data, JsonConfig},
    App, HttpServer,
};
use config::Config;
use dispatcher::Dispatcher;
use gateway::HttpSender;
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

pub mod api;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod message;
pub mod rate_limit;
pub mod service;

/// Starts the queue server: connects the store, wires the gateway sender
/// into a dispatcher, and serves the admin/producer API.
pub async fn run(config: Config) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("ZAPQ_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("ZAPQ_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let bind_addr = config.bind_addr().to_owned();

    let sender = Arc::new(HttpSender::new(
        config.gateway_url(),
        config.gateway_token().map(str::to_owned),
    )?);
    let reap_after = config.reap_after();

    let service = Arc::new(service::Service::connect_with(config).await?);

    let dispatcher = Data::new(Dispatcher::new(service.clone(), sender, reap_after));
    let data = Data::from(service);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();

        let json_cfg = JsonConfig::default().content_type_required(false);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(cors)
            .service(api::queue::service())
            .service(api::rate_limit::service())
            .app_data(data.clone())
            .app_data(dispatcher.clone())
            .app_data(json_cfg)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
