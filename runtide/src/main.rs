use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runtide::config::Config;
use runtide::gateway::{gateway_router, Gateway};
use runtide::metrics::StatsReporter;
use runtide::runtime_api::runtime_api_router;
use runtide::runtime_env;
use runtide::sender::Sender;
use runtide::supervisor;
use runtide_codec::Codec;
use runtide_core::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("runtide={},tower_http=warn", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!(?config, "runtime specification");

    // Environment must be in place before the servers and workers start.
    let runtime_env = runtime_env::prepare(config.internal_api_port);
    runtime_env.apply();

    let codec = Codec::from_format(config.response_format.as_deref(), config.cloudevents());
    let content_type = codec.content_type();

    let dispatcher = Arc::new(Dispatcher::new(config.function_ttl));
    let gateway = Arc::new(Gateway {
        dispatcher: dispatcher.clone(),
        codec,
        sender: Sender::new(config.sink.clone(), content_type),
        reporter: Arc::new(StatsReporter::new()),
        request_size_limit: config.request_size_limit_bytes(),
    });

    // Internal Lambda Runtime API for the workers.
    let internal = tokio::net::TcpListener::bind(runtime_env.internal_socket()).await?;
    let internal_router = runtime_api_router(dispatcher);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(internal, internal_router).await {
            error!(error = %err, "runtime internal API error");
            std::process::exit(1);
        }
    });

    supervisor::start_invokers(config.invoker_count, runtime_env.task_root());

    // External API for function requests.
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let external = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "runtime initialized");
    axum::serve(external, gateway_router(gateway)).await?;

    Ok(())
}
