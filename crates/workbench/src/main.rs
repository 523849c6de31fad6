use anyhow::Context;
use clap::Parser;

mod api;
mod config;

/// Workbench is a daemon that mediates between trained topic models, their
/// corpora and a backing Solr cluster: it ingests both asset kinds into
/// engine collections and answers the catalogue of structured queries.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[clap(
        long = "config",
        env = "WORKBENCH_CONFIG",
        default_value = "config.yaml"
    )]
    config: std::path::PathBuf,
    /// The port to listen on for API requests.
    #[clap(long, default_value = "8080", env = "API_PORT")]
    api_port: u16,
}

fn main() -> Result<(), anyhow::Error> {
    // Use reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let task = runtime.spawn(async move { async_main(args).await });
    let result = runtime.block_on(task);

    // Give spawned work a bounded window to wind down.
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result.context("joining server task")?
}

async fn async_main(args: Args) -> Result<(), anyhow::Error> {
    let config = config::Config::load(&args.config)?;
    tracing::info!(engine_url = %config.engine_url, "configuration loaded");

    let app = std::sync::Arc::new(api::App::new(config)?);
    let router = api::build_router(app);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.api_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving API")
}
