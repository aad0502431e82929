use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hermod", about = "Hermod — chat platform bridge with webhook fan-out")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Port to listen on (overrides API_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Directory for persistent state (overrides STORE_DIR).
    #[arg(long)]
    store_dir: Option<std::path::PathBuf>,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "hermod starting");

    let mut settings = hermod_config::Settings::from_env()?;
    if let Some(port) = cli.port {
        settings.api_port = port;
    }
    if let Some(store_dir) = cli.store_dir {
        settings.store_dir = store_dir;
    }

    hermod_gateway::server::run(settings).await
}
