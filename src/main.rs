use alex_calls::config::StoreKind;
use alex_calls::{
    create_router, parse_duration, AppState, BroadcastNotifier, CallManager, Config,
    InMemoryUsageStore, JsonFileStore, ManagerSettings, ProviderClient, ReqwestTransport,
    RetryingHttpClient, SimulatedTransportFactory, UsageRecorder,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alex-calls", version, about = "Voice call lifecycle service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve {
        /// Config file (extension optional)
        #[arg(long, default_value = "config/alex-calls")]
        config: String,
    },
    /// Validate a duration budget such as "30m"
    CheckDuration { value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Serve { config } => serve(&config).await,
        Command::CheckDuration { value } => {
            let duration = parse_duration(&value)?;
            println!("{} = {} ms", value, duration.as_millis());
            Ok(())
        }
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let cfg = Config::load(config_path).context("Failed to load config")?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Agent: {} ({})", cfg.agent.title, cfg.agent.model);
    info!("Calls are created via {}", cfg.calls.create_call_url);

    let notifier = Arc::new(BroadcastNotifier::default());
    let http = RetryingHttpClient::new(Arc::new(ReqwestTransport::new()), cfg.retry.policy())
        .with_notifier(notifier.clone());

    let usage: Arc<dyn UsageRecorder> = match cfg.usage.store {
        StoreKind::Memory => Arc::new(InMemoryUsageStore::with_default_seconds(
            cfg.usage.default_seconds,
        )),
        StoreKind::File => Arc::new(JsonFileStore::with_default_seconds(
            &cfg.usage.data_dir,
            cfg.usage.default_seconds,
        )?),
    };

    let provider = ProviderClient::from_env(&cfg.provider.api_url, &cfg.provider.api_key_env, http.clone());
    if !provider.has_credential() {
        warn!(
            "{} is not set; /api/calls will answer with a server configuration error",
            cfg.provider.api_key_env
        );
    }

    // The provider's WebRTC client is not bundled; calls run on the simulated transport
    let transports = Arc::new(SimulatedTransportFactory::new());

    let mut settings = ManagerSettings::new(&cfg.calls.create_call_url);
    settings.default_time_exceeded_message = cfg.calls.default_time_exceeded_message.clone();

    let manager = CallManager::new(settings, http, transports, Arc::clone(&usage), notifier.clone());

    let state = AppState::new(manager.clone(), usage, provider, cfg.agent);
    let _board = Arc::clone(&state.board).watch(manager.subscribe_call_ended(), notifier.subscribe());

    let app = create_router(state);
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
