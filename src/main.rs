use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod domain;
mod application;
mod infrastructure;

use application::services::{CommandService, ConnectionSupervisor};
use domain::entities::SessionHandle;
use domain::traits::MessagingClient;
use infrastructure::adapters::console::ConsoleClient;
use infrastructure::adapters::gateway::GatewayClient;
use infrastructure::config::Config;
use infrastructure::http::{self, AppState};

#[derive(Parser)]
#[command(name = "wabot")]
#[command(about = "A minimal WhatsApp bot with a web control panel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot and the control panel
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            run_bot(cli.config);
        }
        Commands::Version => {
            println!("wabot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

fn run_bot(config_path: String) {
    // Load config
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Config::load_env()
        })
    } else {
        Config::load_env()
    };

    tracing::info!("Starting wabot: {}", config.bot.name);

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(64);

        let mut commands = CommandService::new(&config.bot.prefix);
        commands.register_defaults(&config.bot.channel_url);

        // Select client: gateway when configured, console otherwise
        let (client, gateway): (Arc<dyn MessagingClient>, Option<Arc<GatewayClient>>) =
            match &config.gateway {
                Some(gateway_config) => {
                    let gateway =
                        Arc::new(GatewayClient::new(gateway_config.clone(), events_tx));
                    (gateway.clone(), Some(gateway))
                }
                None => {
                    tracing::warn!("No gateway configured, running console client");
                    (Arc::new(ConsoleClient::new(events_tx)), None)
                }
            };

        let session = SessionHandle::new();
        let supervisor = match ConnectionSupervisor::new(
            client,
            events_rx,
            Arc::new(commands),
            session,
            Duration::from_secs(config.session.reconnect_delay_secs),
            shutdown.clone(),
        ) {
            Ok(supervisor) => supervisor,
            Err(e) => {
                tracing::error!("Failed to start supervisor: {}", e);
                return;
            }
        };

        let state = AppState {
            supervisor: supervisor.handle(),
            gateway,
        };
        let addr = format!("{}:{}", config.http.host, config.http.port);

        let http_task = tokio::spawn(http::serve(state, addr, shutdown.clone()));
        let supervisor_task = tokio::spawn(supervisor.run());

        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();

        let _ = supervisor_task.await;
        if let Ok(Err(e)) = http_task.await {
            tracing::error!("Control panel server error: {}", e);
        }
    });
}

fn init_config() {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).expect("default config serializes");
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
}
