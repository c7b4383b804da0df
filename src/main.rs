use std::sync::Arc;

use scan_sentry::config::Config;
use scan_sentry::handler::MessageHandler;
use scan_sentry::health::health_routes;
use scan_sentry::scan::{HttpScanService, ScanOrchestrator};
use scan_sentry::session::SessionSupervisor;
use scan_sentry::store::TempStore;
use scan_sentry::transport::{TelegramTransport, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC-...");
        std::process::exit(1);
    });

    eprintln!("🛡️ Scan Sentry v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Scan API: {}", config.api_base);
    eprintln!("   Size ceiling: {} bytes", config.scan.max_file_bytes);
    eprintln!("   Activation words: {}", config.activation_words.join(", "));
    eprintln!("   Scratch dir: {}", config.scratch_dir.display());
    eprintln!("   Health: http://0.0.0.0:{}/health\n", config.health_port);

    let service = Arc::new(HttpScanService::new(
        config.api_base.clone(),
        config.api_key.clone(),
        &config.scan,
    ));
    let orchestrator = ScanOrchestrator::new(
        service,
        TempStore::new(config.scratch_dir.clone()),
        config.scan.clone(),
    );
    let handler = Arc::new(MessageHandler::new(
        orchestrator,
        config.activation_words.clone(),
    ));

    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot_token));
    let (supervisor, session_state) = SessionSupervisor::new(
        transport,
        handler,
        config.restart_delay,
        config.operator_id.clone(),
    );

    // Liveness endpoint runs independently of the session lifecycle.
    let app = health_routes("scan-sentry".to_string(), session_state);
    let health_port = config.health_port;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{health_port}"))
            .await
            .expect("Failed to bind health endpoint port");
        tracing::info!(port = health_port, "Health endpoint started");
        axum::serve(listener, app).await.ok();
    });

    // Runs until externally terminated.
    supervisor.run().await;

    Ok(())
}
