use loan_origination_assistant::{
    agent::create_orchestrator,
    api::start_server,
    config::AppConfig,
    state::{InMemorySessionStore, SessionStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = AppConfig::from_env()?;

    info!("Loan Origination Assistant - API Server");
    info!(port = config.port, session_timeout_minutes = config.session_timeout_minutes, "Configuration loaded");

    let orchestrator = Arc::new(create_orchestrator(&config).await?);
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.session_timeout()));

    // Idle sessions expire in the background
    let sweeper = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper.evict_idle().await {
                Ok(0) => {}
                Ok(evicted) => info!(evicted, "Idle sessions evicted"),
                Err(e) => warn!(error = %e, "Session eviction failed"),
            }
        }
    });

    info!("Orchestrator initialized, starting API server");
    start_server(orchestrator, sessions, config.port).await?;

    Ok(())
}
