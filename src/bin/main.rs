use loan_origination_assistant::{
    agent::{create_orchestrator, INIT_COMMAND},
    config::AppConfig,
    state::Session,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "bye"];

/// Terminal chat against a single in-process session
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = AppConfig::from_env()?;
    let orchestrator = create_orchestrator(&config).await?;
    let mut session = Session::new(uuid::Uuid::new_v4().to_string());
    info!(session_id = %session.session_id, "Terminal session started");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let greeting = orchestrator.handle_message(&mut session, INIT_COMMAND).await;
    stdout.write_all(format!("\nAssistant: {}\n\nYou: ", greeting.reply).as_bytes()).await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if EXIT_COMMANDS.contains(&message.to_lowercase().as_str()) {
            break;
        }
        if message.is_empty() {
            stdout.write_all(b"You: ").await?;
            stdout.flush().await?;
            continue;
        }

        let turn = orchestrator.handle_message(&mut session, message).await;
        stdout
            .write_all(format!("\nAssistant: {}\n\n[{}]\nYou: ", turn.reply, turn.stage).as_bytes())
            .await?;
        stdout.flush().await?;
    }

    stdout.write_all(b"\nGoodbye!\n").await?;
    Ok(())
}
