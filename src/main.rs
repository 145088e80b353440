use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use linebridge_core::config::{self, Config};
use linebridge_core::service::http::{serve, AppState};

#[derive(Parser)]
#[command(
    name = "linebridge",
    about = "LINE webhook relay with Dialogflow intents and generative fallback",
    version = linebridge_core::VERSION,
)]
struct Cli {
    /// Config file (default: ~/.linebridge/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Resolve one message through Dialogflow and the fallback provider
    Ask {
        /// Message text
        message: Vec<String>,
        /// LINE user id used as the Dialogflow session
        #[arg(short, long, default_value = "cli-user")]
        user: String,
    },
    /// Show configuration status
    Status,
    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linebridge=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { port } => cmd_serve(config_path, port).await?,
        Commands::Ask { message, user } => cmd_ask(config_path, message, user).await?,
        Commands::Status => cmd_status(config_path)?,
        Commands::Init => cmd_init(config_path)?,
    }

    Ok(())
}

async fn cmd_serve(config_path: Option<&std::path::Path>, port: Option<u16>) -> Result<()> {
    let mut cfg = config::load_config_from_env(config_path);
    if let Some(port) = port {
        cfg.gateway.port = port;
    }

    let addr = cfg.bind_addr();
    let state = Arc::new(AppState::from_config(cfg));
    println!("Starting linebridge on {}...", addr);
    serve(&addr, state).await
}

async fn cmd_ask(
    config_path: Option<&std::path::Path>,
    message: Vec<String>,
    user: String,
) -> Result<()> {
    let text = message.join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("Nothing to ask. Usage: linebridge ask <message>");
    }

    let cfg = config::load_config_from_env(config_path);
    let state = AppState::from_config(cfg);

    let (intent, reply) = state.resolver.resolve_with_intent(&text, &user).await;
    println!(
        "Dialogflow: {} (fallback: {})",
        intent.reply_text, intent.is_fallback
    );
    println!("Reply: {}", reply);
    Ok(())
}

fn set_or_missing(value: &str) -> &'static str {
    if value.is_empty() {
        "not set"
    } else {
        "✓"
    }
}

fn cmd_status(config_path: Option<&std::path::Path>) -> Result<()> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);
    let cfg = config::load_config_from_env(config_path);

    println!("linebridge {} status\n", linebridge_core::VERSION);
    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() { "✓" } else { "✗" }
    );
    println!("Listen: {}", cfg.bind_addr());

    println!("\nLINE");
    println!("  Channel secret: {}", set_or_missing(&cfg.line.channel_secret));
    println!(
        "  Access token: {}",
        set_or_missing(&cfg.line.channel_access_token)
    );

    println!("\nDialogflow");
    println!(
        "  Project: {}",
        if cfg.dialogflow.project_id.is_empty() {
            "not set"
        } else {
            cfg.dialogflow.project_id.as_str()
        }
    );
    println!("  Language: {}", cfg.dialogflow.language_code);
    println!(
        "  Credentials: {}",
        match (&cfg.dialogflow.access_token, &cfg.dialogflow.credentials_file) {
            (Some(t), _) if !t.is_empty() => "access token".to_string(),
            (_, Some(f)) if !f.is_empty() => f.clone(),
            _ => "not set".to_string(),
        }
    );

    let kind = cfg.fallback.provider_kind();
    println!("\nFallback");
    println!("  Provider: {} ({})", kind.label(), cfg.fallback.model);
    println!(
        "  API key: {}",
        set_or_missing(cfg.fallback_api_key().unwrap_or(""))
    );
    println!(
        "  Budget: {} words / {} tokens",
        cfg.fallback.max_words, cfg.fallback.max_tokens
    );

    Ok(())
}

fn cmd_init(config_path: Option<&std::path::Path>) -> Result<()> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    if path.exists() {
        println!("Config already exists at {}", path.display());
        println!("Delete it first to re-initialize.");
        return Ok(());
    }

    let saved = config::save_config(&Config::default(), Some(&path))?;
    println!("Created config at {}", saved.display());
    println!("\nNext steps:");
    println!("  1. Set line.channelSecret and line.channelAccessToken");
    println!("  2. Set dialogflow.projectId and GOOGLE_APPLICATION_CREDENTIALS");
    println!("  3. Add a Gemini or OpenAI key under providers");
    println!("  4. Run: linebridge serve");
    Ok(())
}
