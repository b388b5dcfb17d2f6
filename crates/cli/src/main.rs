use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "WhatsApp to AI webhook relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the webhook server. WEBHOOK_VERIFY_TOKEN, GRAPH_API_TOKEN, OPENAI_API_KEY and PORT override the config file.
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Listen port (default from PORT, config, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // .env is optional; real environment variables win.
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    relay::config::apply_env_overrides(&mut config);
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting relay on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    relay::gateway::run_gateway(config).await
}
