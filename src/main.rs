use clap::Parser;
use selcache::cli::{Cli, Commands};
use selcache::types::config::Config;
use selcache::SelcacheResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> SelcacheResult<()> {
    let cli = Cli::parse();

    // Load configuration first (no logging yet)
    let config = if cli.config.exists() {
        Config::load(&cli.config).unwrap_or_else(|_| Config::default_config())
    } else {
        Config::default_config()
    };

    // CLI flags take precedence over config
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("selcache={}", log_level)
            .parse()
            .unwrap_or_else(|_| "selcache=info".parse().expect("fallback directive is valid")),
    );

    let json_logs = config.general.log_format == "json";
    let text_layer = (!json_logs).then(|| fmt::layer().with_writer(std::io::stderr));
    let json_layer = json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(filter)
        .init();

    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Init { path } => {
            selcache::cli::commands::init(path).await?;
        }
        Commands::Config => {
            selcache::cli::commands::config_cmd(&cli.config).await?;
        }
        Commands::Doctor => {
            selcache::cli::commands::doctor(&cli.config).await?;
        }
        Commands::Replay {
            workload,
            selector,
            json,
        } => {
            selcache::cli::commands::replay(&workload, selector.as_deref(), json, &config).await?;
        }
        Commands::Version => {
            selcache::cli::commands::version();
        }
    }

    Ok(())
}
