use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "skinmgr")]
#[command(version, about = "Resolve and apply media server web client skins", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Engine config file (defaults to ~/.config/skinmgr/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding config documents and the user store
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged skin set without writing anything
    Resolve {
        /// Host server version, e.g. 10.10.3
        #[arg(short, long)]
        server_version: Option<String>,
    },
    /// Run the engine and print the resulting stylesheet order
    Apply {
        #[arg(short, long)]
        server_version: Option<String>,
        /// Switch to this skin after initialization
        #[arg(long)]
        skin: Option<String>,
        /// Switch to this admin theme
        #[arg(long)]
        theme: Option<String>,
        /// Switch to this color scheme of the active skin
        #[arg(long)]
        color_scheme: Option<String>,
    },
    /// Turn an optional include on or off for the user
    Toggle {
        /// `global` or a skin name
        #[arg(long, default_value = skinmgr::includes::GLOBAL_SCOPE)]
        scope: String,
        /// Include key, e.g. global-acme-overlay.css
        key: String,
        /// Disable instead of enable
        #[arg(long)]
        off: bool,
        #[arg(short, long)]
        server_version: Option<String>,
    },
    /// Print the major version of a version string
    Version {
        version: String,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skinmgr=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    let ctx = cli::Context::load(cli.config, cli.state_dir)?;

    match cli.command {
        Commands::Resolve { server_version } => cli::cmd_resolve(&ctx, server_version).await,
        Commands::Apply {
            server_version,
            skin,
            theme,
            color_scheme,
        } => {
            let switches = cli::Switches {
                skin,
                theme,
                color_scheme,
            };
            cli::cmd_apply(&ctx, server_version, switches).await
        }
        Commands::Toggle {
            scope,
            key,
            off,
            server_version,
        } => cli::cmd_toggle(&ctx, server_version, &scope, &key, !off).await,
        Commands::Version { version } => cli::cmd_version(&version),
    }
}
