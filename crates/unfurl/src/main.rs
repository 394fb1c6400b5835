//! unfurl - Rewrite service links into readable titles

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use unfurl_core::UnfurlConfig;
use url::Url;

#[derive(Parser)]
#[command(
    name = "unfurl",
    version,
    about = "Rewrite service links into readable titles",
    long_about = "Finds links to configured Backlog spaces and replaces their URL text with\n\
                  a title built from the space's API (issue summary, wiki name, pull request...).\n\
                  \n\
                  Examples:\n\
                    unfurl render page.html -o out.html      # Rewrite every link in a file\n\
                    unfurl title https://x.backlog.jp/view/PROJ-1\n\
                    unfurl tenants                           # List configured domains\n\
                    unfurl sweep                             # Drop expired cache entries\n\
                  \n\
                  Environment Variables:\n\
                    UNFURL_CONFIG                    # Config file (default: <config_dir>/unfurl/config.toml)\n\
                    UNFURL_TENANTS                   # JSON tenant list used when the config has none\n\
                    UNFURL_API_ORIGIN                # Send API requests to this origin instead\n\
                    RUST_LOG                         # Log filter (default: unfurl=info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the config file
    #[arg(long, env = "UNFURL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Keep API responses in memory only
    #[arg(long, global = true)]
    no_persist: bool,

    /// Override the scheme, host and port of every API request
    #[arg(long, env = "UNFURL_API_ORIGIN", global = true)]
    api_origin: Option<Url>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite the links of an HTML file
    Render {
        /// HTML file to read
        file: PathBuf,
        /// URL the page is served from (decides the space prefix)
        #[arg(long)]
        page_url: Option<Url>,
        /// Write here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Print the title for one URL
    Title {
        url: Url,
        /// URL of the page the link appears on
        #[arg(long)]
        page_url: Option<Url>,
    },
    /// Drop cache entries older than the configured max age
    Sweep,
    /// Drop every cached response
    ClearCache,
    /// List configured tenant domains
    Tenants {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .or_else(UnfurlConfig::default_path)
        .context("Could not determine config file location")?;
    let config = UnfurlConfig::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?
        .with_env_fallback();

    let options = cli::EngineOptions {
        persist: !cli.no_persist,
        api_origin: cli.api_origin,
    };

    match cli.command {
        Command::Render {
            file,
            page_url,
            output,
        } => cli::run_render(&config, &options, &file, page_url, output.as_deref()).await,
        Command::Title { url, page_url } => {
            cli::run_title(&config, &options, &url, page_url.as_ref()).await
        }
        Command::Sweep => cli::run_sweep(&config, &options).await,
        Command::ClearCache => cli::run_clear_cache(&config, &options).await,
        Command::Tenants { json } => cli::run_tenants(&config, json),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "unfurl=debug,unfurl_core=debug"
    } else {
        "unfurl=info,unfurl_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
