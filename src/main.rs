use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webforge::cli::{self, SettingsUpdate};
use webforge::{server, Config};

#[derive(Parser)]
#[command(name = "webforge")]
#[command(author, version, about = "webforge - build small websites by chatting with an AI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, env = "WEBFORGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project
    New {
        /// Project name
        name: String,
    },

    /// List projects, most recently updated first
    List {
        /// Include archived projects
        #[arg(short, long)]
        archived: bool,
    },

    /// Show a project's files and chat history
    Show {
        /// Project id or unique id prefix
        id: String,
    },

    /// Rename a project
    Rename {
        /// Project id or unique id prefix
        id: String,
        /// New name
        name: String,
    },

    /// Archive a project
    Archive {
        /// Project id or unique id prefix
        id: String,
    },

    /// Restore an archived project
    Unarchive {
        /// Project id or unique id prefix
        id: String,
    },

    /// Delete a project permanently
    Delete {
        /// Project id or unique id prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Send a prompt and regenerate the project's files
    Generate {
        /// Project id or unique id prefix
        id: String,

        /// What to build or change
        prompt: String,

        /// Backend to use (gemini, ollama, lm-studio)
        #[arg(short, long)]
        provider: Option<String>,

        /// Files to attach (images, text or code)
        #[arg(short, long = "attach")]
        attach: Vec<PathBuf>,
    },

    /// Write the composed preview document
    Preview {
        /// Project id or unique id prefix
        id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show or change self-hosted backend settings
    Settings {
        /// Ollama generate endpoint, e.g. http://localhost:11434/api/generate
        #[arg(long)]
        ollama_url: Option<String>,

        /// LM Studio completions endpoint, e.g. http://localhost:1234/v1/completions
        #[arg(long)]
        lm_studio_url: Option<String>,

        /// Model requested from Ollama
        #[arg(long)]
        ollama_model: Option<String>,

        /// Model requested from LM Studio
        #[arg(long)]
        lm_studio_model: Option<String>,

        /// Remove the Ollama endpoint
        #[arg(long, conflicts_with = "ollama_url")]
        clear_ollama_url: bool,

        /// Remove the LM Studio endpoint
        #[arg(long, conflicts_with = "lm_studio_url")]
        clear_lm_studio_url: bool,
    },

    /// Start the HTTP API
    Serve {
        /// Host to bind to (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "webforge=debug,tower_http=debug"
    } else {
        "webforge=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::New { name } => cli::run_new(&config, &name)?,
        Commands::List { archived } => cli::run_list(&config, archived)?,
        Commands::Show { id } => cli::run_show(&config, &id)?,
        Commands::Rename { id, name } => cli::run_rename(&config, &id, &name)?,
        Commands::Archive { id } => cli::run_archive(&config, &id, true)?,
        Commands::Unarchive { id } => cli::run_archive(&config, &id, false)?,
        Commands::Delete { id, yes } => cli::run_delete(&config, &id, yes)?,
        Commands::Generate {
            id,
            prompt,
            provider,
            attach,
        } => cli::run_generate(&config, &id, &prompt, provider.as_deref(), &attach).await?,
        Commands::Preview { id, output } => cli::run_preview(&config, &id, output.as_deref())?,
        Commands::Settings {
            ollama_url,
            lm_studio_url,
            ollama_model,
            lm_studio_model,
            clear_ollama_url,
            clear_lm_studio_url,
        } => cli::run_settings(
            &config,
            SettingsUpdate {
                ollama_url,
                lm_studio_url,
                ollama_model,
                lm_studio_model,
                clear_ollama_url,
                clear_lm_studio_url,
            },
        )?,
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            tracing::info!("Starting HTTP server on {}:{}", host, port);
            server::run_http_server(&host, port, config).await?;
        }
    }

    Ok(())
}
