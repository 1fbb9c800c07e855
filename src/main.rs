//! Entry point for the Doku CLI (`doku`).
//!
//! Parses the command line, sets up tracing and dispatches to the web server,
//! the one-shot `ask` command or `init`.
//!
//! # Examples
//!
//! ```sh
//! doku init
//! DOKU_API_KEY=... doku serve --port 8080
//! DOKU_API_KEY=... doku ask --file handbook.pdf "How many vacation days do I get?"
//! ```

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use termimad::MadSkin;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use doku::{
    commands::{Cli, Commands},
    config::{self, DokuConfig},
    server,
    template::{DEFAULT_TEMPLATE_NAME, PromptTemplate},
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = config::load_or_default(config.as_deref())?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            debug!("Config loaded: {:?}", redacted(&config));
            server::serve(config).await?;
        }
        Commands::Init { force } => {
            init(force)?;
        }
        Commands::Ask {
            file,
            config,
            question,
        } => {
            let config = config::load_or_default(config.as_deref())?;
            ask(&config, &file, &question).await?;
        }
    }

    Ok(())
}

/// Config for debug logging, without the API key.
fn redacted(config: &DokuConfig) -> DokuConfig {
    DokuConfig {
        api_key: config.api_key.as_ref().map(|_| "<redacted>".to_string()),
        ..config.clone()
    }
}

async fn ask(config: &DokuConfig, file: &Path, question: &str) -> Result<(), Box<dyn Error>> {
    let ingestor = server::build_ingestor(config).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Indexing {}", file.display()));

    let pipeline = match ingestor.ingest_paths(&[file]).await {
        Ok(pipeline) => pipeline,
        Err(err) => {
            spinner.finish_and_clear();
            return Err(err.into());
        }
    };

    spinner.set_message(format!(
        "Searching {} chunk(s) and asking {}",
        pipeline.chunk_count(),
        config.chat_model
    ));
    let answer = pipeline.answer(question).await;
    spinner.finish_and_clear();
    let answer = answer?;

    let skin = MadSkin::default();
    skin.print_text(&answer.text);

    println!();
    for source in &answer.sources {
        println!(
            "  {} #{} (distance {:.3})",
            source.source, source.chunk_index, source.distance
        );
    }
    Ok(())
}

/// Writes a default `config.yaml` and prompt template into the config directory.
fn init(force: bool) -> Result<(), Box<dyn Error>> {
    let config_dir = doku::config_dir()?;
    let templates = config_dir.join("templates");
    info!("Creating template config directory: {}", templates.display());
    fs::create_dir_all(&templates)?;

    write_default(
        templates.join(format!("{DEFAULT_TEMPLATE_NAME}.yaml")),
        &serde_yaml::to_string(&PromptTemplate::default())?,
        force,
    )?;
    write_default(
        config_dir.join("config.yaml"),
        &serde_yaml::to_string(&DokuConfig::default())?,
        force,
    )?;

    Ok(())
}

fn write_default(path: PathBuf, contents: &str, force: bool) -> Result<(), Box<dyn Error>> {
    if path.exists() && !force {
        info!("Keeping existing {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    info!("Creating {}", path.display());
    fs::write(path, contents)?;
    Ok(())
}
