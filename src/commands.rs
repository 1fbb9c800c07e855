//! Command-line interface definitions for the `doku` binary.
//!
//! ```sh
//! doku serve --port 9000
//! doku init
//! doku ask --file manual.pdf "How long is the warranty?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the web UI and JSON API.
    #[clap(name = "serve", alias = "s")]
    Serve {
        /// Config file (defaults to `<config_dir>/config.yaml`).
        #[arg(long, short = 'c', env = "DOKU_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Write a default config file and prompt template.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },

    /// Index one document and answer a single question about it.
    #[clap(name = "ask", alias = "a")]
    Ask {
        #[arg(long, short = 'f')]
        file: PathBuf,

        #[arg(long, short = 'c', env = "DOKU_CONFIG")]
        config: Option<PathBuf>,

        question: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["doku", "serve", "--host", "127.0.0.1", "-p", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { host, port, .. } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["doku", "a", "-f", "manual.pdf", "How long?"]).unwrap();
        match cli.command {
            Commands::Ask { file, question, .. } => {
                assert_eq!(file, PathBuf::from("manual.pdf"));
                assert_eq!(question, "How long?");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_ask_requires_file() {
        assert!(Cli::try_parse_from(["doku", "ask", "question"]).is_err());
    }
}
