//! research-reader CLI
//!
//! Command-line interface for `.rr` document containers.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rr_core::{AnnotationType, Config};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "rrdoc")]
#[command(about = "research-reader - PDFs and their annotations in one portable file")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a .rr container next to a PDF
    Import {
        /// PDF to import
        path: PathBuf,
    },
    /// Show title, page count and last page of a document
    Info {
        /// .rr container
        path: PathBuf,
    },
    /// Manage annotations
    #[command(alias = "ann")]
    Annotations {
        #[command(subcommand)]
        command: AnnotationCommands,
    },
    /// Read or write document metadata
    Meta {
        #[command(subcommand)]
        command: MetaCommands,
    },
    /// Copy the embedded PDF out of a container
    Extract {
        /// .rr container
        container: PathBuf,
        /// Where to write the PDF
        out: PathBuf,
        /// Overwrite `out` if it exists
        #[arg(short, long)]
        force: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Answer JSON requests on stdin, one per line
    Serve,
}

#[derive(Subcommand)]
enum AnnotationCommands {
    /// List annotations
    #[command(alias = "ls")]
    List {
        /// .rr container
        container: PathBuf,
        /// Only annotations on this page
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Create an annotation
    #[command(alias = "add")]
    Create {
        /// .rr container
        container: PathBuf,
        /// highlight, note or bookmark
        #[arg(short = 't', long = "type", default_value = "note")]
        annotation_type: AnnotationType,
        /// Page number (starting at 1)
        #[arg(short, long)]
        page: u32,
        /// Display color, e.g. #ffd54f
        #[arg(short, long)]
        color: Option<String>,
        /// Note text
        #[arg(short = 'm', long)]
        content: Option<String>,
        /// Position on the page as JSON
        #[arg(long, value_name = "JSON")]
        position: Option<String>,
    },
    /// Update an annotation's color, text or position
    #[command(alias = "edit")]
    Update {
        /// .rr container
        container: PathBuf,
        /// Annotation ID
        id: String,
        #[arg(short, long)]
        color: Option<String>,
        #[arg(short = 'm', long)]
        content: Option<String>,
        #[arg(long, value_name = "JSON")]
        position: Option<String>,
    },
    /// Delete an annotation
    #[command(alias = "rm")]
    Delete {
        /// .rr container
        container: PathBuf,
        /// Annotation ID
        id: String,
    },
}

#[derive(Subcommand)]
enum MetaCommands {
    /// Print a metadata value
    Get {
        /// .rr container
        container: PathBuf,
        key: String,
    },
    /// Set a metadata value
    Set {
        /// .rr container
        container: PathBuf,
        key: String,
        value: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (work_dir, log_level, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work even when the config file is broken
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);
    debug!(work_dir = %config.work_dir.display(), "configuration loaded");

    match cli.command {
        Commands::Import { path } => commands::document::import(&config, &path, &output),
        Commands::Info { path } => commands::document::info(&config, &path, &output),
        Commands::Annotations { command } => handle_annotation_command(command, &config, &output),
        Commands::Meta { command } => handle_meta_command(command, &config, &output),
        Commands::Extract {
            container,
            out,
            force,
        } => commands::document::extract(&config, &container, &out, force, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Serve => commands::serve::run(&config),
    }
}

fn handle_annotation_command(
    command: AnnotationCommands,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        AnnotationCommands::List { container, page } => {
            commands::annotation::list(config, &container, page, output)
        }
        AnnotationCommands::Create {
            container,
            annotation_type,
            page,
            color,
            content,
            position,
        } => {
            let fields = commands::annotation::Fields {
                color,
                content,
                position,
            };
            commands::annotation::create(config, &container, annotation_type, page, fields, output)
        }
        AnnotationCommands::Update {
            container,
            id,
            color,
            content,
            position,
        } => {
            let fields = commands::annotation::Fields {
                color,
                content,
                position,
            };
            commands::annotation::update(config, &container, id, fields, output)
        }
        AnnotationCommands::Delete { container, id } => {
            commands::annotation::delete(config, &container, &id, output)
        }
    }
}

fn handle_meta_command(command: MetaCommands, config: &Config, output: &Output) -> Result<()> {
    match command {
        MetaCommands::Get { container, key } => {
            commands::meta::get(config, &container, &key, output)
        }
        MetaCommands::Set {
            container,
            key,
            value,
        } => commands::meta::set(config, &container, &key, &value, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Install the log subscriber
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr unless
/// `log_file` is set, so stdout stays clean for `--json` and `serve`.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rr_core={},rr_cli={}",
            config.log_level, config.log_level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    if let Some(log_path) = &config.log_file {
        match File::options().create(true).append(true).open(log_path) {
            Ok(file) => {
                let _ = builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            }
        }
    }

    let _ = builder.with_writer(std::io::stderr).try_init();
}
