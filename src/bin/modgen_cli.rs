//! Modgen CLI - Bridge interface for the module generator
//!
//! Commands: sanitize, render, generate, inspect
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on invalid input, 1 on any other failure

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use modgen_core::{
    archive, render, sanitize, ErrorKind, FileKind, GenerationRequest, GeneratorConfig,
    ModuleGenerator, ModuleIdentifier, RenderInput,
};

#[derive(Parser)]
#[command(name = "modgen-cli")]
#[command(about = "Modgen CLI - HumHub module scaffold generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, env = "MODGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Parent directory for module working trees
    #[arg(long, env = "MODGEN_STAGING_ROOT")]
    staging_root: Option<PathBuf>,

    /// Directory the archives are written to
    #[arg(long, env = "MODGEN_ARCHIVE_DIR")]
    archive_dir: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the token a module name sanitizes to
    Sanitize {
        /// Module name as typed
        name: String,
    },

    /// Print one generated file without writing anything
    Render {
        #[arg(short, long, value_enum)]
        kind: FileKind,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Generate, package and deliver a module archive
    Generate {
        #[command(flatten)]
        metadata: MetadataArgs,

        /// Where to deliver the archive
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the entries of an archive
    Inspect {
        archive: PathBuf,
    },
}

#[derive(Args)]
struct MetadataArgs {
    /// Module name
    #[arg(long)]
    name: String,

    /// Module description
    #[arg(long)]
    description: String,

    /// Author name
    #[arg(long)]
    author: String,

    /// Author email
    #[arg(long)]
    email: String,

    /// Author homepage
    #[arg(long)]
    homepage: String,

    /// Author role
    #[arg(long)]
    role: String,
}

impl From<MetadataArgs> for GenerationRequest {
    fn from(args: MetadataArgs) -> Self {
        GenerationRequest::new(
            args.name,
            args.description,
            args.author,
            args.email,
            args.homepage,
            args.role,
        )
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn emit(value: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("cannot serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}

fn fail(kind: ErrorKind, message: String) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "kind": kind,
        "error": message,
    });
    println!("{output}");
    if kind == ErrorKind::InvalidInput {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

fn load_config(cli: &Cli) -> Result<GeneratorConfig, String> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_toml_file(path).map_err(|e| e.to_string())?,
        None => GeneratorConfig::default(),
    };
    if let Some(root) = &cli.staging_root {
        config.staging_root = root.clone();
    }
    if let Some(dir) = &cli.archive_dir {
        config.archive_dir = dir.clone();
    }
    Ok(config)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            let output = serde_json::json!({
                "success": false,
                "error": format!("Failed to load config: {e}"),
            });
            println!("{output}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Sanitize { name } => {
            let token = sanitize(&name);
            emit(&serde_json::json!({
                "token": token,
                "valid": !token.is_empty(),
            }))
        }

        Commands::Render { kind, metadata } => {
            let request = GenerationRequest::from(metadata);
            let identifier = match ModuleIdentifier::parse(&request.raw_name) {
                Ok(id) => id,
                Err(e) => return fail(e.kind(), e.to_string()),
            };
            let input = RenderInput {
                identifier: &identifier,
                fields: &request.fields,
                min_platform_version: &config.min_platform_version,
            };

            match render(kind, &input) {
                Ok(contents) => {
                    print!("{contents}");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(ErrorKind::Serialization, e.to_string()),
            }
        }

        Commands::Generate { metadata, output } => {
            let generator = ModuleGenerator::new(config);
            let request = GenerationRequest::from(metadata);

            let mut module = match generator.generate(&request) {
                Ok(m) => m,
                Err(failure) => {
                    return fail(
                        failure.kind(),
                        format!("{} (cleanup succeeded: {})", failure, failure.cleanup_succeeded),
                    )
                }
            };

            if same_file(&output, module.archive_path()) {
                module.cleanup();
                return fail(
                    ErrorKind::InvalidInput,
                    format!("output {} is the working archive path", output.display()),
                );
            }

            let delivered = File::create(&output)
                .map_err(|e| e.to_string())
                .and_then(|file| {
                    module
                        .deliver_to(&mut BufWriter::new(file))
                        .map_err(|e| e.to_string())
                });

            match delivered {
                Ok(delivery) => emit(&serde_json::json!({
                    "success": true,
                    "message": module.message(),
                    "output": output,
                    "delivery": delivery,
                    "report": module.report(),
                })),
                Err(e) => {
                    module.cleanup();
                    fail(ErrorKind::Io, format!("delivery to {} failed: {e}", output.display()))
                }
            }
        }

        Commands::Inspect { archive: path } => match archive::summarize(&path) {
            Ok(entries) => emit(&serde_json::json!({
                "archive": path,
                "entries": entries,
            })),
            Err(e) => fail(ErrorKind::Archive, e.to_string()),
        },
    }
}
