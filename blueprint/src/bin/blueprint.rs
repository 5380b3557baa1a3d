//! Blueprint CLI
//!
//! Compiles task plans into call blueprints against a capability catalog and
//! prints the result as JSON on stdout.

use anyhow::Context;
use blueprint::{CapabilityCatalog, Compiler, CompilerConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(name = "blueprint")]
#[clap(about = "Workflow blueprint compiler")]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// TOML configuration file
    #[clap(long, global = true, env = "BLUEPRINT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a task plan into a workflow blueprint
    Compile {
        /// Plan JSON file (staged or tree form)
        #[clap(short, long)]
        plan: PathBuf,
        /// Original request text
        #[clap(short, long)]
        query: String,
        /// Capability catalog JSON file
        #[clap(short, long, env = "BLUEPRINT_CATALOG")]
        catalog: PathBuf,
        /// Pretty-print the output
        #[clap(long)]
        pretty: bool,
    },
    /// Resolve and bind a single call straight from the request text
    Call {
        #[clap(short, long)]
        query: String,
        #[clap(short, long, env = "BLUEPRINT_CATALOG")]
        catalog: PathBuf,
        #[clap(long)]
        pretty: bool,
    },
    /// Serve the compiler over HTTP
    #[cfg(feature = "server")]
    Serve {
        #[clap(short, long, default_value = "127.0.0.1:8080")]
        bind: std::net::SocketAddr,
        #[clap(short, long, env = "BLUEPRINT_CATALOG")]
        catalog: PathBuf,
    },
}

fn load_compiler(config_path: Option<&Path>, catalog_path: &Path) -> anyhow::Result<Compiler> {
    let config = match config_path {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompilerConfig::default(),
    }
    .apply_env();

    let catalog = CapabilityCatalog::from_file(catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    info!("Loaded {} capabilities", catalog.len());

    Ok(Compiler::from_config(&config, Arc::new(catalog))?)
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blueprint=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Compile {
            plan,
            query,
            catalog,
            pretty,
        } => {
            let compiler = load_compiler(args.config.as_deref(), &catalog)?;
            let raw = tokio::fs::read_to_string(&plan)
                .await
                .with_context(|| format!("reading plan {}", plan.display()))?;
            let plan: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing plan {}", plan.display()))?;

            let output = compiler.compile(&plan, &query).await;
            print_json(&output, pretty)?;
            if output.is_rejected() {
                std::process::exit(2);
            }
        }
        Command::Call {
            query,
            catalog,
            pretty,
        } => {
            let compiler = load_compiler(args.config.as_deref(), &catalog)?;
            let outcome = compiler.compile_call(&query).await;
            print_json(&outcome, pretty)?;
        }
        #[cfg(feature = "server")]
        Command::Serve { bind, catalog } => {
            let compiler = load_compiler(args.config.as_deref(), &catalog)?;
            blueprint::server::run_server(Arc::new(compiler), bind).await?;
        }
    }

    Ok(())
}
