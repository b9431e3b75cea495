//! CLI entrypoint: `flowforge-mcp serve` runs the MCP server over stdio;
//! `refresh-catalog` and `health` are operator utilities that print JSON to
//! stdout without going through the MCP transport (spec §6.1/§C). Grounded
//! on the teacher's `codegraph-official` binary for the stdio-safe tracing
//! setup and the `serve(stdio())` / `.waiting()` shutdown pattern.

use clap::{Parser, Subcommand};
use flowforge_core::config::Configuration;
use flowforge_core::DependencyId;
use flowforge_mcp::{ops, Components, FlowforgeServer};
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "flowforge-mcp", about = "Flowise chatflow construction over MCP")]
struct Cli {
    /// Path to a config file (TOML/JSON/YAML, picked by extension)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory of curated flow templates, loaded once at startup
    #[arg(long, global = true)]
    templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server over stdio
    Serve,
    /// Force a node catalog refresh and print the delta
    RefreshCatalog,
    /// Print dependency/catalog/collection health, or reset a tripped circuit
    Health {
        /// Reset the named dependency's circuit breaker (operator-only, not MCP-exposed)
        #[arg(long)]
        reset: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Configuration::load(cli.config.as_deref())?;
    let components = Components::build(config, cli.templates_dir.as_deref())?;

    match cli.command {
        Commands::Serve => {
            components.reindex().await?;
            info!("node catalog and templates indexed, starting MCP server over stdio");

            let server = FlowforgeServer::new(components.clone());
            let service = server.serve(stdio()).await?;
            service.waiting().await?;

            components.gates.persist()?;
        }
        Commands::RefreshCatalog => {
            let summary = ops::refresh_node_catalog(&components).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Health { reset } => {
            if let Some(dep) = reset {
                let dep_id = parse_dependency(&dep)?;
                components.gates.reset(dep_id);
                components.gates.persist()?;
                println!("reset circuit for {dep_id}");
            } else {
                let health = ops::get_system_health(&components).await;
                println!("{}", serde_json::to_string_pretty(&health)?);
            }
        }
    }

    Ok(())
}

fn parse_dependency(s: &str) -> anyhow::Result<DependencyId> {
    match s {
        "gateway" => Ok(DependencyId::Gateway),
        "embedder" => Ok(DependencyId::Embedder),
        "vector_index" => Ok(DependencyId::VectorIndex),
        other => anyhow::bail!("unknown dependency '{other}', expected one of: gateway, embedder, vector_index"),
    }
}
