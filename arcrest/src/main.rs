use arcrest::api::{export, SearchParams, DEFAULT_DELETE_WHERE};
use arcrest::PortalConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arcrest")]
#[command(about = "ArcGIS Online / Portal content and feature service tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search portal content
    Search {
        query: String,
        #[arg(long, default_value_t = 100)]
        num: u32,
    },
    /// List items owned by the configured user
    Owned,
    /// Print or save a service definition
    Describe {
        service_url: String,
        /// Write the definition to this file instead of stdout
        out: Option<PathBuf>,
    },
    /// Provision a copy of a feature service and mirror its layers
    Copy {
        service_url: String,
        new_name: String,
    },
    /// Count features in a layer
    Count {
        layer_url: String,
        #[arg(default_value = "1=1")]
        where_clause: String,
    },
    /// Delete features from a layer
    Purge {
        layer_url: String,
        #[arg(default_value = DEFAULT_DELETE_WHERE)]
        where_clause: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let level = std::env::var("ARCREST_LOG")
        .ok()
        .and_then(|v| v.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = PortalConfig::from_env()?;
    let (portal, session) = config.connect().await?;

    match cli.command {
        Commands::Search { query, num } => {
            let params = SearchParams::new(query).with_num(num);
            let items = portal.catalog().search(&params, Some(&session)).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Owned => {
            let items = portal.catalog().owned_content(&session).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Describe { service_url, out } => {
            let definition = portal
                .services()
                .read_definition(&service_url, Some(&session))
                .await?;
            match out {
                Some(path) => {
                    let written = export::write_json(path, &definition)?;
                    println!("{}", written.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&definition)?),
            }
        }
        Commands::Copy {
            service_url,
            new_name,
        } => {
            let copy = portal
                .services()
                .copy(&session, &service_url, &new_name)
                .await?;
            println!("{}", copy.url());
            for layer in copy.layers() {
                println!("  {} {}", layer.id(), layer.name());
            }
        }
        Commands::Count {
            layer_url,
            where_clause,
        } => {
            let count = portal
                .features_at(&layer_url, Some(&session))
                .count(&where_clause)
                .await?;
            println!("{}", count);
        }
        Commands::Purge {
            layer_url,
            where_clause,
        } => {
            let result = portal
                .features_at(&layer_url, Some(&session))
                .delete(&where_clause)
                .await?;
            println!(
                "deleted {} ({} failed)",
                result.succeeded(),
                result.failures().len()
            );
        }
    }

    Ok(())
}
