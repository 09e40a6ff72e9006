#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the wine harvest toolchain.
//!
//! `crawl` discovers product links (phase 1), `extract` turns a saved
//! catalog into a CSV dataset (phase 2), and `run` does both. Without a
//! subcommand an interactive menu is shown.
//!
//! Logging goes through [`wine_harvest_cli_utils::init_logger`] so log lines
//! and progress bars never fight for the terminal.

mod harvest;
mod interactive;

use clap::{Parser, Subcommand};
use wine_harvest_retailers::{RetailerDefinition, all_retailers};

use crate::harvest::{ExtractMode, HarvestArgs};

#[derive(Parser)]
#[command(name = "wine_harvest", about = "Wine retailer product harvester")]
struct Cli {
    #[command(flatten)]
    args: HarvestArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in retailers
    Retailers,
    /// Discover product links and save the catalog
    Crawl {
        /// Retailer id (e.g., "decantalo")
        retailer: Option<String>,
        /// Crawl again even if a catalog was saved, replacing it
        #[arg(long)]
        refresh: bool,
    },
    /// Extract product records from the saved catalog
    Extract {
        /// Retailer id (e.g., "decantalo")
        retailer: Option<String>,
        /// Append to the existing dataset, skipping products already in it
        #[arg(long)]
        resume: bool,
        /// Only process the first N catalog entries (for testing)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Discover product links, then extract product records
    Run {
        /// Retailer id (e.g., "decantalo")
        retailer: Option<String>,
        /// Crawl again even if a catalog was saved, replacing it
        #[arg(long)]
        refresh: bool,
        /// Append to the existing dataset, skipping products already in it
        #[arg(long)]
        resume: bool,
        /// Only process the first N catalog entries (for testing)
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn print_retailers(retailers: &[RetailerDefinition]) {
    println!("{:<14} {:<16} CATEGORIES", "ID", "NAME");
    println!("{}", "-".repeat(60));
    for retailer in retailers {
        let labels: Vec<&str> = retailer.categories.iter().map(|c| c.label.as_str()).collect();
        println!("{:<14} {:<16} {}", retailer.id, retailer.name, labels.join(", "));
    }
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let multi = wine_harvest_cli_utils::init_logger();
    let args = cli.args;

    let Some(command) = cli.command else {
        return interactive::run(&args, &multi).await;
    };

    match command {
        Commands::Retailers => {
            let mut retailers = all_retailers();
            if let Some(path) = &args.retailer_file {
                retailers.push(wine_harvest_retailers::load_retailer_file(path)?);
            }
            print_retailers(&retailers);
        }
        Commands::Crawl { retailer, refresh } => {
            let retailer =
                harvest::resolve_retailer(retailer.as_deref(), args.retailer_file.as_deref())?;
            let catalog = harvest::crawl(&retailer, &args, refresh, &multi).await?;
            log::info!("[{}] {} product links", retailer.id, catalog.len());
        }
        Commands::Extract {
            retailer,
            resume,
            limit,
        } => {
            let retailer =
                harvest::resolve_retailer(retailer.as_deref(), args.retailer_file.as_deref())?;
            let catalog = harvest::load_catalog(&retailer, &args)?;
            harvest::extract(&retailer, &catalog, &args, ExtractMode { resume, limit }, &multi)
                .await?;
        }
        Commands::Run {
            retailer,
            refresh,
            resume,
            limit,
        } => {
            let retailer =
                harvest::resolve_retailer(retailer.as_deref(), args.retailer_file.as_deref())?;
            harvest::run(&retailer, &args, refresh, ExtractMode { resume, limit }, &multi).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        log::error!("{e}");
        return Err(e);
    }

    Ok(())
}
