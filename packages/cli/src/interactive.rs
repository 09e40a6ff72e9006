//! Menu-driven harvest for when no subcommand is given.
//!
//! Prompts for a retailer and a phase with `dialoguer`, then runs it with
//! the settings parsed from the command line.

use dialoguer::{Confirm, Input, Select};
use wine_harvest_cli_utils::MultiProgress;
use wine_harvest_extract::dataset_path;
use wine_harvest_retailers::{RetailerDefinition, all_retailers, load_retailer_file};

use crate::harvest::{self, ExtractMode, HarvestArgs};

/// Actions offered by the menu.
enum Action {
    Run,
    Crawl,
    Extract,
    ListRetailers,
}

impl Action {
    const ALL: &[Self] = &[Self::Run, Self::Crawl, Self::Extract, Self::ListRetailers];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Discover products and extract records",
            Self::Crawl => "Discover products only",
            Self::Extract => "Extract records from the saved catalog",
            Self::ListRetailers => "List retailers",
        }
    }
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen phase fails.
pub async fn run(
    args: &HarvestArgs,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;
    let action = &Action::ALL[idx];

    if matches!(action, Action::ListRetailers) {
        crate::print_retailers(&all_retailers());
        return Ok(());
    }

    let retailer = choose_retailer(args)?;

    match action {
        Action::Run => {
            let refresh = ask_refresh(args, &retailer)?;
            let mode = ask_extract_mode(args, &retailer)?;
            harvest::run(&retailer, args, refresh, mode, multi).await?;
        }
        Action::Crawl => {
            let refresh = ask_refresh(args, &retailer)?;
            harvest::crawl(&retailer, args, refresh, multi).await?;
        }
        Action::Extract => {
            let catalog = harvest::load_catalog(&retailer, args)?;
            let mode = ask_extract_mode(args, &retailer)?;
            harvest::extract(&retailer, &catalog, args, mode, multi).await?;
        }
        Action::ListRetailers => {}
    }

    Ok(())
}

fn choose_retailer(args: &HarvestArgs) -> Result<RetailerDefinition, Box<dyn std::error::Error>> {
    if let Some(path) = &args.retailer_file {
        return Ok(load_retailer_file(path)?);
    }

    let mut retailers = all_retailers();
    let labels: Vec<String> = retailers
        .iter()
        .map(|r| format!("{:<14} {}", r.id, r.name))
        .collect();
    let idx = Select::new()
        .with_prompt("Retailer")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(retailers.swap_remove(idx))
}

/// Only asks when a catalog already exists; otherwise a crawl happens anyway.
fn ask_refresh(
    args: &HarvestArgs,
    retailer: &RetailerDefinition,
) -> Result<bool, Box<dyn std::error::Error>> {
    if !args.catalog_store(retailer).exists() {
        return Ok(false);
    }
    Ok(Confirm::new()
        .with_prompt("A catalog already exists. Crawl again and replace it?")
        .default(false)
        .interact()?)
}

fn ask_extract_mode(
    args: &HarvestArgs,
    retailer: &RetailerDefinition,
) -> Result<ExtractMode, Box<dyn std::error::Error>> {
    let resume = if dataset_path(&args.data_dir, &retailer.id).exists() {
        Confirm::new()
            .with_prompt("A dataset already exists. Resume it (otherwise it is overwritten)?")
            .default(true)
            .interact()?
    } else {
        false
    };

    let limit: String = Input::new()
        .with_prompt("Only the first N products (empty for all)")
        .allow_empty(true)
        .interact_text()?;
    let limit = if limit.trim().is_empty() {
        None
    } else {
        Some(limit.trim().parse::<usize>()?)
    };

    Ok(ExtractMode { resume, limit })
}
