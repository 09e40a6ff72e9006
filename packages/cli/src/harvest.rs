//! Phase orchestration for one retailer.
//!
//! Wires the retailer definition, command-line overrides and the HTTP
//! collaborators into a [`ListingCrawler`] (phase 1) and a
//! [`RecordAssembler`] (phase 2), with artifacts under the data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use wine_harvest_catalog_models::{Catalog, CatalogEntry};
use wine_harvest_cli_utils::{IndicatifProgress, MultiProgress};
use wine_harvest_crawl::{CatalogStore, ListingCrawler, PaginationOptions};
use wine_harvest_extract::{
    DatasetWriter, RecordAssembler, RunSummary, completed_entries, dataset_path, pending_entries,
};
use wine_harvest_retailers::{Pacing, RetailerDefinition, find_retailer, load_retailer_file};
use wine_harvest_scraper::fetch::{FetchConfig, HttpFetcher};
use wine_harvest_scraper::static_session::StaticSessionFactory;

/// Retailer pages are read in English.
const ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

/// Settings shared by every phase. Pacing flags left unset fall back to the
/// retailer's `[pacing]` table.
#[derive(Debug, Clone, Args)]
pub struct HarvestArgs {
    /// Directory holding `url/` catalogs and `scraped/` datasets
    #[arg(long, env = "WINE_HARVEST_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,
    /// Load the retailer from this TOML file instead of the built-ins
    #[arg(long, global = true)]
    pub retailer_file: Option<PathBuf>,
    /// Concurrent detail page workers
    #[arg(long, global = true)]
    pub workers: Option<usize>,
    /// Pause before each detail page request, in milliseconds
    #[arg(long, global = true)]
    pub request_delay_ms: Option<u64>,
    /// Pause before each pagination step, in milliseconds
    #[arg(long, global = true)]
    pub page_delay_ms: Option<u64>,
    /// Longest wait for product links on a listing page, in seconds
    #[arg(long, default_value = "15", global = true)]
    pub page_timeout_secs: u64,
    /// Most listing pages visited per category
    #[arg(long, default_value = "500", global = true)]
    pub max_pages: u32,
    /// Categories crawled at once
    #[arg(long, default_value = "1", global = true)]
    pub category_concurrency: usize,
    /// HTTP request timeout, in seconds
    #[arg(long, default_value = "30", global = true)]
    pub http_timeout_secs: u64,
}

/// Phase 2 switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractMode {
    /// Append to the existing dataset, skipping entries it already holds.
    pub resume: bool,
    /// Only process the first N catalog entries.
    pub limit: Option<usize>,
}

/// Pacing after command-line overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePacing {
    pub page_delay: Duration,
    pub request_delay: Duration,
    pub workers: usize,
}

impl HarvestArgs {
    /// Applies the pacing flags on top of a retailer's defaults.
    #[must_use]
    pub fn pacing(&self, defaults: &Pacing) -> EffectivePacing {
        EffectivePacing {
            page_delay: self
                .page_delay_ms
                .map_or_else(|| defaults.page_delay(), Duration::from_millis),
            request_delay: self
                .request_delay_ms
                .map_or_else(|| defaults.request_delay(), Duration::from_millis),
            workers: self.workers.unwrap_or(defaults.workers).max(1),
        }
    }

    /// Where `retailer`'s catalog is persisted.
    #[must_use]
    pub fn catalog_store(&self, retailer: &RetailerDefinition) -> CatalogStore {
        CatalogStore::for_retailer(&self.data_dir, &retailer.id)
    }

    fn fetcher(&self) -> Result<Arc<HttpFetcher>, Box<dyn std::error::Error>> {
        let config = FetchConfig::default()
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
            .with_header("Accept-Language", ACCEPT_LANGUAGE);
        Ok(Arc::new(HttpFetcher::new(&config)?))
    }
}

/// Loads the retailer named by `id`, or the one in `--retailer-file`.
///
/// # Errors
///
/// Returns an error if neither is given, the id is unknown, or the file is
/// invalid.
pub fn resolve_retailer(
    id: Option<&str>,
    file: Option<&Path>,
) -> Result<RetailerDefinition, Box<dyn std::error::Error>> {
    match (file, id) {
        (Some(path), id) => {
            let retailer = load_retailer_file(path)?;
            if let Some(id) = id
                && !id.eq_ignore_ascii_case(&retailer.id)
            {
                return Err(format!(
                    "{} defines retailer '{}', not '{id}'",
                    path.display(),
                    retailer.id
                )
                .into());
            }
            Ok(retailer)
        }
        (None, Some(id)) => Ok(find_retailer(id)?),
        (None, None) => Err("No retailer given (pass an id or --retailer-file)".into()),
    }
}

/// The first `limit` catalog entries, or all of them.
#[must_use]
pub fn select_entries(catalog: &Catalog, limit: Option<usize>) -> Vec<CatalogEntry> {
    let entries = catalog.entries();
    entries[..limit.map_or(entries.len(), |n| n.min(entries.len()))].to_vec()
}

/// Phase 1: loads the persisted catalog, or crawls and persists one.
/// `refresh` forces a new crawl that replaces the stored catalog.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or crawling fails.
pub async fn crawl(
    retailer: &RetailerDefinition,
    args: &HarvestArgs,
    refresh: bool,
    multi: &MultiProgress,
) -> Result<Catalog, Box<dyn std::error::Error>> {
    let pacing = args.pacing(&retailer.pacing);
    let factory = Arc::new(StaticSessionFactory::new(args.fetcher()?));

    let options = PaginationOptions {
        page_timeout: Duration::from_secs(args.page_timeout_secs),
        page_delay: pacing.page_delay,
        max_pages: args.max_pages,
        ..PaginationOptions::default()
    };

    let crawler = ListingCrawler::new(&retailer.id, factory, retailer.listing.clone())
        .with_options(options)
        .with_category_concurrency(args.category_concurrency)
        .with_progress(IndicatifProgress::categories_bar(multi, &retailer.id));

    let store = args.catalog_store(retailer);
    let catalog = if refresh {
        crawler.refresh(&retailer.categories, &store).await?
    } else {
        crawler.crawl_or_load(&retailer.categories, &store).await?
    };

    for category in &retailer.categories {
        log::debug!(
            "[{}] {}: {} products",
            retailer.id,
            category.label,
            catalog.count_in(&category.label)
        );
    }

    Ok(catalog)
}

/// Loads the persisted catalog without crawling.
///
/// # Errors
///
/// Returns an error if no catalog was saved or it cannot be read.
pub fn load_catalog(
    retailer: &RetailerDefinition,
    args: &HarvestArgs,
) -> Result<Catalog, Box<dyn std::error::Error>> {
    let store = args.catalog_store(retailer);
    if !store.exists() {
        return Err(format!(
            "No catalog at {}; run `wine_harvest crawl {}` first",
            store.path().display(),
            retailer.id
        )
        .into());
    }
    Ok(store.load()?)
}

/// Phase 2: assembles records for `catalog` into the retailer's dataset.
///
/// # Errors
///
/// Returns an error if the extraction rules are invalid, the dataset cannot
/// be written, or a page holds a value in an unknown format.
pub async fn extract(
    retailer: &RetailerDefinition,
    catalog: &Catalog,
    args: &HarvestArgs,
    mode: ExtractMode,
    multi: &MultiProgress,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let pacing = args.pacing(&retailer.pacing);
    let extractors = Arc::new(retailer.extractors()?);
    let path = dataset_path(&args.data_dir, &retailer.id);

    let mut entries = select_entries(catalog, mode.limit);
    let mut writer = if mode.resume {
        let done = completed_entries(&path)?;
        let before = entries.len();
        entries = pending_entries(&entries, &done);
        log::info!(
            "[{}] Resuming {}: {} of {before} entries already extracted",
            retailer.id,
            path.display(),
            before - entries.len()
        );
        DatasetWriter::append_to(&path)?
    } else {
        DatasetWriter::create(&path)?
    };

    let assembler = RecordAssembler::new(&retailer.id, args.fetcher()?, extractors)
        .with_workers(pacing.workers)
        .with_request_delay(pacing.request_delay)
        .with_progress(IndicatifProgress::detail_pages_bar(multi, &retailer.id));

    let summary = assembler.run(&entries, &mut writer).await?;
    log::info!(
        "[{}] Wrote {} rows to {}",
        retailer.id,
        writer.written(),
        writer.path().display()
    );

    Ok(summary)
}

/// Both phases back to back.
///
/// # Errors
///
/// Returns the first error from either phase.
pub async fn run(
    retailer: &RetailerDefinition,
    args: &HarvestArgs,
    refresh: bool,
    mode: ExtractMode,
    multi: &MultiProgress,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let catalog = crawl(retailer, args, refresh, multi).await?;
    extract(retailer, &catalog, args, mode, multi).await
}
