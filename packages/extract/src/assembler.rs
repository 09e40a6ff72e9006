//! Record assembly: phase 2 of a harvest.
//!
//! For each catalog entry the detail page is fetched, checked for being a
//! product page, and run through the retailer's [`ExtractorSet`]. The
//! resulting [`ProductRecord`]s go to a [`RecordSink`] in catalog order.
//!
//! Failure handling per entry:
//!
//! - fetch failure: warn, skip the entry, carry on;
//! - not a product page: info, skip the entry, carry on;
//! - a field that cannot be found or parsed: that field is left empty;
//! - a bottle size in an unknown format: the run stops with
//!   [`AssembleError::UnrecognizedFormat`]. Rows already written stay.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt as _};
use wine_harvest_catalog_models::{CatalogEntry, Dataset, Field, ProductRecord};
use wine_harvest_scraper::document::ParsedDocument;
use wine_harvest_scraper::fetch::DocumentFetch;
use wine_harvest_scraper::progress::{ProgressCallback, null_progress};

use crate::dataset::{DatasetError, RecordSink};
use crate::extractors::ExtractorSet;
use crate::units::UnrecognizedFormat;

/// Errors that stop a phase 2 run.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// A detail page carried a value in a format no parser understands.
    #[error("{url}: {source}")]
    UnrecognizedFormat {
        /// Detail page URL.
        url: String,
        /// The unparseable value.
        #[source]
        source: UnrecognizedFormat,
    },

    /// The dataset could not be written.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// What became of one catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// A record was assembled.
    Record(ProductRecord),
    /// The page is not a product page.
    NotProduct,
    /// The page could not be fetched.
    FetchFailed,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records written.
    pub records: usize,
    /// Entries skipped as non-product pages.
    pub not_products: usize,
    /// Entries skipped because their page could not be fetched.
    pub fetch_failures: usize,
}

/// Builds a record from the detail page `html` of `entry`.
///
/// Returns `Ok(None)` for pages that are not product pages.
///
/// # Errors
///
/// Returns [`UnrecognizedFormat`] if the bottle size is in an unknown format.
pub fn assemble_document(
    entry: &CatalogEntry,
    html: &str,
    extractors: &dyn ExtractorSet,
) -> Result<Option<ProductRecord>, UnrecognizedFormat> {
    let doc = ParsedDocument::parse(html);

    if !extractors.is_product_page(&doc) {
        log::info!("Skipping {}: not a product page", entry.detail_url);
        return Ok(None);
    }
    let Some(name) = extractors.extract_name(&doc) else {
        log::info!("Skipping {}: no product name", entry.detail_url);
        return Ok(None);
    };

    let mut record = ProductRecord::new(name, entry);
    record.is_mixed_case = extractors.is_mixed_case(&record.name);
    record.price = extractors.extract_price(&doc);
    record.country = extractors.extract_country(&doc);
    record.rating = extractors.extract_rating(&doc);
    record.review_count = extractors.extract_review_count(&doc);
    record.wine_type = extractors
        .extract_wine_type(&doc)
        .or_else(|| Some(entry.category.clone()));

    // Bottle-level attributes mean nothing for an assortment.
    if !record.is_mixed_case {
        record.bottle_size_cl = extractors.extract_bottle_size_cl(&doc)?;
        record.abv_percent = extractors.extract_abv_percent(&doc);
        record.vintage_year = extractors.extract_vintage_year(&doc);
    }

    let missing: Vec<String> = Field::ALL
        .iter()
        .filter(|field| !record.has(**field))
        .filter(|field| !(record.is_mixed_case && field.is_per_bottle()))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        log::debug!("{}: no {}", entry.detail_url, missing.join(", "));
    }

    Ok(Some(record))
}

/// Drops entries whose `(category, detail_url)` is in `done`.
#[must_use]
pub fn pending_entries(
    entries: &[CatalogEntry],
    done: &HashSet<(String, String)>,
) -> Vec<CatalogEntry> {
    entries
        .iter()
        .filter(|entry| !done.contains(&(entry.category.clone(), entry.detail_url.clone())))
        .cloned()
        .collect()
}

/// Fetches detail pages and assembles records.
pub struct RecordAssembler {
    retailer: String,
    fetcher: Arc<dyn DocumentFetch>,
    extractors: Arc<dyn ExtractorSet>,
    workers: usize,
    request_delay: Duration,
    progress: Arc<dyn ProgressCallback>,
}

impl RecordAssembler {
    /// Creates an assembler for `retailer` with a single worker.
    #[must_use]
    pub fn new(
        retailer: &str,
        fetcher: Arc<dyn DocumentFetch>,
        extractors: Arc<dyn ExtractorSet>,
    ) -> Self {
        Self {
            retailer: retailer.to_owned(),
            fetcher,
            extractors,
            workers: 1,
            request_delay: Duration::ZERO,
            progress: null_progress(),
        }
    }

    /// Sets how many pages are fetched and parsed concurrently.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the pause each worker takes before every request.
    #[must_use]
    pub const fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Reports one unit of progress per finished entry.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetches and assembles one entry.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::UnrecognizedFormat`] if the page holds a value
    /// in an unknown format. Fetch failures are not errors.
    pub async fn assemble(&self, entry: &CatalogEntry) -> Result<EntryOutcome, AssembleError> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let html = match self.fetcher.fetch(&entry.detail_url).await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("[{}] Skipping {}: {e}", self.retailer, entry.detail_url);
                return Ok(EntryOutcome::FetchFailed);
            }
        };

        let record = assemble_document(entry, &html, self.extractors.as_ref()).map_err(
            |source| AssembleError::UnrecognizedFormat {
                url: entry.detail_url.clone(),
                source,
            },
        )?;

        Ok(record.map_or(EntryOutcome::NotProduct, EntryOutcome::Record))
    }

    /// Assembles every entry, appending records to `sink` in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError`] on an unrecognized value format or a sink
    /// failure. Records appended before the error remain in `sink`.
    pub async fn run(
        &self,
        entries: &[CatalogEntry],
        sink: &mut dyn RecordSink,
    ) -> Result<RunSummary, AssembleError> {
        log::info!(
            "[{}] Extracting {} detail pages (workers={})",
            self.retailer,
            entries.len(),
            self.workers
        );
        self.progress.set_total(entries.len() as u64);

        let mut summary = RunSummary::default();
        let mut outcomes = stream::iter(entries.iter().map(|entry| self.assemble(entry)))
            .buffered(self.workers);

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                EntryOutcome::Record(record) => {
                    sink.append(&record)?;
                    summary.records += 1;
                    self.progress.set_message(record.name);
                }
                EntryOutcome::NotProduct => summary.not_products += 1,
                EntryOutcome::FetchFailed => summary.fetch_failures += 1,
            }
            self.progress.inc(1);
        }

        self.progress.finish(format!("{} records", summary.records));
        log::info!(
            "[{}] {} records, {} non-product pages, {} fetch failures",
            self.retailer,
            summary.records,
            summary.not_products,
            summary.fetch_failures
        );

        Ok(summary)
    }

    /// Assembles every entry into an in-memory [`Dataset`].
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError`] on an unrecognized value format.
    pub async fn collect(&self, entries: &[CatalogEntry]) -> Result<Dataset, AssembleError> {
        let mut dataset = Dataset::new();
        self.run(entries, &mut dataset).await?;
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use wine_harvest_catalog_models::Price;
    use wine_harvest_scraper::fetch::FetchError;

    use super::*;
    use crate::extractors::ConfiguredExtractors;
    use crate::rules::{ExtractionRules, FieldRule, FieldSpec};

    /// Serves canned pages; later URLs answer faster so that concurrent
    /// workers finish out of order.
    struct CannedFetcher {
        pages: HashMap<String, String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CannedFetcher {
        fn new(pages: &[(&str, String)]) -> Arc<Self> {
            Arc::new(Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| ((*url).to_owned(), html.clone()))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentFetch for CannedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let index: u64 = url.rsplit('/').next().and_then(|i| i.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(index * 2))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_owned(),
                status: 503,
            })
        }
    }

    fn page(name: &str, extra: &str) -> String {
        format!(
            r#"<html><body>
                 <div class="bop-title"><h1>{name} <span>75cl</span></h1></div>
                 <span class="bop-price__current">£9.50</span>
                 <span class="bop-catchWeight">75cl</span>
                 <div class="bop-info__field"><h6>ABV (%)</h6><div class="bop-info__content">12.5</div></div>
                 <div class="bop-info__field"><h6>Country of Origin</h6><div class="bop-info__content">Spain</div></div>
                 <div itemprop="ratingValue" content="4.5"></div>
                 {extra}
               </body></html>"#
        )
    }

    fn rules() -> ExtractionRules {
        let labelled = |equals: &str| {
            FieldSpec::new(FieldRule::Labelled {
                container: ".bop-info__field".to_owned(),
                label: "h6".to_owned(),
                equals: Some(equals.to_owned()),
                value: ".bop-info__content".to_owned(),
            })
        };
        ExtractionRules {
            required: vec![".bop-catchWeight".to_owned()],
            price: Some(FieldSpec::text(".bop-price__current")),
            bottle_size: Some(FieldSpec::text(".bop-catchWeight")),
            abv: Some(labelled("ABV (%)")),
            vintage: Some(labelled("Current Vintage")),
            country: Some(labelled("Country of Origin")),
            rating: Some(FieldSpec::attribute("[itemprop='ratingValue']", "content")),
            ..ExtractionRules::new(FieldSpec::new(FieldRule::Text {
                selector: ".bop-title h1".to_owned(),
                exclude: Some("span".to_owned()),
            }))
        }
    }

    fn extractors() -> Arc<dyn ExtractorSet> {
        Arc::new(ConfiguredExtractors::new(&rules()).unwrap())
    }

    fn entry(i: usize) -> CatalogEntry {
        CatalogEntry::new("red", format!("https://shop.test/p/{i}"))
    }

    #[test]
    fn assembles_full_record() {
        let record = assemble_document(&entry(1), &page("Rioja Reserva 2018", ""), extractors().as_ref())
            .unwrap()
            .unwrap();

        assert_eq!(record.name, "Rioja Reserva 2018");
        assert_eq!(record.category, "red");
        assert_eq!(record.wine_type.as_deref(), Some("red"));
        assert_eq!(record.price, Some(Price::Amount(9.5)));
        assert_eq!(record.bottle_size_cl, Some(75.0));
        assert_eq!(record.abv_percent, Some(12.5));
        assert_eq!(record.vintage_year, None);
        assert_eq!(record.country.as_deref(), Some("Spain"));
        assert_eq!(record.rating, Some(4.5));
        assert!(!record.is_mixed_case);
        assert_eq!(record.source_url, "https://shop.test/p/1");
    }

    #[test]
    fn missing_rating_degrades_only_that_field() {
        let html = page("Rioja Reserva 2018", "").replace("ratingValue", "somethingElse");
        let record = assemble_document(&entry(1), &html, extractors().as_ref())
            .unwrap()
            .unwrap();
        assert_eq!(record.rating, None);
        assert_eq!(record.price, Some(Price::Amount(9.5)));
        assert_eq!(record.abv_percent, Some(12.5));
        assert_eq!(record.country.as_deref(), Some("Spain"));
    }

    #[test]
    fn mixed_case_skips_per_bottle_fields() {
        let record = assemble_document(
            &entry(1),
            &page("Red Wine Mystery Case", ""),
            extractors().as_ref(),
        )
        .unwrap()
        .unwrap();
        assert!(record.is_mixed_case);
        assert_eq!(record.bottle_size_cl, None);
        assert_eq!(record.abv_percent, None);
        assert_eq!(record.price, Some(Price::Amount(9.5)));
        assert_eq!(record.country.as_deref(), Some("Spain"));
    }

    #[test]
    fn page_without_title_is_skipped_without_error() {
        let html = page("Rioja", "").replace("bop-title", "gift-banner");
        assert_eq!(
            assemble_document(&entry(1), &html, extractors().as_ref()).unwrap(),
            None
        );
    }

    #[test]
    fn non_product_page_without_required_element_is_skipped() {
        let html = page("Prosecco Scented Candle", "").replace("bop-catchWeight", "bop-other");
        assert_eq!(
            assemble_document(&entry(1), &html, extractors().as_ref()).unwrap(),
            None
        );
    }

    #[test]
    fn unknown_size_format_is_fatal() {
        let html = page("Rioja", "").replace(r#"catchWeight">75cl"#, r#"catchWeight">20oz"#);
        let err = assemble_document(&entry(1), &html, extractors().as_ref()).unwrap_err();
        assert_eq!(err.text, "20oz");
    }

    #[test]
    fn pending_entries_skip_completed_pairs() {
        let entries = vec![entry(1), entry(2), CatalogEntry::new("white", "https://shop.test/p/1")];
        let done = HashSet::from([("red".to_owned(), "https://shop.test/p/1".to_owned())]);
        let pending = pending_entries(&entries, &done);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], entry(2));
        assert_eq!(pending[1].category, "white");
    }

    #[tokio::test]
    async fn run_keeps_catalog_order_and_skips_failures() {
        let pages: Vec<(String, String)> = (0..8)
            .filter(|i| *i != 3)
            .map(|i| {
                let html = if i == 5 {
                    "<html><body><h1>Gift cards</h1></body></html>".to_owned()
                } else {
                    page(&format!("Wine {i}"), "")
                };
                (format!("https://shop.test/p/{i}"), html)
            })
            .collect();
        let borrowed: Vec<(&str, String)> =
            pages.iter().map(|(u, h)| (u.as_str(), h.clone())).collect();
        let fetcher = CannedFetcher::new(&borrowed);

        let entries: Vec<CatalogEntry> = (0..8).map(entry).collect();
        let assembler = RecordAssembler::new("testshop", fetcher.clone(), extractors()).with_workers(4);

        let mut dataset = Dataset::new();
        let summary = assembler.run(&entries, &mut dataset).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                records: 6,
                not_products: 1,
                fetch_failures: 1,
            }
        );
        let names: Vec<&str> = dataset.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Wine 0", "Wine 1", "Wine 2", "Wine 4", "Wine 6", "Wine 7"]);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) > 1);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn unknown_format_stops_run_after_earlier_rows() {
        let bad = page("Wine 1", "").replace(r#"catchWeight">75cl"#, r#"catchWeight">20oz"#);
        let fetcher = CannedFetcher::new(&[
            ("https://shop.test/p/0", page("Wine 0", "")),
            ("https://shop.test/p/1", bad),
            ("https://shop.test/p/2", page("Wine 2", "")),
        ]);
        let entries: Vec<CatalogEntry> = (0..3).map(entry).collect();

        let mut dataset = Dataset::new();
        let err = RecordAssembler::new("testshop", fetcher, extractors())
            .run(&entries, &mut dataset)
            .await
            .unwrap_err();

        assert!(matches!(err, AssembleError::UnrecognizedFormat { ref url, .. } if url.ends_with("/1")));
        assert_eq!(dataset.len(), 1);
    }

    #[tokio::test]
    async fn collect_builds_dataset() {
        let fetcher = CannedFetcher::new(&[("https://shop.test/p/0", page("Wine 0", ""))]);
        let dataset = RecordAssembler::new("testshop", fetcher, extractors())
            .collect(&[entry(0)])
            .await
            .unwrap();
        assert_eq!(dataset.len(), 1);
    }
}
