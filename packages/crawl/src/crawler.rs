//! Category crawling: phase 1 of a harvest.
//!
//! [`ListingCrawler`] runs [`discover`] over every category of a retailer,
//! each in a fresh browsing session, and gathers the results into a
//! [`Catalog`]. Categories may be crawled concurrently; the catalog still
//! lists them in configuration order.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt as _, TryStreamExt as _};
use serde::{Deserialize, Serialize};
use wine_harvest_catalog_models::{Catalog, CatalogEntry};
use wine_harvest_scraper::progress::{ProgressCallback, null_progress};
use wine_harvest_scraper::session::{SessionError, SessionFactory};

use crate::catalog_store::{CatalogStore, CatalogStoreError};
use crate::pagination::{ListingConfig, PaginationError, PaginationOptions, discover};

/// A category label and the URL of its listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Label attached to every product found (e.g. `"red"`).
    pub label: String,
    /// Listing entry point.
    pub url: String,
}

impl CategoryConfig {
    /// Creates a category.
    #[must_use]
    pub fn new(label: &str, url: &str) -> Self {
        Self {
            label: label.to_owned(),
            url: url.to_owned(),
        }
    }
}

/// Crawl failures. Empty categories and exhausted listings are not errors.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The listing configuration is unusable.
    #[error(transparent)]
    Listing(#[from] PaginationError),

    /// No session could be opened for a category.
    #[error("could not open a browsing session for category '{category}': {source}")]
    Session {
        /// Category label.
        category: String,
        /// Underlying error.
        #[source]
        source: SessionError,
    },

    /// Traversal of a category failed.
    #[error("crawl of category '{category}' failed: {source}")]
    Category {
        /// Category label.
        category: String,
        /// Underlying error.
        #[source]
        source: PaginationError,
    },

    /// The catalog could not be persisted or loaded.
    #[error(transparent)]
    Store(#[from] CatalogStoreError),
}

/// Discovers every product of a retailer's categories.
pub struct ListingCrawler {
    retailer: String,
    factory: Arc<dyn SessionFactory>,
    listing: ListingConfig,
    options: PaginationOptions,
    category_concurrency: usize,
    progress: Arc<dyn ProgressCallback>,
}

impl ListingCrawler {
    /// Creates a crawler for `retailer`, opening sessions from `factory`.
    #[must_use]
    pub fn new(retailer: &str, factory: Arc<dyn SessionFactory>, listing: ListingConfig) -> Self {
        Self {
            retailer: retailer.to_owned(),
            factory,
            listing,
            options: PaginationOptions::default(),
            category_concurrency: 1,
            progress: null_progress(),
        }
    }

    /// Sets pacing and limits.
    #[must_use]
    pub fn with_options(mut self, options: PaginationOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets how many categories are crawled at once.
    #[must_use]
    pub fn with_category_concurrency(mut self, concurrency: usize) -> Self {
        self.category_concurrency = concurrency.max(1);
        self
    }

    /// Reports one unit of progress per finished category.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Crawls every category and returns the combined catalog.
    ///
    /// Categories with no products are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if the listing configuration is invalid, a
    /// session cannot be opened, or a category listing cannot be traversed.
    pub async fn crawl(&self, categories: &[CategoryConfig]) -> Result<Catalog, CrawlError> {
        self.listing.validate()?;

        self.progress.set_total(categories.len() as u64);
        log::info!(
            "[{}] Crawling {} categories (concurrency={})",
            self.retailer,
            categories.len(),
            self.category_concurrency
        );

        let per_category: Vec<Vec<CatalogEntry>> =
            stream::iter(categories.iter().map(|category| self.crawl_category(category)))
                .buffered(self.category_concurrency)
                .try_collect()
                .await?;

        let catalog: Catalog = per_category.into_iter().flatten().collect();
        self.progress.finish(format!("{} product links", catalog.len()));
        log::info!("[{}] Catalog holds {} entries", self.retailer, catalog.len());

        Ok(catalog)
    }

    /// Loads the catalog from `store` if one was persisted, otherwise crawls
    /// and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if loading, crawling or saving fails.
    pub async fn crawl_or_load(
        &self,
        categories: &[CategoryConfig],
        store: &CatalogStore,
    ) -> Result<Catalog, CrawlError> {
        if store.exists() {
            let catalog = store.load()?;
            log::info!(
                "[{}] Using existing catalog {} ({} entries)",
                self.retailer,
                store.path().display(),
                catalog.len()
            );
            return Ok(catalog);
        }

        self.refresh(categories, store).await
    }

    /// Crawls unconditionally and replaces whatever `store` holds.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if crawling or saving fails. The stored catalog
    /// is left untouched on failure.
    pub async fn refresh(
        &self,
        categories: &[CategoryConfig],
        store: &CatalogStore,
    ) -> Result<Catalog, CrawlError> {
        let catalog = self.crawl(categories).await?;
        store.save(&catalog)?;
        log::info!("[{}] Saved catalog to {}", self.retailer, store.path().display());
        Ok(catalog)
    }

    async fn crawl_category(
        &self,
        category: &CategoryConfig,
    ) -> Result<Vec<CatalogEntry>, CrawlError> {
        let label = category.label.as_str();
        self.progress.set_message(label.to_owned());
        log::debug!("[{}] Crawling '{label}' from {}", self.retailer, category.url);

        let mut session = self
            .factory
            .open()
            .await
            .map_err(|source| CrawlError::Session {
                category: label.to_owned(),
                source,
            })?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        {
            let mut links = discover(
                session.as_mut(),
                &self.listing,
                &category.url,
                &self.options,
            );

            while let Some(link) = links.next().await {
                let link = link.map_err(|source| CrawlError::Category {
                    category: label.to_owned(),
                    source,
                })?;
                if seen.insert(link.clone()) {
                    entries.push(CatalogEntry::new(label, link));
                } else {
                    log::debug!("[{}] '{label}' lists {link} twice", self.retailer);
                }
            }
        }

        if entries.is_empty() {
            log::warn!(
                "[{}] No products found for category '{label}'; skipping it",
                self.retailer
            );
        } else {
            log::info!(
                "[{}] '{label}': {} product links",
                self.retailer,
                entries.len()
            );
        }

        self.progress.inc(1);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use wine_harvest_scraper::session::BrowsingSession;

    use super::*;
    use crate::pagination::tests::{
        FakePage, FakeSession, LINKS, NEXT, fast_options, links, three_numbered_pages,
    };

    /// Hands out fake sessions over a shared page map and counts opens.
    struct FakeFactory {
        pages: Mutex<Vec<(String, FakePage)>>,
        opened: AtomicUsize,
    }

    impl FakeFactory {
        fn new(pages: Vec<(String, FakePage)>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages),
                opened: AtomicUsize::new(0),
            })
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open(&self) -> Result<Box<dyn BrowsingSession>, SessionError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let pages = self.pages.lock().unwrap().clone();
            Ok(Box::new(FakeSession::new(pages)))
        }
    }

    fn shop() -> Vec<(String, FakePage)> {
        let mut pages = three_numbered_pages("red");
        pages.push((
            "https://shop.test/white/1".to_owned(),
            FakePage {
                // The first red product is also filed under white.
                links: [links("red-p1", 1), links("white", 3)].concat(),
                ..FakePage::default()
            },
        ));
        pages.push(("https://shop.test/empty/1".to_owned(), FakePage::default()));
        pages
    }

    fn categories() -> Vec<CategoryConfig> {
        vec![
            CategoryConfig::new("red", "https://shop.test/red/1"),
            CategoryConfig::new("fortified", "https://shop.test/empty/1"),
            CategoryConfig::new("white", "https://shop.test/white/1"),
        ]
    }

    fn crawler(factory: Arc<FakeFactory>) -> ListingCrawler {
        ListingCrawler::new(
            "testshop",
            factory,
            ListingConfig::new(LINKS).with_next_control(NEXT),
        )
        .with_options(fast_options())
    }

    fn scratch_store(name: &str) -> (std::path::PathBuf, CatalogStore) {
        let dir = std::env::temp_dir().join(format!("wine_harvest_crawler_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let store = CatalogStore::for_retailer(&dir, "testshop");
        (dir, store)
    }

    #[tokio::test]
    async fn tags_entries_and_skips_empty_categories() {
        let factory = FakeFactory::new(shop());
        let catalog = crawler(Arc::clone(&factory))
            .crawl(&categories())
            .await
            .unwrap();

        assert_eq!(catalog.len(), 116);
        assert_eq!(catalog.count_in("red"), 112);
        assert_eq!(catalog.count_in("fortified"), 0);
        assert_eq!(catalog.count_in("white"), 4);
        assert_eq!(factory.opened(), 3);

        // Same URL under two categories is kept in both.
        let shared = "https://shop.test/red-p1/0";
        assert_eq!(
            catalog.iter().filter(|e| e.detail_url == shared).count(),
            2
        );
    }

    #[tokio::test]
    async fn concurrent_categories_keep_configuration_order() {
        let factory = FakeFactory::new(shop());
        let catalog = crawler(factory)
            .with_category_concurrency(3)
            .crawl(&categories())
            .await
            .unwrap();

        let order: Vec<&str> = catalog.iter().map(|e| e.category.as_str()).collect();
        let first_white = order.iter().position(|c| *c == "white").unwrap();
        assert!(order[..first_white].iter().all(|c| *c == "red"));
        assert_eq!(catalog.entries()[0].detail_url, "https://shop.test/red-p1/0");
    }

    #[tokio::test]
    async fn resume_skips_discovery_and_returns_identical_catalog() {
        let (dir, store) = scratch_store("resume");

        let first_factory = FakeFactory::new(shop());
        let first = crawler(Arc::clone(&first_factory))
            .crawl_or_load(&categories(), &store)
            .await
            .unwrap();
        assert!(first_factory.opened() > 0);
        assert!(store.exists());

        let second_factory = FakeFactory::new(shop());
        let second = crawler(Arc::clone(&second_factory))
            .crawl_or_load(&categories(), &store)
            .await
            .unwrap();
        assert_eq!(second_factory.opened(), 0);
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn refresh_replaces_persisted_catalog() {
        let (dir, store) = scratch_store("refresh");
        let stale: Catalog = vec![CatalogEntry::new("red", "https://shop.test/old")].into();
        store.save(&stale).unwrap();

        let catalog = crawler(FakeFactory::new(shop()))
            .refresh(&categories(), &store)
            .await
            .unwrap();
        assert_eq!(store.load().unwrap(), catalog);
        assert_ne!(catalog, stale);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_listing_page_is_structural_and_saves_nothing() {
        let (dir, store) = scratch_store("structural");
        let mut cats = categories();
        cats.push(CategoryConfig::new("sparkling", "https://shop.test/gone"));

        let err = crawler(FakeFactory::new(shop()))
            .crawl_or_load(&cats, &store)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CrawlError::Category { ref category, source: PaginationError::EntryPoint { .. } }
                if category == "sparkling"
        ));
        assert!(!store.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn invalid_listing_fails_before_opening_sessions() {
        let factory = FakeFactory::new(shop());
        let err = ListingCrawler::new("testshop", factory.clone(), ListingConfig::new(" "))
            .crawl(&categories())
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::Listing(PaginationError::Config(_))));
        assert_eq!(factory.opened(), 0);
    }
}
