#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Phase 1 of a harvest: product discovery.
//!
//! [`pagination`] walks one category listing whatever its paging idiom,
//! [`crawler`] runs it across a retailer's categories to build a
//! [`Catalog`](wine_harvest_catalog_models::Catalog), and [`catalog_store`]
//! persists that catalog so later runs can skip discovery.

pub mod catalog_store;
pub mod crawler;
pub mod pagination;

pub use catalog_store::{CatalogStore, CatalogStoreError};
pub use crawler::{CategoryConfig, CrawlError, ListingCrawler};
pub use pagination::{
    ListingConfig, PageParam, PaginationError, PaginationIdiom, PaginationOptions, discover,
};
