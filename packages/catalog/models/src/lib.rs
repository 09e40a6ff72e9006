#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog and dataset types shared by both harvest phases.
//!
//! Phase 1 (listing discovery) produces a [`Catalog`] of [`CatalogEntry`]
//! values. Phase 2 (detail extraction) reads that catalog and produces a
//! [`Dataset`] of [`ProductRecord`] values. The catalog is the only artifact
//! handed from one phase to the other.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A product detail page discovered while traversing a category listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Category label the listing was crawled under (e.g. `"red"`).
    pub category: String,
    /// Absolute URL of the product detail page.
    pub detail_url: String,
}

impl CatalogEntry {
    /// Creates a new entry tagging `detail_url` with `category`.
    #[must_use]
    pub fn new(category: impl Into<String>, detail_url: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            detail_url: detail_url.into(),
        }
    }
}

/// Ordered list of catalog entries, grouped by category in crawl order.
///
/// Within one category a `detail_url` appears at most once. The same URL may
/// show up again under a different category when a retailer files the
/// product in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry to the end of the catalog.
    pub fn push(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in catalog order.
    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    /// Returns the entries as a slice.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of entries filed under `category`.
    #[must_use]
    pub fn count_in(&self, category: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.category == category)
            .count()
    }
}

impl From<Vec<CatalogEntry>> for Catalog {
    fn from(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<T: IntoIterator<Item = CatalogEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Catalog {
    type Item = CatalogEntry;
    type IntoIter = std::vec::IntoIter<CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Price of a product as listed on its detail page.
///
/// Some retailers render a product without a price when it is out of stock.
/// Those pages get a labelled [`Price::Unavailable`] instead of a missing
/// value so the two cases stay distinguishable in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    /// Numeric price with the currency symbol and separators removed.
    Amount(f64),
    /// Retailer-specific label such as `"out of stock"`.
    Unavailable(String),
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(value) => write!(f, "{value}"),
            Self::Unavailable(label) => f.write_str(label),
        }
    }
}

/// Recognized product fields. The string form is the dataset column name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    /// Product name.
    Name,
    /// Category the product was catalogued under.
    Category,
    /// Wine style as stated on the detail page.
    WineType,
    /// Listed price.
    Price,
    /// Bottle size in centilitres.
    BottleSizeCl,
    /// Alcohol by volume, percent.
    AbvPercent,
    /// Vintage as printed by the retailer.
    VintageYear,
    /// Country of origin.
    Country,
    /// Average customer rating.
    Rating,
    /// Number of customer reviews.
    ReviewCount,
    /// Whether the product is a mixed case.
    IsMixedCase,
    /// Detail page URL.
    SourceUrl,
}

impl Field {
    /// All fields in dataset column order.
    pub const ALL: &[Self] = &[
        Self::Name,
        Self::Category,
        Self::WineType,
        Self::Price,
        Self::BottleSizeCl,
        Self::AbvPercent,
        Self::VintageYear,
        Self::Country,
        Self::Rating,
        Self::ReviewCount,
        Self::IsMixedCase,
        Self::SourceUrl,
    ];

    /// Fields describing a single bottle. Not applicable to mixed cases.
    #[must_use]
    pub const fn is_per_bottle(self) -> bool {
        matches!(self, Self::BottleSizeCl | Self::AbvPercent | Self::VintageYear)
    }
}

/// One product extracted from a detail page.
///
/// `category` and `source_url` come from the [`CatalogEntry`] and are always
/// set. Every other attribute is independently optional: a retailer leaving
/// one out never prevents the others from being captured.
///
/// Field order here is the column order of the dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Product name, whitespace-normalised.
    pub name: String,
    /// Category from the catalog entry.
    pub category: String,
    /// Style printed on the detail page, falling back to `category`.
    pub wine_type: Option<String>,
    /// Listed price.
    pub price: Option<Price>,
    /// Bottle size normalised to centilitres.
    pub bottle_size_cl: Option<f64>,
    /// Alcohol by volume, percent.
    pub abv_percent: Option<f64>,
    /// Vintage. Kept as text since not every listing prints a parseable
    /// year (e.g. `"NV"`).
    pub vintage_year: Option<String>,
    /// Country of origin.
    pub country: Option<String>,
    /// Average customer rating.
    pub rating: Option<f64>,
    /// Number of customer reviews.
    pub review_count: Option<u32>,
    /// `true` for multi-bottle assortments.
    pub is_mixed_case: bool,
    /// Detail page URL from the catalog entry.
    pub source_url: String,
}

impl ProductRecord {
    /// Creates a record for `entry` with only the mandatory fields set.
    #[must_use]
    pub fn new(name: impl Into<String>, entry: &CatalogEntry) -> Self {
        Self {
            name: name.into(),
            category: entry.category.clone(),
            wine_type: None,
            price: None,
            bottle_size_cl: None,
            abv_percent: None,
            vintage_year: None,
            country: None,
            rating: None,
            review_count: None,
            is_mixed_case: false,
            source_url: entry.detail_url.clone(),
        }
    }

    /// Whether `field` holds a value on this record.
    #[must_use]
    pub const fn has(&self, field: Field) -> bool {
        match field {
            Field::Name | Field::Category | Field::IsMixedCase | Field::SourceUrl => true,
            Field::WineType => self.wine_type.is_some(),
            Field::Price => self.price.is_some(),
            Field::BottleSizeCl => self.bottle_size_cl.is_some(),
            Field::AbvPercent => self.abv_percent.is_some(),
            Field::VintageYear => self.vintage_year.is_some(),
            Field::Country => self.country.is_some(),
            Field::Rating => self.rating.is_some(),
            Field::ReviewCount => self.review_count.is_some(),
        }
    }
}

/// Ordered product records, one per successfully assembled detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<ProductRecord>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: ProductRecord) {
        self.records.push(record);
    }

    /// Number of records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records in processing order.
    pub fn iter(&self) -> std::slice::Iter<'_, ProductRecord> {
        self.records.iter()
    }
}

impl IntoIterator for Dataset {
    type Item = ProductRecord;
    type IntoIter = std::vec::IntoIter<ProductRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
