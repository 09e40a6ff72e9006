//! Config-driven retailer definition.
//!
//! [`RetailerDefinition`] captures everything specific to one retailer in a
//! serializable struct, so a single generic crawler and extractor serve every
//! retailer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wine_harvest_crawl::{CategoryConfig, ListingConfig};
use wine_harvest_extract::{ConfiguredExtractors, ExtractionRules};

use crate::RetailerError;

/// A complete retailer definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerDefinition {
    /// Unique identifier, also used in artifact file names (e.g.
    /// `"decantalo"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Categories to crawl, in order.
    pub categories: Vec<CategoryConfig>,
    /// How listings paginate.
    pub listing: ListingConfig,
    /// How detail pages are read.
    pub extract: ExtractionRules,
    /// Request pacing.
    #[serde(default)]
    pub pacing: Pacing,
}

/// Delays and parallelism suited to a retailer. Command-line flags override
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Pause before each pagination step, in milliseconds.
    #[serde(default)]
    pub page_delay_ms: u64,
    /// Pause before each detail page request, in milliseconds.
    #[serde(default)]
    pub request_delay_ms: u64,
    /// Concurrent detail page workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

const fn default_workers() -> usize {
    4
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_delay_ms: 0,
            request_delay_ms: 0,
            workers: default_workers(),
        }
    }
}

impl Pacing {
    /// Page delay as a [`Duration`].
    #[must_use]
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Request delay as a [`Duration`].
    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl RetailerDefinition {
    /// Compiles the extraction rules.
    ///
    /// # Errors
    ///
    /// Returns [`RetailerError::Rules`] if a selector or pattern is invalid.
    pub fn extractors(&self) -> Result<ConfiguredExtractors, RetailerError> {
        ConfiguredExtractors::new(&self.extract).map_err(|source| RetailerError::Rules {
            id: self.id.clone(),
            source,
        })
    }

    /// Checks the whole definition without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`RetailerError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), RetailerError> {
        let invalid = |message: &str| RetailerError::Invalid {
            id: self.id.clone(),
            message: message.to_owned(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if self.categories.is_empty() {
            return Err(invalid("no categories"));
        }
        if let Some(category) = self
            .categories
            .iter()
            .find(|c| c.label.trim().is_empty() || c.url.trim().is_empty())
        {
            return Err(invalid(&format!(
                "category '{}' needs a label and a url",
                category.label
            )));
        }

        self.listing
            .validate()
            .map_err(|source| RetailerError::Listing {
                id: self.id.clone(),
                source,
            })?;
        self.extractors()?;

        Ok(())
    }
}

/// Parses and validates a TOML string into a [`RetailerDefinition`].
///
/// # Errors
///
/// Returns [`RetailerError`] if the TOML is malformed or the definition
/// fails [`RetailerDefinition::validate`].
pub fn parse_retailer_toml(toml_str: &str) -> Result<RetailerDefinition, RetailerError> {
    let retailer: RetailerDefinition = toml::de::from_str(toml_str)?;
    retailer.validate()?;
    Ok(retailer)
}

/// Loads a retailer definition from a TOML file.
///
/// # Errors
///
/// Returns [`RetailerError`] if the file cannot be read or is invalid.
pub fn load_retailer_file(path: &Path) -> Result<RetailerDefinition, RetailerError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| RetailerError::Io {
        path: path.to_owned(),
        source,
    })?;
    let retailer = parse_retailer_toml(&toml_str)?;
    log::debug!("Loaded retailer '{}' from {}", retailer.id, path.display());
    Ok(retailer)
}
