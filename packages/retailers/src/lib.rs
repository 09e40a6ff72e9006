#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Retailer definitions.
//!
//! A retailer is pure configuration: its categories, how its listings
//! paginate, and the rules for reading its detail pages. The built-in
//! retailers are TOML files embedded at compile time ([`registry`]); more can
//! be loaded from disk with [`load_retailer_file`].

pub mod registry;
pub mod retailer_def;

use std::path::PathBuf;

use wine_harvest_crawl::PaginationError;
use wine_harvest_extract::RuleError;

pub use registry::{all_retailers, find_retailer, retailer_ids};
pub use retailer_def::{Pacing, RetailerDefinition, load_retailer_file, parse_retailer_toml};

/// Errors loading or validating a retailer definition.
#[derive(Debug, thiserror::Error)]
pub enum RetailerError {
    /// The TOML is malformed or does not match the definition schema.
    #[error("Invalid retailer TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A retailer file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The listing configuration is unusable.
    #[error("Retailer '{id}': {source}")]
    Listing {
        /// Retailer id.
        id: String,
        /// What is wrong.
        #[source]
        source: PaginationError,
    },

    /// An extraction rule does not compile.
    #[error("Retailer '{id}': {source}")]
    Rules {
        /// Retailer id.
        id: String,
        /// What is wrong.
        #[source]
        source: RuleError,
    },

    /// The definition is structurally incomplete.
    #[error("Retailer '{id}': {message}")]
    Invalid {
        /// Retailer id.
        id: String,
        /// What is missing.
        message: String,
    },

    /// No built-in retailer has this id.
    #[error("Unknown retailer '{id}' (available: {available})")]
    Unknown {
        /// Requested id.
        id: String,
        /// Comma-separated built-in ids.
        available: String,
    },
}
