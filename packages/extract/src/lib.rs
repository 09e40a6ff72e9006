#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Phase 2 of a harvest: turning detail pages into product records.
//!
//! - [`units`]: number, price and bottle size parsing.
//! - [`mixed_case`]: recognizing assortment products by name.
//! - [`rules`]: declarative per-retailer field rules.
//! - [`extractors`]: the [`ExtractorSet`] contract and its rule-driven
//!   implementation.
//! - [`assembler`]: fetches detail pages and assembles records.
//! - [`dataset`]: CSV persistence of the result.

pub mod assembler;
pub mod dataset;
pub mod extractors;
pub mod mixed_case;
pub mod rules;
pub mod units;

pub use assembler::{
    AssembleError, EntryOutcome, RecordAssembler, RunSummary, assemble_document, pending_entries,
};
pub use dataset::{DatasetError, DatasetWriter, RecordSink, completed_entries, dataset_path};
pub use extractors::{ConfiguredExtractors, ExtractorSet};
pub use mixed_case::{MixedCaseRules, classify_mixed_case};
pub use rules::{ExtractionRules, FieldRule, FieldSpec, RuleError};
pub use units::UnrecognizedFormat;
