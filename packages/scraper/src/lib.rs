#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Document sources for retailer scraping.
//!
//! Everything the harvest pipeline needs from the outside world goes through
//! this crate:
//!
//! - [`fetch`]: one-shot retrieval of static HTML ([`fetch::DocumentFetch`]),
//!   with a `reqwest` implementation.
//! - [`document`]: parsed HTML with selector lookup and text extraction.
//! - [`session`]: the interactive browsing session contract used to drive
//!   listing pagination.
//! - [`static_session`]: a [`session::BrowsingSession`] backed by plain HTTP
//!   fetches, enough for listings whose pagination controls are links.
//! - [`progress`]: progress reporting decoupled from any renderer.

pub mod document;
pub mod fetch;
pub mod progress;
pub mod session;
pub mod static_session;

/// Errors raised while setting up scraping collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Building the HTTP client failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A CSS selector could not be parsed.
    #[error("invalid CSS selector '{selector}': {message}")]
    Selector {
        /// The offending selector text.
        selector: String,
        /// Parser diagnostic.
        message: String,
    },

    /// A configured HTTP header was rejected.
    #[error("invalid header '{0}'")]
    Header(String),
}
