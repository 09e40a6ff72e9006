#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the wine harvest binary.
//!
//! [`init_logger`] routes `log` output through an `indicatif`
//! [`MultiProgress`] so log lines and progress bars share the terminal, and
//! [`IndicatifProgress`] renders the pipeline's [`ProgressCallback`]s.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use wine_harvest_scraper::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// A [`ProgressBar`] behind [`ProgressCallback`].
///
/// Bars start as spinners and switch to `counting` style the first time a
/// total is reported.
pub struct IndicatifProgress {
    bar: ProgressBar,
    counting: ProgressStyle,
}

impl IndicatifProgress {
    fn spinner(multi: &MultiProgress, message: &str, color: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template(&format!("{{spinner:.{color}}} {{msg}}"))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_owned());

        let counting = ProgressStyle::with_template(&format!(
            "  {{msg}} {{wide_bar:.{color}/dim}} {{pos}}/{{len}} {{percent}}% [{{eta}}]"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, counting })
    }

    /// Bar for category listings (phase 1). The message shows the category
    /// being paged through.
    #[must_use]
    pub fn categories_bar(multi: &MultiProgress, retailer: &str) -> Arc<dyn ProgressCallback> {
        Self::spinner(multi, &format!("[{retailer}] discovering products"), "green")
    }

    /// Bar for detail pages (phase 2). The message shows the last product
    /// assembled.
    #[must_use]
    pub fn detail_pages_bar(multi: &MultiProgress, retailer: &str) -> Arc<dyn ProgressCallback> {
        Self::spinner(multi, &format!("[{retailer}] extracting products"), "cyan")
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.counting.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs a `pretty_env_logger` logger behind `indicatif-log-bridge` and
/// returns the [`MultiProgress`] every progress bar must be added to.
///
/// The filter comes from `RUST_LOG`, or [`DEFAULT_LOG_FILTER`] when unset.
/// Installing twice (as in tests) keeps the first logger.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filter) if !filter.trim().is_empty() => builder.parse_filters(&filter),
        _ => builder.parse_filters(DEFAULT_LOG_FILTER),
    };
    let logger = builder.build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}
