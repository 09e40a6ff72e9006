//! Listing pagination.
//!
//! Retailers expose their category listings through one of three UI idioms
//! (see [`PaginationIdiom`]). [`discover`] drives a [`BrowsingSession`]
//! through whichever idiom the listing uses and yields every product detail
//! URL in page order.
//!
//! Running out of pages is never an error: a missing, disabled or unusable
//! "next"/"show more" control ends the listing quietly. Session faults are
//! reported, including a later page that never renders its products.

use std::collections::HashSet;
use std::time::Duration;

use async_stream::try_stream;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use wine_harvest_scraper::session::{BrowsingSession, SessionError, WaitCondition};

/// Default number of scroll steps before looking for a "show more" control.
const DEFAULT_SCROLL_STEPS: u32 = 10;

/// How a category listing exposes its pages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaginationIdiom {
    /// Discrete pages linked by a "next" control.
    NumberedPages,
    /// One growing page extended by a "show more" control.
    ShowMore,
    /// Pages addressed by a number in the URL query.
    PageParam,
}

/// Query parameter carrying the page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParam {
    /// Parameter name, e.g. `page`.
    pub param: String,
    /// Number of the first page.
    #[serde(default = "default_first_page")]
    pub start: u32,
}

const fn default_first_page() -> u32 {
    1
}

/// Selectors and settings describing one retailer's listing pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Selector matching product links on a listing page, or inside each
    /// product tile when `product_tile` is set.
    pub product_link: String,
    /// Selector of one product's tile. Only the first link in each tile is
    /// read, leaving out review and fragment links.
    #[serde(default)]
    pub product_tile: Option<String>,
    /// Attribute of a product link holding the detail URL.
    #[serde(default = "default_link_attribute")]
    pub link_attribute: String,
    /// Selector of the "next page" control.
    #[serde(default)]
    pub next_control: Option<String>,
    /// Selector of the "show more" control.
    #[serde(default)]
    pub show_more_control: Option<String>,
    /// Selector of the cookie-consent accept button.
    #[serde(default)]
    pub consent_button: Option<String>,
    /// Page number query parameter, for listings paged through the URL.
    #[serde(default)]
    pub page_param: Option<PageParam>,
    /// Forces an idiom instead of detecting one from the page.
    #[serde(default)]
    pub idiom: Option<PaginationIdiom>,
    /// Scroll steps performed before each "show more" activation.
    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: u32,
}

fn default_link_attribute() -> String {
    "href".to_owned()
}

const fn default_scroll_steps() -> u32 {
    DEFAULT_SCROLL_STEPS
}

impl ListingConfig {
    /// Creates a listing whose product links match `product_link`.
    #[must_use]
    pub fn new(product_link: &str) -> Self {
        Self {
            product_link: product_link.to_owned(),
            product_tile: None,
            link_attribute: default_link_attribute(),
            next_control: None,
            show_more_control: None,
            consent_button: None,
            page_param: None,
            idiom: None,
            scroll_steps: DEFAULT_SCROLL_STEPS,
        }
    }

    /// Reads one link per tile matching `selector`.
    #[must_use]
    pub fn with_product_tile(mut self, selector: &str) -> Self {
        self.product_tile = Some(selector.to_owned());
        self
    }

    /// Sets the "next page" control selector.
    #[must_use]
    pub fn with_next_control(mut self, selector: &str) -> Self {
        self.next_control = Some(selector.to_owned());
        self
    }

    /// Sets the "show more" control selector.
    #[must_use]
    pub fn with_show_more_control(mut self, selector: &str) -> Self {
        self.show_more_control = Some(selector.to_owned());
        self
    }

    /// Sets the consent button selector.
    #[must_use]
    pub fn with_consent_button(mut self, selector: &str) -> Self {
        self.consent_button = Some(selector.to_owned());
        self
    }

    /// Pages through the `param` query parameter starting at `start`.
    #[must_use]
    pub fn with_page_param(mut self, param: &str, start: u32) -> Self {
        self.page_param = Some(PageParam {
            param: param.to_owned(),
            start,
        });
        self
    }

    /// Forces `idiom`.
    #[must_use]
    pub const fn with_idiom(mut self, idiom: PaginationIdiom) -> Self {
        self.idiom = Some(idiom);
        self
    }

    /// Checks that a forced idiom has the control it relies on.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::Config`] if the product link selector is
    /// empty or a forced idiom lacks its control.
    pub fn validate(&self) -> Result<(), PaginationError> {
        if self.product_link.trim().is_empty() {
            return Err(PaginationError::Config(
                "product_link selector is empty".to_owned(),
            ));
        }
        match self.idiom {
            Some(PaginationIdiom::ShowMore) if self.show_more_control.is_none() => Err(
                PaginationError::Config("show_more idiom needs show_more_control".to_owned()),
            ),
            Some(PaginationIdiom::PageParam) if self.page_param.is_none() => Err(
                PaginationError::Config("page_param idiom needs page_param".to_owned()),
            ),
            _ => Ok(()),
        }
    }

    /// Selector whose presence means products have rendered.
    fn rendered_marker(&self) -> &str {
        self.product_tile.as_deref().unwrap_or(&self.product_link)
    }

    /// Idiom known without looking at a page, if any.
    const fn preset_idiom(&self) -> Option<PaginationIdiom> {
        match (self.idiom, &self.page_param) {
            (Some(idiom), _) => Some(idiom),
            (None, Some(_)) => Some(PaginationIdiom::PageParam),
            (None, None) => None,
        }
    }
}

/// Traversal pacing and limits.
#[derive(Debug, Clone)]
pub struct PaginationOptions {
    /// Longest wait for product links to appear on a page.
    pub page_timeout: Duration,
    /// Interval between checks while waiting.
    pub poll_interval: Duration,
    /// Pause before requesting each further page.
    pub page_delay: Duration,
    /// Hard cap on pages read per listing.
    pub max_pages: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            page_delay: Duration::ZERO,
            max_pages: 500,
        }
    }
}

/// Pagination failures. Running out of pages is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// The listing configuration cannot drive any idiom.
    #[error("invalid listing configuration: {0}")]
    Config(String),

    /// The category entry point could not be loaded.
    #[error("listing entry point {url} could not be loaded: {source}")]
    EntryPoint {
        /// Entry point URL.
        url: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },

    /// A page after the first never showed its product links.
    #[error("page {page} of {url} did not load: {source}")]
    PageTimeout {
        /// 1-based page number.
        page: u32,
        /// Listing entry point.
        url: String,
        /// The timed-out wait.
        #[source]
        source: SessionError,
    },

    /// The session failed mid-traversal.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Lazily yields every product detail URL of the listing at `entry_point`.
///
/// The stream is finite and not restartable. URLs come out in page order,
/// each at most once.
pub fn discover<'a>(
    session: &'a mut dyn BrowsingSession,
    listing: &'a ListingConfig,
    entry_point: &'a str,
    options: &'a PaginationOptions,
) -> BoxStream<'a, Result<String, PaginationError>> {
    Box::pin(try_stream! {
        let mut cursor = PageCursor::open(session, listing, entry_point, options).await?;
        while let Some(links) = cursor.next_page().await? {
            for link in links {
                yield link;
            }
        }
    })
}

/// Picks the idiom for the page currently loaded in `session`.
///
/// A forced idiom wins, then a configured page parameter, then a visible
/// "show more" control. Anything else is treated as numbered pages, which
/// degrades to a single page when there is no "next" control.
///
/// # Errors
///
/// Returns [`PaginationError`] if the configuration is invalid or the session
/// fails while looking for controls.
pub async fn detect_idiom(
    session: &mut dyn BrowsingSession,
    listing: &ListingConfig,
) -> Result<PaginationIdiom, PaginationError> {
    listing.validate()?;

    if let Some(idiom) = listing.preset_idiom() {
        return Ok(idiom);
    }

    if let Some(selector) = &listing.show_more_control
        && session.find(selector).await?.is_some()
    {
        return Ok(PaginationIdiom::ShowMore);
    }

    Ok(PaginationIdiom::NumberedPages)
}

/// Accepts the cookie-consent banner if one is configured and displayed.
///
/// Returns whether a banner was dismissed. A missing or hidden banner is
/// normal.
///
/// # Errors
///
/// Returns [`PaginationError::Session`] on a session fault.
pub async fn dismiss_consent(
    session: &mut dyn BrowsingSession,
    listing: &ListingConfig,
) -> Result<bool, PaginationError> {
    let Some(selector) = &listing.consent_button else {
        return Ok(false);
    };

    let Some(button) = session.find(selector).await? else {
        log::debug!("No consent banner ({selector})");
        return Ok(false);
    };

    if !session.is_interactable(button).await? {
        log::debug!("Consent banner present but not displayed ({selector})");
        return Ok(false);
    }

    match session.activate(button).await {
        Ok(()) => {
            log::debug!("Dismissed consent banner");
            Ok(true)
        }
        Err(e) if e.is_control_unusable() => {
            log::debug!("Consent banner could not be dismissed: {e}");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Builds the URL of page `page` by setting `param` on `entry_point`.
///
/// # Errors
///
/// Returns [`PaginationError::Config`] if `entry_point` is not a valid URL.
pub fn page_url(entry_point: &str, param: &str, page: u32) -> Result<String, PaginationError> {
    let mut url = reqwest::Url::parse(entry_point)
        .map_err(|e| PaginationError::Config(format!("invalid entry point {entry_point}: {e}")))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, &page.to_string());

    Ok(url.into())
}

/// Resolves a possibly relative link against the page it was found on.
fn absolutize(base: Option<&str>, link: &str) -> String {
    base.and_then(|base| reqwest::Url::parse(base).ok())
        .and_then(|base| base.join(link).ok())
        .map_or_else(|| link.to_owned(), String::from)
}

/// Page-at-a-time traversal state for one listing.
struct PageCursor<'a> {
    session: &'a mut dyn BrowsingSession,
    listing: &'a ListingConfig,
    options: &'a PaginationOptions,
    entry_point: &'a str,
    idiom: PaginationIdiom,
    pages_read: u32,
    page_number: u32,
    finished: bool,
    seen: HashSet<String>,
    last_first_link: Option<String>,
}

impl<'a> PageCursor<'a> {
    /// Loads the first page, dismisses any consent banner and picks the
    /// idiom.
    async fn open(
        session: &'a mut dyn BrowsingSession,
        listing: &'a ListingConfig,
        entry_point: &'a str,
        options: &'a PaginationOptions,
    ) -> Result<Self, PaginationError> {
        listing.validate()?;

        let (first_url, page_number) = match (listing.preset_idiom(), &listing.page_param) {
            (Some(PaginationIdiom::PageParam), Some(page)) => (
                page_url(entry_point, &page.param, page.start)?,
                page.start,
            ),
            _ => (entry_point.to_owned(), 0),
        };

        session
            .navigate(&first_url)
            .await
            .map_err(|source| PaginationError::EntryPoint {
                url: first_url.clone(),
                source,
            })?;

        dismiss_consent(session, listing).await?;
        let idiom = detect_idiom(session, listing).await?;
        log::debug!("Listing {entry_point} uses {idiom} pagination");

        Ok(Self {
            session,
            listing,
            options,
            entry_point,
            idiom,
            pages_read: 0,
            page_number,
            finished: false,
            seen: HashSet::new(),
            last_first_link: None,
        })
    }

    /// Links first seen on the next page, or `None` once the listing is
    /// exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<String>>, PaginationError> {
        if self.finished {
            return Ok(None);
        }

        if self.pages_read >= self.options.max_pages {
            log::warn!(
                "Stopping {} after {} pages (max_pages reached)",
                self.entry_point,
                self.pages_read
            );
            self.finished = true;
            return Ok(None);
        }

        if self.pages_read > 0 && !self.advance().await? {
            self.finished = true;
            return Ok(None);
        }

        self.wait_for_links().await?;
        let links = self.read_links().await?;
        self.pages_read += 1;

        if links.is_empty() {
            if self.pages_read == 1 {
                log::debug!("No product links on the first page of {}", self.entry_point);
            } else {
                log::debug!("Page {} of {} is empty", self.pages_read, self.entry_point);
            }
            self.finished = true;
            return Ok(None);
        }

        if self.idiom != PaginationIdiom::ShowMore {
            if self.last_first_link.as_deref() == links.first().map(String::as_str) {
                log::warn!(
                    "Page {} of {} repeats the previous page; stopping",
                    self.pages_read,
                    self.entry_point
                );
                self.finished = true;
                return Ok(None);
            }
            self.last_first_link = links.first().cloned();
        }

        let fresh: Vec<String> = links
            .into_iter()
            .filter(|link| self.seen.insert(link.clone()))
            .collect();

        if fresh.is_empty() {
            if self.idiom == PaginationIdiom::ShowMore {
                log::debug!("Expansion of {} added no products", self.entry_point);
            } else {
                log::warn!(
                    "Page {} of {} only repeats earlier products; stopping",
                    self.pages_read,
                    self.entry_point
                );
            }
            self.finished = true;
            return Ok(None);
        }

        Ok(Some(fresh))
    }

    /// Moves to the next page. Returns `false` when there is none.
    async fn advance(&mut self) -> Result<bool, PaginationError> {
        if !self.options.page_delay.is_zero() {
            tokio::time::sleep(self.options.page_delay).await;
        }

        match self.idiom {
            PaginationIdiom::NumberedPages => {
                let listing = self.listing;
                let Some(selector) = &listing.next_control else {
                    return Ok(false);
                };
                self.activate_control(selector).await
            }
            PaginationIdiom::ShowMore => {
                let listing = self.listing;
                let Some(selector) = &listing.show_more_control else {
                    return Ok(false);
                };
                self.session.scroll(None, listing.scroll_steps).await?;
                self.activate_control(selector).await
            }
            PaginationIdiom::PageParam => {
                let Some(page) = &self.listing.page_param else {
                    return Ok(false);
                };
                self.page_number += 1;
                let url = page_url(self.entry_point, &page.param, self.page_number)?;
                self.session.navigate(&url).await?;
                Ok(true)
            }
        }
    }

    /// Activates the control matching `selector` if it is present and usable.
    async fn activate_control(&mut self, selector: &str) -> Result<bool, PaginationError> {
        let Some(control) = self.session.find(selector).await? else {
            log::debug!("No '{selector}' control; end of {}", self.entry_point);
            return Ok(false);
        };

        if !self.session.is_interactable(control).await? {
            log::debug!("'{selector}' control is disabled; end of {}", self.entry_point);
            return Ok(false);
        }

        match self.session.activate(control).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_control_unusable() => {
                log::info!("'{selector}' control could not be activated ({e}); end of listing");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Waits for product links to render.
    ///
    /// A timeout on the first page, or on any page of a page-parameter
    /// listing, is read as-is so an empty page ends the listing. Anywhere else
    /// the listing is known to continue, so the timeout is a fault.
    async fn wait_for_links(&mut self) -> Result<(), PaginationError> {
        let condition = WaitCondition::ElementPresent(self.listing.rendered_marker().to_owned());
        match self
            .session
            .wait_until(
                &condition,
                self.options.page_timeout,
                self.options.poll_interval,
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e @ SessionError::Timeout { .. })
                if self.pages_read == 0 || self.idiom == PaginationIdiom::PageParam =>
            {
                log::debug!("{e}");
                Ok(())
            }
            Err(source @ SessionError::Timeout { .. }) => Err(PaginationError::PageTimeout {
                page: self.pages_read + 1,
                url: self.entry_point.to_owned(),
                source,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Every product link on the current page, absolute, in page order.
    async fn read_links(&mut self) -> Result<Vec<String>, PaginationError> {
        let listing = self.listing;
        let handles = match &listing.product_tile {
            Some(tile_selector) => {
                let tiles = self.session.find_all(tile_selector).await?;
                let mut firsts = Vec::with_capacity(tiles.len());
                for tile in tiles {
                    if let Some(link) = self
                        .session
                        .find_within(tile, &listing.product_link)
                        .await?
                    {
                        firsts.push(link);
                    }
                }
                firsts
            }
            None => self.session.find_all(&listing.product_link).await?,
        };
        let mut links = Vec::with_capacity(handles.len());

        for handle in handles {
            let Some(raw) = self
                .session
                .attribute(handle, &self.listing.link_attribute)
                .await?
            else {
                continue;
            };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            links.push(absolutize(self.session.current_url(), raw));
        }

        Ok(links)
    }
}
