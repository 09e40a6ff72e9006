//! HTTP-backed browsing session.
//!
//! [`StaticSession`] implements [`BrowsingSession`] on top of a
//! [`DocumentFetch`]: navigation fetches the page, lookups run CSS selectors
//! against the fetched HTML, and activating an element follows its `href`.
//! That covers listings whose "next page" control is an ordinary link and
//! listings paged through a URL parameter. Controls driven by script (a
//! `<button>` with no link target) report [`SessionError::NotInteractable`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::fetch::DocumentFetch;
use crate::session::{
    BrowsingSession, ElementHandle, SessionError, SessionFactory, WaitCondition,
};

/// Snapshot of an element found on the current page.
#[derive(Debug)]
struct FoundElement {
    /// Navigation counter at the time the element was found.
    page: u64,
    attributes: BTreeMap<String, String>,
    /// Outer HTML, for lookups inside the element.
    html: String,
}

/// Attributes and outer HTML of a matched element.
type Snapshot = (BTreeMap<String, String>, String);

fn snapshot(element: ElementRef<'_>) -> Snapshot {
    let attributes = element
        .value()
        .attrs()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect();
    (attributes, element.html())
}

/// [`BrowsingSession`] over plain HTTP fetches.
pub struct StaticSession {
    fetcher: Arc<dyn DocumentFetch>,
    current_url: Option<String>,
    body: String,
    /// Bumped on every navigation; handles from older pages are stale.
    page: u64,
    found: Vec<FoundElement>,
}

impl StaticSession {
    /// Creates a session with no page loaded.
    #[must_use]
    pub fn new(fetcher: Arc<dyn DocumentFetch>) -> Self {
        Self {
            fetcher,
            current_url: None,
            body: String::new(),
            page: 0,
            found: Vec::new(),
        }
    }

    fn parse_selector(selector: &str) -> Result<Selector, SessionError> {
        Selector::parse(selector).map_err(|_| SessionError::InvalidSelector(selector.to_owned()))
    }

    /// Runs `selector` against the current page, returning snapshots of at
    /// most `limit` matches.
    fn query(
        &self,
        selector: &str,
        limit: usize,
    ) -> Result<Vec<Snapshot>, SessionError> {
        let selector = Self::parse_selector(selector)?;
        let document = Html::parse_document(&self.body);
        Ok(document.select(&selector).take(limit).map(snapshot).collect())
    }

    fn register(&mut self, (attributes, html): Snapshot) -> ElementHandle {
        self.found.push(FoundElement {
            page: self.page,
            attributes,
            html,
        });
        ElementHandle::new(self.found.len() as u64 - 1)
    }

    fn lookup(&self, element: ElementHandle) -> Result<&FoundElement, SessionError> {
        usize::try_from(element.id())
            .ok()
            .and_then(|idx| self.found.get(idx))
            .filter(|found| found.page == self.page)
            .ok_or(SessionError::StaleElement(element))
    }

    /// Resolves `href` against the current page URL.
    fn resolve(&self, href: &str) -> Option<String> {
        let base = reqwest::Url::parse(self.current_url.as_deref()?).ok()?;
        base.join(href).ok().map(String::from)
    }
}

/// Whether the attributes describe a disabled control.
fn is_disabled(attributes: &BTreeMap<String, String>) -> bool {
    attributes.contains_key("disabled")
        || attributes
            .get("aria-disabled")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
        || attributes
            .get("class")
            .is_some_and(|class| class.split_whitespace().any(|c| c == "disabled"))
}

/// The followable link target, ignoring placeholders such as `#` and
/// `javascript:` pseudo-URLs.
fn link_target(attributes: &BTreeMap<String, String>) -> Option<&str> {
    attributes
        .get("href")
        .map(|href| href.trim())
        .filter(|href| {
            !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:")
        })
}

#[async_trait]
impl BrowsingSession for StaticSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let body = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| SessionError::Navigation {
                url: url.to_owned(),
                message: e.to_string(),
            })?;

        self.page += 1;
        self.found.clear();
        self.body = body;
        self.current_url = Some(url.to_owned());
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    async fn find(&mut self, selector: &str) -> Result<Option<ElementHandle>, SessionError> {
        let first = self.query(selector, 1)?.into_iter().next();
        Ok(first.map(|found| self.register(found)))
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError> {
        let matches = self.query(selector, usize::MAX)?;
        Ok(matches.into_iter().map(|found| self.register(found)).collect())
    }

    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, SessionError> {
        let selector = Self::parse_selector(selector)?;
        let fragment = Html::parse_fragment(&self.lookup(parent)?.html);
        let first = fragment.select(&selector).next().map(snapshot);
        Ok(first.map(|found| self.register(found)))
    }

    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let found = self.lookup(element)?;
        let value = found.attributes.get(name).map(|v| v.trim().to_owned());

        // Browsers report link targets as absolute URLs.
        if name == "href" {
            return Ok(value.and_then(|href| self.resolve(&href)));
        }
        Ok(value)
    }

    async fn is_interactable(&mut self, element: ElementHandle) -> Result<bool, SessionError> {
        let found = self.lookup(element)?;
        Ok(!is_disabled(&found.attributes) && link_target(&found.attributes).is_some())
    }

    async fn activate(&mut self, element: ElementHandle) -> Result<(), SessionError> {
        let found = self.lookup(element)?;
        if is_disabled(&found.attributes) {
            return Err(SessionError::NotInteractable("control is disabled".to_owned()));
        }

        let target = link_target(&found.attributes)
            .and_then(|href| self.resolve(href))
            .ok_or_else(|| {
                SessionError::NotInteractable(
                    "control has no link target; it needs a script-capable session".to_owned(),
                )
            })?;

        self.navigate(&target).await
    }

    async fn scroll(
        &mut self,
        _element: Option<ElementHandle>,
        _amount: u32,
    ) -> Result<(), SessionError> {
        // A fetched document is already complete; nothing loads on scroll.
        Ok(())
    }

    async fn wait_until(
        &mut self,
        condition: &WaitCondition,
        _timeout: Duration,
        _poll_interval: Duration,
    ) -> Result<(), SessionError> {
        // The document never changes after the fetch, so polling cannot help.
        let holds = match condition {
            WaitCondition::ElementPresent(selector) => !self.query(selector, 1)?.is_empty(),
            WaitCondition::ElementAbsent(selector) => self.query(selector, 1)?.is_empty(),
        };
        if holds {
            Ok(())
        } else {
            Err(SessionError::Timeout {
                condition: condition.to_string(),
                waited: Duration::ZERO,
            })
        }
    }
}

/// Opens [`StaticSession`]s sharing one fetcher.
pub struct StaticSessionFactory {
    fetcher: Arc<dyn DocumentFetch>,
}

impl StaticSessionFactory {
    /// Creates a factory whose sessions fetch through `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn DocumentFetch>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SessionFactory for StaticSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>, SessionError> {
        Ok(Box::new(StaticSession::new(Arc::clone(&self.fetcher))))
    }
}
