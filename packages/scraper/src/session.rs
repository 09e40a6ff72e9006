//! Interactive browsing session contract.
//!
//! Listing pages often need interaction (clicking "next", pressing "show
//! more", scrolling) before every product link is visible. Implementations
//! wrap a browser driver or, for link-driven listings, plain HTTP (see
//! [`crate::static_session`]).
//!
//! A selector that matches nothing is reported as `Ok(None)` / an empty
//! `Vec`, never as an error. Pagination relies on that to tell "no next
//! control" (end of listing) apart from a session fault.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Opaque reference to an element inside a session's current page.
///
/// Handles become stale once the session navigates away; using one after
/// that yields [`SessionError::StaleElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    /// Wraps a session-specific element id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The session-specific element id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Condition polled by [`BrowsingSession::wait_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one element matches the selector.
    ElementPresent(String),
    /// No element matches the selector.
    ElementAbsent(String),
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementPresent(selector) => write!(f, "'{selector}' to appear"),
            Self::ElementAbsent(selector) => write!(f, "'{selector}' to disappear"),
        }
    }
}

/// Failures reported by a [`BrowsingSession`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The selector is not valid for this session.
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    /// Loading a page failed.
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL.
        url: String,
        /// Driver or transport diagnostic.
        message: String,
    },

    /// The element exists but cannot be activated (hidden, disabled,
    /// covered, or not backed by an action this session can perform).
    #[error("element cannot be activated: {0}")]
    NotInteractable(String),

    /// The element handle no longer refers to the current page.
    #[error("stale element handle {0:?}")]
    StaleElement(ElementHandle),

    /// A wait condition did not hold before the timeout.
    #[error("timed out after {waited:?} waiting for {condition}")]
    Timeout {
        /// Description of the awaited condition.
        condition: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// Any other driver fault.
    #[error("browser session error: {0}")]
    Driver(String),
}

impl SessionError {
    /// Whether this error says something about the control rather than the
    /// session: the control exists but cannot be used. Pagination treats
    /// these as the end of a listing; everything else is a fault.
    #[must_use]
    pub const fn is_control_unusable(&self) -> bool {
        matches!(self, Self::NotInteractable(_) | Self::StaleElement(_))
    }
}

/// A stateful page-browsing session.
///
/// Sessions are strictly sequential: every method takes `&mut self`, so two
/// traversals can never drive the same session at once.
#[async_trait]
pub trait BrowsingSession: Send {
    /// Loads `url` and waits for the document to be ready.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Navigation`] if the page cannot be loaded.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// URL of the current page, if any page has been loaded.
    fn current_url(&self) -> Option<&str>;

    /// First element matching `selector`, or `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on an invalid selector or a driver fault.
    async fn find(&mut self, selector: &str) -> Result<Option<ElementHandle>, SessionError>;

    /// Every element matching `selector`; empty when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on an invalid selector or a driver fault.
    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError>;

    /// First element matching `selector` inside `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] for an outdated `parent`, or
    /// another variant on an invalid selector or a driver fault.
    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, SessionError>;

    /// Attribute `name` of `element` (for links, `href` should be absolute).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] for an outdated handle.
    async fn attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Whether `element` is displayed and enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] for an outdated handle.
    async fn is_interactable(&mut self, element: ElementHandle) -> Result<bool, SessionError>;

    /// Activates (clicks) `element`. Any navigation the activation triggers
    /// has settled by the time this returns.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInteractable`] if the element cannot be
    /// activated, or another variant on a driver fault.
    async fn activate(&mut self, element: ElementHandle) -> Result<(), SessionError>;

    /// Scrolls the page (or `element`, when given) down by `amount` steps.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on a driver fault.
    async fn scroll(
        &mut self,
        element: Option<ElementHandle>,
        amount: u32,
    ) -> Result<(), SessionError>;

    /// Polls `condition` every `poll_interval` until it holds or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] when the condition never held, or
    /// any error raised while polling.
    async fn wait_until(
        &mut self,
        condition: &WaitCondition,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), SessionError> {
        let started = tokio::time::Instant::now();

        loop {
            let holds = match condition {
                WaitCondition::ElementPresent(selector) => self.find(selector).await?.is_some(),
                WaitCondition::ElementAbsent(selector) => self.find(selector).await?.is_none(),
            };
            if holds {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(SessionError::Timeout {
                    condition: condition.to_string(),
                    waited,
                });
            }

            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }
}

/// Opens fresh, independent browsing sessions (one per category crawl).
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a new session with no page loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the browser or client cannot be started.
    async fn open(&self) -> Result<Box<dyn BrowsingSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Session whose target element shows up after a fixed number of polls.
    struct Appearing {
        polls_until_present: u32,
        polls: u32,
    }

    #[async_trait]
    impl BrowsingSession for Appearing {
        async fn navigate(&mut self, _url: &str) -> Result<(), SessionError> {
            Ok(())
        }

        fn current_url(&self) -> Option<&str> {
            None
        }

        async fn find(&mut self, _selector: &str) -> Result<Option<ElementHandle>, SessionError> {
            self.polls += 1;
            Ok((self.polls > self.polls_until_present).then_some(ElementHandle::new(1)))
        }

        async fn find_all(
            &mut self,
            selector: &str,
        ) -> Result<Vec<ElementHandle>, SessionError> {
            Ok(self.find(selector).await?.into_iter().collect())
        }

        async fn find_within(
            &mut self,
            _parent: ElementHandle,
            selector: &str,
        ) -> Result<Option<ElementHandle>, SessionError> {
            self.find(selector).await
        }

        async fn attribute(
            &mut self,
            _element: ElementHandle,
            _name: &str,
        ) -> Result<Option<String>, SessionError> {
            Ok(None)
        }

        async fn is_interactable(&mut self, _element: ElementHandle) -> Result<bool, SessionError> {
            Ok(true)
        }

        async fn activate(&mut self, _element: ElementHandle) -> Result<(), SessionError> {
            Ok(())
        }

        async fn scroll(
            &mut self,
            _element: Option<ElementHandle>,
            _amount: u32,
        ) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn wait_until_returns_once_element_appears() {
        let mut session = Appearing {
            polls_until_present: 3,
            polls: 0,
        };
        session
            .wait_until(
                &WaitCondition::ElementPresent("div.product".to_owned()),
                Duration::from_secs(1),
                Duration::from_millis(1),
            )
            .await
            .unwrap();
        assert_eq!(session.polls, 4);
    }

    #[tokio::test]
    async fn wait_until_times_out_instead_of_hanging() {
        let mut session = Appearing {
            polls_until_present: u32::MAX,
            polls: 0,
        };
        let err = session
            .wait_until(
                &WaitCondition::ElementPresent("div.product".to_owned()),
                Duration::from_millis(20),
                Duration::from_millis(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
        assert!(!err.is_control_unusable());
    }

    #[tokio::test]
    async fn wait_until_absent_holds_immediately() {
        let mut session = Appearing {
            polls_until_present: u32::MAX,
            polls: 0,
        };
        session
            .wait_until(
                &WaitCondition::ElementAbsent("div.spinner".to_owned()),
                Duration::from_millis(20),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
        assert_eq!(session.polls, 1);
    }

    #[test]
    fn unusable_control_classification() {
        assert!(SessionError::NotInteractable("hidden".to_owned()).is_control_unusable());
        assert!(SessionError::StaleElement(ElementHandle::new(3)).is_control_unusable());
        assert!(!SessionError::Driver("crashed".to_owned()).is_control_unusable());
    }
}
