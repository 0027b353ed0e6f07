//! Selectors and event envelopes carried by the bus.

use std::fmt;
use std::sync::Arc;

/// Routing key for events. Compared by exact value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector(Arc<str>);

impl Selector {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Selector of a request: the URI path, query string excluded.
    pub fn from_uri(uri: &hyper::Uri) -> Self {
        Self::new(uri.path())
    }

    /// Private reply channel for one request/reply exchange on `self`.
    pub(crate) fn reply_channel(&self, exchange_id: u64) -> Self {
        Self::new(format!("{}#reply-{exchange_id}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Selector {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

/// A published payload together with the selector it was published under.
#[derive(Debug, Clone)]
pub struct Event<T> {
    selector: Selector,
    reply_to: Option<Selector>,
    data: T,
}

impl<T> Event<T> {
    pub const fn new(selector: Selector, data: T) -> Self {
        Self {
            selector,
            reply_to: None,
            data,
        }
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: Selector) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    pub const fn reply_to(&self) -> Option<&Selector> {
        self.reply_to.as_ref()
    }

    pub const fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_from_uri_drops_query() {
        let uri: hyper::Uri = "/thumbnail?width=64".parse().unwrap();
        assert_eq!(Selector::from_uri(&uri), Selector::from("/thumbnail"));
    }

    #[test]
    fn test_selector_exact_match_only() {
        assert_ne!(Selector::from("/thumbnail"), Selector::from("/thumbnail/"));
        assert_ne!(Selector::from("/Thumbnail"), Selector::from("/thumbnail"));
    }

    #[test]
    fn test_reply_channels_are_distinct() {
        let selector = Selector::from("/thumbnail");
        let a = selector.reply_channel(1);
        let b = selector.reply_channel(2);
        assert_ne!(a, b);
        assert_ne!(a, selector);
        assert!(a.as_str().starts_with("/thumbnail#"));
    }

    #[test]
    fn test_event_reply_to() {
        let event = Event::new(Selector::from("/a"), 7);
        assert!(event.reply_to().is_none());
        let event = event.with_reply_to(Selector::from("/a#reply-1"));
        assert_eq!(event.reply_to().map(Selector::as_str), Some("/a#reply-1"));
        assert_eq!(event.into_data(), 7);
    }
}
