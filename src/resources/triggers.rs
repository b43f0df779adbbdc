//! End-of-resource detection.
//!
//! A trigger inspects one site of a response (headers or decoded body)
//! and votes keep/drop per response. The resolver fuses the votes of
//! all triggers of a batch into the strictest bitmap; the collector
//! uses it to compress the batch and decide whether to advance the URL
//! axis.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use tracing::debug;

/// Which part of the response a trigger inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSite {
    Content,
    Headers,
}

/// Borrowed view of one completed response.
pub struct ResponseView<'a> {
    pub url: &'a str,
    pub status: u16,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Termination predicate. `true` means *keep* the response.
pub trait EorTrigger: Send + Sync {
    fn search_site(&self) -> SearchSite;
    fn is_end_of_resource(&self, response: &ResponseView<'_>) -> bool;
}

/// Drops everything after the first `max_rounds` inspected responses.
pub struct SimpleEorTrigger {
    max_rounds: usize,
    calls: AtomicUsize,
}

impl SimpleEorTrigger {
    pub fn new(max_rounds: usize) -> Self {
        Self {
            max_rounds,
            calls: AtomicUsize::new(0),
        }
    }
}

impl EorTrigger for SimpleEorTrigger {
    fn search_site(&self) -> SearchSite {
        SearchSite::Content
    }

    fn is_end_of_resource(&self, _response: &ResponseView<'_>) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed) < self.max_rounds
    }
}

/// Drops a response once its "current page" field exceeds its
/// "maximum page" field, both read from the configured site.
pub struct MaxPageEorTrigger {
    current_field: String,
    max_field: String,
    site: SearchSite,
}

impl MaxPageEorTrigger {
    pub fn new(current_field: &str, max_field: &str, site: SearchSite) -> Self {
        Self {
            current_field: current_field.to_string(),
            max_field: max_field.to_string(),
            site,
        }
    }

    fn read_field(&self, response: &ResponseView<'_>, field: &str) -> Option<f64> {
        match self.site {
            SearchSite::Headers => response
                .headers
                .get(field)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            SearchSite::Content => serde_json::from_slice::<serde_json::Value>(response.body)
                .ok()
                .and_then(|v| v.get(field).and_then(|f| f.as_f64())),
        }
    }
}

impl EorTrigger for MaxPageEorTrigger {
    fn search_site(&self) -> SearchSite {
        self.site
    }

    fn is_end_of_resource(&self, response: &ResponseView<'_>) -> bool {
        match (
            self.read_field(response, &self.current_field),
            self.read_field(response, &self.max_field),
        ) {
            (Some(current), Some(max)) => current <= max,
            // Fields absent: nothing to conclude, keep the response.
            _ => true,
        }
    }
}

/// Drops responses carrying the configured status code.
pub struct StatusEorTrigger {
    status: u16,
}

impl StatusEorTrigger {
    pub fn new(status: u16) -> Self {
        Self { status }
    }
}

impl EorTrigger for StatusEorTrigger {
    fn search_site(&self) -> SearchSite {
        SearchSite::Headers
    }

    fn is_end_of_resource(&self, response: &ResponseView<'_>) -> bool {
        response.status != self.status
    }
}

/// Drops responses whose `Content-Length` (or body length when the
/// header is absent) is at or below the threshold.
pub struct ContentLengthEorTrigger {
    min_length: u64,
}

impl ContentLengthEorTrigger {
    pub fn new(min_length: u64) -> Self {
        Self { min_length }
    }
}

impl EorTrigger for ContentLengthEorTrigger {
    fn search_site(&self) -> SearchSite {
        SearchSite::Headers
    }

    fn is_end_of_resource(&self, response: &ResponseView<'_>) -> bool {
        let length = response
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(response.body.len() as u64);
        length > self.min_length
    }
}

/// Outcome of resolving a batch against all triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EorSignal {
    /// Per-response keep bits, strictest trigger's view.
    pub keep: Vec<bool>,
    /// True once at least one response was dropped.
    pub end_of_resource: bool,
}

/// Fuses per-trigger bitmaps into the strictest sequence.
pub struct EorResolver {
    triggers: Vec<Arc<dyn EorTrigger>>,
}

impl EorResolver {
    pub fn new(triggers: Vec<Arc<dyn EorTrigger>>) -> Self {
        Self { triggers }
    }

    /// Bitmap with the smallest kept-count among all triggers; with no
    /// triggers configured every response is kept.
    pub fn resolve(&self, batch: &[ResponseView<'_>]) -> EorSignal {
        if self.triggers.is_empty() {
            return EorSignal {
                keep: vec![true; batch.len()],
                end_of_resource: false,
            };
        }
        let bitmaps: Vec<Vec<bool>> = self
            .triggers
            .iter()
            .map(|t| batch.iter().map(|r| t.is_end_of_resource(r)).collect())
            .collect();
        let strictest = bitmaps
            .into_iter()
            .min_by_key(|bits: &Vec<bool>| bits.iter().filter(|b| **b).count())
            .expect("at least one trigger present");
        let end_of_resource = !strictest.iter().all(|b| *b);
        if end_of_resource {
            debug!(kept = strictest.iter().filter(|b| **b).count(), total = batch.len(), "end of resource detected");
        }
        EorSignal {
            keep: strictest,
            end_of_resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn view<'a>(status: u16, headers: &'a HeaderMap, body: &'a [u8]) -> ResponseView<'a> {
        ResponseView {
            url: "https://api.example/list",
            status,
            headers,
            body,
        }
    }

    #[test]
    fn status_trigger_drops_matching_code() {
        let headers = HeaderMap::new();
        let trigger = StatusEorTrigger::new(204);
        assert!(trigger.is_end_of_resource(&view(200, &headers, b"{}")));
        assert!(!trigger.is_end_of_resource(&view(204, &headers, b"")));
    }

    #[test]
    fn simple_trigger_counts_rounds() {
        let headers = HeaderMap::new();
        let trigger = SimpleEorTrigger::new(2);
        let v = view(200, &headers, b"{}");
        assert!(trigger.is_end_of_resource(&v));
        assert!(trigger.is_end_of_resource(&v));
        assert!(!trigger.is_end_of_resource(&v));
    }

    #[test]
    fn content_length_trigger_uses_header_then_body() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("2"));
        let trigger = ContentLengthEorTrigger::new(2);
        assert!(!trigger.is_end_of_resource(&view(200, &headers, b"ignored")));
        let bare = HeaderMap::new();
        assert!(trigger.is_end_of_resource(&view(200, &bare, b"abcdef")));
    }

    #[test]
    fn max_page_trigger_reads_json_body() {
        let headers = HeaderMap::new();
        let trigger = MaxPageEorTrigger::new("page", "pages", SearchSite::Content);
        assert!(trigger.is_end_of_resource(&view(200, &headers, br#"{"page":3,"pages":10}"#)));
        assert!(!trigger.is_end_of_resource(&view(200, &headers, br#"{"page":11,"pages":10}"#)));
        assert!(trigger.is_end_of_resource(&view(200, &headers, b"not json")));
    }

    #[test]
    fn resolver_picks_the_strictest_bitmap() {
        let headers = HeaderMap::new();
        let lenient = Arc::new(StatusEorTrigger::new(418));
        let strict = Arc::new(SimpleEorTrigger::new(1));
        let resolver = EorResolver::new(vec![lenient, strict]);
        let bodies = [b"{}".as_slice(), b"{}".as_slice(), b"{}".as_slice()];
        let batch: Vec<ResponseView> = bodies.iter().map(|b| view(200, &headers, b)).collect();
        let signal = resolver.resolve(&batch);
        assert_eq!(signal.keep, vec![true, false, false]);
        assert!(signal.end_of_resource);
        assert_eq!(signal.keep.iter().filter(|b| **b).count(), 1);
    }

    #[test]
    fn no_triggers_keep_everything() {
        let headers = HeaderMap::new();
        let resolver = EorResolver::new(vec![]);
        let batch = vec![view(204, &headers, b"")];
        let signal = resolver.resolve(&batch);
        assert_eq!(signal.keep, vec![true]);
        assert!(!signal.end_of_resource);
    }
}
