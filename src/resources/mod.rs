//! Resource model: endpoint roots, their queries and the shared
//! collection quota.

pub mod batch;
pub mod endpoint;
pub mod request;
pub mod triggers;
pub mod url_stream;

pub use batch::{BatchCounter, MinBatch};
pub use endpoint::EndpointPath;
pub use request::{ApiRequest, QueryOptions};
pub use triggers::{
    ContentLengthEorTrigger, EorResolver, EorSignal, EorTrigger, MaxPageEorTrigger, ResponseView,
    SearchSite, SimpleEorTrigger, StatusEorTrigger,
};
pub use url_stream::{UrlPlan, UrlStream};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::contentio::{DataRecord, IoContext};
use crate::error::ConfigError;

/// Tunables applied through [`ApiResource::configure`].
#[derive(Default)]
pub struct ResourceConfig {
    pub extra_headers: Vec<(String, String)>,
    pub max_batch: Option<usize>,
    pub delay_secs: Option<f64>,
    pub request_timeout_secs: Option<u64>,
    pub eor_triggers: Vec<Arc<dyn EorTrigger>>,
    pub proxies: Vec<String>,
}

/// An HTTP endpoint root plus everything needed to crawl it: headers,
/// pacing, batch quota, termination triggers and named queries.
pub struct ApiResource<T: DataRecord> {
    url: String,
    extra_headers: Vec<(String, String)>,
    delay_secs: f64,
    request_timeout_secs: u64,
    max_batch: usize,
    eor_triggers: Vec<Arc<dyn EorTrigger>>,
    proxies: Vec<String>,
    endpoints: HashMap<String, EndpointPath>,
    queries: Vec<ApiRequest<T>>,
}

impl<T: DataRecord> std::fmt::Debug for ApiResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiResource")
            .field("url", &self.url)
            .field("extra_headers", &self.extra_headers)
            .field("delay_secs", &self.delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_batch", &self.max_batch)
            .field("eor_triggers", &self.eor_triggers.len())
            .field("proxies", &self.proxies)
            .field("queries", &self.queries)
            .finish()
    }
}

impl<T: DataRecord> ApiResource<T> {
    /// Define a resource rooted at `url`. The URL must parse; a
    /// trailing slash is dropped.
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            extra_headers: Vec::new(),
            delay_secs: 0.0,
            request_timeout_secs: 10,
            max_batch: 1,
            eor_triggers: Vec::new(),
            proxies: Vec::new(),
            endpoints: HashMap::new(),
            queries: Vec::new(),
        })
    }

    /// Apply the optional tunables in one go.
    pub fn configure(&mut self, config: ResourceConfig) -> Result<&mut Self, ConfigError> {
        if let Some(max_batch) = config.max_batch {
            if max_batch < 1 {
                return Err(ConfigError::InvalidMaxBatch(max_batch));
            }
            self.max_batch = max_batch;
        }
        if !config.extra_headers.is_empty() {
            self.extra_headers = config.extra_headers;
        }
        if let Some(delay) = config.delay_secs {
            self.delay_secs = delay.max(0.0);
        }
        if let Some(timeout) = config.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if !config.eor_triggers.is_empty() {
            self.eor_triggers = config.eor_triggers;
        }
        if !config.proxies.is_empty() {
            self.proxies = config.proxies;
        }
        info!(url = %self.url, max_batch = self.max_batch, "resource configured");
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    pub fn delay_secs(&self) -> f64 {
        self.delay_secs
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    pub fn eor_triggers(&self) -> &[Arc<dyn EorTrigger>] {
        &self.eor_triggers
    }

    /// Create (or fetch) an endpoint path under this resource.
    pub fn add_endpoint(&mut self, id: &str) -> &mut EndpointPath {
        self.endpoints
            .entry(id.to_string())
            .or_insert_with(|| EndpointPath::new(id))
    }

    pub fn endpoint(&self, id: &str) -> Option<&EndpointPath> {
        self.endpoints.get(id)
    }

    /// Register a named query bound to one of this resource's
    /// endpoints. Duplicate names need `replace=true`.
    pub fn make_query(
        &mut self,
        name: &str,
        endpoint_id: &str,
        io_context: IoContext<T>,
        options: QueryOptions,
    ) -> Result<&mut ApiRequest<T>, ConfigError> {
        if !self.endpoints.contains_key(endpoint_id) {
            return Err(ConfigError::UnknownEndpoint(endpoint_id.to_string()));
        }
        let existing = self.queries.iter().position(|q| q.name() == name);
        match existing {
            Some(idx) if options.replace => {
                self.queries.remove(idx);
            }
            Some(_) => return Err(ConfigError::DuplicateQuery(name.to_string())),
            None => {}
        }
        self.queries
            .push(ApiRequest::new(name, endpoint_id, io_context, options));
        info!(query = name, endpoint = endpoint_id, "query registered");
        Ok(self.queries.last_mut().expect("pushed above"))
    }

    pub fn allowed_queries(&self) -> Vec<&str> {
        self.queries.iter().map(|q| q.name()).collect()
    }

    pub fn query(&self, name: &str) -> Option<&ApiRequest<T>> {
        self.queries.iter().find(|q| q.name() == name)
    }

    pub fn query_mut(&mut self, name: &str) -> Option<&mut ApiRequest<T>> {
        self.queries.iter_mut().find(|q| q.name() == name)
    }

    pub(crate) fn into_run_parts(
        self,
    ) -> (
        String,
        Vec<(String, String)>,
        f64,
        u64,
        usize,
        Vec<Arc<dyn EorTrigger>>,
        Vec<String>,
        HashMap<String, EndpointPath>,
        Vec<ApiRequest<T>>,
    ) {
        (
            self.url,
            self.extra_headers,
            self.delay_secs,
            self.request_timeout_secs,
            self.max_batch,
            self.eor_triggers,
            self.proxies,
            self.endpoints,
            self.queries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contentio::{create_io_context, CodecRegistry};
    use crate::storage::StorageBuilder;
    use serde_json::{json, Value};

    fn io_context() -> IoContext<Value> {
        let storage = StorageBuilder::new()
            .configure(
                Arc::new(CodecRegistry::with_json()),
                "memory",
                json!({}),
                true,
                "count",
                100.0,
            )
            .unwrap();
        create_io_context("json", "json", storage).unwrap()
    }

    #[test]
    fn bad_url_is_rejected() {
        assert!(ApiResource::<Value>::new("not a url").is_err());
        assert!(ApiResource::<Value>::new("https://api.example/v3/").is_ok());
    }

    #[test]
    fn max_batch_must_be_positive() {
        let mut resource = ApiResource::<Value>::new("https://api.example").unwrap();
        let err = resource
            .configure(ResourceConfig {
                max_batch: Some(0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxBatch(0)));
    }

    #[test]
    fn duplicate_query_needs_replace() {
        let mut resource = ApiResource::<Value>::new("https://api.example").unwrap();
        resource.add_endpoint("list");
        resource
            .make_query("jobs", "list", io_context(), QueryOptions::default())
            .unwrap();
        let err = resource
            .make_query("jobs", "list", io_context(), QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateQuery(_)));
        resource
            .make_query(
                "jobs",
                "list",
                io_context(),
                QueryOptions {
                    replace: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(resource.allowed_queries(), vec!["jobs"]);
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let mut resource = ApiResource::<Value>::new("https://api.example").unwrap();
        let err = resource
            .make_query("jobs", "nope", io_context(), QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEndpoint(_)));
    }

    #[test]
    fn url_plan_counts_cartesian_product() {
        let mut resource = ApiResource::<Value>::new("https://api.example").unwrap();
        {
            let endpoint = resource.add_endpoint("quotes");
            endpoint.add_fix_part("quote", None);
            endpoint.add_mutable_parts(["AAPL", "MSFT"], None);
        }
        resource
            .make_query(
                "quotes",
                "quotes",
                io_context(),
                QueryOptions {
                    mutable_params: vec![(
                        "period".to_string(),
                        vec!["q1".into(), "q2".into(), "q3".into()],
                    )],
                    has_pages: false,
                    ..Default::default()
                },
            )
            .unwrap();
        let endpoint = resource.endpoint("quotes").unwrap().clone();
        let plan = resource
            .query("quotes")
            .unwrap()
            .url_plan("https://api.example", &endpoint);
        assert_eq!(plan.unpaged_count(), 2 * 3);
    }
}
