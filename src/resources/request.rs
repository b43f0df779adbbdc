//! Named queries against a resource.
//!
//! An [`ApiRequest`] pairs an endpoint with its query parameters, the
//! IO context that routes its results, and the activation condition
//! gating its collector.

use crate::contentio::{DataRecord, IoContext};
use crate::resources::endpoint::EndpointPath;
use crate::resources::url_stream::UrlPlan;
use crate::scheduling::ActionCondition;

/// Options accepted by `make_query` beyond the mandatory bindings.
pub struct QueryOptions {
    pub collect_interval: ActionCondition,
    /// Query parameters present on every URL, in declaration order.
    pub fix_params: Vec<(String, String)>,
    /// Query parameters with one value chosen per URL.
    pub mutable_params: Vec<(String, Vec<String>)>,
    /// Append a `page` counter axis to every URL.
    pub has_pages: bool,
    /// Overwrite an existing query of the same name.
    pub replace: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            collect_interval: ActionCondition::AlwaysRun,
            fix_params: Vec::new(),
            mutable_params: Vec::new(),
            has_pages: true,
            replace: false,
        }
    }
}

/// One named collection query of a resource.
pub struct ApiRequest<T: DataRecord> {
    name: String,
    endpoint_id: String,
    fix_params: Vec<(String, String)>,
    mutable_params: Vec<(String, Vec<String>)>,
    io_context: IoContext<T>,
    collect_interval: ActionCondition,
    has_pages: bool,
}

impl<T: DataRecord> std::fmt::Debug for ApiRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("name", &self.name)
            .field("endpoint_id", &self.endpoint_id)
            .field("fix_params", &self.fix_params)
            .field("mutable_params", &self.mutable_params)
            .field("collect_interval", &self.collect_interval)
            .field("has_pages", &self.has_pages)
            .finish()
    }
}

impl<T: DataRecord> ApiRequest<T> {
    pub(crate) fn new(
        name: &str,
        endpoint_id: &str,
        io_context: IoContext<T>,
        options: QueryOptions,
    ) -> Self {
        Self {
            name: name.to_string(),
            endpoint_id: endpoint_id.to_string(),
            fix_params: options.fix_params,
            mutable_params: options.mutable_params,
            io_context,
            collect_interval: options.collect_interval,
            has_pages: options.has_pages,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn has_pages(&self) -> bool {
        self.has_pages
    }

    pub fn io_context(&self) -> &IoContext<T> {
        &self.io_context
    }

    pub fn io_context_mut(&mut self) -> &mut IoContext<T> {
        &mut self.io_context
    }

    /// Add or override a fixed query parameter.
    pub fn set_fix_param(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some(slot) = self.fix_params.iter_mut().find(|(k, _)| k == name) {
            slot.1 = value.to_string();
        } else {
            self.fix_params.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Add or override a mutable query parameter.
    pub fn set_mutable_param<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if let Some(slot) = self.mutable_params.iter_mut().find(|(k, _)| k == name) {
            slot.1 = values;
        } else {
            self.mutable_params.push((name.to_string(), values));
        }
        self
    }

    /// Build the URL plan for this query against a base URL.
    pub fn url_plan(&self, base_url: &str, endpoint: &EndpointPath) -> UrlPlan {
        let bases = endpoint
            .expand()
            .into_iter()
            .map(|suffix| {
                if suffix.is_empty() {
                    base_url.to_string()
                } else {
                    format!("{base_url}/{suffix}")
                }
            })
            .collect();
        UrlPlan::new(
            bases,
            self.fix_params.clone(),
            self.mutable_params.clone(),
            self.has_pages,
        )
    }

    pub(crate) fn into_parts(self) -> (String, IoContext<T>, ActionCondition) {
        (self.name, self.io_context, self.collect_interval)
    }
}
