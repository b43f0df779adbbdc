//! API data collector.
//!
//! Ties the whole fabric together for one request: activation
//! condition, batch quota, URL stream, concurrent HTTP, EOR
//! resolution, decode, pipeline, buffered storage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use url::Url;

use crate::collectors::{CollectorSource, DataCollector, Progress};
use crate::config::RuntimeConfig;
use crate::contentio::{DataRecord, IoBoundPipeline, PathPart, PathTemplate};
use crate::error::{ConfigError, Error};
use crate::resources::{
    ApiResource, BatchCounter, EorResolver, EorTrigger, ResponseView, UrlPlan, UrlStream,
};
use crate::scheduling::ActionCondition;
use crate::storage::{FsBlobStorage, QueueId};

/// Kept bodies of one HTTP batch plus the end-of-resource verdict.
struct BatchOutcome {
    contents: Vec<Vec<u8>>,
    end_of_resource: bool,
}

pub(crate) struct CollectorParts<T: DataRecord> {
    pub name: String,
    pub resource_url: String,
    pub plan: UrlPlan,
    pub in_format: String,
    pub out_format: String,
    pub storage: Arc<FsBlobStorage<T>>,
    pub path_template: Option<PathTemplate>,
    pub pipeline: Option<IoBoundPipeline<T>>,
    pub collect_trigger: ActionCondition,
    pub batcher: Arc<BatchCounter>,
    pub eor_triggers: Vec<Arc<dyn EorTrigger>>,
    pub extra_headers: Vec<(String, String)>,
    pub delay_secs: f64,
    pub request_timeout_secs: u64,
    pub proxies: Vec<String>,
}

/// Collector for one named query of an API resource.
pub struct ApiDataCollector<T: DataRecord> {
    name: String,
    client: reqwest::Client,
    delay: Duration,
    collect_trigger: ActionCondition,
    plan: UrlPlan,
    in_format: String,
    out_format: String,
    storage: Arc<FsBlobStorage<T>>,
    path_template: PathTemplate,
    pipeline: Option<IoBoundPipeline<T>>,
    batcher: Arc<BatchCounter>,
    eor_resolver: EorResolver,
    queue_id: Option<QueueId>,
    current_bs: usize,
}

impl<T: DataRecord> ApiDataCollector<T> {
    pub(crate) fn new(parts: CollectorParts<T>) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &parts.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::InvalidHeader(value.clone()))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(parts.request_timeout_secs))
            .default_headers(headers);
        if let Some(proxy) = parts.proxies.choose(&mut rand::thread_rng()) {
            debug!(%proxy, "collector routed through proxy");
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;

        let path_template = match parts.path_template {
            Some(template) if !template.is_empty() => template,
            _ => default_path_template(&parts.resource_url, &parts.name),
        };

        Ok(Self {
            name: parts.name,
            client,
            delay: Duration::from_secs_f64(parts.delay_secs.max(0.0)),
            collect_trigger: parts.collect_trigger,
            plan: parts.plan,
            in_format: parts.in_format,
            out_format: parts.out_format,
            storage: parts.storage,
            path_template,
            pipeline: parts.pipeline,
            batcher: parts.batcher,
            eor_resolver: EorResolver::new(parts.eor_triggers),
            queue_id: None,
            current_bs: 0,
        })
    }

    async fn queue_id(&mut self) -> QueueId {
        match self.queue_id {
            Some(id) => id,
            None => {
                let id = self
                    .storage
                    .create_buffer(&self.name, &self.in_format, &self.out_format)
                    .await;
                self.queue_id = Some(id);
                id
            }
        }
    }

    // Walk the URL stream until it runs dry.
    async fn traverse(&mut self, stream: &mut UrlStream) -> Result<(), Error> {
        let queue_id = self.queue_id().await;
        loop {
            let urls = stream.take(self.current_bs);
            if urls.is_empty() {
                info!(collector = %self.name, "url stream exhausted");
                return Ok(());
            }
            let started = Instant::now();

            let outcome = self.process_requests(&urls).await?;
            let mut decoded = Vec::with_capacity(outcome.contents.len());
            for body in &outcome.contents {
                decoded.push(self.storage.codecs().decode(&self.in_format, body)?);
            }
            if let Some(pipeline) = &self.pipeline {
                decoded = pipeline.run_transform(decoded).await?;
            }
            let pairs: Vec<(String, T)> = decoded
                .into_iter()
                .map(|record| (self.path_template.render_path(&self.out_format), record))
                .collect();
            if !pairs.is_empty() {
                self.storage
                    .clone()
                    .parse_content(queue_id, pairs)
                    .await?;
            }

            let progress = if outcome.end_of_resource {
                Progress::AdvanceAxis
            } else {
                Progress::Continue
            };
            if progress == Progress::AdvanceAxis && !stream.advance_axis() {
                info!(collector = %self.name, "resource traversal finished");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if self.delay > elapsed {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
    }

    /// Fire one batch of GETs concurrently, fail hard on any non-2xx,
    /// and compress the results by the EOR bitmap.
    async fn process_requests(&mut self, urls: &[String]) -> Result<BatchOutcome, Error> {
        debug!(collector = %self.name, batch = urls.len(), "dispatching requests");
        let pending = futures::future::join_all(urls.iter().map(|url| self.client.get(url).send()));
        // Rebalance before awaiting so co-running collectors can pick
        // up surplus quota mid-flight.
        self.current_bs = self.batcher.recalc_limit(self.current_bs).await;
        let responses = pending.await;

        let mut completed: Vec<(String, u16, HeaderMap, Vec<u8>)> =
            Vec::with_capacity(responses.len());
        for response in responses {
            let response = response?;
            let url = response.url().to_string();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();
            if !status.is_success() {
                return Err(Error::HttpStatus {
                    url,
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            completed.push((url, status.as_u16(), headers, body));
        }

        let views: Vec<ResponseView<'_>> = completed
            .iter()
            .map(|(url, status, headers, body)| ResponseView {
                url,
                status: *status,
                headers,
                body,
            })
            .collect();
        let signal = self.eor_resolver.resolve(&views);
        drop(views);

        let contents = completed
            .into_iter()
            .zip(signal.keep)
            .filter_map(|((_, _, _, body), keep)| keep.then_some(body))
            .collect();
        Ok(BatchOutcome {
            contents,
            end_of_resource: signal.end_of_resource,
        })
    }
}

#[async_trait]
impl<T: DataRecord> DataCollector for ApiDataCollector<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_cycle(&mut self) -> Result<(), Error> {
        self.collect_trigger.pending().await;
        self.storage.launch_session().await?;
        self.current_bs = self.batcher.acquire_batch().await;
        debug!(collector = %self.name, batch_size = self.current_bs, "cycle started");

        let mut stream = self.plan.stream();
        let outcome = self.traverse(&mut stream).await;
        // The slice goes back even when the traversal failed.
        self.batcher.release_batch(self.current_bs).await;
        if let Err(err) = &outcome {
            warn!(collector = %self.name, %err, "collection cycle failed");
        }
        outcome
    }
}

impl<T: DataRecord> CollectorSource for ApiResource<T> {
    fn build_collectors(
        self: Box<Self>,
        _runtime: &RuntimeConfig,
    ) -> Result<Vec<Box<dyn DataCollector>>, Error> {
        let (url, extra_headers, delay_secs, request_timeout_secs, max_batch, triggers, proxies, endpoints, queries) =
            self.into_run_parts();
        let batcher = Arc::new(BatchCounter::new(max_batch));
        let mut collectors: Vec<Box<dyn DataCollector>> = Vec::with_capacity(queries.len());
        for query in queries {
            let endpoint = endpoints
                .get(query.endpoint_id())
                .cloned()
                .ok_or_else(|| ConfigError::UnknownEndpoint(query.endpoint_id().to_string()))?;
            let plan = query.url_plan(&url, &endpoint);
            let (name, io_context, collect_trigger) = query.into_parts();
            let (in_format, out_format, storage, path_template, pipeline) =
                io_context.into_parts();
            let collector = ApiDataCollector::new(CollectorParts {
                name,
                resource_url: url.clone(),
                plan,
                in_format,
                out_format,
                storage,
                path_template,
                pipeline,
                collect_trigger,
                batcher: batcher.clone(),
                eor_triggers: triggers.clone(),
                extra_headers: extra_headers.clone(),
                delay_secs,
                request_timeout_secs,
                proxies: proxies.clone(),
            })?;
            collectors.push(Box::new(collector));
        }
        Ok(collectors)
    }
}

// Fallback output path: host / request name / date_name_time_seq. The
// sequence part keeps paths of one batch distinct even within a
// millisecond.
fn default_path_template(resource_url: &str, request_name: &str) -> PathTemplate {
    let host = Url::parse(resource_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "collected".to_string());
    let name_for_file = request_name.to_string();
    let seq = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let mut template = PathTemplate::default();
    template.add_segment("", 1, vec![host.into()]);
    template.add_segment("", 2, vec![request_name.into()]);
    template.add_segment(
        "_",
        3,
        vec![
            PathPart::deferred(|| chrono::Local::now().format("%Y-%m-%d").to_string()),
            name_for_file.into(),
            PathPart::deferred(|| chrono::Local::now().format("%H%M%S%.3f").to_string()),
            PathPart::deferred(move || {
                seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                    .to_string()
            }),
        ],
    );
    template
}
