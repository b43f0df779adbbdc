//! User-declared transform pipelines.
//!
//! A pipeline is an ordered list of pure functions over decoded
//! records, with an optional content filter in front and an error
//! handler on the side. Batches run off the event loop: every
//! surviving record is transformed on the blocking pool, all records
//! of a batch concurrently, awaited under the pipeline timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::contentio::DataRecord;
use crate::error::{ConfigError, Error};

type StepFn<T> = Arc<dyn Fn(T) -> Result<T, Error> + Send + Sync>;
type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(Error) -> Option<Error> + Send + Sync>;

/// Batch deadline applied when the user sets none.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Ordered transform chain bound to an IO context.
pub struct IoBoundPipeline<T> {
    functions: Vec<StepFn<T>>,
    data_filter: Option<FilterFn<T>>,
    on_error: Option<ErrorHandler>,
    timeout_secs: u64,
}

impl<T> Default for IoBoundPipeline<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECS)
    }
}

impl<T> std::fmt::Debug for IoBoundPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoBoundPipeline")
            .field("steps", &self.functions.len())
            .field("has_filter", &self.data_filter.is_some())
            .field("has_error_handler", &self.on_error.is_some())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl<T> IoBoundPipeline<T> {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            functions: Vec::new(),
            data_filter: None,
            on_error: None,
            timeout_secs,
        }
    }

    /// Deadline for one transformed batch.
    pub fn set_timeout(&mut self, timeout_secs: u64) -> &mut Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Register a transform at a 1-based position. Positions up to one
    /// past the current tail are valid; anything else is a
    /// configuration error, raised here and not at run time.
    pub fn step(
        &mut self,
        order: usize,
        f: impl Fn(T) -> Result<T, Error> + Send + Sync + 'static,
    ) -> Result<&mut Self, ConfigError> {
        let max = self.functions.len() + 1;
        if order == 0 || order > max {
            return Err(ConfigError::InvalidStepOrder { order, max });
        }
        self.functions.insert(order - 1, Arc::new(f));
        Ok(self)
    }

    /// Select which records enter the pipeline; the rest are dropped
    /// silently.
    pub fn content_filter(&mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> &mut Self {
        self.data_filter = Some(Arc::new(f));
        self
    }

    /// Route per-record errors. Returning `Some` aborts the batch with
    /// that error; returning `None` drops the record and continues.
    pub fn error_handler(
        &mut self,
        f: impl Fn(Error) -> Option<Error> + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Move a registered step to a new 1-based position.
    pub fn change_order(&mut self, from: usize, to: usize) -> Result<(), ConfigError> {
        let max = self.functions.len();
        if from == 0 || from > max || to == 0 || to > max {
            return Err(ConfigError::InvalidStepOrder {
                order: from.max(to),
                max,
            });
        }
        let f = self.functions.remove(from - 1);
        self.functions.insert(to - 1, f);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Human-readable chain, e.g. `1 -> 2 -> 3`.
    pub fn show_pipeline(&self) -> String {
        (1..=self.functions.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl<T: DataRecord> IoBoundPipeline<T> {
    /// Transform a batch. Filtered-out records vanish; the rest run
    /// through all steps in order, each record on the blocking pool,
    /// all records concurrently.
    pub async fn run_transform(&self, batch: Vec<T>) -> Result<Vec<T>, Error> {
        let survivors: Vec<T> = match &self.data_filter {
            Some(filter) => batch.into_iter().filter(|r| filter(r)).collect(),
            None => batch,
        };
        if survivors.is_empty() || self.functions.is_empty() {
            return Ok(survivors);
        }
        debug!(records = survivors.len(), steps = self.functions.len(), "running transform batch");

        let handles: Vec<_> = survivors
            .into_iter()
            .map(|record| {
                let chain = self.functions.clone();
                tokio::task::spawn_blocking(move || {
                    chain.iter().try_fold(record, |value, step| step(value))
                })
            })
            .collect();

        let joined = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            join_all(handles),
        )
        .await
        .map_err(|_| Error::PipelineTimeout(self.timeout_secs))?;

        let mut out = Vec::with_capacity(joined.len());
        for item in joined {
            match item.map_err(Error::Join)? {
                Ok(record) => out.push(record),
                Err(err) => match &self.on_error {
                    Some(handler) => {
                        if let Some(err) = handler(err) {
                            return Err(Error::Pipeline(err.to_string()));
                        }
                        warn!("transform error suppressed by handler, record dropped");
                    }
                    None => return Err(Error::Pipeline(err.to_string())),
                },
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn set_field(name: &'static str) -> impl Fn(Value) -> Result<Value, Error> {
        move |mut v: Value| {
            v[name] = json!(true);
            Ok(v)
        }
    }

    #[tokio::test]
    async fn steps_apply_in_order_and_filter_drops_records() {
        let mut pipeline: IoBoundPipeline<Value> = IoBoundPipeline::new(5);
        pipeline.content_filter(|v| !v.as_object().map(|o| o.is_empty()).unwrap_or(false));
        pipeline.step(1, set_field("parsed")).unwrap();
        pipeline.step(2, set_field("enriched")).unwrap();

        let batch = vec![json!({"id": 1}), json!({}), json!({"id": 2})];
        let out = pipeline.run_transform(batch).await.unwrap();
        assert_eq!(out.len(), 2);
        for record in out {
            assert_eq!(record["parsed"], json!(true));
            assert_eq!(record["enriched"], json!(true));
        }
    }

    #[tokio::test]
    async fn out_of_range_step_fails_before_running() {
        let mut pipeline: IoBoundPipeline<Value> = IoBoundPipeline::new(5);
        let err = pipeline.step(3, set_field("x")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidStepOrder { order: 3, max: 1 }
        ));
    }

    #[tokio::test]
    async fn error_handler_decides_between_abort_and_drop() {
        let mut pipeline: IoBoundPipeline<Value> = IoBoundPipeline::new(5);
        pipeline.step(1, |v: Value| {
            if v["bad"].as_bool().unwrap_or(false) {
                Err(Error::Pipeline("bad record".into()))
            } else {
                Ok(v)
            }
        }).unwrap();
        pipeline.error_handler(|_| None);
        let out = pipeline
            .run_transform(vec![json!({"bad": true}), json!({"bad": false})])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);

        let mut strict: IoBoundPipeline<Value> = IoBoundPipeline::new(5);
        strict.step(1, |_| Err::<Value, _>(Error::Pipeline("boom".into()))).unwrap();
        strict.error_handler(Some);
        assert!(strict.run_transform(vec![json!({})]).await.is_err());
    }

    #[tokio::test]
    async fn step_insertion_prepends_when_asked() {
        let mut pipeline: IoBoundPipeline<Value> = IoBoundPipeline::new(5);
        pipeline.step(1, |mut v: Value| {
            v["trail"] = json!(format!("{}b", v["trail"].as_str().unwrap_or("")));
            Ok(v)
        }).unwrap();
        pipeline.step(1, |mut v: Value| {
            v["trail"] = json!(format!("{}a", v["trail"].as_str().unwrap_or("")));
            Ok(v)
        }).unwrap();
        let out = pipeline.run_transform(vec![json!({})]).await.unwrap();
        assert_eq!(out[0]["trail"], json!("ab"));
        assert_eq!(pipeline.show_pipeline(), "1 -> 2");
    }
}
