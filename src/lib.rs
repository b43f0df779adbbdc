//! Scheduled data-collection engine.
//!
//! `gatherer` periodically crawls parameterized HTTP/JSON endpoints,
//! runs the payloads through a user-declared transform pipeline,
//! buffers decoded records in memory and flushes them as serialized
//! objects to a pluggable blob store.
//!
//! The moving parts, bottom up:
//!
//! - [`scheduling`]: activation windows ([`TimeCondition`]) and
//!   buffer overflow limits;
//! - [`resources`]: endpoint/query model, lazy page-aware
//!   [`UrlStream`], the shared [`BatchCounter`] quota and the
//!   end-of-resource trigger fabric;
//! - [`contentio`]: typed codecs, output-path templates and the
//!   [`IoBoundPipeline`] transform chain;
//! - [`storage`]: buffering blob storage over pluggable engines;
//! - [`collectors`]: the per-query collection task;
//! - [`supervisor`]: the [`EntryPoint`] driving everything.
//!
//! ```no_run
//! use gatherer::{
//!     create_io_context, define_storage, CodecRegistry, EntryPoint, QueryOptions,
//!     StatusEorTrigger,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let codecs = Arc::new(CodecRegistry::with_json());
//! let storage = define_storage().configure(
//!     codecs,
//!     "file",
//!     serde_json::json!({"root": "./collected"}),
//!     true,
//!     "count",
//!     100.0,
//! )?;
//!
//! let mut resource = EntryPoint::define_resource("https://api.example/v3")?;
//! resource.configure(gatherer::ResourceConfig {
//!     max_batch: Some(2),
//!     eor_triggers: vec![Arc::new(StatusEorTrigger::new(204))],
//!     ..Default::default()
//! })?;
//! resource.add_endpoint("list").add_fix_part("vacancies", None);
//! let io = create_io_context("json", "json", storage)?;
//! resource.make_query("vacancies", "list", io, QueryOptions::default())?;
//!
//! let mut app = EntryPoint::new();
//! app.add_resource(resource);
//! app.run(false).await
//! # }
//! ```

pub mod collectors;
pub mod config;
pub mod contentio;
pub mod error;
pub mod resources;
pub mod scheduling;
pub mod storage;
pub mod supervisor;

pub use collectors::{ApiDataCollector, CollectorSource, DataCollector};
pub use config::RuntimeConfig;
pub use contentio::{
    create_io_context, Codec, CodecRegistry, DataRecord, FnCodec, IoBoundPipeline, IoContext,
    JsonCodec, PathPart, PathSegment, PathTemplate,
};
pub use error::{ConfigError, Error, Result};
pub use resources::{
    ApiRequest, ApiResource, BatchCounter, ContentLengthEorTrigger, EndpointPath, EorResolver,
    EorSignal, EorTrigger, MaxPageEorTrigger, QueryOptions, ResourceConfig, ResponseView,
    SearchSite, SimpleEorTrigger, StatusEorTrigger, UrlPlan, UrlStream,
};
pub use scheduling::{
    ActionCondition, BufferLimit, BufferStats, Clock, ManualClock, SchedulePeriod, SystemClock,
    TimeCondition,
};
pub use storage::{
    define_storage, ContentQueue, EngineRegistry, FsBlobStorage, LocalFsEngine, MemoryEngine,
    QueueId, StorageBuilder, StorageEngine,
};
pub use supervisor::EntryPoint;
