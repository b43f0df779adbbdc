//! Collection tasks.
//!
//! A collector drives one request: trigger wait, URL stream, HTTP
//! batches, decode, transform, buffer. The supervisor only sees the
//! object-safe [`DataCollector`] trait, so resources with different
//! record types coexist in one run.

pub mod api;

pub use api::ApiDataCollector;

use async_trait::async_trait;

use crate::config::RuntimeConfig;
use crate::error::Error;

/// One schedulable collection task.
#[async_trait]
pub trait DataCollector: Send {
    fn name(&self) -> &str;

    /// One full traversal: wait for the activation condition, walk the
    /// URL stream, buffer results, release the batch slice.
    async fn run_cycle(&mut self) -> Result<(), Error>;
}

/// Anything that can be turned into a set of collectors at run time.
pub trait CollectorSource: Send {
    fn build_collectors(
        self: Box<Self>,
        runtime: &RuntimeConfig,
    ) -> Result<Vec<Box<dyn DataCollector>>, Error>;
}

/// Loop decision after one processed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// Keep walking the current axis.
    Continue,
    /// End of resource seen: abandon the innermost axis.
    AdvanceAxis,
}
