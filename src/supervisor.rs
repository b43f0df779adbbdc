//! Top-level supervisor loop.
//!
//! Holds every registered resource, builds one collector per query and
//! drives them as self-rescheduling tasks: a collector finishing a
//! traversal is respawned for its next trigger window; a collector
//! failing repeatedly is dropped without touching its siblings.

use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::collectors::{CollectorSource, DataCollector};
use crate::config::RuntimeConfig;
use crate::contentio::DataRecord;
use crate::error::{ConfigError, Error};
use crate::resources::ApiResource;

type CycleResult = (usize, Box<dyn DataCollector>, Result<(), Error>);

/// User-facing application object: register resources, then `run`.
pub struct EntryPoint {
    sources: Vec<Box<dyn CollectorSource>>,
    config: RuntimeConfig,
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryPoint {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            sources: Vec::new(),
            config,
        }
    }

    /// Define an API resource rooted at `url`.
    pub fn define_resource<T: DataRecord>(url: &str) -> Result<ApiResource<T>, ConfigError> {
        ApiResource::new(url)
    }

    /// Register a configured resource for the next run.
    pub fn add_resource(&mut self, resource: impl CollectorSource + 'static) -> &mut Self {
        self.sources.push(Box::new(resource));
        self
    }

    /// Build all collectors and drive them until every one has either
    /// finished for good or exceeded the failure budget.
    pub async fn run(self, debug: bool) -> anyhow::Result<()> {
        init_tracing(debug);
        let config = self.config;
        let mut collectors: Vec<Box<dyn DataCollector>> = Vec::new();
        for source in self.sources {
            collectors.extend(source.build_collectors(&config)?);
        }
        info!(collectors = collectors.len(), "supervisor starting");

        let mut failures = vec![0u32; collectors.len()];
        let mut tasks: JoinSet<CycleResult> = JoinSet::new();
        for (idx, collector) in collectors.into_iter().enumerate() {
            spawn_cycle(&mut tasks, idx, collector);
        }

        let lookup = Duration::from_secs(config.lookup_interval_secs.max(1));
        loop {
            match tokio::time::timeout(lookup, tasks.join_next()).await {
                Err(_elapsed) => {
                    debug!(active = tasks.len(), "supervisor heartbeat");
                }
                Ok(None) => break,
                Ok(Some(Err(join_err))) => {
                    // A panicked task cannot be rescheduled; its state is gone.
                    error!(%join_err, "collector task aborted");
                }
                Ok(Some(Ok((idx, collector, result)))) => match result {
                    Ok(()) => {
                        failures[idx] = 0;
                        debug!(collector = collector.name(), "cycle complete, rescheduling");
                        spawn_cycle(&mut tasks, idx, collector);
                    }
                    Err(err) => {
                        failures[idx] += 1;
                        error!(
                            collector = collector.name(),
                            %err,
                            consecutive = failures[idx],
                            "collector cycle failed"
                        );
                        if failures[idx] < config.max_consecutive_failures {
                            spawn_cycle(&mut tasks, idx, collector);
                        } else {
                            error!(
                                collector = collector.name(),
                                "failure budget exhausted, collector dropped"
                            );
                        }
                    }
                },
            }
        }
        info!("all collectors finished");
        Ok(())
    }
}

fn spawn_cycle(tasks: &mut JoinSet<CycleResult>, idx: usize, mut collector: Box<dyn DataCollector>) {
    tasks.spawn(async move {
        let result = collector.run_cycle().await;
        (idx, collector, result)
    });
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Repeated runs in one process keep the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyCollector {
        name: String,
        cycles: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DataCollector for FlakyCollector {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run_cycle(&mut self) -> Result<(), Error> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            Err(Error::Pipeline("always failing".into()))
        }
    }

    struct StubSource {
        cycles: Arc<AtomicU32>,
    }

    impl CollectorSource for StubSource {
        fn build_collectors(
            self: Box<Self>,
            _runtime: &RuntimeConfig,
        ) -> Result<Vec<Box<dyn DataCollector>>, Error> {
            Ok(vec![Box::new(FlakyCollector {
                name: "flaky".to_string(),
                cycles: self.cycles,
            })])
        }
    }

    #[tokio::test]
    async fn failing_collector_is_retried_then_dropped() {
        let cycles = Arc::new(AtomicU32::new(0));
        let mut app = EntryPoint::with_config(RuntimeConfig {
            lookup_interval_secs: 1,
            max_consecutive_failures: 3,
        });
        app.add_resource(StubSource {
            cycles: cycles.clone(),
        });
        app.run(false).await.unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
    }

    struct ScriptedCollector {
        outcomes: Vec<bool>,
        cycles: Arc<AtomicU32>,
    }

    #[async_trait]
    impl DataCollector for ScriptedCollector {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run_cycle(&mut self) -> Result<(), Error> {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) as usize;
            match self.outcomes.get(cycle) {
                Some(true) => Ok(()),
                _ => Err(Error::Pipeline("scripted failure".into())),
            }
        }
    }

    struct ScriptedSource {
        outcomes: Vec<bool>,
        cycles: Arc<AtomicU32>,
    }

    impl CollectorSource for ScriptedSource {
        fn build_collectors(
            self: Box<Self>,
            _runtime: &RuntimeConfig,
        ) -> Result<Vec<Box<dyn DataCollector>>, Error> {
            Ok(vec![Box::new(ScriptedCollector {
                outcomes: self.outcomes,
                cycles: self.cycles,
            })])
        }
    }

    #[tokio::test]
    async fn successful_cycle_resets_the_failure_budget() {
        let cycles = Arc::new(AtomicU32::new(0));
        let mut app = EntryPoint::with_config(RuntimeConfig {
            lookup_interval_secs: 1,
            max_consecutive_failures: 3,
        });
        // Two failures, one success, then failures until dropped. The
        // success wipes the count, so six cycles run in total.
        app.add_resource(ScriptedSource {
            outcomes: vec![false, false, true, false, false, false],
            cycles: cycles.clone(),
        });
        app.run(false).await.unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 6);
    }
}
