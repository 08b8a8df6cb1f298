use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::collector::Collector;
use crate::config::MetricsConfig;
use crate::error::{MetricsError, MetricsResult};
use crate::graph::MetricsReport;
use crate::sink::MetricsSink;
use crate::stats::ServerStats;

/// When the reporter begins submitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartDecision {
    /// Opted out; nothing is ever collected.
    OptedOut,
    /// Metrics enabled in config; start right away.
    Immediate,
    /// Start `deferred_delay` after the first admin joins.
    Deferred,
}

impl StartDecision {
    pub fn from_config(config: &MetricsConfig) -> Self {
        if config.opt_out {
            Self::OptedOut
        } else if config.enabled {
            Self::Immediate
        } else {
            Self::Deferred
        }
    }
}

/// Collects usage statistics on a timer and hands them to a [`MetricsSink`].
pub struct MetricsReporter {
    config: MetricsConfig,
    decision: StartDecision,
    stats: Arc<dyn ServerStats>,
    sink: Arc<dyn MetricsSink>,
    collector: Collector,
    admin_joined: Notify,
    admin_seen: AtomicBool,
}

impl MetricsReporter {
    pub fn new(
        config: MetricsConfig,
        stats: Arc<dyn ServerStats>,
        sink: Arc<dyn MetricsSink>,
        collector: Collector,
    ) -> Self {
        let decision = StartDecision::from_config(&config);
        if decision == StartDecision::Deferred {
            info!(
                "This plugin collects minimal statistic data and sends it to {}.",
                config.endpoint
            );
            info!("You can opt out, disabling metrics for all plugins, by running /essentials opt-out");
            info!(
                "This will start {} seconds after the first admin/op joins.",
                config.deferred_delay_secs
            );
        }
        Self {
            config,
            decision,
            stats,
            sink,
            collector,
            admin_joined: Notify::new(),
            admin_seen: AtomicBool::new(false),
        }
    }

    pub fn decision(&self) -> StartDecision {
        self.decision
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Build a report without submitting it.
    pub fn collect(&self) -> MetricsResult<MetricsReport> {
        if self.decision == StartDecision::OptedOut {
            return Err(MetricsError::OptedOut);
        }
        self.collector.collect(self.stats.as_ref())
    }

    /// Collect and submit one report.
    pub async fn run_once(&self) -> MetricsResult<()> {
        let report = self.collect()?;
        self.sink.submit(&report).await?;
        debug!(graphs = report.graphs.len(), "metrics report submitted");
        Ok(())
    }

    /// Signal that an admin joined. Only the first call has any effect.
    pub fn notify_admin_join(&self) {
        if !self.admin_seen.swap(true, Ordering::AcqRel) {
            self.admin_joined.notify_one();
        }
    }

    /// Log a failure the way every metrics error is surfaced: one `info`
    /// line prefixed `[Metrics]`, with the error's full structure in debug
    /// mode.
    pub fn report_error(&self, err: &MetricsError) {
        info!("[Metrics] {}", log_message(err, self.config.debug));
    }

    /// Run the report loop on the current tokio runtime.
    ///
    /// Dropping the returned handle stops the loop at its next wakeup.
    pub fn spawn(self: Arc<Self>) -> ReporterHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            match self.decision {
                StartDecision::OptedOut => return,
                StartDecision::Immediate => {}
                StartDecision::Deferred => {
                    tokio::select! {
                        _ = self.admin_joined.notified() => {}
                        _ = stop.changed() => return,
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.deferred_delay()) => {}
                        _ = stop.changed() => return,
                    }
                }
            }
            info!(interval_secs = self.config.interval().as_secs(), "metrics reporter started");

            let mut ticker = tokio::time::interval(self.config.interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            self.report_error(&e);
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            debug!("metrics reporter stopped");
        });
        ReporterHandle { shutdown, task }
    }
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("decision", &self.decision)
            .field("gauges", &self.collector.gauge_count())
            .finish()
    }
}

/// Handle to a spawned reporter loop.
#[derive(Debug)]
pub struct ReporterHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReporterHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Display messages already embed their causes, so the chain is not walked
/// again; debug mode appends the `Debug` form with variants and keys.
fn log_message(err: &MetricsError, debug: bool) -> String {
    if debug {
        format!("{err} ({err:?})")
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::FakeServer;
    use crate::sink::MemorySink;
    use ess_storage::{StorageError, StorageKey};
    use std::time::Duration;

    fn reporter(config: MetricsConfig, server: FakeServer) -> (Arc<MetricsReporter>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let reporter = MetricsReporter::new(config, Arc::new(server), sink.clone(), Collector::new());
        (Arc::new(reporter), sink)
    }

    fn enabled() -> MetricsConfig {
        MetricsConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn start_decision_from_config() {
        let mut config = MetricsConfig::default();
        assert_eq!(StartDecision::from_config(&config), StartDecision::Deferred);
        config.enabled = true;
        assert_eq!(StartDecision::from_config(&config), StartDecision::Immediate);
        config.opt_out = true;
        assert_eq!(StartDecision::from_config(&config), StartDecision::OptedOut);
    }

    #[tokio::test]
    async fn run_once_submits_report() {
        let (reporter, sink) = reporter(enabled(), FakeServer::default());
        reporter.run_once().await.unwrap();
        assert_eq!(sink.len(), 1);
        assert!(sink.reports()[0].graph("Locale").is_some());
    }

    #[tokio::test]
    async fn opted_out_never_collects() {
        let config = MetricsConfig {
            opt_out: true,
            enabled: true,
            ..Default::default()
        };
        let (reporter, sink) = reporter(config, FakeServer::default());
        assert!(matches!(reporter.run_once().await, Err(MetricsError::OptedOut)));

        let handle = reporter.clone().spawn();
        tokio::task::yield_now().await;
        assert!(handle.is_finished());
        handle.shutdown().await;
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_reports_every_interval() {
        let (reporter, sink) = reporter(enabled(), FakeServer::default());
        let handle = reporter.spawn();

        // First tick fires at once, second after one interval.
        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(sink.len(), 2);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_waits_for_admin_then_delay() {
        let (reporter, sink) = reporter(MetricsConfig::default(), FakeServer::default());
        assert_eq!(reporter.decision(), StartDecision::Deferred);
        let handle = reporter.clone().spawn();

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert!(sink.is_empty());

        reporter.notify_admin_join();
        reporter.notify_admin_join();
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(sink.is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_admin_joins() {
        let (reporter, sink) = reporter(MetricsConfig::default(), FakeServer::default());
        let handle = reporter.spawn();
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.shutdown().await;
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn collection_errors_do_not_stop_loop() {
        let server = FakeServer {
            broken: true,
            ..Default::default()
        };
        let (reporter, sink) = reporter(enabled(), server);
        let handle = reporter.spawn();

        tokio::time::sleep(Duration::from_secs(1801)).await;
        assert!(!handle.is_finished());
        assert!(sink.is_empty());
        handle.shutdown().await;
    }

    #[test]
    fn error_causes_logged_once() {
        let key: StorageKey = "user:alice".parse().unwrap();
        let err = MetricsError::from(StorageError::PersistenceLoadFailed {
            key: key.clone(),
            source: Box::new(StorageError::NotFound { key }),
        });

        let plain = log_message(&err, false);
        assert_eq!(
            plain,
            "storage error: failed to load user:alice: storage object not found: user:alice"
        );

        let detailed = log_message(&err, true);
        assert!(detailed.starts_with(&plain));
        assert_eq!(detailed.matches("storage object not found").count(), 1);
        assert!(detailed.contains("PersistenceLoadFailed"));
        assert!(detailed.contains("NotFound"));
    }

    #[test]
    fn debug_format() {
        let (reporter, _) = reporter(enabled(), FakeServer::default());
        let debug = format!("{reporter:?}");
        assert!(debug.contains("Immediate"));
    }
}
