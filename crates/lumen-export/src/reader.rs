use lumen_metrics::{CollectStats, MeterProvider, MetricsResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Drives `MeterProvider::collect` on a fixed interval.
pub struct PeriodicReader {
    provider: Arc<MeterProvider>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    cycles: Arc<AtomicU64>,
}

impl PeriodicReader {
    /// Start collecting every `interval`. The first collection runs one full
    /// interval after start. Must be called from within a tokio runtime.
    pub fn start(provider: Arc<MeterProvider>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cycles = Arc::new(AtomicU64::new(0));

        let handle = {
            let provider = provider.clone();
            let cycles = cycles.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + interval;
                let mut ticker = tokio::time::interval_at(start, interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let provider = provider.clone();
                            match tokio::task::spawn_blocking(move || provider.collect()).await {
                                Ok(stats) => {
                                    cycles.fetch_add(1, Ordering::Relaxed);
                                    tracing::debug!(
                                        metrics = stats.metrics,
                                        points = stats.points,
                                        evicted = stats.evicted,
                                        failed = stats.failed,
                                        "periodic collection"
                                    );
                                }
                                Err(e) => tracing::error!(error = %e, "collection task panicked"),
                            }
                        }
                        _ = shutdown_rx.changed() => break,
                    }
                }
            })
        };

        tracing::info!(interval_ms = interval.as_millis() as u64, "periodic reader started");
        Self {
            provider,
            shutdown_tx,
            handle,
            cycles,
        }
    }

    /// Completed periodic collections, not counting the final one.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Stop the ticker, then shut the provider down, which runs the final
    /// collection.
    pub async fn shutdown(self) -> MetricsResult<CollectStats> {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "periodic reader task panicked");
        }
        let provider = self.provider;
        match tokio::task::spawn_blocking(move || provider.shutdown()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "final collection panicked");
                Ok(CollectStats::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_metrics::{InMemoryProcessor, LabelSet, MetricsError};

    fn provider() -> (Arc<MeterProvider>, Arc<InMemoryProcessor>) {
        let processor = Arc::new(InMemoryProcessor::new());
        let provider = MeterProvider::builder()
            .with_processor(processor.clone())
            .build();
        (Arc::new(provider), processor)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_periodic_collection() {
        let (provider, processor) = provider();
        let counter = provider.meter("svc").i64_counter("ticks").init();
        counter.add(1, &LabelSet::empty());

        let reader = PeriodicReader::start(provider.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(reader.cycles() >= 2);
        assert!(!processor.take_metrics().is_empty());

        let stats = reader.shutdown().await.unwrap();
        assert_eq!(stats.metrics, 1);
        assert!(provider.is_shut_down());
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let (provider, processor) = provider();
        let counter = provider.meter("svc").i64_counter("once").init();
        counter.add(3, &LabelSet::empty());

        let reader = PeriodicReader::start(provider.clone(), Duration::from_secs(3600));
        assert_eq!(reader.cycles(), 0);
        reader.shutdown().await.unwrap();

        let flushed = processor.take_metrics();
        assert_eq!(flushed.len(), 1);
        assert_eq!(provider.shutdown(), Err(MetricsError::ShutDown));
    }
}
