//! Batching metric processor.
//!
//! `process` runs on the collecting thread and must not block, so it only
//! does a `try_send` into a bounded channel. Worker tasks drain the channel,
//! gather up to `batch_size` metrics, drop blacklisted names and hand the
//! batch to the exporter. A full queue drops the metric: delivery is at most
//! once.

use arc_swap::ArcSwap;
use lumen_metrics::{Metric, MetricProcessor, MetricsResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::exporter::Exporter;

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    exported: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the pipeline counters, in metrics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    pub received: u64,
    pub exported: u64,
    /// Rejected because the queue was full or closed.
    pub dropped: u64,
    /// Blacklisted.
    pub filtered: u64,
    /// Lost to exporter errors.
    pub failed: u64,
}

pub struct BatchProcessor {
    config: ExportConfig,
    sender: Mutex<Option<mpsc::Sender<Metric>>>,
    blacklist: Arc<ArcSwap<HashSet<String>>>,
    counters: Arc<Counters>,
    workers: Mutex<Option<JoinHandle<()>>>,
}

impl BatchProcessor {
    /// Spawn the worker tasks. Must be called from within a tokio runtime.
    pub fn start(config: ExportConfig, exporter: Arc<dyn Exporter>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let blacklist = Arc::new(ArcSwap::from_pointee(
            config.blacklisted_metric_names.clone(),
        ));
        let counters = Arc::new(Counters::default());

        let handle = tokio::spawn(run_workers(
            receiver,
            exporter,
            config.workers.max(1),
            config.batch_size.max(1),
            blacklist.clone(),
            counters.clone(),
        ));

        Self {
            config,
            sender: Mutex::new(Some(sender)),
            blacklist,
            counters,
            workers: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Replace the blacklist. Applies to every batch exported afterwards.
    pub fn set_blacklist(&self, names: HashSet<String>) {
        tracing::info!(count = names.len(), "export blacklist updated");
        self.blacklist.store(Arc::new(names));
    }

    pub fn stats(&self) -> ExportStats {
        let c = &self.counters;
        ExportStats {
            received: c.received.load(Ordering::Relaxed),
            exported: c.exported.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            filtered: c.filtered.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait until the workers have exported everything
    /// already queued.
    pub async fn close(&self) {
        self.sender.lock().take();
        let handle = self.workers.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "export workers panicked");
            }
        }
    }

    fn enqueue(&self, metric: Metric) -> Result<(), ExportError> {
        let sender = self.sender.lock().clone().ok_or(ExportError::Closed)?;
        match sender.try_send(metric) {
            Ok(()) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(metric)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(ExportError::QueueFull(metric.descriptor.name))
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(ExportError::Closed)
            }
        }
    }
}

impl MetricProcessor for BatchProcessor {
    fn process(&self, metric: Metric) -> MetricsResult<()> {
        Ok(self.enqueue(metric)?)
    }

    /// Closes the queue. Workers keep draining in the background; await
    /// [`BatchProcessor::close`] to wait for them.
    fn shutdown(&self) -> MetricsResult<()> {
        self.sender.lock().take();
        Ok(())
    }
}

async fn run_workers(
    receiver: mpsc::Receiver<Metric>,
    exporter: Arc<dyn Exporter>,
    workers: usize,
    batch_size: usize,
    blacklist: Arc<ArcSwap<HashSet<String>>>,
    counters: Arc<Counters>,
) {
    let shared_rx = Arc::new(tokio::sync::Mutex::new(receiver));
    let mut handles = Vec::with_capacity(workers);

    for worker_id in 0..workers {
        let rx = shared_rx.clone();
        let exporter = exporter.clone();
        let blacklist = blacklist.clone();
        let counters = counters.clone();

        handles.push(tokio::spawn(async move {
            tracing::debug!(worker_id, "export worker started");
            loop {
                let mut batch = {
                    let mut rx = rx.lock().await;
                    let Some(first) = rx.recv().await else {
                        break;
                    };
                    let mut batch = vec![first];
                    while batch.len() < batch_size {
                        match rx.try_recv() {
                            Ok(more) => batch.push(more),
                            Err(_) => break,
                        }
                    }
                    batch
                };

                let before = batch.len();
                {
                    let blacklist = blacklist.load();
                    if !blacklist.is_empty() {
                        batch.retain(|m| !blacklist.contains(&m.descriptor.name));
                    }
                }
                counters
                    .filtered
                    .fetch_add((before - batch.len()) as u64, Ordering::Relaxed);
                if batch.is_empty() {
                    continue;
                }

                let count = batch.len() as u64;
                match exporter.export(&batch).await {
                    Ok(()) => {
                        counters.exported.fetch_add(count, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(count, Ordering::Relaxed);
                        tracing::error!(worker_id, count, error = %e, "failed to export metrics");
                    }
                }
            }
            tracing::debug!(worker_id, "export worker stopped");
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "export worker panicked");
        }
    }
    tracing::info!("all export workers stopped");
}
