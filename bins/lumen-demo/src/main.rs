use clap::Parser;
use lumen_config::{from_toml_serde, render_serde, Config, ConfigError, ConfigManager};
use lumen_export::{build_exporter, BatchProcessor, ExportConfig, PeriodicReader};
use lumen_logging::LogConfig;
use lumen_metrics::{Meter, MeterProvider, SdkConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Lumen metrics demo: records synthetic traffic and exports it.
#[derive(Parser, Debug)]
#[command(name = "lumen-demo", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lumen-demo.toml")]
    config: String,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(long)]
    duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DemoConfig {
    #[serde(default)]
    log: LogConfig,
    #[serde(default)]
    sdk: SdkConfig,
    #[serde(default)]
    export: ExportConfig,
}

impl Config for DemoConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_serde(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.sdk.hot_update(&other.sdk);
        self.export.hot_update(&other.export);
    }

    fn render(&self) -> String {
        render_serde(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.sdk.validate()?;
        self.export.validate()
    }
}

fn load_config(path: &str) -> anyhow::Result<ConfigManager<DemoConfig>> {
    if Path::new(path).exists() {
        Ok(ConfigManager::load(path)?)
    } else {
        Ok(ConfigManager::new(DemoConfig::default()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", DemoConfig::default().render());
        return Ok(());
    }

    let manager = load_config(&args.config)?;
    let config = manager.snapshot();
    let _log_guard = lumen_logging::init_logging(&config.log)?;

    tracing::info!(
        config = %args.config,
        loaded = manager.path().is_some(),
        exporter = ?config.export.exporter_type,
        "starting lumen demo"
    );

    let processor = Arc::new(BatchProcessor::start(
        config.export.clone(),
        build_exporter(&config.export),
    ));
    let provider = Arc::new(
        MeterProvider::builder()
            .with_config(config.sdk.clone())
            .with_processor(processor.clone())
            .build(),
    );
    let reader = PeriodicReader::start(provider.clone(), config.export.collect_interval());

    let (stop_tx, stop_rx) = watch::channel(false);
    let load = tokio::spawn(generate_load(provider.meter("demo.http"), stop_rx));

    wait_for_stop(args.duration_secs, &manager, &processor).await?;

    let _ = stop_tx.send(true);
    if let Err(e) = load.await {
        tracing::error!(error = %e, "load generator panicked");
    }
    let stats = reader.shutdown().await?;
    processor.close().await;

    tracing::info!(
        final_metrics = stats.metrics,
        final_points = stats.points,
        export = ?processor.stats(),
        "lumen demo stopped"
    );
    Ok(())
}

/// Wait for CTRL+C, SIGTERM or the optional deadline. SIGHUP reloads the
/// hot-updatable parts of the config file.
async fn wait_for_stop(
    duration_secs: Option<u64>,
    manager: &ConfigManager<DemoConfig>,
    processor: &BatchProcessor,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { tracing::info!("received CTRL+C"); break; }
            _ = sigterm.recv() => { tracing::info!("received SIGTERM"); break; }
            _ = &mut deadline => { tracing::info!("demo duration elapsed"); break; }
            _ = sighup.recv() => match manager.reload() {
                Ok(()) => processor.set_blacklist(manager.get().export.blacklisted_metric_names.clone()),
                Err(e) => tracing::warn!(error = %e, "config reload failed"),
            },
        }
    }
    Ok(())
}

/// Record synthetic HTTP traffic. User ids rotate so that old label sets age
/// out of the stores.
async fn generate_load(meter: Arc<Meter>, mut stop: watch::Receiver<bool>) {
    let requests = meter
        .i64_counter("requests")
        .with_description("handled requests")
        .with_unit("1")
        .init();
    let in_flight = meter.i64_up_down_counter("in_flight").init();
    let latency = meter
        .f64_histogram("latency")
        .with_unit("ms")
        .with_boundaries(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0])
        .init();
    let payload = meter.i64_summary("payload_bytes").with_unit("By").init();
    let queue_depth = meter.i64_gauge("queue_depth").init();
    let peak_latency = meter.f64_max_gauge("peak_latency").with_unit("ms").init();

    let connections = meter.i64_up_down_counter("connections").init();
    let pool = connections.bind(&meter.labels([("pool", "primary")]));
    pool.add(8);

    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    let mut seq: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        seq += 1;

        let method = if seq % 4 == 0 { "POST" } else { "GET" };
        let code = if seq % 50 == 0 { "500" } else { "200" };
        let user = format!("u-{}", (seq / 500) % 1000);
        let labels = meter.labels([("method", method), ("code", code), ("user", user.as_str())]);

        in_flight.add(1, &labels);
        let ms = ((seq * 7919) % 400) as f64 / 3.0;
        requests.add(1, &labels);
        latency.record(ms, &labels);
        peak_latency.record(ms, &labels);
        payload.record(((seq * 104_729) % 16_384) as i64, &labels);
        queue_depth.record((seq % 32) as i64, &meter.labels([("queue", "ingress")]));
        in_flight.add(-1, &labels);
    }
    pool.add(-8);
    tracing::info!(records = seq, "load generator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips() {
        let config = DemoConfig::default();
        let value: toml::Value = config.render().parse().unwrap();
        let parsed = DemoConfig::from_toml(&value).unwrap();
        assert_eq!(parsed, config);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let value: toml::Value = r#"
            [export]
            exporter_type = "memory"
            collect_interval_ms = 500

            [log]
            level = "debug"
        "#
        .parse()
        .unwrap();
        let config = DemoConfig::from_toml(&value).unwrap();
        assert_eq!(config.export.collect_interval(), Duration::from_millis(500));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.sdk, SdkConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let manager = load_config("/nonexistent/lumen-demo.toml").unwrap();
        assert!(manager.path().is_none());
        assert_eq!(manager.snapshot(), DemoConfig::default());
    }
}
