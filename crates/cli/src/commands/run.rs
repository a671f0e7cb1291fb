//! Run command - stream samples through the window engine
//!
//! Samples are read as newline-delimited JSON from a file or stdin and
//! results are written the same way to a file or stdout. With the `kafka`
//! feature and `kafka.enabled` both ends use Kafka instead.

use anyhow::Context;
use clap::Args;
use cpu_p95_config::Settings;
use processor::config::IdStrategy;
use processor::io::{NdjsonSource, SampleSource, WriterSink};
use processor::metrics::{EngineMetrics, MetricsRegistry, MetricsServer};
use processor::pipeline::StreamExecutor;
use processor::sink::ResultSink;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::io::{BufReader, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// Sample input, `-` for stdin
    #[arg(short, long, value_name = "PATH", default_value = "-")]
    input: String,

    /// Result output, `-` for stdout
    #[arg(short, long, value_name = "PATH", default_value = "-")]
    output: String,

    /// Number of shard workers
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Emit results for open windows on shutdown
    #[arg(long)]
    flush_on_shutdown: bool,

    /// Derive result ids from device and window bounds
    #[arg(long)]
    deterministic_ids: bool,

    /// Do not start the metrics server
    #[arg(long)]
    no_metrics: bool,
}

impl RunCommand {
    /// Command line flags take precedence over file and environment
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(parallelism) = self.parallelism {
            settings.engine.parallelism = parallelism;
        }
        if self.flush_on_shutdown {
            settings.engine.flush_on_shutdown = true;
        }
        if self.deterministic_ids {
            settings.engine.id_strategy = IdStrategy::Deterministic;
        }
        if self.no_metrics {
            settings.observability.metrics_enabled = false;
        }
    }

    pub async fn execute(&self, settings: Settings) -> anyhow::Result<()> {
        settings.validate()?;

        let registry = Arc::new(MetricsRegistry::new());
        let metrics = EngineMetrics::registered(&registry);
        let ready = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let server = if settings.observability.metrics_enabled {
            let server = MetricsServer::new(
                settings.observability.metrics_server(),
                registry,
                Arc::clone(&metrics),
            )
            .with_readiness(Arc::clone(&ready));
            let token = shutdown.clone();
            Some(tokio::spawn(async move { server.start(token).await }))
        } else {
            None
        };

        // First ctrl-c stops reading and drains, a second one abandons a stuck sink
        let interrupt = CancellationToken::new();
        let (signal, abort) = (shutdown.clone(), interrupt.clone());
        tokio::spawn(async move {
            for token in [signal, abort] {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for shutdown signal");
                    return;
                }
                info!("Received shutdown signal");
                token.cancel();
            }
        });

        let sink = self.sink(&settings).await?;
        let mut source = self.source(&settings).await?;

        let mut engine = StreamExecutor::new(settings.engine_config(), sink)
            .with_metrics(metrics)
            .with_readiness(ready)
            .with_cancellation(interrupt.clone())
            .start()?;

        let outcome = engine.run_source(source.as_mut(), shutdown.clone()).await;
        if let Err(e) = &outcome {
            error!(error = %e, "Source failed, shutting down");
        }

        let stats = engine.shutdown().await?;
        info!(
            samples_received = stats.samples_received,
            samples_rejected = stats.samples_rejected,
            late_samples = stats.late_samples,
            windows_fired = stats.windows_fired,
            results_emitted = stats.results_emitted,
            watermark = stats.current_watermark,
            "Run complete"
        );

        shutdown.cancel();
        if let Some(server) = server {
            if let Err(e) = server.await? {
                warn!(error = %e, "Metrics server stopped with an error");
            }
        }

        outcome.map_err(Into::into)
    }

    async fn source(&self, settings: &Settings) -> anyhow::Result<Box<dyn SampleSource>> {
        if settings.kafka.enabled {
            return kafka_source(settings);
        }

        if self.input == "-" {
            return Ok(Box::new(NdjsonSource::stdin()));
        }
        let file = tokio::fs::File::open(&self.input)
            .await
            .with_context(|| format!("failed to open input {}", self.input))?;
        Ok(Box::new(NdjsonSource::new(
            BufReader::new(file),
            self.input.clone(),
        )))
    }

    async fn sink(&self, settings: &Settings) -> anyhow::Result<Arc<dyn ResultSink>> {
        if settings.kafka.enabled {
            return kafka_sink(settings);
        }

        if self.output == "-" {
            return Ok(Arc::new(WriterSink::stdout()));
        }
        let path = PathBuf::from(&self.output);
        let file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("failed to create output {}", path.display()))?;
        Ok(Arc::new(WriterSink::new(
            BufWriter::new(file),
            self.output.clone(),
        )))
    }
}

#[cfg(feature = "kafka")]
fn kafka_source(settings: &Settings) -> anyhow::Result<Box<dyn SampleSource>> {
    use processor::kafka::{KafkaSource, KafkaSourceConfig};

    let config = KafkaSourceConfig {
        brokers: settings.kafka.brokers.clone(),
        group_id: settings.kafka.group_id.clone(),
        topic: settings.kafka.input_topic.clone(),
        ..KafkaSourceConfig::default()
    };
    Ok(Box::new(KafkaSource::new(config)?))
}

#[cfg(feature = "kafka")]
fn kafka_sink(settings: &Settings) -> anyhow::Result<Arc<dyn ResultSink>> {
    use processor::kafka::{KafkaSink, KafkaSinkConfig};

    let config = KafkaSinkConfig {
        brokers: settings.kafka.brokers.clone(),
        topic: settings.kafka.output_topic.clone(),
        ..KafkaSinkConfig::default()
    };
    Ok(Arc::new(KafkaSink::new(config)?))
}

#[cfg(not(feature = "kafka"))]
fn kafka_source(_settings: &Settings) -> anyhow::Result<Box<dyn SampleSource>> {
    anyhow::bail!("kafka.enabled is set but this binary was built without the `kafka` feature")
}

#[cfg(not(feature = "kafka"))]
fn kafka_sink(_settings: &Settings) -> anyhow::Result<Arc<dyn ResultSink>> {
    anyhow::bail!("kafka.enabled is set but this binary was built without the `kafka` feature")
}
