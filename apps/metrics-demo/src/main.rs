//! Metrics demo
//!
//! Replays a ReadRows call that fails a configurable number of times before
//! succeeding, driving the tracer from a scripted clock, then prints what the
//! project's Prometheus handler recorded.

use chrono::{TimeDelta, Utc};
use clap::Parser;
use client_metrics::metadata::{ResponseParams, INSTANCE_INFORMATION_KEY, SERVER_TIMING_KEY};
use client_metrics::telemetry::{init_tracing, install_color_eyre};
use client_metrics::{
    AttemptCompleteInfo, Clock, FromEnv, MethodName, MetricsConfig, MetricsTracer,
    MetricsTracerFactory, PrometheusConfigManager, ScriptedClock, TableResource,
};
use eyre::{ensure, Result, WrapErr};
use prost::Message;
use std::sync::Arc;
use tonic::Code;
use tonic::metadata::{AsciiMetadataValue, MetadataMap, MetadataValue};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "metrics-demo")]
#[command(about = "Trace a simulated ReadRows call and print the recorded metrics")]
struct Cli {
    /// Project to export for. Overrides BIGTABLE_PROJECT_ID.
    #[arg(short, long)]
    project: Option<String>,

    #[arg(short, long, default_value = "demo-instance")]
    instance: String,

    #[arg(short, long, default_value = "demo-table")]
    table: String,

    /// Total attempts; every attempt but the last fails with UNAVAILABLE
    #[arg(short, long, default_value_t = 2)]
    attempts: u32,

    /// Rows returned by the successful attempt
    #[arg(short, long, default_value_t = 3)]
    rows: u32,

    /// Simulated time between lifecycle events, in milliseconds
    #[arg(long, default_value_t = 25)]
    step_ms: i64,

    #[arg(long, default_value = "us-west1-c")]
    zone: String,

    #[arg(long, default_value = "demo-cluster")]
    cluster: String,
}

fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();
    ensure!(cli.attempts > 0, "at least one attempt is required");
    ensure!(cli.step_ms >= 0, "step must not be negative");

    let mut config = MetricsConfig::from_env().wrap_err("Invalid metrics configuration")?;
    init_tracing(&config.environment);
    if let Some(project) = cli.project.clone() {
        config.project_id = Some(project);
    }

    let manager = PrometheusConfigManager::prometheus();
    let factory = MetricsTracerFactory::from_config(&config, &manager)?;
    let clock: Arc<dyn Clock> = Arc::new(ScriptedClock::stepping(
        Utc::now(),
        TimeDelta::milliseconds(cli.step_ms),
    ));

    let table = TableResource::new(&cli.instance, &cli.table);
    let mut tracer = factory.get_metrics_tracer(&table, MethodName::ReadRows, clock)?;
    info!(
        attempts = cli.attempts,
        rows = cli.rows,
        handlers = factory.handler_count(),
        "Replaying ReadRows"
    );
    replay(&mut tracer, &cli)?;

    if !config.enabled {
        println!("client metrics are disabled; nothing recorded");
        return Ok(());
    }
    let handler = manager.get_handler_for_key(config.handler_key(), &config.handler_options())?;
    print!("{}", handler.render());
    Ok(())
}

fn replay(tracer: &mut MetricsTracer, cli: &Cli) -> Result<()> {
    tracer.on_operation_start()?;

    for attempt in 1..cli.attempts {
        tracer.on_attempt_start()?;
        if attempt == 1 {
            // Headers without server timing: the request never reached the service.
            tracer.on_metadata_received(&MetadataMap::new())?;
            tracer.on_attempt_complete(Code::Unavailable)?;
        } else {
            tracer.on_metadata_received(&server_timing(u64::from(attempt) * 7))?;
            tracer.on_attempt_complete(AttemptCompleteInfo::new(Code::Unavailable))?;
        }
    }

    tracer.on_attempt_start()?;
    tracer.on_metadata_received(&server_timing(12))?;
    for _ in 0..cli.rows {
        tracer.on_response()?;
    }
    for _ in 0..cli.rows {
        tracer.on_read()?;
    }
    tracer.on_status_received(&location(&cli.zone, &cli.cluster))?;
    tracer.on_operation_complete(Code::Ok)?;
    Ok(())
}

fn server_timing(millis: u64) -> MetadataMap {
    let mut headers = MetadataMap::new();
    if let Ok(value) = format!("gfet4t7; dur={millis}").parse::<AsciiMetadataValue>() {
        headers.insert(SERVER_TIMING_KEY, value);
    }
    headers
}

fn location(zone: &str, cluster: &str) -> MetadataMap {
    let payload = ResponseParams {
        zone_id: Some(zone.to_string()),
        cluster_id: Some(cluster.to_string()),
    }
    .encode_to_vec();
    let mut trailers = MetadataMap::new();
    trailers.insert_bin(INSTANCE_INFORMATION_KEY, MetadataValue::from_bytes(&payload));
    trailers
}
