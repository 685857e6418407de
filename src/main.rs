//! shelfd server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use shelfd::admission::{self, AdmissionControl, AdmissionState};
use shelfd::api::{self, AppState};
use shelfd::clock::{Clock, SystemClock};
use shelfd::config::Config;
use shelfd::db::Database;
use shelfd::http::{self, OpsState};
use shelfd::telemetry::{self, MetricsCollector, PromExporter, SystemSampler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log filter comes from RUST_LOG, defaulting to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // The config path is the sole CLI argument.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Config load failed");
        e
    })?;

    info!(
        listen = %config.server.listen,
        environment = %config.server.environment,
        "Starting shelfd"
    );

    // Opens the pool and applies migrations.
    let db = Database::new(&config.database.path).await?;

    // One clock shared by everything that measures elapsed time
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collector = Arc::new(MetricsCollector::new(&config.telemetry, clock.clone()));
    let admission_control = Arc::new(AdmissionControl::from_config(
        &config.admission,
        clock.clone(),
    )?);
    let sampler = Arc::new(SystemSampler::new());

    // Ops server is optional.
    // Convention: metrics_port = 0 disables the endpoints (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9100);
    if metrics_port == 0 {
        info!("Ops server disabled");
    } else {
        let exporter = Arc::new(PromExporter::new()?);
        let ops_state = OpsState {
            db: db.clone(),
            collector: collector.clone(),
            admission: admission_control.clone(),
            exporter,
            sampler: sampler.clone(),
            window: Duration::from_secs(config.telemetry.window_secs),
            reset_enabled: !config.server.is_production(),
        };
        tokio::spawn(async move {
            http::run_ops_server(metrics_port, ops_state).await;
        });
        info!(port = metrics_port, "Ops HTTP server started");
    }

    // Start telemetry maintenance task (runs on the configured cadence)
    {
        let collector = collector.clone();
        let admission_control = admission_control.clone();
        let period = Duration::from_secs(config.telemetry.prune_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                collector.prune_active_clients();
                debug!(
                    tracked_clients = admission_control.tracked_clients(),
                    "Telemetry maintenance completed"
                );
            }
        });
    }
    info!("Telemetry maintenance task started");

    // Books API, wrapped by admission (when enabled) and request tracking.
    // Tracking sits outermost so 429s are recorded like any other response.
    let mut books = api::router();
    if config.admission.enabled {
        books = books.layer(middleware::from_fn_with_state(
            AdmissionState::new(admission_control.clone()),
            admission::admit,
        ));
        info!("Admission control enabled");
    } else {
        info!("Admission control disabled");
    }
    let app = Router::new()
        .route("/health", get(api::health))
        .merge(books)
        .layer(middleware::from_fn_with_state(
            collector.clone(),
            telemetry::track,
        ))
        .with_state(AppState { db });

    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;
    info!(addr = %config.server.listen, "Books API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
