use crate::cli::ServeArgs;
use crate::infra::{load_address_book, offline_coordinator, spawn_background_tasks, AppState};
use crate::routes::with_rescue_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use food_rescue::config::AppConfig;
use food_rescue::error::AppError;
use food_rescue::telemetry;
use food_rescue::workflows::roster::RosterImporter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.locations.take() {
        config.rescue.locations_path = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let locations = load_address_book(&config.rescue)?;
    let coordinator = offline_coordinator(&config.rescue, locations);

    if let Some(path) = args.roster.take() {
        let import = RosterImporter::from_path(&path)?;
        let registration = coordinator.register_roster(import, Utc::now())?;
        for issue in &registration.issues {
            warn!(line = issue.line, reason = %issue.reason, "roster row skipped");
        }
        info!(
            path = %path.display(),
            registered = registration.registered.len(),
            "volunteer roster loaded"
        );
    }

    let background = spawn_background_tasks(&coordinator, &config.rescue);

    let app = with_rescue_routes(coordinator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "food rescue dispatcher ready");

    let served = axum::serve(listener, app).await;
    for handle in background {
        handle.abort();
    }
    served?;
    Ok(())
}
