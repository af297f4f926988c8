use chrono::Utc;
use food_rescue::collaborators::{Collaborators, KnownLocations};
use food_rescue::config::RescueConfig;
use food_rescue::error::AppError;
use food_rescue::workflows::rescue::{MatchingConfig, Registry, RescueCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MIN_TICK: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Geocoder entries for addresses that arrive without coordinates.
pub(crate) fn load_address_book(config: &RescueConfig) -> Result<KnownLocations, AppError> {
    let Some(path) = &config.locations_path else {
        warn!("no address book configured; only addresses with coordinates can be matched");
        return Ok(KnownLocations::new());
    };
    let locations = KnownLocations::from_path(path)?;
    info!(path = %path.display(), known = locations.len(), "address book loaded");
    Ok(locations)
}

/// Coordinator with offline collaborators: no AI backends, logged
/// notifications, and distances from embedded or known coordinates.
pub(crate) fn offline_coordinator(
    config: &RescueConfig,
    locations: KnownLocations,
) -> Arc<RescueCoordinator> {
    Arc::new(RescueCoordinator::new(
        Arc::new(Registry::new()),
        Collaborators::offline(locations),
        MatchingConfig::from(config),
    ))
}

/// Periodically expire stale offers and past-deadline entities.
pub(crate) fn spawn_sweep_task(
    coordinator: Arc<RescueCoordinator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
        loop {
            ticker.tick().await;
            match coordinator.sweep(Utc::now()) {
                Ok(report) => debug!(
                    expired_offers = report.expired_offers.len(),
                    lapsed = report.lapsed_matches.len(),
                    "scheduled sweep finished"
                ),
                Err(err) => warn!(error = %err, "scheduled sweep failed"),
            }
        }
    })
}

/// Periodically run a matching cycle over everything still open.
pub(crate) fn spawn_matching_task(
    coordinator: Arc<RescueCoordinator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_TICK));
        loop {
            ticker.tick().await;
            match coordinator.run_matching_cycle(Utc::now()).await {
                Ok(report) => debug!(
                    proposed = report.proposed.len(),
                    offered = report.offered.len(),
                    "scheduled matching cycle finished"
                ),
                Err(err) => warn!(error = %err, "scheduled matching cycle failed"),
            }
        }
    })
}

pub(crate) fn spawn_background_tasks(
    coordinator: &Arc<RescueCoordinator>,
    config: &RescueConfig,
) -> Vec<JoinHandle<()>> {
    let handles = vec![
        spawn_sweep_task(coordinator.clone(), config.sweep_interval),
        spawn_matching_task(coordinator.clone(), config.match_interval),
    ];
    info!(
        sweep_secs = config.sweep_interval.as_secs(),
        match_secs = config.match_interval.as_secs(),
        "background rescue tasks started"
    );
    handles
}
