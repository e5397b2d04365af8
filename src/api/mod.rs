pub mod dto;
pub mod errors;
pub mod handlers;

use std::{sync::Arc, time::Duration};

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    alerts::AlertLog,
    clock::Clock,
    dashboard::DashboardAggregator,
    plants::PlantRegistry,
    sensors::{ClaimDesk, SensorStreamAdapter},
    settings::SettingsStore,
    store::{DocumentStore, RealtimeStore},
};
use handlers::ApiDoc;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub plants: PlantRegistry,
    pub sensors: SensorStreamAdapter,
    pub settings: SettingsStore,
    pub alerts: AlertLog,
    pub claims: ClaimDesk,
    pub dashboard: DashboardAggregator,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        realtime: Arc<dyn RealtimeStore>,
        clock: Arc<dyn Clock>,
        refresh: Duration,
    ) -> Self {
        let plants = PlantRegistry::new(documents);
        let sensors = SensorStreamAdapter::new(realtime.clone());
        let settings = SettingsStore::new(realtime.clone());
        let dashboard = DashboardAggregator::new(
            plants.clone(),
            sensors.clone(),
            settings.clone(),
            clock.clone(),
            refresh,
        );
        Self {
            plants,
            sensors,
            settings,
            alerts: AlertLog::new(realtime.clone()),
            claims: ClaimDesk::new(realtime),
            dashboard,
            clock,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/health", get(handlers::health))
        .route(
            "/users/{owner}/plants",
            get(handlers::list_plants).post(handlers::create_plant),
        )
        .route(
            "/users/{owner}/plants/{plant_id}",
            get(handlers::get_plant)
                .patch(handlers::update_plant)
                .delete(handlers::delete_plant),
        )
        .route(
            "/users/{owner}/plants/{plant_id}/watered",
            post(handlers::mark_watered),
        )
        .route(
            "/users/{owner}/plants/{plant_id}/sensor",
            put(handlers::link_sensor).delete(handlers::unlink_sensor),
        )
        .route(
            "/users/{owner}/watering-records",
            get(handlers::list_watering_records),
        )
        .route("/users/{owner}/sensors", get(handlers::list_sensors))
        .route(
            "/users/{owner}/sensors/{sensor_id}/latest",
            get(handlers::get_latest_reading),
        )
        .route(
            "/users/{owner}/sensors/{sensor_id}/readings",
            post(handlers::ingest_reading),
        )
        .route(
            "/users/{owner}/sensors/{sensor_id}/history",
            get(handlers::get_sensor_history),
        )
        .route(
            "/users/{owner}/settings",
            get(handlers::get_settings)
                .put(handlers::save_settings)
                .delete(handlers::reset_settings),
        )
        .route(
            "/users/{owner}/settings/toggles/{toggle}",
            patch(handlers::set_setting_toggle),
        )
        .route("/users/{owner}/alerts", get(handlers::list_alerts))
        .route(
            "/users/{owner}/alerts/{alert_id}/read",
            post(handlers::mark_alert_read),
        )
        .route(
            "/users/{owner}/alerts/{alert_id}",
            delete(handlers::delete_alert),
        )
        .route("/devices/unclaimed", get(handlers::list_unclaimed_devices))
        .route(
            "/devices/unclaimed/{device_id}",
            post(handlers::announce_device),
        )
        .route(
            "/devices/unclaimed/{device_id}/claim",
            post(handlers::claim_device),
        )
        .route("/users/{owner}/dashboard", get(handlers::get_dashboard))
        .with_state(state)
        .split_for_parts();

    router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
