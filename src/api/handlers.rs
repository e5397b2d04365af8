use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tokio::time;
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{
        ClaimRequest, HealthDto, HistoryQuery, LatestQuery, LinkSensorRequest, SensorStatusDto,
        ToggleRequest, WateredRequest, WateredResponse, WateringRecordsQuery,
    },
    errors::AppError,
    AppState,
};
use crate::{
    alerts::{AlertKind, AlertRecord},
    dashboard::{AlertLists, AlertedPlant, Banner, DashboardSnapshot, PlantCard},
    error::ServiceError,
    evaluator::{self, HistoryWindow, HumidityStatus, WateringStatus},
    plants::models::{NewPlant, Plant, PlantPatch, WateringRecord},
    sensors::{
        claim::UnclaimedDevice,
        models::{ReadingInput, SensorReading},
    },
    settings::{
        models::{Calibration, TemperatureUnit, Theme},
        SettingToggle, Settings,
    },
};

/// Upper bound for `?wait_secs=` on the latest-reading long poll.
const MAX_WAIT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Plants
// ---------------------------------------------------------------------------

/// List an owner's plants, newest first.
#[utoipa::path(
    get,
    path = "/users/{owner}/plants",
    params(("owner" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Plants of the owner", body = Vec<Plant>),
        (status = 503, description = "Document store unavailable"),
    ),
    tag = "plants"
)]
pub async fn list_plants(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<Plant>>, AppError> {
    Ok(Json(state.plants.list(&owner).await?))
}

/// Create a plant. It counts as watered at creation time.
#[utoipa::path(
    post,
    path = "/users/{owner}/plants",
    params(("owner" = String, Path, description = "Owner id")),
    request_body = NewPlant,
    responses(
        (status = 201, description = "Plant created", body = Plant),
        (status = 400, description = "Missing name/species or non-positive interval"),
        (status = 503, description = "Document store unavailable"),
    ),
    tag = "plants"
)]
pub async fn create_plant(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(body): Json<NewPlant>,
) -> Result<(StatusCode, Json<Plant>), AppError> {
    let plant = state.plants.create(&owner, body, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(plant)))
}

#[utoipa::path(
    get,
    path = "/users/{owner}/plants/{plant_id}",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("plant_id" = Uuid, Path, description = "Plant id"),
    ),
    responses(
        (status = 200, description = "The plant", body = Plant),
        (status = 404, description = "No such plant for this owner"),
    ),
    tag = "plants"
)]
pub async fn get_plant(
    State(state): State<AppState>,
    Path((owner, plant_id)): Path<(String, Uuid)>,
) -> Result<Json<Plant>, AppError> {
    Ok(Json(state.plants.get(&owner, plant_id).await?))
}

/// Partial update. An empty `sensor_id` unlinks the sensor.
#[utoipa::path(
    patch,
    path = "/users/{owner}/plants/{plant_id}",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("plant_id" = Uuid, Path, description = "Plant id"),
    ),
    request_body = PlantPatch,
    responses(
        (status = 200, description = "Updated plant", body = Plant),
        (status = 400, description = "Invalid field value"),
        (status = 404, description = "No such plant for this owner"),
    ),
    tag = "plants"
)]
pub async fn update_plant(
    State(state): State<AppState>,
    Path((owner, plant_id)): Path<(String, Uuid)>,
    Json(patch): Json<PlantPatch>,
) -> Result<Json<Plant>, AppError> {
    Ok(Json(state.plants.update(&owner, plant_id, patch).await?))
}

/// Delete a plant. Its watering records and sensor history are kept.
#[utoipa::path(
    delete,
    path = "/users/{owner}/plants/{plant_id}",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("plant_id" = Uuid, Path, description = "Plant id"),
    ),
    responses(
        (status = 204, description = "Plant deleted"),
        (status = 404, description = "No such plant for this owner"),
    ),
    tag = "plants"
)]
pub async fn delete_plant(
    State(state): State<AppState>,
    Path((owner, plant_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.plants.delete(&owner, plant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/users/{owner}/plants/{plant_id}/watered",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("plant_id" = Uuid, Path, description = "Plant id"),
    ),
    request_body = WateredRequest,
    responses(
        (status = 200, description = "Plant rescheduled and watering recorded", body = WateredResponse),
        (status = 400, description = "No due date can follow the watering time"),
        (status = 404, description = "No such plant for this owner"),
        (status = 503, description = "Store unavailable; nothing was written"),
    ),
    tag = "plants"
)]
pub async fn mark_watered(
    State(state): State<AppState>,
    Path((owner, plant_id)): Path<(String, Uuid)>,
    Json(body): Json<WateredRequest>,
) -> Result<Json<WateredResponse>, AppError> {
    let at = body.watered_at.unwrap_or_else(|| state.clock.now());
    let (plant, record) = state
        .plants
        .mark_watered(&owner, plant_id, at, body.notes)
        .await?;
    Ok(Json(WateredResponse { plant, record }))
}

#[utoipa::path(
    put,
    path = "/users/{owner}/plants/{plant_id}/sensor",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("plant_id" = Uuid, Path, description = "Plant id"),
    ),
    request_body = LinkSensorRequest,
    responses(
        (status = 200, description = "Sensor linked", body = Plant),
        (status = 400, description = "Empty sensor id"),
        (status = 404, description = "No such plant for this owner"),
    ),
    tag = "plants"
)]
pub async fn link_sensor(
    State(state): State<AppState>,
    Path((owner, plant_id)): Path<(String, Uuid)>,
    Json(body): Json<LinkSensorRequest>,
) -> Result<Json<Plant>, AppError> {
    Ok(Json(
        state
            .plants
            .link_sensor(&owner, plant_id, &body.sensor_id)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/users/{owner}/plants/{plant_id}/sensor",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("plant_id" = Uuid, Path, description = "Plant id"),
    ),
    responses(
        (status = 200, description = "Sensor unlinked", body = Plant),
        (status = 404, description = "No such plant for this owner"),
    ),
    tag = "plants"
)]
pub async fn unlink_sensor(
    State(state): State<AppState>,
    Path((owner, plant_id)): Path<(String, Uuid)>,
) -> Result<Json<Plant>, AppError> {
    Ok(Json(state.plants.unlink_sensor(&owner, plant_id).await?))
}

/// Watering history, newest first.
#[utoipa::path(
    get,
    path = "/users/{owner}/watering-records",
    params(
        ("owner" = String, Path, description = "Owner id"),
        WateringRecordsQuery,
    ),
    responses(
        (status = 200, description = "Watering records", body = Vec<WateringRecord>),
    ),
    tag = "plants"
)]
pub async fn list_watering_records(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<WateringRecordsQuery>,
) -> Result<Json<Vec<WateringRecord>>, AppError> {
    Ok(Json(
        state
            .plants
            .watering_records(&owner, query.plant_id)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Every sensor of the owner that has a usable reading, with liveness.
#[utoipa::path(
    get,
    path = "/users/{owner}/sensors",
    params(("owner" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Latest reading per sensor", body = Vec<SensorStatusDto>),
    ),
    tag = "sensors"
)]
pub async fn list_sensors(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<SensorStatusDto>>, AppError> {
    let now = state.clock.now();
    let sensors = state
        .sensors
        .list_sensors(&owner)
        .await?
        .into_iter()
        .map(|reading| SensorStatusDto {
            online: evaluator::is_online(Some(&reading), now),
            reading,
        })
        .collect();
    Ok(Json(sensors))
}

/// Latest reading of one sensor, `null` when it never reported.
///
/// With `?wait_secs=N` the request waits up to N seconds (capped at 60) for
/// a newer reading before answering with whatever is current.
#[utoipa::path(
    get,
    path = "/users/{owner}/sensors/{sensor_id}/latest",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("sensor_id" = String, Path, description = "Sensor id"),
        LatestQuery,
    ),
    responses(
        (status = 200, description = "Latest reading or null", body = SensorReading),
    ),
    tag = "sensors"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
    Path((owner, sensor_id)): Path<(String, String)>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<Option<SensorReading>>, AppError> {
    let wait = query.wait_secs.unwrap_or(0).min(MAX_WAIT_SECS);
    if wait == 0 {
        return Ok(Json(state.sensors.latest(&owner, &sensor_id).await?));
    }

    let mut sub = state.sensors.subscribe_latest(&owner, &sensor_id).await;
    let reading = match time::timeout(Duration::from_secs(wait), sub.changed()).await {
        Ok(Some(next)) => next,
        _ => sub.current(),
    };
    sub.unsubscribe();
    Ok(Json(reading))
}

/// Record a reading as the sensor's latest value and append it to history.
#[utoipa::path(
    post,
    path = "/users/{owner}/sensors/{sensor_id}/readings",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("sensor_id" = String, Path, description = "Sensor id"),
    ),
    request_body = ReadingInput,
    responses(
        (status = 201, description = "Reading stored", body = SensorReading),
        (status = 400, description = "Invalid sensor id"),
    ),
    tag = "sensors"
)]
pub async fn ingest_reading(
    State(state): State<AppState>,
    Path((owner, sensor_id)): Path<(String, String)>,
    Json(body): Json<ReadingInput>,
) -> Result<(StatusCode, Json<SensorReading>), AppError> {
    let reading = state
        .sensors
        .publish(&owner, &sensor_id, body, state.clock.now())
        .await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

/// The last 100 history entries, oldest first, limited to a time window.
#[utoipa::path(
    get,
    path = "/users/{owner}/sensors/{sensor_id}/history",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("sensor_id" = String, Path, description = "Sensor id"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "History entries", body = Vec<SensorReading>),
        (status = 400, description = "Unknown window"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_history(
    State(state): State<AppState>,
    Path((owner, sensor_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SensorReading>>, AppError> {
    let window = match query.window.as_deref() {
        None => HistoryWindow::All,
        Some(raw) => raw
            .parse::<HistoryWindow>()
            .map_err(|e| ServiceError::Validation(e.to_string()))?,
    };
    Ok(Json(
        state
            .sensors
            .history(&owner, &sensor_id, window, state.clock.now())
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// The stored settings, or the defaults when none are stored.
#[utoipa::path(
    get,
    path = "/users/{owner}/settings",
    params(("owner" = String, Path, description = "Owner id")),
    responses((status = 200, description = "Settings", body = Settings)),
    tag = "settings"
)]
pub async fn get_settings(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<Settings>, AppError> {
    Ok(Json(state.settings.get_or_default(&owner).await?))
}

#[utoipa::path(
    put,
    path = "/users/{owner}/settings",
    params(("owner" = String, Path, description = "Owner id")),
    request_body = Settings,
    responses((status = 200, description = "Settings saved", body = Settings)),
    tag = "settings"
)]
pub async fn save_settings(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(body): Json<Settings>,
) -> Result<Json<Settings>, AppError> {
    state.settings.save_all(&owner, &body).await?;
    Ok(Json(body))
}

#[utoipa::path(
    delete,
    path = "/users/{owner}/settings",
    params(("owner" = String, Path, description = "Owner id")),
    responses((status = 200, description = "Defaults restored", body = Settings)),
    tag = "settings"
)]
pub async fn reset_settings(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<Settings>, AppError> {
    Ok(Json(state.settings.reset(&owner).await?))
}

/// Flip one toggle without touching the rest of the record.
#[utoipa::path(
    patch,
    path = "/users/{owner}/settings/toggles/{toggle}",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("toggle" = SettingToggle, Path, description = "Toggle name"),
    ),
    request_body = ToggleRequest,
    responses((status = 200, description = "Settings after the write", body = Settings)),
    tag = "settings"
)]
pub async fn set_setting_toggle(
    State(state): State<AppState>,
    Path((owner, toggle)): Path<(String, SettingToggle)>,
    Json(body): Json<ToggleRequest>,
) -> Result<Json<Settings>, AppError> {
    Ok(Json(
        state
            .settings
            .set_toggle(&owner, toggle, body.enabled)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// The alert log, newest first.
#[utoipa::path(
    get,
    path = "/users/{owner}/alerts",
    params(("owner" = String, Path, description = "Owner id")),
    responses((status = 200, description = "Alert log", body = Vec<AlertRecord>)),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<AlertRecord>>, AppError> {
    Ok(Json(state.alerts.list(&owner).await?))
}

#[utoipa::path(
    post,
    path = "/users/{owner}/alerts/{alert_id}/read",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("alert_id" = String, Path, description = "Alert id"),
    ),
    responses(
        (status = 200, description = "Alert marked read", body = AlertRecord),
        (status = 404, description = "No such alert"),
    ),
    tag = "alerts"
)]
pub async fn mark_alert_read(
    State(state): State<AppState>,
    Path((owner, alert_id)): Path<(String, String)>,
) -> Result<Json<AlertRecord>, AppError> {
    Ok(Json(state.alerts.mark_read(&owner, &alert_id).await?))
}

#[utoipa::path(
    delete,
    path = "/users/{owner}/alerts/{alert_id}",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("alert_id" = String, Path, description = "Alert id"),
    ),
    responses(
        (status = 204, description = "Alert deleted"),
        (status = 404, description = "No such alert"),
    ),
    tag = "alerts"
)]
pub async fn delete_alert(
    State(state): State<AppState>,
    Path((owner, alert_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.alerts.delete(&owner, &alert_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Device claims
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/devices/unclaimed",
    responses((status = 200, description = "Announced devices", body = Vec<UnclaimedDevice>)),
    tag = "devices"
)]
pub async fn list_unclaimed_devices(
    State(state): State<AppState>,
) -> Result<Json<Vec<UnclaimedDevice>>, AppError> {
    Ok(Json(state.claims.list().await?))
}

/// Device side of the handshake: announce (or refresh) a device.
#[utoipa::path(
    post,
    path = "/devices/unclaimed/{device_id}",
    params(("device_id" = String, Path, description = "Device id")),
    responses((status = 200, description = "Device announced", body = UnclaimedDevice)),
    tag = "devices"
)]
pub async fn announce_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<UnclaimedDevice>, AppError> {
    Ok(Json(
        state
            .claims
            .announce(&device_id, state.clock.now())
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/devices/unclaimed/{device_id}/claim",
    params(("device_id" = String, Path, description = "Device id")),
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "Device claimed", body = UnclaimedDevice),
        (status = 404, description = "Device never announced"),
        (status = 409, description = "Device claimed by another owner"),
    ),
    tag = "devices"
)]
pub async fn claim_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<ClaimRequest>,
) -> Result<Json<UnclaimedDevice>, AppError> {
    Ok(Json(state.claims.claim(&device_id, &body.owner).await?))
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Alert lists, banners and plant cards evaluated at the current time.
#[utoipa::path(
    get,
    path = "/users/{owner}/dashboard",
    params(("owner" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Dashboard snapshot", body = DashboardSnapshot),
        (status = 503, description = "A store is unavailable"),
    ),
    tag = "dashboard"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    Ok(Json(state.dashboard.snapshot(&owner).await?))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthDto)),
    tag = "system"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_owned(),
        document_store: state.plants.backend().to_owned(),
    })
}

// ---------------------------------------------------------------------------
// OpenAPI document (used in api/mod.rs)
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        list_plants,
        create_plant,
        get_plant,
        update_plant,
        delete_plant,
        mark_watered,
        link_sensor,
        unlink_sensor,
        list_watering_records,
        list_sensors,
        get_latest_reading,
        ingest_reading,
        get_sensor_history,
        get_settings,
        save_settings,
        reset_settings,
        set_setting_toggle,
        list_alerts,
        mark_alert_read,
        delete_alert,
        list_unclaimed_devices,
        announce_device,
        claim_device,
        get_dashboard,
        health,
    ),
    components(schemas(
        Plant,
        NewPlant,
        PlantPatch,
        WateringRecord,
        WateredRequest,
        WateredResponse,
        LinkSensorRequest,
        SensorReading,
        SensorStatusDto,
        ReadingInput,
        Settings,
        Calibration,
        TemperatureUnit,
        Theme,
        SettingToggle,
        ToggleRequest,
        AlertRecord,
        AlertKind,
        UnclaimedDevice,
        ClaimRequest,
        DashboardSnapshot,
        AlertLists,
        AlertedPlant,
        Banner,
        PlantCard,
        HumidityStatus,
        WateringStatus,
        HistoryWindow,
        HealthDto,
    )),
    tags(
        (name = "plants", description = "Plant registry and watering"),
        (name = "sensors", description = "Sensor readings and history"),
        (name = "settings", description = "Per-owner preferences"),
        (name = "alerts", description = "Alert log"),
        (name = "devices", description = "Device claim handshake"),
        (name = "dashboard", description = "Derived alert state"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Orchid Monitor API",
        version = "0.1.0",
        description = "REST API for orchid care monitoring"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
