/**
 * API REST TOASTER - Serveur HTTP principal du kernel
 *
 * RÔLE :
 * Expose les opérations du grille-pain (start/stop/status) et le registre
 * des appareils (register/claim/list). Interface unique entre le monde
 * extérieur et la machine à états.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes /toaster et /devices
 * - Réponses JSON via serde, status texte brut pour le firmware
 * - Erreurs métier -> code HTTP + message court, jamais fatales
 *
 * COMPATIBILITÉ :
 * /toaster/start accepte GET (param `sec`) et POST (champ `duration` puis
 * `sec`). L'asymétrie est volontaire : les firmwares historiques n'envoient
 * que `sec` en GET. Un body JSON malformé vaut "absent" (durée par défaut).
 */

use crate::config::KernelConfig;
use crate::devices::{DeviceEntry, DeviceError, SharedDevices};
use crate::health::{HealthTracker, KernelHealth};
use crate::toaster::{SharedToaster, ToasterError, ToasterSnapshot};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;

#[derive(serde::Serialize)]
struct DeviceView {
    code: String,
    claimed: bool,
    owner: Option<String>,
    last_seen: String, // format RFC3339 pour l'API
}

fn to_view(d: &DeviceEntry) -> DeviceView {
    DeviceView {
        code: d.code.clone(),
        claimed: d.claimed,
        owner: d.owner.clone(),
        last_seen: d.last_seen.format(&Rfc3339).unwrap_or_default(),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub toaster: SharedToaster,
    pub devices: SharedDevices,
    pub health_tracker: HealthTracker,
    pub cfg: KernelConfig,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "toaster-kernel ok" }))
        .route("/system/health", get(get_system_health))
        .route("/toaster/register", get(register_device))
        .route("/devices/claim", post(claim_device))
        .route("/devices", get(list_devices))
        .route("/toaster/start", get(start_toasting_get).post(start_toasting_post))
        .route("/toaster/stop", get(stop_toasting))
        .route("/toaster/status", get(get_status_line))
        .route("/toaster/status.json", get(get_status_json))
        .with_state(app_state)
}

// GET /toaster/register?code=XXXX
async fn register_device(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let code = params.get("code").map(String::as_str).unwrap_or("");
    match app.devices.register(code) {
        Ok(entry) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "code": entry.code, "claimed": entry.claimed })),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "message": e.to_string() }))),
    }
}

// POST /devices/claim body {"code": "XXXX"}
async fn claim_device(State(app): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    // body malformé = absent, donc code manquant
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let Some(code) = parsed.get("code").and_then(Value::as_str) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Missing device code" })),
        );
    };

    match app.devices.claim(code) {
        Ok(entry) => (
            StatusCode::OK,
            Json(json!({ "status": "claimed", "code": entry.code, "user": entry.owner })),
        ),
        Err(e) => {
            let status = match e {
                DeviceError::NotFound(_) => StatusCode::NOT_FOUND,
                DeviceError::EmptyCode | DeviceError::AlreadyClaimed(_) => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({ "message": e.to_string() })))
        }
    }
}

// GET /devices (snapshot complet)
async fn list_devices(State(app): State<AppState>) -> Json<Vec<DeviceView>> {
    let list: Vec<DeviceView> = app.devices.list().iter().map(to_view).collect();
    Json(list)
}

// GET /toaster/start?sec=N — seul `sec` est lu en GET (compat firmware)
async fn start_toasting_get(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let duration = params
        .get("sec")
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(app.cfg.default_toast_seconds());
    start_toasting(&app, duration)
}

// POST /toaster/start body {"duration": N} ou {"sec": N}
async fn start_toasting_post(State(app): State<AppState>, body: String) -> (StatusCode, Json<Value>) {
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let duration = duration_from_body(&parsed).unwrap_or(app.cfg.default_toast_seconds());
    start_toasting(&app, duration)
}

fn start_toasting(app: &AppState, duration: i64) -> (StatusCode, Json<Value>) {
    match app.toaster.start(duration) {
        Ok(msg) => (StatusCode::OK, Json(json!({ "message": msg }))),
        Err(e @ ToasterError::AlreadyToasting) => {
            (StatusCode::CONFLICT, Json(json!({ "message": e.to_string() })))
        }
    }
}

/// `duration` prioritaire, `sec` en repli. Accepte nombre ou chaîne numérique.
fn duration_from_body(body: &Value) -> Option<i64> {
    body.get("duration")
        .and_then(value_as_secs)
        .or_else(|| body.get("sec").and_then(value_as_secs))
}

fn value_as_secs(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

// GET /toaster/stop — toujours 200, idempotent
async fn stop_toasting(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    app.toaster.stop();
    (StatusCode::OK, Json(json!({ "message": "Toasting stopped" })))
}

// GET /toaster/status — ligne texte brut pour le firmware
async fn get_status_line(State(app): State<AppState>) -> String {
    format_status_line(&app.toaster.query())
}

fn format_status_line(snap: &ToasterSnapshot) -> String {
    format!(
        "status={};remaining={};gpio={}",
        snap.status.as_str(),
        snap.remaining,
        if snap.gpio_on { 1 } else { 0 }
    )
}

// GET /toaster/status.json — état complet + registre
async fn get_status_json(State(app): State<AppState>) -> Json<Value> {
    let snap = app.toaster.query();
    let devices: Vec<DeviceView> = app.devices.list().iter().map(to_view).collect();
    Json(json!({
        "status": snap.status,
        "gpio_on": snap.gpio_on,
        "remaining": snap.remaining,
        "duration": snap.duration,
        "devices": devices,
    }))
}

// GET /system/health (état du kernel)
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.toaster, &app.devices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceRegistry;
    use crate::toaster::{ToasterMachine, ToasterStatus};
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState {
            toaster: Arc::new(ToasterMachine::new()),
            devices: Arc::new(DeviceRegistry::new()),
            health_tracker: HealthTracker::new(),
            cfg: KernelConfig::default(),
        }
    }

    #[test]
    fn post_body_prefers_duration_over_sec() {
        let body = json!({ "duration": 7, "sec": 3 });
        assert_eq!(duration_from_body(&body), Some(7));

        let body = json!({ "sec": 3 });
        assert_eq!(duration_from_body(&body), Some(3));

        let body = json!({ "duration": "12" });
        assert_eq!(duration_from_body(&body), Some(12));
    }

    #[test]
    fn malformed_body_falls_back_to_default() {
        assert_eq!(duration_from_body(&Value::Null), None);
        assert_eq!(duration_from_body(&json!({ "duration": "pain" })), None);
        assert_eq!(duration_from_body(&json!({})), None);
    }

    #[test]
    fn second_start_returns_conflict() {
        let app = test_state();

        let (status, _) = start_toasting(&app, 5);
        assert_eq!(status, StatusCode::OK);

        let (status, Json(body)) = start_toasting(&app, 3);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Already toasting");
    }

    #[tokio::test]
    async fn claim_maps_errors_to_status_codes() {
        let app = test_state();

        // code inconnu -> 404
        let (status, _) =
            claim_device(State(app.clone()), r#"{"code":"ZZZZ"}"#.to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // code absent (body malformé inclus) -> 400
        let (status, _) = claim_device(State(app.clone()), "pas du json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.devices.register("ABCD").unwrap();
        let (status, Json(body)) =
            claim_device(State(app.clone()), r#"{"code":"ABCD"}"#.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "claimed");
        assert!(body["user"].is_string());

        // double claim -> 400
        let (status, _) =
            claim_device(State(app.clone()), r#"{"code":"ABCD"}"#.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn status_line_format() {
        let toaster = ToasterMachine::new();
        let snap = toaster.query();
        assert_eq!(snap.status, ToasterStatus::Idle);
        assert_eq!(format_status_line(&snap), "status=idle;remaining=0;gpio=0");

        toaster.start(3).unwrap();
        let line = format_status_line(&toaster.query());
        assert!(line.starts_with("status=toasting;remaining="));
        assert!(line.ends_with(";gpio=1"));
    }
}
