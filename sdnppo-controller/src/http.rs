/**
 * API REST SDN-PPO - Surface de contrôle exposée à l'agent externe
 *
 * ROUTES :
 * - GET  /sdnppo/state   -> snapshot métriques (ts rafraîchi à la lecture)
 * - POST /sdnppo/action  -> {"u": <float>} borné à [0,1], renvoie u + meter_kbps
 * - POST /sdnppo/reset   -> remet à zéro métriques et bookkeeping, garde u
 * - GET  /health, /sdnppo/health
 *
 * Un corps illisible ou sans `u` n'est jamais rejeté : u = 0.5 est appliqué.
 * Pas d'authentification.
 */

use crate::controller::Controller;
use crate::health::ControllerHealth;
use crate::meter::DEFAULT_CONTROL;
use crate::models::MetricsSnapshot;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone)]
pub struct AppState {
    pub controller: Controller,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    pub ok: bool,
    pub u: f64,
    pub meter_kbps: u64,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sdnppo/health", get(get_health))
        .route("/sdnppo/state", get(get_state))
        .route("/sdnppo/action", post(set_action))
        .route("/sdnppo/reset", post(reset))
        .with_state(app_state)
}

/// Extrait `u` du corps JSON; nombre ou chaîne numérique, sinon valeur par défaut.
pub fn parse_control(body: &[u8]) -> f64 {
    let payload: Option<Value> = serde_json::from_slice(body).ok();
    payload
        .as_ref()
        .and_then(|p| p.get("u"))
        .and_then(|u| match u {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|u| u.is_finite())
        .unwrap_or(DEFAULT_CONTROL)
}

// GET /sdnppo/state
async fn get_state(State(app): State<AppState>) -> Json<MetricsSnapshot> {
    Json(app.controller.state())
}

// POST /sdnppo/action
async fn set_action(State(app): State<AppState>, body: Bytes) -> Json<ActionReply> {
    let update = app.controller.apply_control(parse_control(&body));
    Json(ActionReply { ok: true, u: update.state.u, meter_kbps: update.state.meter_kbps })
}

// POST /sdnppo/reset
async fn reset(State(app): State<AppState>) -> Json<Value> {
    app.controller.reset();
    Json(serde_json::json!({ "ok": true }))
}

// GET /sdnppo/health
async fn get_health(State(app): State<AppState>) -> Json<ControllerHealth> {
    Json(app.controller.health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;

    fn app() -> AppState {
        AppState { controller: Controller::new(ControllerConfig::default()) }
    }

    #[test]
    fn control_parsing_defaults() {
        assert_eq!(parse_control(br#"{"u": 0.25}"#), 0.25);
        assert_eq!(parse_control(br#"{"u": "0.7"}"#), 0.7);
        assert_eq!(parse_control(br#"{"u": 3}"#), 3.0);
        assert_eq!(parse_control(br#"{"x": 1}"#), 0.5);
        assert_eq!(parse_control(br#"{"u": null}"#), 0.5);
        assert_eq!(parse_control(b"not json"), 0.5);
        assert_eq!(parse_control(b""), 0.5);
    }

    #[tokio::test]
    async fn action_clamps_and_reports_rate() {
        let app = app();
        let Json(reply) = set_action(State(app.clone()), Bytes::from_static(br#"{"u": 1.5}"#)).await;
        assert_eq!(reply, ActionReply { ok: true, u: 1.0, meter_kbps: 20000 });
        let Json(state) = get_state(State(app.clone())).await;
        assert_eq!((state.u, state.meter_kbps), (1.0, 20000));

        let Json(reply) = set_action(State(app), Bytes::from_static(b"{garbage")).await;
        assert_eq!(reply.u, 0.5);
        assert_eq!(reply.meter_kbps, 11000);
    }

    #[tokio::test]
    async fn reset_zeroes_metrics() {
        let app = app();
        app.controller.apply_control(0.0);
        app.controller.flow_book().record(1, crate::models::now_ts());
        app.controller.telemetry().cleanup(crate::models::now_ts());
        assert_eq!(get_state(State(app.clone())).await.0.active_flows, 1);

        let Json(reply) = reset(State(app.clone())).await;
        assert_eq!(reply, serde_json::json!({ "ok": true }));
        let Json(state) = get_state(State(app)).await;
        assert_eq!(state.active_flows, 0);
        assert_eq!(state.mean_util, 0.0);
        assert_eq!(state.u, 0.0);
    }

    #[tokio::test]
    async fn state_serializes_expected_keys() {
        let Json(state) = get_state(State(app())).await;
        let json = serde_json::to_value(&state).unwrap();
        for key in ["ts", "u", "meter_kbps", "mean_util", "max_util", "drop_rate", "throughput_mbps", "active_flows"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
