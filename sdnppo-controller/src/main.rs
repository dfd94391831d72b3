/**
 * SDNPPO CONTROLLER - Point d'entrée principal
 *
 * RÔLE : Charge la config, démarre le dispatch d'événements, les boucles
 * de télémétrie, le bridge southbound et l'API REST.
 */

use anyhow::Context;
use sdnppo_controller::config::load_config;
use sdnppo_controller::http::{self, AppState};
use sdnppo_controller::{event_channel, southbound, Controller};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    info!(
        link_capacity_mbps = cfg.link_capacity_mbps,
        stats_interval_s = cfg.stats_interval_s,
        rate_min_kbps = cfg.rate_min_kbps,
        rate_max_kbps = cfg.rate_max_kbps,
        "controller configuration loaded"
    );

    let controller = Controller::new(cfg.clone());
    let (events_tx, events_rx) = event_channel();

    // dispatch séquentiel des événements + boucles stats/cleanup
    controller.spawn_dispatcher(events_rx);
    controller.spawn_background_loops();

    // bridge southbound (agent protocole)
    let southbound_listener = TcpListener::bind(&cfg.southbound_addr)
        .await
        .with_context(|| format!("binding southbound listener on {}", cfg.southbound_addr))?;
    tokio::spawn(southbound::serve(southbound_listener, events_tx));

    // HTTP
    let app = http::build_router(AppState { controller });
    let listener = TcpListener::bind(&cfg.http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", cfg.http_addr))?;
    info!("listening on http://{}", cfg.http_addr);
    axum::serve(listener, app).await.context("HTTP server stopped")?;
    Ok(())
}
