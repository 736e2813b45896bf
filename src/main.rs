/**
 * TOASTER KERNEL - Point d'entrée principal du backend grille-pain
 *
 * RÔLE : Orchestration des modules : config, machine à états, reconciler,
 * registre d'appareils, HTTP. Bootstrap complet avec arrêt propre.
 *
 * ARCHITECTURE : état partagé sous mutex + tâche de fond périodique + API REST.
 * Aucune persistance : tout l'état vit en mémoire le temps du process.
 */

mod config;
mod devices;
mod health;
mod http;
mod reconciler;
mod toaster;

use crate::config::load_config;
use crate::devices::{DeviceRegistry, SharedDevices};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::toaster::{SharedToaster, ToasterMachine};

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await;

    // état partagé : une seule machine à états pour tout le process
    let toaster: SharedToaster = Arc::new(ToasterMachine::new());
    let devices: SharedDevices = Arc::new(DeviceRegistry::new());
    let health_tracker = HealthTracker::new();

    // canal d'arrêt pour les tâches de fond
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // démarre la boucle d'auto-expiration
    reconciler::spawn_reconciler(toaster.clone(), cfg.reconcile_interval_ms(), shutdown_rx);

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        toaster,
        devices,
        health_tracker,
        cfg: cfg.clone(),
    };

    // HTTP
    let app = http::build_router(app_state);

    let addr = cfg.bind_addr();
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .unwrap();
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    tokio::signal::ctrl_c().await.ok();
    println!("[kernel] shutdown requested");
    let _ = shutdown_tx.send(true);
}
