use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use trifactor_core::Modality;

mod capture;
mod config;
mod dbus_interface;
mod engine;
mod rate_limiter;
mod store;

use capture::CaptureWindow;
use config::Config;
use dbus_interface::{AppState, TrifactorService};
use engine::{cosine_factory, spawn_engine, EngineConfig};
use rate_limiter::{Limits, RateLimiter};
use store::ReferenceStore;

const BUS_NAME: &str = "org.freedesktop.Trifactor1";
const OBJECT_PATH: &str = "/org/freedesktop/Trifactor1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("trifactord starting");

    let config = Config::from_env();
    tracing::info!(db = %config.db_path.display(), session_bus = config.session_bus, "configured");

    let store = ReferenceStore::open(&config.db_path).await?;

    let engine = spawn_engine(
        EngineConfig {
            face: config.modality_config(Modality::Face),
            palm: config.modality_config(Modality::Palm),
            voice: config.modality_config(Modality::Voice),
            compare_timeout: Duration::from_secs(config.compare_timeout_secs),
        },
        cosine_factory(),
    );

    let capture = CaptureWindow::new(
        Some(config.blink_threshold),
        Duration::from_secs(config.liveness_arm_timeout_secs),
    );

    let state = Arc::new(Mutex::new(AppState {
        config,
        engine,
        store,
        rate_limiter: RateLimiter::new(Limits::default()),
        capture,
    }));

    let session_bus = state.lock().await.config.session_bus;
    let service = TrifactorService { state };

    let builder = if session_bus {
        tracing::warn!("registering on the session bus (development mode)");
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };

    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "trifactord ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("trifactord shutting down");

    Ok(())
}
