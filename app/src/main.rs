use std::sync::Arc;

use anyhow::Context as _;
use settings::Settings;
use tokio_util::sync::CancellationToken;

use crate::adapter::backend::HttpBackend;
use crate::control::ControlRunner;
use crate::persistence::{FileSettingsStore, MemorySettingsStore, SettingsStore};

mod actuator;
mod adapter;
mod control;
mod core;
mod persistence;
mod settings;
mod thermostat;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() -> anyhow::Result<()> {
    let settings = Settings::new().context("Error reading configuration")?;

    settings
        .monitoring
        .init()
        .map_err(|e| anyhow::anyhow!("Error initializing monitoring: {}", e))?;

    let store = open_store(&settings)?;
    let backend = Arc::new(HttpBackend::new(&settings.backend)?);
    let cancel = CancellationToken::new();

    let control_runner = ControlRunner::new(
        backend,
        store.clone(),
        &settings.thermostat,
        &settings.actuator,
        &settings.backend,
        cancel.clone(),
    );

    let http_server_exec = {
        let http_control_client = control_runner.client();
        let http_server = settings.http_server.clone();

        async move {
            http_server
                .run_server(move || vec![adapter::control_panel::new_routes(http_control_client.clone())])
                .await
        }
    };

    let settings_log = {
        let mut listener = store.subscribe();

        async move {
            while let Some(change) = listener.recv().await {
                tracing::debug!("Setting {} changed to {:?}", change.key, change.value);
            }
        }
    };

    tracing::info!("Starting main loop, backend at {}", settings.backend.url);

    let control_exec = control_runner.run();
    tokio::pin!(control_exec);

    tokio::select!(
        result = http_server_exec => result.context("HTTP server execution failed")?,
        _ = &mut control_exec => tracing::warn!("Control loop ended unexpectedly"),
        _ = settings_log => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            cancel.cancel();
            control_exec.await;
        }
    );

    Ok(())
}

fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn SettingsStore>> {
    match &settings.store.path {
        Some(path) => {
            tracing::info!("Persisting controls to {}", path);
            Ok(Arc::new(FileSettingsStore::open(path)?))
        }
        None => {
            tracing::warn!("No settings file configured, controls are kept in memory only");
            Ok(Arc::new(MemorySettingsStore::default()))
        }
    }
}
