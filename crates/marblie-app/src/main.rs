//! Marblie
//!
//! Windowed runner. On desktop it reads models from `assets/models` and an
//! optional JSON config named by `MARBLIE_CONFIG`; in the browser it fetches
//! the models next to the page and persists layouts to `localStorage`.

mod assets;

use std::sync::Arc;

use bevy::prelude::*;
use marblie_core::bevy::{CommandQueue, MarblieHeadlessPlugin, MarblieRenderPlugin};
use marblie_core::{AssetLibrary, KeyValueStore, MarblieConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILTER: &str = "info,wgpu=error,naga=warn";

// ============================================================================
// App
// ============================================================================

fn build_app(
    config: MarblieConfig,
    assets: AssetLibrary,
    store: Arc<dyn KeyValueStore>,
    command_queue: CommandQueue,
    window: Window,
) -> App {
    let mut app = App::new();

    app.add_plugins(
        DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(window),
                ..default()
            })
            .disable::<bevy::log::LogPlugin>(),
    );

    tracing::info!("[marblie] adding MarblieRenderPlugin");
    app.add_plugins(MarblieRenderPlugin::new(
        MarblieHeadlessPlugin::new(config, assets)
            .with_store(store)
            .with_command_queue(command_queue),
    ));
    app
}

// ============================================================================
// Native
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
fn load_config() -> anyhow::Result<MarblieConfig> {
    use anyhow::Context;

    match std::env::var("MARBLIE_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            MarblieConfig::from_json(&json).with_context(|| format!("parsing config {path}"))
        }
        Err(_) => Ok(MarblieConfig::default()),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_FILTER)),
            ),
        )
        .init();

    let config = load_config()?;
    let assets = pollster::block_on(assets::preload_native("assets/models"))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(marblie_core::MemoryStore::new());

    let mut app = build_app(
        config,
        assets,
        store,
        CommandQueue::new(),
        Window {
            title: "marblie".into(),
            ..default()
        },
    );
    app.run();
    Ok(())
}

// ============================================================================
// Browser
// ============================================================================

#[cfg(target_arch = "wasm32")]
const CANVAS_ID: &str = "marblie-canvas";

#[cfg(target_arch = "wasm32")]
fn main() {
    console_error_panic_hook::set_once();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .without_time()
        .with_writer(tracing_web::MakeWebConsoleWriter::new())
        .with_filter(EnvFilter::new(LOG_FILTER));
    tracing_subscriber::registry().with(fmt_layer).init();

    wasm_bindgen_futures::spawn_local(async {
        if let Err(e) = start_browser().await {
            tracing::error!("[marblie] failed to start: {e:#}");
        }
    });
}

#[cfg(target_arch = "wasm32")]
async fn start_browser() -> anyhow::Result<()> {
    use bevy::winit::{UpdateMode, WinitSettings};
    use marblie_core::bevy::{check_exit_system, host_command_queue, mark_app_started};

    if !mark_app_started() {
        tracing::info!("[marblie] app already running, skipping creation");
        return Ok(());
    }

    let assets = assets::preload_browser("models").await?;
    let store: Arc<dyn KeyValueStore> = Arc::new(marblie_core::LocalStorageStore);

    let mut app = build_app(
        MarblieConfig::default(),
        assets,
        store,
        host_command_queue(),
        Window {
            canvas: Some(format!("#{CANVAS_ID}")),
            fit_canvas_to_parent: true,
            prevent_default_event_handling: true,
            ..default()
        },
    );
    app.insert_resource(WinitSettings {
        focused_mode: UpdateMode::Continuous,
        unfocused_mode: UpdateMode::Continuous,
    });
    app.add_systems(Update, check_exit_system);

    tracing::info!("[marblie] calling app.run()");
    app.run();
    Ok(())
}
