mod config;
mod date_utils;
mod db;
mod jalali;
mod refresh_poller;
mod tracking;
mod web;

use config::{load as config_load, validate as config_validate};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_load();

    if let Err(err) = config_validate(&config) {
        eprintln!("Configuration error: {err}");
        std::process::exit(1);
    }

    info!(
        db_path = %config.database.path,
        tracking_url = %config.tracking.base_url,
        "Effective configuration loaded"
    );

    let poller_db = match db::SqliteDatabase::open(&config.database.path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to open database");
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);

    ctrlc::set_handler(move || {
        info!("Ctrl-C received, shutting down gracefully");
        running_signal.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    info!(
        check_interval = config.refresh.check_interval_seconds,
        max_age = config.refresh.max_age_seconds,
        "rahgir starting"
    );

    let provider = tracking::post_ir::PostIrClient::new(&config.tracking);

    let poller = refresh_poller::RefreshPoller::new(
        config.refresh,
        Box::new(poller_db),
        Box::new(provider),
        Arc::clone(&running),
    );
    let poller_handle = std::thread::Builder::new()
        .name("refresh-poller".into())
        .spawn(move || poller.run())
        .expect("Failed to spawn refresh poller thread");

    let web_db_path = config.database.path.clone();
    let web_port = config.web.port;
    let web_running = Arc::clone(&running);
    let web_handle = std::thread::Builder::new()
        .name("web-server".into())
        .spawn(move || web::start(web_db_path, web_port, web_running))
        .expect("Failed to spawn web server thread");

    let mut exit_code = 0;

    if let Err(err) = poller_handle.join() {
        error!("Refresh poller thread panicked: {:?}", err);
        exit_code = 1;
    }

    if let Err(err) = web_handle.join() {
        error!("Web server thread panicked: {:?}", err);
        exit_code = 1;
    }

    if exit_code == 0 {
        info!("rahgir stopped");
    } else {
        std::process::exit(exit_code);
    }
}
